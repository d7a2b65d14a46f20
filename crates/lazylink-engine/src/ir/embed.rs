//! Embedded IR bundle format
//!
//! A library that supports the IR execution path carries its modules as a
//! payload appended to the native image:
//!
//! ```text
//! ┌─────────────────────────┐
//! │  native image           │  ← unchanged shared object
//! ├─────────────────────────┤
//! │  Manifest (JSON)        │  ← BundleManifest
//! ├─────────────────────────┤
//! │  Trailer (20 bytes)     │  ← crc32 | manifest length | magic
//! └─────────────────────────┘
//! ```
//!
//! A file without the trailer magic is a plain native library.

use std::fs;
use std::path::{Path, PathBuf};

use data_encoding::BASE64;
use serde::{Deserialize, Serialize};

use super::module::{IrPayload, ModuleRepresentation};
use crate::error::{DllError, DllResult};

/// Magic bytes identifying an embedded IR trailer.
pub const TRAILER_MAGIC: [u8; 8] = *b"LZLKIR01";

/// Size of the trailer: checksum (4) + manifest length (8) + magic (8).
pub const TRAILER_SIZE: usize = 4 + 8 + 8;

/// Current manifest version
pub const MANIFEST_VERSION: u32 = 1;

/// JSON manifest listing the modules of a library.
///
/// This is also the input format of `lazylink embed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    /// Manifest format version
    #[serde(default = "default_version")]
    pub version: u32,
    /// Modules in library order
    pub modules: Vec<ManifestModule>,
}

fn default_version() -> u32 {
    MANIFEST_VERSION
}

/// One module entry of a [`BundleManifest`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestModule {
    /// Module name
    pub name: String,
    /// Defined symbols
    #[serde(default)]
    pub exports: Vec<String>,
    /// Referenced but undefined symbols
    #[serde(default)]
    pub imports: Vec<String>,
    /// The IR itself
    pub ir: ManifestPayload,
}

/// Payload encoding inside the manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "format", content = "data", rename_all = "lowercase")]
pub enum ManifestPayload {
    /// Base64-encoded binary IR
    Bitcode(String),
    /// Textual IR
    Text(String),
}

impl BundleManifest {
    /// Build a manifest from module descriptors
    pub fn from_modules(modules: &[ModuleRepresentation]) -> Self {
        let modules = modules
            .iter()
            .map(|m| ManifestModule {
                name: m.name().to_string(),
                exports: m.exports().to_vec(),
                imports: m.imports().to_vec(),
                ir: match m.payload() {
                    IrPayload::Binary(bytes) => ManifestPayload::Bitcode(BASE64.encode(bytes)),
                    IrPayload::Text(text) => ManifestPayload::Text(text.clone()),
                },
            })
            .collect();
        Self {
            version: MANIFEST_VERSION,
            modules,
        }
    }

    /// Decode the manifest into module descriptors.
    ///
    /// Returns the name of the offending module on a base64 error.
    pub fn into_modules(self) -> Result<Vec<ModuleRepresentation>, String> {
        self.modules
            .into_iter()
            .map(|m| {
                let payload = match m.ir {
                    ManifestPayload::Bitcode(encoded) => IrPayload::Binary(
                        BASE64
                            .decode(encoded.as_bytes())
                            .map_err(|e| format!("module '{}': {}", m.name, e))?,
                    ),
                    ManifestPayload::Text(text) => IrPayload::Text(text),
                };
                Ok(ModuleRepresentation::new(m.name, m.exports, m.imports, payload))
            })
            .collect()
    }
}

/// Encode modules as manifest + trailer bytes, ready to append to a library.
pub fn encode_bundle(modules: &[ModuleRepresentation]) -> DllResult<Vec<u8>> {
    let manifest = serde_json::to_vec(&BundleManifest::from_modules(modules)).map_err(|e| {
        DllError::Bundle {
            path: String::new(),
            reason: e.to_string(),
        }
    })?;

    let mut bytes = Vec::with_capacity(manifest.len() + TRAILER_SIZE);
    bytes.extend_from_slice(&manifest);
    bytes.extend_from_slice(&crc32fast::hash(&manifest).to_le_bytes());
    bytes.extend_from_slice(&(manifest.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&TRAILER_MAGIC);
    Ok(bytes)
}

/// Locate the manifest inside a file image.
///
/// Returns `(start, end)` of the manifest bytes, or `None` if there is no
/// trailer. A trailer that is present but inconsistent is an error.
fn locate_manifest(data: &[u8], path: &str) -> DllResult<Option<(usize, usize)>> {
    if data.len() < TRAILER_SIZE {
        return Ok(None);
    }

    let trailer = &data[data.len() - TRAILER_SIZE..];
    if trailer[12..20] != TRAILER_MAGIC {
        return Ok(None);
    }

    let bundle_error = |reason: &str| DllError::Bundle {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    let mut crc = [0u8; 4];
    crc.copy_from_slice(&trailer[0..4]);
    let mut len = [0u8; 8];
    len.copy_from_slice(&trailer[4..12]);
    let checksum = u32::from_le_bytes(crc);
    let manifest_len = u64::from_le_bytes(len) as usize;

    let end = data.len() - TRAILER_SIZE;
    if manifest_len > end {
        return Err(bundle_error("manifest length exceeds file size"));
    }
    let start = end - manifest_len;

    if crc32fast::hash(&data[start..end]) != checksum {
        return Err(bundle_error("checksum mismatch"));
    }

    Ok(Some((start, end)))
}

/// Decode the modules embedded in a file image, if any.
pub fn decode_bundle(data: &[u8], path: &str) -> DllResult<Option<Vec<ModuleRepresentation>>> {
    let Some((start, end)) = locate_manifest(data, path)? else {
        return Ok(None);
    };

    let manifest: BundleManifest =
        serde_json::from_slice(&data[start..end]).map_err(|e| DllError::Bundle {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

    if manifest.version != MANIFEST_VERSION {
        return Err(DllError::Bundle {
            path: path.to_string(),
            reason: format!("unsupported manifest version {}", manifest.version),
        });
    }

    manifest
        .into_modules()
        .map(Some)
        .map_err(|reason| DllError::Bundle {
            path: path.to_string(),
            reason,
        })
}

/// Read the IR modules embedded in a library file.
///
/// `Ok(None)` means the file exists but carries no IR.
pub fn extract_ir(path: &Path) -> DllResult<Option<Vec<ModuleRepresentation>>> {
    let data = fs::read(path)?;
    decode_bundle(&data, &path.display().to_string())
}

/// Embed modules into a library file, replacing any existing bundle.
///
/// The new image is written next to the library and renamed over it, so a
/// failed write leaves the original file untouched.
pub fn embed_ir(path: &Path, modules: &[ModuleRepresentation]) -> DllResult<()> {
    let mut data = fs::read(path)?;
    let image_len = match locate_manifest(&data, &path.display().to_string())? {
        Some((start, _)) => start,
        None => data.len(),
    };
    data.truncate(image_len);
    data.extend_from_slice(&encode_bundle(modules)?);

    let mut staging = path.as_os_str().to_owned();
    staging.push(".lzlk-tmp");
    let staging = PathBuf::from(staging);

    let written = fs::write(&staging, &data)
        .and_then(|()| fs::set_permissions(&staging, fs::metadata(path)?.permissions()))
        .and_then(|()| fs::rename(&staging, path));
    if let Err(e) = written {
        let _ = fs::remove_file(&staging);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_modules() -> Vec<ModuleRepresentation> {
        vec![
            ModuleRepresentation::new(
                "init",
                vec!["R_init_foo".to_string()],
                vec!["helper".to_string()],
                IrPayload::Binary(vec![0xde, 0xc0, 0x17, 0x0b]),
            ),
            ModuleRepresentation::new(
                "text",
                vec!["t".to_string()],
                vec![],
                IrPayload::Text("define void @t() { ret void }".to_string()),
            ),
        ]
    }

    #[test]
    fn test_plain_file_has_no_ir() {
        let data = b"\x7fELF not really a library".to_vec();
        assert!(decode_bundle(&data, "plain.so").unwrap().is_none());
    }

    #[test]
    fn test_short_file_has_no_ir() {
        assert!(decode_bundle(b"tiny", "tiny.so").unwrap().is_none());
    }

    #[test]
    fn test_bundle_after_native_image() {
        let mut data = b"\x7fELF native image bytes".to_vec();
        data.extend(encode_bundle(&sample_modules()).unwrap());

        let modules = decode_bundle(&data, "libfoo.so").unwrap().unwrap();
        assert_eq!(modules, sample_modules());
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut data = encode_bundle(&sample_modules()).unwrap();
        data[2] ^= 0xff;
        let result = decode_bundle(&data, "libfoo.so");
        assert!(matches!(result, Err(DllError::Bundle { .. })));
    }

    #[test]
    fn test_bad_length() {
        let mut data = encode_bundle(&sample_modules()).unwrap();
        let len_at = data.len() - 16;
        data[len_at..len_at + 8].copy_from_slice(&u64::MAX.to_le_bytes());
        let err = decode_bundle(&data, "libfoo.so").unwrap_err();
        assert!(err.to_string().contains("exceeds file size"));
    }

    #[test]
    fn test_embed_replaces_existing_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libfoo.so");
        fs::write(&path, b"native").unwrap();

        embed_ir(&path, &sample_modules()).unwrap();
        embed_ir(&path, &sample_modules()[..1]).unwrap();

        let data = fs::read(&path).unwrap();
        assert!(data.starts_with(b"native"));
        let modules = extract_ir(&path).unwrap().unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].name(), "init");
    }

    #[test]
    fn test_embed_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libfoo.so");
        fs::write(&path, b"native").unwrap();

        embed_ir(&path, &sample_modules()).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("libfoo.so")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_embed_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libfoo.so");
        fs::write(&path, b"native").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        embed_ir(&path, &sample_modules()).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_embed_into_corrupt_bundle_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libfoo.so");
        let mut data = b"native".to_vec();
        data.extend(encode_bundle(&sample_modules()).unwrap());
        data[8] ^= 0xff;
        fs::write(&path, &data).unwrap();

        assert!(matches!(embed_ir(&path, &sample_modules()), Err(DllError::Bundle { .. })));
        assert_eq!(fs::read(&path).unwrap(), data);
    }

    #[test]
    fn test_manifest_json_shape() {
        let json = r#"{
            "modules": [
                { "name": "m1", "exports": ["f"], "ir": { "format": "bitcode", "data": "3sAXCw==" } }
            ]
        }"#;
        let manifest: BundleManifest = serde_json::from_str(json).unwrap();
        let modules = manifest.into_modules().unwrap();
        assert_eq!(modules[0].imports().len(), 0);
        assert_eq!(
            modules[0].payload(),
            &IrPayload::Binary(vec![0xde, 0xc0, 0x17, 0x0b])
        );
    }
}
