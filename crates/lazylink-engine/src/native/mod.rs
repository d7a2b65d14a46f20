//! Native library support
//!
//! Libraries without embedded IR are opened through a [`NativeLoader`].

pub mod loader;

pub use loader::{NativeHandle, NativeLoader, SystemLoader};
