//! Context creation and teardown
//!
//! A new context starts with an empty resolution map. What gets registered
//! into it depends on whether it is the initial context and on its kind.

use crate::context::{ContextKind, ExecutionContext};
use crate::engine::IrEngine;
use crate::registry::DlHandle;

use super::DynamicLinker;

impl DynamicLinker {
    /// Create the process's initial context.
    ///
    /// Nothing is registered: the base library registers itself when it is
    /// opened in this context.
    pub fn create_initial_context(&self, engine: Box<dyn IrEngine>) -> ExecutionContext {
        let ctx = ExecutionContext::new(ContextKind::ShareNothing, true, None, engine);
        log::debug!("created initial context {}", ctx.id());
        ctx
    }

    /// Create a child of `parent`.
    ///
    /// Every non-initial context gets the base library's exports. A
    /// [`ContextKind::ShareParentRw`] child additionally gets the exports of
    /// every loaded IR library, all unparsed: compiled code is never shared.
    pub fn create_context(
        &self,
        parent: &ExecutionContext,
        kind: ContextKind,
        engine: Box<dyn IrEngine>,
    ) -> ExecutionContext {
        let mut ctx = ExecutionContext::new(kind, false, Some(parent.id()), engine);

        let suffix = self.config.base_export_suffix.as_str();
        let mut registered = 0;
        for &id in &self.base_modules {
            registered += ctx.state_mut().register_module_exports(
                &self.config.base_library,
                id,
                &self.modules[id],
                |name| name.ends_with(suffix),
            );
        }

        if ctx.shares_parent_state() {
            for info in self.registry.live() {
                let DlHandle::Ir(ir) = info.handle() else {
                    continue;
                };
                for &id in ir.modules() {
                    registered += ctx.state_mut().register_module_exports(
                        ir.name(),
                        id,
                        &self.modules[id],
                        |_| true,
                    );
                }
            }
        }

        log::debug!(
            "created {:?} context {} from {}: {} symbols registered",
            kind,
            ctx.id(),
            parent.id(),
            registered
        );
        ctx
    }

    /// Tear a context down.
    ///
    /// A non-initial context drops its resolution map; using it afterwards
    /// finds nothing. The initial context keeps its map until the process
    /// exits.
    pub fn destroy_context(&self, ctx: &mut ExecutionContext) {
        if !ctx.is_initial() {
            ctx.state_mut().clear();
        }
        ctx.mark_destroyed();
        log::debug!("destroyed context {}", ctx.id());
    }
}
