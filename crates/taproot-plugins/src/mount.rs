//! External view mounting
//!
//! Views contributed by community plugins render through a mount
//! function instead of a trusted component, and externally-loaded UI
//! cannot be trusted to cooperate with teardown. `ViewHost` owns that
//! contract for one container: acquire on mount, release exactly once
//! on every exit path - remount, explicit unmount, or drop.

use serde_json::Value;
use std::sync::Arc;

use taproot_core::storage::Database;

use crate::registry::ExtensionRegistry;
use crate::sdk::PluginSdk;
use crate::types::{CleanupFn, MountContext, MountTarget, ViewRenderer};
use crate::{PluginError, PluginResult};

/// Hosts at most one live external mount for one tab/container.
pub struct ViewHost {
    registry: Arc<ExtensionRegistry>,
    db: Database,
    target: MountTarget,
    cleanup: Option<CleanupFn>,
}

impl ViewHost {
    pub fn new(registry: Arc<ExtensionRegistry>, db: Database, target: MountTarget) -> Self {
        Self {
            registry,
            db,
            target,
            cleanup: None,
        }
    }

    /// Whether a mount is live (its cleanup has not run yet)
    pub fn is_mounted(&self) -> bool {
        self.cleanup.is_some()
    }

    /// Mount a view into this host's container.
    ///
    /// Any pending cleanup runs first, so remounting the same container
    /// never stacks two live fragments. Component-rendered views have
    /// nothing to mount here and return `Ok(false)`; the shell renders
    /// them natively. The mount receives the opening props plus an SDK
    /// scoped to the view's owning plugin.
    pub fn mount(&mut self, view_id: &str, props: &Value) -> PluginResult<bool> {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }

        let view = self
            .registry
            .view(view_id)
            .ok_or_else(|| PluginError::NotFound(format!("view '{view_id}'")))?;

        let mount_fn = match view.renderer {
            ViewRenderer::Component(_) => return Ok(false),
            ViewRenderer::External(mount_fn) => mount_fn,
        };

        // A view registered without an owner gets an anonymous identity,
        // which holds no grants.
        let plugin_id = match self.registry.plugin_id_for_view(view_id) {
            Some(plugin_id) => plugin_id,
            None => {
                tracing::warn!(view_id, "Mounting view with no recorded owner");
                String::new()
            }
        };

        let sdk = PluginSdk::new(plugin_id, self.registry.enforcer(), self.db.clone());
        let context = MountContext {
            props: props.clone(),
            sdk,
        };

        let cleanup = mount_fn(&mut self.target, context)?;
        self.cleanup = Some(cleanup);
        Ok(true)
    }

    /// Run the pending cleanup, if any. Safe to call repeatedly.
    pub fn unmount(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl Drop for ViewHost {
    fn drop(&mut self) {
        self.unmount();
    }
}
