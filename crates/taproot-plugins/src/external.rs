//! Community plugin adapter
//!
//! Bridges a discovered `{manifest, module}` pair into the [`Plugin`]
//! trait. The module is executed in the sandbox - once at activation,
//! and again whenever one of its views mounts or one of its commands
//! runs. Its UI surface comes from the manifest's `contributes` block;
//! the module itself is never handed registration functions.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::PluginContext;
use crate::loader::Plugin;
use crate::manifest::{CommandContribution, PluginManifest, ViewContribution};
use crate::registry::ExtensionRegistry;
use crate::sandbox::{ACTIVATE_EXPORT, Sandbox};
use crate::types::{Command, MountFn, ViewDefinition};
use crate::{PluginError, PluginResult};

/// Default export invoked when a contributed view mounts
const DEFAULT_MOUNT_EXPORT: &str = "mount";

/// A dynamically discovered plugin backed by a sandboxed WASM module
#[derive(Debug)]
pub struct ExternalPlugin {
    manifest: PluginManifest,
    module: Arc<Vec<u8>>,
    sandbox: Arc<Sandbox>,
}

impl ExternalPlugin {
    /// Wrap a module, requiring the `activate` export up front so a
    /// mis-built module fails at load, not at activation.
    pub fn new(
        manifest: PluginManifest,
        module_bytes: Vec<u8>,
        sandbox: Arc<Sandbox>,
    ) -> PluginResult<Self> {
        let exports = sandbox.validate_module(&module_bytes)?;
        if !exports.iter().any(|name| name == ACTIVATE_EXPORT) {
            return Err(PluginError::LoadFailed {
                plugin_id: manifest.id.clone(),
                reason: format!("module does not export '{ACTIVATE_EXPORT}'"),
            });
        }

        Ok(Self {
            manifest,
            module: Arc::new(module_bytes),
            sandbox,
        })
    }

    fn mount_fn(&self, view: &ViewContribution) -> MountFn {
        let sandbox = self.sandbox.clone();
        let module = self.module.clone();
        let export = view
            .export
            .clone()
            .unwrap_or_else(|| DEFAULT_MOUNT_EXPORT.to_string());
        let plugin_id = self.manifest.id.clone();

        Arc::new(move |target, _context| {
            sandbox.execute_export(&module, &export)?;
            let container_id = target.container_id.clone();
            let plugin_id = plugin_id.clone();
            Ok(Box::new(move || {
                tracing::debug!(%plugin_id, %container_id, "External view unmounted");
            }))
        })
    }

    fn command(&self, contribution: &CommandContribution) -> Command {
        let sandbox = self.sandbox.clone();
        let module = self.module.clone();
        let export = contribution
            .export
            .clone()
            .unwrap_or_else(|| contribution.id.clone());
        let plugin_id = self.manifest.id.clone();
        let command_id = contribution.id.clone();

        let mut command = Command::new(
            &contribution.id,
            &contribution.name,
            move |_registry: &ExtensionRegistry| {
                if let Err(e) = sandbox.execute_export(&module, &export) {
                    tracing::warn!(%plugin_id, %command_id, error = %e, "Plugin command failed");
                }
            },
        );
        if let Some(category) = &contribution.category {
            command = command.with_category(category);
        }
        if let Some(shortcut) = &contribution.shortcut {
            command = command.with_shortcut(shortcut);
        }
        command
    }
}

#[async_trait]
impl Plugin for ExternalPlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    async fn activate(&self, context: &PluginContext) -> PluginResult<()> {
        // Give the module one bounded run to initialize itself
        let sandbox = self.sandbox.clone();
        let module = self.module.clone();
        tokio::task::spawn_blocking(move || sandbox.execute_export(&module, ACTIVATE_EXPORT))
            .await
            .map_err(|e| PluginError::ActivationFailed {
                plugin_id: self.manifest.id.clone(),
                reason: format!("activation task failed: {e}"),
            })??;

        let contributes = &self.manifest.contributes;

        for section in &contributes.sidebar_sections {
            context.register_sidebar_section(section.clone());
        }

        for view in &contributes.views {
            let mut definition =
                ViewDefinition::external(&view.id, &view.name, self.mount_fn(view))
                    .allow_multiple(view.allow_multiple);
            if let Some(icon) = &view.icon {
                definition = definition.with_icon(icon);
            }
            context.register_view(definition);
        }

        for item in &contributes.sidebar_items {
            context.register_sidebar_item(item.clone());
        }

        for command in &contributes.commands {
            context.register_command(self.command(command));
        }

        for status_item in &contributes.status_bar {
            context.register_status_bar_item(status_item.clone());
        }

        Ok(())
    }
}
