//! Per-plugin activation context
//!
//! The context is the only surface a plugin gets during `activate`. It
//! is bound to the plugin's identity: views registered through it are
//! tagged with the owning plugin id automatically, and the database
//! handle it exposes resolves every operation against the enforcer.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::registry::ExtensionRegistry;
use crate::sdk::PluginSdk;
use crate::types::{Command, SidebarItem, SidebarSection, StatusBarItem, ViewDefinition};

/// Capability-scoped handle passed to `Plugin::activate`
#[derive(Clone)]
pub struct PluginContext {
    plugin_id: String,
    registry: Arc<ExtensionRegistry>,
    sdk: PluginSdk,
}

impl PluginContext {
    pub fn new(
        plugin_id: impl Into<String>,
        registry: Arc<ExtensionRegistry>,
        sdk: PluginSdk,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            registry,
            sdk,
        }
    }

    /// The plugin this context belongs to
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Database handle scoped to this plugin's grants
    pub fn sdk(&self) -> &PluginSdk {
        &self.sdk
    }

    pub fn register_sidebar_section(&self, section: SidebarSection) {
        self.registry.register_sidebar_section(section);
    }

    pub fn register_sidebar_item(&self, item: SidebarItem) {
        self.registry.register_sidebar_item(item);
    }

    /// Register a view owned by this plugin
    pub fn register_view(&self, view: ViewDefinition) {
        self.registry.register_view(view, Some(&self.plugin_id));
    }

    pub fn register_command(&self, command: Command) {
        self.registry.register_command(command);
    }

    pub fn register_status_bar_item(&self, item: StatusBarItem) {
        self.registry.register_status_bar_item(item);
    }

    /// Open a view in a tab (commands registered by a plugin often do
    /// this from their thunk instead)
    pub fn open_view(&self, view_id: &str, props: Value) -> Option<Uuid> {
        self.registry.open_view(view_id, props)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::PermissionEnforcer;
    use taproot_core::storage::Database;

    #[tokio::test]
    async fn test_views_registered_through_context_are_owned() {
        let registry = Arc::new(ExtensionRegistry::new());
        let db = Database::in_memory().await.expect("open db");
        let sdk = PluginSdk::new("net-worth", Arc::new(PermissionEnforcer::new()), db);
        let ctx = PluginContext::new("net-worth", registry.clone(), sdk);

        ctx.register_view(ViewDefinition::component(
            "net-worth.chart",
            "Net Worth",
            "NetWorthChart",
        ));

        assert_eq!(
            registry.plugin_id_for_view("net-worth.chart").as_deref(),
            Some("net-worth")
        );
    }
}
