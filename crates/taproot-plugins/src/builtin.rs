//! Core plugins
//!
//! The statically-linked, implicitly trusted plugins that ship with the
//! app. They go through the same activation surface as community
//! plugins - same context, same registry calls - which keeps the
//! extension path honest.

use async_trait::async_trait;
use serde_json::json;

use crate::context::PluginContext;
use crate::loader::Plugin;
use crate::manifest::{PluginContributions, PluginManifest, PluginPermissions};
use crate::types::{
    Command, SidebarItem, StatusBarItem, StatusBarPosition, ViewDefinition,
};
use crate::PluginResult;

/// The core plugin set, in activation order
pub fn core_plugins() -> Vec<Box<dyn Plugin>> {
    vec![
        Box::new(AccountsPlugin::new()),
        Box::new(BudgetsPlugin::new()),
    ]
}

/// Account list and transaction register
pub struct AccountsPlugin {
    manifest: PluginManifest,
}

impl AccountsPlugin {
    pub fn new() -> Self {
        Self {
            manifest: PluginManifest {
                id: "accounts".to_string(),
                name: "Accounts".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: "Account list and transaction register".to_string(),
                author: "Taproot".to_string(),
                icon: Some("bank".to_string()),
                main: None,
                permissions: PluginPermissions {
                    read: Some(vec![
                        "accounts".to_string(),
                        "transactions".to_string(),
                        "categories".to_string(),
                    ]),
                    write: vec![
                        "accounts".to_string(),
                        "transactions".to_string(),
                        "categories".to_string(),
                    ],
                    create: vec![],
                },
                contributes: PluginContributions::default(),
            },
        }
    }
}

impl Default for AccountsPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for AccountsPlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    async fn activate(&self, context: &PluginContext) -> PluginResult<()> {
        context.register_view(
            ViewDefinition::component("accounts.list", "Accounts", "AccountsView")
                .with_icon("bank"),
        );
        context.register_view(
            ViewDefinition::component("accounts.register", "Transactions", "RegisterView")
                .with_icon("list")
                .allow_multiple(true),
        );

        context.register_sidebar_item(
            SidebarItem::new("accounts", "overview", "accounts.list", "Accounts")
                .with_icon("bank")
                .with_shortcut("mod+1")
                .with_order(0),
        );

        context.register_command(Command::new(
            "accounts.open",
            "Open Accounts",
            |registry| {
                registry.open_view("accounts.list", json!({}));
            },
        ));

        Ok(())
    }
}

/// Monthly budget tracking
pub struct BudgetsPlugin {
    manifest: PluginManifest,
}

impl BudgetsPlugin {
    pub fn new() -> Self {
        Self {
            manifest: PluginManifest {
                id: "budgets".to_string(),
                name: "Budgets".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: "Monthly budget tracking".to_string(),
                author: "Taproot".to_string(),
                icon: Some("target".to_string()),
                main: None,
                permissions: PluginPermissions {
                    read: Some(vec![
                        "budgets".to_string(),
                        "categories".to_string(),
                        "transactions".to_string(),
                    ]),
                    write: vec!["budgets".to_string()],
                    create: vec![],
                },
                contributes: PluginContributions::default(),
            },
        }
    }
}

impl Default for BudgetsPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for BudgetsPlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    async fn activate(&self, context: &PluginContext) -> PluginResult<()> {
        context.register_view(
            ViewDefinition::component("budgets.month", "Budgets", "BudgetMonthView")
                .with_icon("target"),
        );

        context.register_sidebar_item(
            SidebarItem::new("budgets", "overview", "budgets.month", "Budgets")
                .with_icon("target")
                .with_shortcut("mod+2")
                .with_order(1),
        );

        context.register_command(Command::new("budgets.open", "Open Budgets", |registry| {
            registry.open_view("budgets.month", json!({}));
        }));

        context.register_status_bar_item(StatusBarItem::new(
            "budgets.remaining",
            StatusBarPosition::Right,
            0,
            "BudgetRemaining",
        ));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_manifests_are_valid() {
        for plugin in core_plugins() {
            crate::manifest::validate_manifest(plugin.manifest(), true).expect("valid manifest");
        }
    }

    #[test]
    fn test_core_plugin_order_is_stable() {
        let ids: Vec<String> = core_plugins()
            .iter()
            .map(|p| p.manifest().id.clone())
            .collect();
        assert_eq!(ids, vec!["accounts".to_string(), "budgets".to_string()]);
    }
}
