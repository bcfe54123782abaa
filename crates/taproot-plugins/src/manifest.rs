//! Plugin manifests and permission declarations
//!
//! A plugin describes itself in a `manifest.json`: identity, the tables
//! it wants to touch, and (for community plugins) the UI it contributes.
//! Manifests are immutable once loaded; the `id` is the capability key
//! and the namespace prefix for any tables the plugin creates.

use serde::{Deserialize, Serialize};

use crate::types::{SidebarItem, SidebarSection, StatusBarItem};
use crate::{PluginError, PluginResult};

/// File name of the manifest inside a plugin directory
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Default module file when the manifest does not name one via `main`
pub const DEFAULT_MODULE_FILE: &str = "module.wasm";

/// Manifests larger than this are rejected outright
pub const MAX_MANIFEST_BYTES: u64 = 64 * 1024;

/// Plugin manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Entry module file, relative to the plugin directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
    #[serde(default)]
    pub permissions: PluginPermissions,
    #[serde(default)]
    pub contributes: PluginContributions,
}

impl PluginManifest {
    /// Module file name for this plugin
    pub fn module_file(&self) -> &str {
        self.main.as_deref().unwrap_or(DEFAULT_MODULE_FILE)
    }
}

/// Per-table permission declarations, the unit the enforcer checks against.
///
/// An absent `read` field means "unrestricted read" - a legacy escape
/// hatch for manifests written before read declarations existed. It is
/// advisory only and never enforced on the query path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginPermissions {
    /// Tables the plugin may SELECT from; `None` means unrestricted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<Vec<String>>,
    /// Tables the plugin may INSERT/UPDATE/DELETE
    #[serde(default)]
    pub write: Vec<String>,
    /// Tables the plugin may CREATE/DROP
    #[serde(default)]
    pub create: Vec<String>,
}

impl PluginPermissions {
    /// Whether the manifest predates read declarations
    pub fn unrestricted_read(&self) -> bool {
        self.read.is_none()
    }
}

/// UI surface a community plugin contributes.
///
/// A community plugin's module cannot call registration functions
/// directly, so its sidebar entries, views, commands, and status bar
/// items are declared here and registered on its behalf at activation.
/// Core plugins register through the context API instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginContributions {
    #[serde(default)]
    pub sidebar_sections: Vec<SidebarSection>,
    #[serde(default)]
    pub sidebar_items: Vec<SidebarItem>,
    #[serde(default)]
    pub views: Vec<ViewContribution>,
    #[serde(default)]
    pub commands: Vec<CommandContribution>,
    #[serde(default)]
    pub status_bar: Vec<StatusBarItem>,
}

/// A view a community plugin contributes, rendered by mounting the
/// plugin's module rather than a trusted in-process component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewContribution {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Module export invoked on mount (default "mount")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<String>,
    #[serde(default)]
    pub allow_multiple: bool,
}

/// A command a community plugin contributes; invoking it executes the
/// named module export in the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandContribution {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<String>,
    /// Module export invoked on execution (default: the command id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<String>,
}

/// Namespace prefix for tables created by a plugin. Hyphens in the id
/// map to underscores so ids stay valid table-name fragments.
pub fn table_prefix(plugin_id: &str) -> String {
    format!("sys_plugin_{}_", plugin_id.replace('-', "_"))
}

/// Validate a manifest.
///
/// `trusted` is true for core plugins; community plugins additionally
/// must keep every created table inside their `sys_plugin_{id}_*`
/// namespace so cross-plugin collisions are structurally impossible.
pub fn validate_manifest(manifest: &PluginManifest, trusted: bool) -> PluginResult<()> {
    if manifest.id.trim().is_empty()
        || manifest.name.trim().is_empty()
        || manifest.version.trim().is_empty()
        || manifest.description.trim().is_empty()
        || manifest.author.trim().is_empty()
    {
        return Err(PluginError::ValidationFailed(
            "Manifest fields cannot be empty".to_string(),
        ));
    }

    if !manifest
        .id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(PluginError::ValidationFailed(format!(
            "Plugin id '{}' may contain only letters, numbers, hyphens, and underscores",
            manifest.id
        )));
    }

    for (set_name, tables) in [
        ("read", manifest.permissions.read.as_deref().unwrap_or(&[])),
        ("write", manifest.permissions.write.as_slice()),
        ("create", manifest.permissions.create.as_slice()),
    ] {
        let mut seen = std::collections::HashSet::new();
        for table in tables {
            if table.trim().is_empty() {
                return Err(PluginError::ValidationFailed(format!(
                    "Empty table name in {} permissions",
                    set_name
                )));
            }
            if !seen.insert(table.as_str()) {
                return Err(PluginError::ValidationFailed(format!(
                    "Duplicate table '{}' in {} permissions",
                    table, set_name
                )));
            }
        }
    }

    if !trusted {
        let prefix = table_prefix(&manifest.id);
        for table in &manifest.permissions.create {
            if !table.starts_with(&prefix) {
                return Err(PluginError::ValidationFailed(format!(
                    "Created table '{}' must be namespaced as {}*",
                    table, prefix
                )));
            }
        }
    }

    Ok(())
}
