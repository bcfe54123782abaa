//! Per-plugin table permission enforcement
//!
//! The enforcer is the only gate between plugin-issued statements and
//! the shared database connection. It holds two maps: the capability
//! grants of activated plugins (consulted by the SDK on every write),
//! and the declared permission records of every known plugin (consulted
//! by the settings UI and the uninstall dependency scan - declared
//! records survive for disabled plugins whose code never runs).
//!
//! Read declarations are advisory: they feed the dependency scan and
//! the permission preview, not the query path. Nothing here is a
//! security boundary against a plugin with write access to the process.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::RwLock;

use crate::manifest::PluginPermissions;

/// A table operation a plugin can be granted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableOperation {
    Read,
    Write,
    Create,
}

impl fmt::Display for TableOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Create => write!(f, "create"),
        }
    }
}

/// Another plugin that reads tables slated for deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDependents {
    pub plugin_id: String,
    /// The overlapping table names, as the dependent declared them
    pub tables: Vec<String>,
}

/// Grants actually extended to an activated plugin
#[derive(Debug, Default)]
struct Grant {
    write: HashSet<String>,
    create: HashSet<String>,
}

/// Authoritative map of plugin capabilities.
///
/// Populated at load time, read throughout the session, never
/// persisted; a restart rebuilds it from manifests. An unknown plugin
/// id has no permissions - that is a deny, not an error.
#[derive(Debug, Default)]
pub struct PermissionEnforcer {
    grants: RwLock<HashMap<String, Grant>>,
    declared: RwLock<HashMap<String, PluginPermissions>>,
}

impl PermissionEnforcer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant a plugin the capabilities its manifest declares, and record
    /// the declaration. Idempotent; a later call overwrites the earlier.
    pub fn set_plugin_permissions(&self, plugin_id: &str, permissions: &PluginPermissions) {
        let grant = Grant {
            write: permissions.write.iter().cloned().collect(),
            create: permissions.create.iter().cloned().collect(),
        };
        self.grants
            .write()
            .expect("permission grants lock poisoned")
            .insert(plugin_id.to_string(), grant);
        self.declare_plugin_permissions(plugin_id, permissions);
    }

    /// Record a plugin's declared permissions without granting anything.
    ///
    /// Used for disabled plugins: the settings UI can still explain what
    /// the plugin would touch, but `can_write` stays false for it.
    pub fn declare_plugin_permissions(&self, plugin_id: &str, permissions: &PluginPermissions) {
        self.declared
            .write()
            .expect("declared permissions lock poisoned")
            .insert(plugin_id.to_string(), permissions.clone());
    }

    /// Whether a plugin may INSERT/UPDATE/DELETE on a table.
    /// Table names are compared case-sensitively.
    pub fn can_write(&self, plugin_id: &str, table: &str) -> bool {
        self.grants
            .read()
            .expect("permission grants lock poisoned")
            .get(plugin_id)
            .map(|grant| grant.write.contains(table))
            .unwrap_or(false)
    }

    /// Whether a plugin may CREATE/DROP a table.
    pub fn can_create(&self, plugin_id: &str, table: &str) -> bool {
        self.grants
            .read()
            .expect("permission grants lock poisoned")
            .get(plugin_id)
            .map(|grant| grant.create.contains(table))
            .unwrap_or(false)
    }

    /// The write-table set granted to a plugin (empty if none)
    pub fn write_tables(&self, plugin_id: &str) -> HashSet<String> {
        self.grants
            .read()
            .expect("permission grants lock poisoned")
            .get(plugin_id)
            .map(|grant| grant.write.clone())
            .unwrap_or_default()
    }

    /// The declared permission record for a plugin (empty if undeclared)
    pub fn plugin_permissions(&self, plugin_id: &str) -> PluginPermissions {
        self.declared
            .read()
            .expect("declared permissions lock poisoned")
            .get(plugin_id)
            .cloned()
            .unwrap_or_default()
    }

    /// All declared permission records, for dependency analysis
    pub fn all_plugin_permissions(&self) -> HashMap<String, PluginPermissions> {
        self.declared
            .read()
            .expect("declared permissions lock poisoned")
            .clone()
    }

    /// Find every other plugin whose declared read set overlaps the
    /// given tables - used before dropping a plugin's tables on
    /// uninstall. Comparison is case-insensitive. Runs entirely against
    /// the in-memory permission map; the database is never consulted.
    ///
    /// Plugins with legacy unrestricted read declare nothing, so they
    /// never appear here.
    pub fn dependents_on_tables(
        &self,
        tables: &[String],
        exclude_plugin: &str,
    ) -> Vec<TableDependents> {
        let slated: HashSet<String> = tables.iter().map(|t| t.to_lowercase()).collect();

        let declared = self
            .declared
            .read()
            .expect("declared permissions lock poisoned");

        let mut dependents: Vec<TableDependents> = declared
            .iter()
            .filter(|(plugin_id, _)| plugin_id.as_str() != exclude_plugin)
            .filter_map(|(plugin_id, permissions)| {
                let reads = permissions.read.as_deref()?;
                let mut overlapping: Vec<String> = reads
                    .iter()
                    .filter(|table| slated.contains(&table.to_lowercase()))
                    .cloned()
                    .collect();
                if overlapping.is_empty() {
                    return None;
                }
                overlapping.sort();
                Some(TableDependents {
                    plugin_id: plugin_id.clone(),
                    tables: overlapping,
                })
            })
            .collect();

        dependents.sort_by(|a, b| a.plugin_id.cmp(&b.plugin_id));
        dependents
    }
}
