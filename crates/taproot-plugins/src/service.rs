//! Local plugin installation and removal
//!
//! Installs copy a validated `{manifest.json, module}` pair into the
//! plugins directory; removal drops the plugin's own namespaced tables
//! after checking whether any other plugin still declares a read on
//! them. The dependency check runs against the permission map, never
//! the database.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use taproot_core::storage::Database;

use crate::manifest::{
    MANIFEST_FILE_NAME, MAX_MANIFEST_BYTES, PluginManifest, table_prefix, validate_manifest,
};
use crate::permissions::{PermissionEnforcer, TableDependents};
use crate::sandbox::{ACTIVATE_EXPORT, Sandbox};
use crate::{PluginError, PluginResult};

/// Outcome of a successful install
#[derive(Debug, Clone, Serialize)]
pub struct InstallReceipt {
    pub plugin_id: String,
    pub plugin_name: String,
    pub version: String,
    pub install_dir: PathBuf,
    pub installed_at: DateTime<Utc>,
}

/// Outcome of an uninstall attempt.
///
/// `removed` is false when dependents blocked the removal; the caller
/// decides whether to retry with `force`.
#[derive(Debug, Clone, Serialize)]
pub struct UninstallReport {
    pub plugin_id: String,
    pub removed: bool,
    pub dropped_tables: Vec<String>,
    pub dependents: Vec<TableDependents>,
}

/// Manages the on-disk plugin installation directory
pub struct PluginService {
    plugins_dir: PathBuf,
    sandbox: Arc<Sandbox>,
}

impl PluginService {
    pub fn new(plugins_dir: PathBuf) -> PluginResult<Self> {
        fs::create_dir_all(&plugins_dir).map_err(PluginError::IoError)?;
        Ok(Self {
            plugins_dir,
            sandbox: Arc::new(Sandbox::new()?),
        })
    }

    /// All installed plugin manifests. Entries that no longer parse are
    /// skipped with a warning, never fatal.
    pub fn list_installed(&self) -> Vec<PluginManifest> {
        let entries = match fs::read_dir(&self.plugins_dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut manifests = Vec::new();
        for entry in entries.flatten() {
            let directory = entry.path();
            if !directory.is_dir() {
                continue;
            }
            let manifest_path = directory.join(MANIFEST_FILE_NAME);
            if !manifest_path.exists() {
                continue;
            }
            match read_manifest(&manifest_path) {
                Ok(manifest) => manifests.push(manifest),
                Err(e) => {
                    tracing::warn!(dir = ?directory, error = %e, "Skipping invalid installed plugin");
                }
            }
        }

        manifests.sort_by(|a, b| a.id.cmp(&b.id));
        manifests
    }

    /// The manifest of one installed plugin
    pub fn installed_manifest(&self, plugin_id: &str) -> PluginResult<PluginManifest> {
        let manifest_path = self
            .plugins_dir
            .join(plugin_id)
            .join(MANIFEST_FILE_NAME);
        if !manifest_path.exists() {
            return Err(PluginError::NotFound(plugin_id.to_string()));
        }
        read_manifest(&manifest_path)
    }

    /// Install a plugin from a local build directory.
    ///
    /// The directory must hold a valid community manifest and a built
    /// module exporting `activate`; both are checked before anything is
    /// copied, so a broken plugin fails at install time rather than at
    /// the next startup.
    pub fn install_from_directory(&self, source: &Path) -> PluginResult<InstallReceipt> {
        if !source.is_dir() {
            return Err(PluginError::ValidationFailed(format!(
                "Not a directory: {}",
                source.display()
            )));
        }

        let manifest_path = source.join(MANIFEST_FILE_NAME);
        if !manifest_path.exists() {
            return Err(PluginError::ValidationFailed(format!(
                "No {} found in {}",
                MANIFEST_FILE_NAME,
                source.display()
            )));
        }
        let manifest = read_manifest(&manifest_path)?;

        let module_name = manifest.module_file().to_string();
        let module_path = source.join(&module_name);
        if !module_path.exists() {
            return Err(PluginError::ValidationFailed(format!(
                "Plugin not built: expected module at {}",
                module_path.display()
            )));
        }

        let module_bytes = fs::read(&module_path).map_err(PluginError::IoError)?;
        let exports = self.sandbox.validate_module(&module_bytes)?;
        if !exports.iter().any(|name| name == ACTIVATE_EXPORT) {
            return Err(PluginError::ValidationFailed(format!(
                "Module does not export '{ACTIVATE_EXPORT}'"
            )));
        }

        let install_dir = self.plugins_dir.join(&manifest.id);
        fs::create_dir_all(&install_dir).map_err(PluginError::IoError)?;
        fs::copy(&manifest_path, install_dir.join(MANIFEST_FILE_NAME))
            .map_err(PluginError::IoError)?;
        fs::copy(&module_path, install_dir.join(&module_name)).map_err(PluginError::IoError)?;

        tracing::info!(plugin_id = %manifest.id, version = %manifest.version, "Plugin installed");

        Ok(InstallReceipt {
            plugin_id: manifest.id.clone(),
            plugin_name: manifest.name.clone(),
            version: manifest.version.clone(),
            install_dir,
            installed_at: Utc::now(),
        })
    }

    /// Remove an installed plugin and drop its namespaced tables.
    ///
    /// If another plugin declares a read on a table slated for deletion
    /// and `force` is false, nothing is touched and the report carries
    /// the dependents.
    pub async fn uninstall(
        &self,
        plugin_id: &str,
        enforcer: &PermissionEnforcer,
        db: &Database,
        force: bool,
    ) -> PluginResult<UninstallReport> {
        let manifest = self.installed_manifest(plugin_id)?;
        let tables = manifest.permissions.create.clone();

        let dependents = enforcer.dependents_on_tables(&tables, plugin_id);
        if !dependents.is_empty() && !force {
            return Ok(UninstallReport {
                plugin_id: plugin_id.to_string(),
                removed: false,
                dropped_tables: Vec::new(),
                dependents,
            });
        }

        let prefix = table_prefix(plugin_id);
        for table in &tables {
            ensure_droppable_table(table, &prefix)?;
            sqlx::query(&format!("DROP TABLE IF EXISTS \"{table}\""))
                .execute(db.pool())
                .await?;
            tracing::info!(plugin_id, %table, "Dropped plugin table");
        }

        fs::remove_dir_all(self.plugins_dir.join(plugin_id)).map_err(PluginError::IoError)?;
        tracing::info!(plugin_id, "Plugin uninstalled");

        Ok(UninstallReport {
            plugin_id: plugin_id.to_string(),
            removed: true,
            dropped_tables: tables,
            dependents,
        })
    }
}

fn read_manifest(path: &Path) -> PluginResult<PluginManifest> {
    let metadata = fs::metadata(path).map_err(PluginError::IoError)?;
    if metadata.len() > MAX_MANIFEST_BYTES {
        return Err(PluginError::ValidationFailed(
            "Manifest file too large".to_string(),
        ));
    }

    let data = fs::read_to_string(path).map_err(PluginError::IoError)?;
    let manifest: PluginManifest = serde_json::from_str(&data)
        .map_err(|e| PluginError::ValidationFailed(format!("Invalid manifest JSON: {e}")))?;
    validate_manifest(&manifest, false)?;
    Ok(manifest)
}

/// A table is only droppable if it sits in the plugin's namespace and
/// is a plain identifier - the name is interpolated into SQL.
fn ensure_droppable_table(table: &str, prefix: &str) -> PluginResult<()> {
    if !table.starts_with(prefix) {
        return Err(PluginError::ValidationFailed(format!(
            "Refusing to drop table '{table}' outside namespace {prefix}*"
        )));
    }
    if !table
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(PluginError::ValidationFailed(format!(
            "Refusing to drop table with non-identifier name '{table}'"
        )));
    }
    Ok(())
}
