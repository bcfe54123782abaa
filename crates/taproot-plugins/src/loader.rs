//! Plugin loading and discovery
//!
//! Startup runs through here once: core plugins first, then whatever
//! the plugins directory holds, in a stable order, each activation
//! isolated so one broken plugin cannot take the app down or block the
//! plugins behind it. Disabled plugins are skipped wholesale - never
//! constructed, never granted anything - though their declared
//! permissions are still recorded so the settings UI can describe them.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use std::{fs, io};

use taproot_core::config::Settings;
use taproot_core::storage::Database;

use crate::context::PluginContext;
use crate::external::ExternalPlugin;
use crate::manifest::{
    MANIFEST_FILE_NAME, MAX_MANIFEST_BYTES, PluginManifest, validate_manifest,
};
use crate::registry::ExtensionRegistry;
use crate::sandbox::Sandbox;
use crate::sdk::PluginSdk;
use crate::types::SidebarSection;
use crate::{PluginError, PluginResult};

/// Environment override for the plugins directory
pub const PLUGIN_DIR_ENV: &str = "TAPROOT_PLUGIN_DIR";

/// Modules larger than this are rejected outright
pub const MAX_MODULE_BYTES: usize = 8 * 1024 * 1024;

/// Default per-plugin activation budget
const DEFAULT_ACTIVATION_TIMEOUT: Duration = Duration::from_secs(10);

/// One unit of extension: identity plus an activation entry point.
///
/// Core plugins implement this statically; community plugins arrive as
/// WASM modules behind [`ExternalPlugin`]. Activation runs exactly once
/// per app session and is expected to be effect-only (register things).
/// `deactivate` is a contract only - nothing invokes it in normal
/// operation.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn manifest(&self) -> &PluginManifest;

    async fn activate(&self, context: &PluginContext) -> PluginResult<()>;

    async fn deactivate(&self) -> PluginResult<()> {
        Ok(())
    }
}

/// Outcome of loading one plugin, failure carried as data rather than
/// an escaping error
pub enum LoadResult {
    Loaded(Box<dyn Plugin>),
    Failed { plugin_id: String, reason: String },
}

/// A plugin found on disk, not yet loaded
#[derive(Debug, Clone)]
pub struct DiscoveredPlugin {
    pub manifest: PluginManifest,
    pub directory: PathBuf,
    pub module_path: PathBuf,
}

/// A plugin that failed somewhere between discovery and activation
#[derive(Debug, Clone, Serialize)]
pub struct FailedPlugin {
    pub plugin_id: String,
    pub reason: String,
}

/// What startup ended up doing, per plugin id
#[derive(Debug, Clone, Default, Serialize)]
pub struct InitReport {
    pub activated: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<FailedPlugin>,
}

impl InitReport {
    fn record_failure(&mut self, plugin_id: &str, reason: String) {
        tracing::warn!(plugin_id, %reason, "Plugin failed to initialize");
        self.failed.push(FailedPlugin {
            plugin_id: plugin_id.to_string(),
            reason,
        });
    }
}

/// Resolve the plugins directory, creating it if needed
pub fn default_plugins_dir() -> PluginResult<PathBuf> {
    let base = if let Ok(path) = std::env::var(PLUGIN_DIR_ENV) {
        PathBuf::from(path)
    } else if let Some(home) = dirs::home_dir() {
        home.join(".taproot").join("plugins")
    } else {
        return Err(PluginError::ValidationFailed(
            "Unable to resolve plugin directory".to_string(),
        ));
    };

    fs::create_dir_all(&base).map_err(PluginError::IoError)?;
    let canonical_base = base.canonicalize().unwrap_or(base);
    Ok(canonical_base)
}

/// Canonicalize a path and require it to be a regular, non-symlinked
/// file inside the plugins directory.
fn resolve_plugin_path(path: &Path, base: &Path) -> PluginResult<PathBuf> {
    let canonical_target = path.canonicalize().map_err(PluginError::IoError)?;

    let metadata = fs::symlink_metadata(&canonical_target).map_err(PluginError::IoError)?;
    if metadata.file_type().is_symlink() {
        return Err(PluginError::ValidationFailed(
            "Plugin paths cannot point to symlinks".to_string(),
        ));
    }
    if !metadata.file_type().is_file() {
        return Err(PluginError::ValidationFailed(
            "Plugin path must be a regular file".to_string(),
        ));
    }

    if !canonical_target.starts_with(base) {
        return Err(PluginError::ValidationFailed(format!(
            "Plugin path {:?} must reside under {:?}",
            canonical_target, base
        )));
    }

    Ok(canonical_target)
}

/// Load and parse a community plugin manifest from disk (JSON)
pub fn load_manifest(path: &Path, base: &Path) -> PluginResult<PluginManifest> {
    let canonical_path = resolve_plugin_path(path, base)?;

    let metadata = fs::metadata(&canonical_path).map_err(PluginError::IoError)?;
    if metadata.len() > MAX_MANIFEST_BYTES {
        return Err(PluginError::ValidationFailed(
            "Manifest file too large".to_string(),
        ));
    }

    let data = fs::read_to_string(&canonical_path).map_err(PluginError::IoError)?;
    let manifest: PluginManifest = serde_json::from_str(&data)
        .map_err(|e| PluginError::ValidationFailed(format!("Invalid manifest JSON: {e}")))?;

    validate_manifest(&manifest, false)?;

    Ok(manifest)
}

/// Load WASM module bytes with a size cap
pub fn load_module_bytes(path: &Path, base: &Path, max_bytes: usize) -> PluginResult<Vec<u8>> {
    let canonical_path = resolve_plugin_path(path, base)?;

    let metadata = fs::metadata(&canonical_path).map_err(PluginError::IoError)?;
    if metadata.len() as usize > max_bytes {
        return Err(PluginError::ValidationFailed(format!(
            "WASM module too large: {} bytes (limit {})",
            metadata.len(),
            max_bytes
        )));
    }

    fs::read(&canonical_path).map_err(PluginError::IoError)
}

/// Orchestrates one startup pass over core and community plugins.
pub struct PluginLoader {
    registry: Arc<ExtensionRegistry>,
    db: Database,
    plugins_dir: PathBuf,
    disabled: HashSet<String>,
    sandbox: Arc<Sandbox>,
    activation_timeout: Duration,
}

impl PluginLoader {
    pub fn new(
        registry: Arc<ExtensionRegistry>,
        db: Database,
        plugins_dir: PathBuf,
        settings: &Settings,
    ) -> PluginResult<Self> {
        Ok(Self {
            registry,
            db,
            plugins_dir,
            disabled: settings.plugins.disabled.iter().cloned().collect(),
            sandbox: Arc::new(Sandbox::new()?),
            activation_timeout: DEFAULT_ACTIVATION_TIMEOUT,
        })
    }

    /// Override the per-plugin activation budget
    pub fn with_activation_timeout(mut self, timeout: Duration) -> Self {
        self.activation_timeout = timeout;
        self
    }

    /// Scan the plugins directory for `{manifest.json, module}` pairs.
    ///
    /// A directory that cannot be read means zero community plugins,
    /// never a startup failure; a bad entry is logged and skipped.
    pub fn discover(&self) -> Vec<DiscoveredPlugin> {
        let entries = match fs::read_dir(&self.plugins_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!(dir = ?self.plugins_dir, error = %e, "Cannot read plugins directory");
                return Vec::new();
            }
        };

        let mut discovered = Vec::new();

        for entry in entries.flatten() {
            let directory = entry.path();
            if !directory.is_dir() {
                continue;
            }

            let manifest_path = directory.join(MANIFEST_FILE_NAME);
            if !manifest_path.exists() {
                continue;
            }

            match load_manifest(&manifest_path, &self.plugins_dir) {
                Ok(manifest) => {
                    let module_path = directory.join(manifest.module_file());
                    discovered.push(DiscoveredPlugin {
                        manifest,
                        directory,
                        module_path,
                    });
                }
                Err(e) => {
                    tracing::warn!(dir = ?directory, error = %e, "Skipping plugin with invalid manifest");
                }
            }
        }

        discovered
    }

    /// Load one discovered plugin into an activatable form.
    pub fn load_external(&self, discovered: &DiscoveredPlugin) -> LoadResult {
        let plugin_id = discovered.manifest.id.clone();

        let bytes =
            match load_module_bytes(&discovered.module_path, &self.plugins_dir, MAX_MODULE_BYTES) {
                Ok(bytes) => bytes,
                Err(e) => {
                    return LoadResult::Failed {
                        plugin_id,
                        reason: e.to_string(),
                    };
                }
            };

        match ExternalPlugin::new(discovered.manifest.clone(), bytes, self.sandbox.clone()) {
            Ok(plugin) => LoadResult::Loaded(Box::new(plugin)),
            Err(e) => LoadResult::Failed {
                plugin_id,
                reason: e.to_string(),
            },
        }
    }

    /// Run the startup sequence: baseline sections, then every
    /// non-disabled plugin in core-then-community order, one at a time.
    pub async fn initialize_plugins(&self, core_plugins: Vec<Box<dyn Plugin>>) -> InitReport {
        let mut report = InitReport::default();

        // Sections the core UI needs before any plugin contributes
        self.registry
            .register_sidebar_section(SidebarSection::new("overview", "Overview", 0));
        self.registry
            .register_sidebar_section(SidebarSection::new("plugins", "Plugins", 100));

        let discovered = self.discover();

        // Declared permissions are metadata and survive for disabled
        // plugins; grants happen per-plugin right before activation.
        let enforcer = self.registry.enforcer();
        for plugin in &core_plugins {
            let manifest = plugin.manifest();
            enforcer.declare_plugin_permissions(&manifest.id, &manifest.permissions);
        }
        for discovered_plugin in &discovered {
            enforcer.declare_plugin_permissions(
                &discovered_plugin.manifest.id,
                &discovered_plugin.manifest.permissions,
            );
        }

        let mut to_activate: Vec<Box<dyn Plugin>> = Vec::new();

        for plugin in core_plugins {
            let plugin_id = plugin.manifest().id.clone();
            if self.disabled.contains(&plugin_id) {
                tracing::info!(%plugin_id, "Skipping disabled plugin");
                report.skipped.push(plugin_id);
                continue;
            }
            if let Err(e) = validate_manifest(plugin.manifest(), true) {
                report.record_failure(&plugin_id, e.to_string());
                continue;
            }
            to_activate.push(plugin);
        }

        for discovered_plugin in &discovered {
            let plugin_id = &discovered_plugin.manifest.id;
            if self.disabled.contains(plugin_id) {
                tracing::info!(%plugin_id, "Skipping disabled plugin");
                report.skipped.push(plugin_id.clone());
                continue;
            }
            match self.load_external(discovered_plugin) {
                LoadResult::Loaded(plugin) => to_activate.push(plugin),
                LoadResult::Failed { plugin_id, reason } => {
                    report.record_failure(&plugin_id, reason);
                }
            }
        }

        // Activations are awaited one at a time: core plugins establish
        // shared sections and tables before community plugins run.
        for plugin in to_activate {
            let manifest = plugin.manifest().clone();
            match self.activate_one(plugin).await {
                Ok(()) => {
                    tracing::info!(plugin_id = %manifest.id, name = %manifest.name, "Plugin activated");
                    report.activated.push(manifest.id);
                }
                Err(e) => {
                    report.record_failure(&manifest.id, e.to_string());
                }
            }
        }

        report
    }

    /// Grant, contextualize, and activate a single plugin, converting
    /// panics and hangs into per-plugin failures.
    async fn activate_one(&self, plugin: Box<dyn Plugin>) -> PluginResult<()> {
        let manifest = plugin.manifest().clone();
        let enforcer = self.registry.enforcer();
        enforcer.set_plugin_permissions(&manifest.id, &manifest.permissions);

        let sdk = PluginSdk::new(&manifest.id, enforcer, self.db.clone());
        let context = PluginContext::new(&manifest.id, self.registry.clone(), sdk);

        let timeout = self.activation_timeout;
        let handle =
            tokio::spawn(
                async move { tokio::time::timeout(timeout, plugin.activate(&context)).await },
            );

        match handle.await {
            Err(join_error) => Err(PluginError::ActivationFailed {
                plugin_id: manifest.id,
                reason: format!("activation panicked: {join_error}"),
            }),
            Ok(Err(_elapsed)) => Err(PluginError::ActivationTimeout {
                plugin_id: manifest.id,
                limit_secs: timeout.as_secs(),
            }),
            Ok(Ok(Err(e))) => Err(PluginError::ActivationFailed {
                plugin_id: manifest.id,
                reason: e.to_string(),
            }),
            Ok(Ok(Ok(()))) => Ok(()),
        }
    }
}
