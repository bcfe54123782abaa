//! Taproot CLI - local-first personal finance

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use taproot_core::config::Settings;
use taproot_core::storage::Database;
use taproot_plugins::builtin;
use taproot_plugins::directory::{DEFAULT_INDEX_URL, DirectoryClient};
use taproot_plugins::loader::{PluginLoader, default_plugins_dir};
use taproot_plugins::manifest::{PluginManifest, PluginPermissions};
use taproot_plugins::permissions::PermissionEnforcer;
use taproot_plugins::registry::ExtensionRegistry;
use taproot_plugins::service::PluginService;
use taproot_plugins::PluginError;

#[derive(Parser)]
#[command(name = "taproot")]
#[command(author, version, about = "Local-first personal finance", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage plugins
    Plugin {
        #[command(subcommand)]
        action: PluginAction,
    },

    /// Settings management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Initialize plugins and report what loaded
    Status,
}

#[derive(Subcommand)]
enum PluginAction {
    /// List core and installed plugins
    List,
    /// Show a plugin's manifest and permissions
    Info { id: String },
    /// Enable a disabled plugin (takes effect next startup)
    Enable { id: String },
    /// Disable a plugin so it is never constructed or activated
    Disable { id: String },
    /// Install a plugin from a local build directory
    Install { path: PathBuf },
    /// Uninstall a plugin and drop its namespaced tables
    Uninstall {
        id: String,
        /// Drop tables even if other plugins declare reads on them
        #[arg(long)]
        force: bool,
    },
    /// Search the community plugin directory
    Search {
        #[arg(default_value = "")]
        query: String,
        /// Override the community index URL
        #[arg(long)]
        index_url: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a settings value
    Get { key: String },
    /// Set a settings value
    Set { key: String, value: String },
    /// List all settings values
    List,
    /// Show settings file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let quiet = cli.quiet;
    let format = cli.format;

    match cli.command {
        Commands::Plugin { action } => match action {
            PluginAction::List => cmd_plugin_list(format).await,
            PluginAction::Info { id } => cmd_plugin_info(&id, format).await,
            PluginAction::Enable { id } => cmd_plugin_toggle(&id, true, quiet),
            PluginAction::Disable { id } => cmd_plugin_toggle(&id, false, quiet),
            PluginAction::Install { path } => cmd_plugin_install(&path, format, quiet),
            PluginAction::Uninstall { id, force } => {
                cmd_plugin_uninstall(&id, force, format, quiet).await
            }
            PluginAction::Search { query, index_url } => {
                cmd_plugin_search(&query, index_url, format).await
            }
        },
        Commands::Config { action } => cmd_config(action, quiet),
        Commands::Status => cmd_status(format, quiet).await,
    }
}

/// Core plugin manifests plus everything installed on disk
fn known_manifests(service: &PluginService) -> Vec<(PluginManifest, bool)> {
    let mut manifests: Vec<(PluginManifest, bool)> = builtin::core_plugins()
        .iter()
        .map(|p| (p.manifest().clone(), true))
        .collect();
    manifests.extend(service.list_installed().into_iter().map(|m| (m, false)));
    manifests
}

fn permissions_summary(permissions: &PluginPermissions) -> String {
    let read = match &permissions.read {
        None => "(unrestricted)".to_string(),
        Some(tables) if tables.is_empty() => "-".to_string(),
        Some(tables) => tables.join(", "),
    };
    let write = if permissions.write.is_empty() {
        "-".to_string()
    } else {
        permissions.write.join(", ")
    };
    let create = if permissions.create.is_empty() {
        "-".to_string()
    } else {
        permissions.create.join(", ")
    };
    format!("read: {read} | write: {write} | create: {create}")
}

fn print_suggestion(error: &PluginError) {
    if let Some(suggestion) = error.suggestion() {
        eprintln!("Try: {suggestion}");
    }
}

async fn cmd_plugin_list(format: OutputFormat) -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let service = PluginService::new(default_plugins_dir()?)?;
    let manifests = known_manifests(&service);

    if format == OutputFormat::Json {
        let entries: Vec<serde_json::Value> = manifests
            .iter()
            .map(|(manifest, core)| {
                serde_json::json!({
                    "id": manifest.id,
                    "name": manifest.name,
                    "version": manifest.version,
                    "core": core,
                    "enabled": !settings.is_plugin_disabled(&manifest.id),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if manifests.is_empty() {
        println!("No plugins installed.");
        return Ok(());
    }

    for (manifest, core) in &manifests {
        let kind = if *core { "core" } else { "community" };
        let state = if settings.is_plugin_disabled(&manifest.id) {
            "disabled"
        } else {
            "enabled"
        };
        println!(
            "{:<16} {:<10} {:<9} {:<8} {}",
            manifest.id, manifest.version, kind, state, manifest.name
        );
    }
    Ok(())
}

async fn cmd_plugin_info(id: &str, format: OutputFormat) -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let service = PluginService::new(default_plugins_dir()?)?;
    let manifests = known_manifests(&service);

    let Some((manifest, core)) = manifests.into_iter().find(|(m, _)| m.id == id) else {
        let error = PluginError::NotFound(id.to_string());
        print_suggestion(&error);
        return Err(error.into());
    };

    if format == OutputFormat::Json {
        let mut value = serde_json::to_value(&manifest)?;
        if let Some(object) = value.as_object_mut() {
            object.insert("core".to_string(), serde_json::json!(core));
            object.insert(
                "enabled".to_string(),
                serde_json::json!(!settings.is_plugin_disabled(id)),
            );
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{} ({} {})", manifest.name, manifest.id, manifest.version);
    println!("  {}", manifest.description);
    println!("  Author:      {}", manifest.author);
    println!("  Kind:        {}", if core { "core" } else { "community" });
    println!(
        "  Enabled:     {}",
        if settings.is_plugin_disabled(id) { "no" } else { "yes" }
    );
    println!("  Permissions: {}", permissions_summary(&manifest.permissions));
    Ok(())
}

fn cmd_plugin_toggle(id: &str, enable: bool, quiet: bool) -> anyhow::Result<()> {
    let mut settings = Settings::load()?;
    let changed = if enable {
        settings.enable_plugin(id)
    } else {
        settings.disable_plugin(id)
    };
    settings.save()?;
    tracing::info!(plugin_id = id, enabled = enable, "Plugin toggle saved");

    if !quiet {
        let state = if enable { "enabled" } else { "disabled" };
        if changed {
            println!("Plugin '{id}' {state}. Restart the app to apply.");
        } else {
            println!("Plugin '{id}' was already {state}.");
        }
    }
    Ok(())
}

fn cmd_plugin_install(path: &Path, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let service = PluginService::new(default_plugins_dir()?)?;
    match service.install_from_directory(path) {
        Ok(receipt) => {
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&receipt)?);
            } else if !quiet {
                println!(
                    "Installed {} {} to {}",
                    receipt.plugin_id,
                    receipt.version,
                    receipt.install_dir.display()
                );
            }
            Ok(())
        }
        Err(error) => {
            print_suggestion(&error);
            Err(error.into())
        }
    }
}

async fn cmd_plugin_uninstall(
    id: &str,
    force: bool,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let service = PluginService::new(default_plugins_dir()?)?;

    // The dependency scan runs over declared permissions, so feed the
    // enforcer every manifest we know about.
    let enforcer = PermissionEnforcer::new();
    for (manifest, _) in known_manifests(&service) {
        enforcer.declare_plugin_permissions(&manifest.id, &manifest.permissions);
    }

    let db = Database::open_default().await?;
    let report = match service.uninstall(id, &enforcer, &db, force).await {
        Ok(report) => report,
        Err(error) => {
            print_suggestion(&error);
            return Err(error.into());
        }
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.removed {
        if !quiet {
            println!("Uninstalled '{}'.", report.plugin_id);
            for table in &report.dropped_tables {
                println!("  Dropped table {table}");
            }
        }
    } else {
        println!("Not removed: other plugins read tables this plugin owns.");
        for dependent in &report.dependents {
            println!(
                "  {} reads {}",
                dependent.plugin_id,
                dependent.tables.join(", ")
            );
        }
        println!("Re-run with --force to drop them anyway.");
    }
    Ok(())
}

async fn cmd_plugin_search(
    query: &str,
    index_url: Option<String>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let client = DirectoryClient::new(index_url.unwrap_or_else(|| DEFAULT_INDEX_URL.to_string()))?;
    let entries = match client.fetch_index().await {
        Ok(entries) => entries,
        Err(error) => {
            print_suggestion(&error);
            return Err(error.into());
        }
    };

    let query = query.to_lowercase();
    let matches: Vec<_> = entries
        .into_iter()
        .filter(|entry| {
            query.is_empty()
                || entry.id.to_lowercase().contains(&query)
                || entry.name.to_lowercase().contains(&query)
                || entry.description.to_lowercase().contains(&query)
        })
        .collect();

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }

    if matches.is_empty() {
        println!("No plugins matched '{query}'.");
        return Ok(());
    }
    for entry in &matches {
        println!("{:<16} {:<10} {}", entry.id, entry.version, entry.description);
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let settings = Settings::load()?;
            println!("{}", settings.get(&key)?);
        }
        ConfigAction::Set { key, value } => {
            let mut settings = Settings::load()?;
            settings.set(&key, &value)?;
            settings.save()?;
            if !quiet {
                println!("{key} = {value}");
            }
        }
        ConfigAction::List => {
            let settings = Settings::load()?;
            for key in [
                "app.theme",
                "app.auto_sync_on_startup",
                "app.last_sync_date",
                "plugins.disabled",
            ] {
                println!("{key} = {}", settings.get(key)?);
            }
        }
        ConfigAction::Path => {
            println!("{}", Settings::settings_path()?.display());
        }
    }
    Ok(())
}

async fn cmd_status(format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let db = Database::open_default()
        .await
        .context("Failed to open the database")?;
    db.health_check().await?;

    let registry = Arc::new(ExtensionRegistry::new());
    let loader = PluginLoader::new(
        registry.clone(),
        db.clone(),
        default_plugins_dir()?,
        &settings,
    )?;
    let report = loader.initialize_plugins(builtin::core_plugins()).await;

    if format == OutputFormat::Json {
        let status = serde_json::json!({
            "database": db.path().display().to_string(),
            "migrations": db.migration_status().await?.up_to_date,
            "plugins": report,
            "views": registry.views().len(),
            "commands": registry.commands().len(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    if !quiet {
        println!("Database: {}", db.path().display());
        println!(
            "Plugins:  {} activated, {} skipped, {} failed",
            report.activated.len(),
            report.skipped.len(),
            report.failed.len()
        );
        for plugin_id in &report.activated {
            println!("  [ok]      {plugin_id}");
        }
        for plugin_id in &report.skipped {
            println!("  [off]     {plugin_id}");
        }
        for failed in &report.failed {
            println!("  [failed]  {} - {}", failed.plugin_id, failed.reason);
        }
        println!(
            "Registry: {} views, {} commands, {} sidebar items",
            registry.views().len(),
            registry.commands().len(),
            registry.sidebar_items().len()
        );
    }
    Ok(())
}
