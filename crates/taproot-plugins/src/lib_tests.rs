//! Plugin system scenario tests
//!
//! End-to-end behavior of the loader + registry + enforcer working
//! together, with scripted plugins standing in for real ones.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use taproot_core::config::Settings;
use taproot_core::storage::Database;

use crate::context::PluginContext;
use crate::loader::{Plugin, PluginLoader};
use crate::manifest::{PluginContributions, PluginManifest, PluginPermissions};
use crate::registry::ExtensionRegistry;
use crate::types::{Command, SidebarItem, ViewDefinition};
use crate::{PluginError, PluginResult};

/// How a scripted plugin behaves when activated
#[derive(Clone, Copy)]
enum Behavior {
    Register,
    Fail,
    Panic,
    Hang,
}

struct ScriptedPlugin {
    manifest: PluginManifest,
    behavior: Behavior,
}

impl ScriptedPlugin {
    fn boxed(id: &str, behavior: Behavior, permissions: PluginPermissions) -> Box<dyn Plugin> {
        Box::new(Self {
            manifest: PluginManifest {
                id: id.to_string(),
                name: format!("{} plugin", id),
                version: "0.1.0".to_string(),
                description: "Scripted test plugin".to_string(),
                author: "Tests".to_string(),
                icon: None,
                main: None,
                permissions,
                contributes: PluginContributions::default(),
            },
            behavior,
        })
    }
}

#[async_trait]
impl Plugin for ScriptedPlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    async fn activate(&self, context: &PluginContext) -> PluginResult<()> {
        match self.behavior {
            Behavior::Register => {
                let id = self.manifest.id.clone();
                let view_id = format!("{id}.view");
                context.register_view(ViewDefinition::component(
                    &view_id,
                    &self.manifest.name,
                    "TestView",
                ));
                context.register_sidebar_item(SidebarItem::new(
                    &id, "overview", &view_id, &self.manifest.name,
                ));
                let command_view_id = view_id.clone();
                context.register_command(Command::new(
                    format!("{id}.open"),
                    format!("Open {id}"),
                    move |registry| {
                        registry.open_view(&command_view_id, json!({}));
                    },
                ));
                Ok(())
            }
            Behavior::Fail => Err(PluginError::ActivationFailed {
                plugin_id: self.manifest.id.clone(),
                reason: "scripted failure".to_string(),
            }),
            Behavior::Panic => panic!("scripted panic"),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}

struct Fixture {
    registry: Arc<ExtensionRegistry>,
    loader: PluginLoader,
    _plugins_dir: TempDir,
}

async fn fixture(settings: Settings) -> Fixture {
    let registry = Arc::new(ExtensionRegistry::new());
    let db = Database::in_memory().await.expect("db");
    let plugins_dir = TempDir::new().expect("tempdir");
    let loader = PluginLoader::new(
        registry.clone(),
        db,
        plugins_dir.path().to_path_buf(),
        &settings,
    )
    .expect("loader");
    Fixture {
        registry,
        loader,
        _plugins_dir: plugins_dir,
    }
}

fn no_permissions() -> PluginPermissions {
    PluginPermissions::default()
}

#[tokio::test]
async fn test_activation_preserves_declared_order() {
    let f = fixture(Settings::default()).await;

    let report = f
        .loader
        .initialize_plugins(vec![
            ScriptedPlugin::boxed("alpha", Behavior::Register, no_permissions()),
            ScriptedPlugin::boxed("beta", Behavior::Register, no_permissions()),
            ScriptedPlugin::boxed("gamma", Behavior::Register, no_permissions()),
        ])
        .await;

    assert_eq!(report.activated, vec!["alpha", "beta", "gamma"]);
    let view_ids: Vec<String> = f.registry.views().iter().map(|v| v.id.clone()).collect();
    assert_eq!(view_ids, vec!["alpha.view", "beta.view", "gamma.view"]);
}

#[tokio::test]
async fn test_failing_plugin_does_not_affect_neighbors() {
    let f = fixture(Settings::default()).await;

    let report = f
        .loader
        .initialize_plugins(vec![
            ScriptedPlugin::boxed("alpha", Behavior::Register, no_permissions()),
            ScriptedPlugin::boxed("broken", Behavior::Fail, no_permissions()),
            ScriptedPlugin::boxed("gamma", Behavior::Register, no_permissions()),
        ])
        .await;

    assert_eq!(report.activated, vec!["alpha", "gamma"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].plugin_id, "broken");

    assert!(f.registry.view("alpha.view").is_some());
    assert!(f.registry.view("gamma.view").is_some());
    assert!(f.registry.view("broken.view").is_none());
}

#[tokio::test]
async fn test_panicking_plugin_is_contained() {
    let f = fixture(Settings::default()).await;

    let report = f
        .loader
        .initialize_plugins(vec![
            ScriptedPlugin::boxed("alpha", Behavior::Register, no_permissions()),
            ScriptedPlugin::boxed("bomb", Behavior::Panic, no_permissions()),
            ScriptedPlugin::boxed("gamma", Behavior::Register, no_permissions()),
        ])
        .await;

    assert_eq!(report.activated, vec!["alpha", "gamma"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].plugin_id, "bomb");
}

#[tokio::test]
async fn test_hanging_plugin_converts_to_timeout_failure() {
    let f = fixture(Settings::default()).await;
    let loader = f
        .loader
        .with_activation_timeout(Duration::from_millis(100));

    let report = loader
        .initialize_plugins(vec![
            ScriptedPlugin::boxed("sleeper", Behavior::Hang, no_permissions()),
            ScriptedPlugin::boxed("gamma", Behavior::Register, no_permissions()),
        ])
        .await;

    assert_eq!(report.activated, vec!["gamma"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].plugin_id, "sleeper");
    assert!(report.failed[0].reason.contains("timed out"));
}

#[tokio::test]
async fn test_disabled_plugin_never_runs_but_metadata_survives() {
    let mut settings = Settings::default();
    settings.disable_plugin("beta");
    let f = fixture(settings).await;

    let write_tables = PluginPermissions {
        read: None,
        write: vec!["transactions".to_string()],
        create: vec![],
    };

    let report = f
        .loader
        .initialize_plugins(vec![
            ScriptedPlugin::boxed("alpha", Behavior::Register, no_permissions()),
            ScriptedPlugin::boxed("beta", Behavior::Register, write_tables),
        ])
        .await;

    assert_eq!(report.activated, vec!["alpha"]);
    assert_eq!(report.skipped, vec!["beta"]);

    // Nothing of beta's reached the registry
    assert!(f.registry.view("beta.view").is_none());
    assert!(!f.registry.commands().iter().any(|c| c.id == "beta.open"));
    assert!(!f.registry.sidebar_items().iter().any(|i| i.id == "beta"));

    // Its declared permissions are still inspectable, but nothing is granted
    let enforcer = f.registry.enforcer();
    assert_eq!(
        enforcer.plugin_permissions("beta").write,
        vec!["transactions".to_string()]
    );
    assert!(!enforcer.can_write("beta", "transactions"));
}

#[tokio::test]
async fn test_uninstall_dependency_scenario() {
    let f = fixture(Settings::default()).await;

    let p_reads_transactions = PluginPermissions {
        read: Some(vec!["transactions".to_string()]),
        write: vec![],
        create: vec![],
    };
    let q_creates_own_table = PluginPermissions {
        read: None,
        write: vec![],
        create: vec!["sys_plugin_q_x".to_string()],
    };

    f.loader
        .initialize_plugins(vec![
            ScriptedPlugin::boxed("p", Behavior::Register, p_reads_transactions),
            ScriptedPlugin::boxed("q", Behavior::Register, q_creates_own_table),
        ])
        .await;

    let enforcer = f.registry.enforcer();

    // P doesn't read q's table: no false positive
    let dependents = enforcer.dependents_on_tables(&["sys_plugin_q_x".to_string()], "q");
    assert!(dependents.is_empty());

    // Once P declares a read on it, the scan reports P with the table
    enforcer.declare_plugin_permissions(
        "p",
        &PluginPermissions {
            read: Some(vec![
                "transactions".to_string(),
                "sys_plugin_q_x".to_string(),
            ]),
            write: vec![],
            create: vec![],
        },
    );
    let dependents = enforcer.dependents_on_tables(&["sys_plugin_q_x".to_string()], "q");
    assert_eq!(dependents.len(), 1);
    assert_eq!(dependents[0].plugin_id, "p");
    assert_eq!(dependents[0].tables, vec!["sys_plugin_q_x".to_string()]);
}

#[tokio::test]
async fn test_grants_are_exposed_for_settings_ui() {
    let f = fixture(Settings::default()).await;

    let tagger = PluginPermissions {
        read: Some(vec!["transactions".to_string()]),
        write: vec!["transactions".to_string()],
        create: vec![],
    };

    f.loader
        .initialize_plugins(vec![ScriptedPlugin::boxed(
            "tagger",
            Behavior::Register,
            tagger,
        )])
        .await;

    let write_tables = f.registry.plugin_write_tables("tagger");
    assert!(write_tables.contains("transactions"));
    assert_eq!(write_tables.len(), 1);

    let all = f.registry.enforcer().all_plugin_permissions();
    assert_eq!(
        all.get("tagger").and_then(|p| p.read.as_ref()).map(Vec::len),
        Some(1)
    );
}

#[tokio::test]
async fn test_baseline_sections_exist_before_plugins() {
    let f = fixture(Settings::default()).await;
    f.loader.initialize_plugins(Vec::new()).await;

    let section_ids: Vec<String> = f
        .registry
        .sidebar_sections()
        .iter()
        .map(|s| s.id.clone())
        .collect();
    assert_eq!(section_ids, vec!["overview", "plugins"]);
}

#[tokio::test]
async fn test_commands_registered_by_plugins_drive_tabs() {
    let f = fixture(Settings::default()).await;
    f.loader
        .initialize_plugins(vec![ScriptedPlugin::boxed(
            "alpha",
            Behavior::Register,
            no_permissions(),
        )])
        .await;

    f.registry.execute_command("alpha.open");
    assert_eq!(f.registry.tabs().len(), 1);
    assert_eq!(f.registry.tabs()[0].view_id, "alpha.view");
}
