//! Loader integration tests
//!
//! Exercise the full startup path against a real plugins directory:
//! core plugins, a community plugin on disk, disabled plugins, and
//! mounting a community view.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use taproot_core::config::Settings;
use taproot_core::storage::Database;
use taproot_plugins::builtin;
use taproot_plugins::loader::PluginLoader;
use taproot_plugins::mount::ViewHost;
use taproot_plugins::registry::ExtensionRegistry;
use taproot_plugins::types::MountTarget;

/// Hand-assembled module equivalent to:
///   (module (func (export "activate")) (func (export "mount")))
fn module_bytes() -> Vec<u8> {
    vec![
        0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, //
        0x01, 0x04, 0x01, 0x60, 0x00, 0x00, //
        0x03, 0x03, 0x02, 0x00, 0x00, //
        0x07, 0x14, 0x02, //
        0x08, b'a', b'c', b't', b'i', b'v', b'a', b't', b'e', 0x00, 0x00, //
        0x05, b'm', b'o', b'u', b'n', b't', 0x00, 0x01, //
        0x0a, 0x07, 0x02, 0x02, 0x00, 0x0b, 0x02, 0x00, 0x0b,
    ]
}

fn write_net_worth_plugin(plugins_dir: &Path) {
    let plugin_dir = plugins_dir.join("net-worth");
    fs::create_dir_all(&plugin_dir).unwrap();

    let manifest = json!({
        "id": "net-worth",
        "name": "Net Worth",
        "version": "1.0.0",
        "description": "Tracks net worth over time",
        "author": "Community",
        "permissions": {
            "read": ["accounts", "transactions"],
            "write": ["sys_plugin_net_worth_snapshots"],
            "create": ["sys_plugin_net_worth_snapshots"]
        },
        "contributes": {
            "views": [
                {"id": "net-worth.chart", "name": "Net Worth", "icon": "chart"}
            ],
            "sidebar_items": [
                {
                    "id": "net-worth",
                    "section_id": "plugins",
                    "view_id": "net-worth.chart",
                    "label": "Net Worth"
                }
            ],
            "commands": [
                {"id": "net-worth.refresh", "name": "Refresh Net Worth", "export": "mount"}
            ]
        }
    });
    fs::write(
        plugin_dir.join("manifest.json"),
        serde_json::to_string_pretty(&manifest).unwrap(),
    )
    .unwrap();
    fs::write(plugin_dir.join("module.wasm"), module_bytes()).unwrap();
}

struct App {
    registry: Arc<ExtensionRegistry>,
    db: Database,
    loader: PluginLoader,
    plugins_dir: TempDir,
}

async fn app(settings: Settings, write_plugin: bool) -> App {
    let plugins_dir = TempDir::new().unwrap();
    if write_plugin {
        write_net_worth_plugin(plugins_dir.path());
    }

    let registry = Arc::new(ExtensionRegistry::new());
    let db = Database::in_memory().await.expect("db");
    let loader = PluginLoader::new(
        registry.clone(),
        db.clone(),
        plugins_dir.path().to_path_buf(),
        &settings,
    )
    .expect("loader");

    App {
        registry,
        db,
        loader,
        plugins_dir,
    }
}

#[tokio::test]
async fn test_core_plugins_activate_before_community_plugins() {
    let app = app(Settings::default(), true).await;

    let report = app.loader.initialize_plugins(builtin::core_plugins()).await;

    assert_eq!(report.activated, vec!["accounts", "budgets", "net-worth"]);
    assert!(report.failed.is_empty());

    let view_ids: Vec<String> = app.registry.views().iter().map(|v| v.id.clone()).collect();
    assert_eq!(
        view_ids,
        vec![
            "accounts.list",
            "accounts.register",
            "budgets.month",
            "net-worth.chart"
        ]
    );

    // Budgets contributes the only status bar widget
    assert_eq!(app.registry.status_bar_items().len(), 1);
}

#[tokio::test]
async fn test_community_plugin_grants_follow_its_manifest() {
    let app = app(Settings::default(), true).await;
    app.loader.initialize_plugins(builtin::core_plugins()).await;

    let enforcer = app.registry.enforcer();
    assert!(enforcer.can_write("net-worth", "sys_plugin_net_worth_snapshots"));
    assert!(!enforcer.can_write("net-worth", "transactions"));
    assert!(enforcer.can_create("net-worth", "sys_plugin_net_worth_snapshots"));

    assert_eq!(
        app.registry.plugin_id_for_view("net-worth.chart").as_deref(),
        Some("net-worth")
    );
}

#[tokio::test]
async fn test_disabled_community_plugin_is_never_loaded() {
    let mut settings = Settings::default();
    settings.disable_plugin("net-worth");
    let app = app(settings, true).await;

    let report = app.loader.initialize_plugins(builtin::core_plugins()).await;

    assert_eq!(report.activated, vec!["accounts", "budgets"]);
    assert_eq!(report.skipped, vec!["net-worth"]);
    assert!(app.registry.view("net-worth.chart").is_none());

    // Declared permissions remain visible for the settings screen
    let declared = app.registry.enforcer().plugin_permissions("net-worth");
    assert_eq!(
        declared.write,
        vec!["sys_plugin_net_worth_snapshots".to_string()]
    );
    assert!(!app
        .registry
        .enforcer()
        .can_write("net-worth", "sys_plugin_net_worth_snapshots"));
}

#[tokio::test]
async fn test_broken_module_is_isolated_to_its_plugin() {
    let app = app(Settings::default(), true).await;
    // Manifest stays valid, module does not
    fs::write(
        app.plugins_dir.path().join("net-worth").join("module.wasm"),
        b"not wasm",
    )
    .unwrap();

    let report = app.loader.initialize_plugins(builtin::core_plugins()).await;

    assert_eq!(report.activated, vec!["accounts", "budgets"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].plugin_id, "net-worth");
}

#[tokio::test]
async fn test_invalid_manifest_directory_is_skipped() {
    let app = app(Settings::default(), true).await;
    let bad_dir = app.plugins_dir.path().join("bad-plugin");
    fs::create_dir_all(&bad_dir).unwrap();
    fs::write(bad_dir.join("manifest.json"), "{ not json").unwrap();

    let report = app.loader.initialize_plugins(builtin::core_plugins()).await;

    // The malformed directory is logged and skipped; everything else loads
    assert_eq!(report.activated, vec!["accounts", "budgets", "net-worth"]);
}

#[tokio::test]
async fn test_mounting_a_community_view_round_trips() {
    let app = app(Settings::default(), true).await;
    app.loader.initialize_plugins(builtin::core_plugins()).await;

    let tab = app
        .registry
        .open_view("net-worth.chart", json!({"range": "1y"}))
        .expect("open community view");

    let mut host = ViewHost::new(
        app.registry.clone(),
        app.db.clone(),
        MountTarget::new(tab.to_string()),
    );

    let props = app.registry.tab(tab).expect("tab").props;
    assert!(host.mount("net-worth.chart", &props).expect("mount"));
    assert!(host.is_mounted());
    host.unmount();
    assert!(!host.is_mounted());
}

#[tokio::test]
async fn test_empty_plugins_directory_still_boots_core() {
    let app = app(Settings::default(), false).await;
    let report = app.loader.initialize_plugins(builtin::core_plugins()).await;
    assert_eq!(report.activated, vec!["accounts", "budgets"]);
    assert!(report.failed.is_empty());
    assert!(report.skipped.is_empty());
}
