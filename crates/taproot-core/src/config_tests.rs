//! Settings store tests

use crate::config::Settings;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.app.theme, "dark");
    assert!(settings.app.auto_sync_on_startup);
    assert!(settings.app.last_sync_date.is_none());
    assert!(settings.plugins.disabled.is_empty());
}

#[test]
fn test_disable_enable_plugin() {
    let mut settings = Settings::default();

    assert!(settings.disable_plugin("net-worth"));
    assert!(settings.is_plugin_disabled("net-worth"));
    // Disabling twice is a no-op
    assert!(!settings.disable_plugin("net-worth"));
    assert_eq!(settings.plugins.disabled.len(), 1);

    assert!(settings.enable_plugin("net-worth"));
    assert!(!settings.is_plugin_disabled("net-worth"));
    // Enabling an already-enabled plugin is a no-op
    assert!(!settings.enable_plugin("net-worth"));
}

#[test]
fn test_get_set_by_key() {
    let mut settings = Settings::default();

    settings.set("app.theme", "light").expect("set theme");
    assert_eq!(settings.get("app.theme").expect("get theme"), "light");

    settings
        .set("app.auto_sync_on_startup", "false")
        .expect("set auto sync");
    assert_eq!(
        settings.get("app.auto_sync_on_startup").expect("get auto sync"),
        "false"
    );

    settings
        .set("plugins.disabled", "net-worth, subscriptions")
        .expect("set disabled");
    assert_eq!(
        settings.get("plugins.disabled").expect("get disabled"),
        "net-worth, subscriptions"
    );
    assert!(settings.is_plugin_disabled("subscriptions"));
}

#[test]
fn test_unknown_key_is_an_error() {
    let mut settings = Settings::default();
    assert!(settings.get("nope.nothing").is_err());
    assert!(settings.set("nope.nothing", "x").is_err());
    assert!(settings.set("app.auto_sync_on_startup", "not-a-bool").is_err());
}

#[test]
fn test_settings_toml_round_trip() {
    let mut settings = Settings::default();
    settings.app.theme = "light".to_string();
    settings.disable_plugin("net-worth");

    let serialized = toml::to_string_pretty(&settings).expect("serialize");
    let parsed: Settings = toml::from_str(&serialized).expect("parse");

    assert_eq!(parsed.app.theme, "light");
    assert!(parsed.is_plugin_disabled("net-worth"));
}

#[test]
fn test_missing_plugins_section_defaults_to_empty() {
    // Settings files written before the plugin system shipped have no
    // [plugins] table.
    let parsed: Settings = toml::from_str(
        r#"
        [app]
        theme = "dark"
        auto_sync_on_startup = true
        [plugins]
        "#,
    )
    .expect("parse");
    assert!(parsed.plugins.disabled.is_empty());
}
