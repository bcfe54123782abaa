//! Taproot Plugin System
//!
//! Everything that makes Taproot extensible lives here:
//! - Plugin manifests and per-table permission declarations
//! - The permission enforcer gating plugin writes to the shared database
//! - The extension registry (sidebar, views, commands, status bar, tabs)
//! - Plugin discovery, loading, and activation with per-plugin isolation
//! - WASM sandboxing for community plugin modules via wasmtime
//! - The mount adapter for externally-rendered view fragments
//! - Community directory lookup and local install/uninstall
//!
//! Core plugins ship with the app and are trusted; community plugins are
//! discovered on disk at startup and constrained to the tables their
//! manifest declares.

pub mod builtin;
pub mod context;
pub mod directory;
pub mod external;
pub mod loader;
pub mod manifest;
pub mod mount;
pub mod permissions;
pub mod registry;
pub mod sandbox;
pub mod sdk;
pub mod service;
pub mod types;

use thiserror::Error;

use crate::permissions::TableOperation;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("Plugin validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to load plugin '{plugin_id}': {reason}")]
    LoadFailed { plugin_id: String, reason: String },

    #[error("Activation failed for plugin '{plugin_id}': {reason}")]
    ActivationFailed { plugin_id: String, reason: String },

    #[error("Activation of plugin '{plugin_id}' timed out after {limit_secs}s")]
    ActivationTimeout { plugin_id: String, limit_secs: u64 },

    #[error("Plugin '{plugin_id}' is not permitted to {operation} table '{table}'")]
    PermissionDenied {
        plugin_id: String,
        table: String,
        operation: TableOperation,
    },

    #[error("WASM execution error: {0}")]
    WasmError(String),

    #[error("Plugin directory unavailable: {0}")]
    Directory(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Plugin IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PluginError {
    /// Get a suggestion for how to resolve this error, if there is one
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::NotFound(_) => Some("taproot plugin list".to_string()),
            Self::PermissionDenied { plugin_id, .. } => {
                Some(format!("taproot plugin info {}", plugin_id))
            }
            Self::Directory(_) => Some("Check your internet connection".to_string()),
            _ => None,
        }
    }
}

pub type PluginResult<T> = Result<T, PluginError>;

pub use context::PluginContext;
pub use loader::{InitReport, LoadResult, Plugin, PluginLoader};
pub use manifest::{PluginManifest, PluginPermissions};
pub use permissions::{PermissionEnforcer, TableDependents};
pub use registry::ExtensionRegistry;
pub use sdk::{PluginSdk, QueryResult};
pub use types::{
    Command, SidebarItem, SidebarSection, StatusBarItem, StatusBarPosition, Tab, ViewDefinition,
};

#[cfg(test)]
mod lib_tests;
#[cfg(test)]
pub(crate) mod testutil;
