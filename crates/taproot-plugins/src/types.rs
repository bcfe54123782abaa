//! Extension point data model
//!
//! Everything a plugin can contribute to the shell: navigation entries,
//! views, commands, status bar items, and the live tabs opened over
//! registered views.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::PluginResult;
use crate::registry::ExtensionRegistry;
use crate::sdk::PluginSdk;

/// A navigation group in the sidebar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidebarSection {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub order: i32,
}

impl SidebarSection {
    pub fn new(id: impl Into<String>, title: impl Into<String>, order: i32) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            order,
        }
    }
}

/// A navigation entry binding a sidebar slot to a view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidebarItem {
    pub id: String,
    pub section_id: String,
    pub view_id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<String>,
    #[serde(default)]
    pub order: i32,
    /// Small counter/marker next to the label; updated by re-registering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
}

impl SidebarItem {
    pub fn new(
        id: impl Into<String>,
        section_id: impl Into<String>,
        view_id: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            section_id: section_id.into(),
            view_id: view_id.into(),
            label: label.into(),
            icon: None,
            shortcut: None,
            order: 0,
            badge: None,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_shortcut(mut self, shortcut: impl Into<String>) -> Self {
        self.shortcut = Some(shortcut.into());
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn with_badge(mut self, badge: impl Into<String>) -> Self {
        self.badge = Some(badge.into());
        self
    }
}

/// Which side of the status bar an item docks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusBarPosition {
    Left,
    Right,
}

/// A purely additive status bar widget; no access-control relevance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBarItem {
    pub id: String,
    pub position: StatusBarPosition,
    #[serde(default)]
    pub order: i32,
    /// Component key the shell resolves
    pub component: String,
}

impl StatusBarItem {
    pub fn new(
        id: impl Into<String>,
        position: StatusBarPosition,
        order: i32,
        component: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            position,
            order,
            component: component.into(),
        }
    }
}

/// The container an external view fragment mounts into
#[derive(Debug, Clone)]
pub struct MountTarget {
    pub container_id: String,
}

impl MountTarget {
    pub fn new(container_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
        }
    }
}

/// What an external mount receives: the opening props plus a database
/// handle scoped to the owning plugin's grants
pub struct MountContext {
    pub props: Value,
    pub sdk: PluginSdk,
}

/// Teardown closure returned by a mount; invoked exactly once
pub type CleanupFn = Box<dyn FnOnce() + Send>;

/// Mount function for externally-rendered views
pub type MountFn =
    Arc<dyn Fn(&mut MountTarget, MountContext) -> PluginResult<CleanupFn> + Send + Sync>;

/// Exactly one rendering strategy per view: a trusted in-process
/// component, or an untrusted mount/cleanup pair
#[derive(Clone)]
pub enum ViewRenderer {
    /// Component key the shell resolves and renders natively
    Component(String),
    /// Mount function invoked by the shell's view host
    External(MountFn),
}

impl fmt::Debug for ViewRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Component(key) => f.debug_tuple("Component").field(key).finish(),
            Self::External(_) => f.debug_tuple("External").field(&"<mount fn>").finish(),
        }
    }
}

/// An addressable UI surface a plugin contributes
#[derive(Debug, Clone)]
pub struct ViewDefinition {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    pub renderer: ViewRenderer,
    /// Whether opening always creates a new tab (true) or reuses the
    /// existing one (false)
    pub allow_multiple: bool,
}

impl ViewDefinition {
    /// A view rendered natively by the shell
    pub fn component(
        id: impl Into<String>,
        name: impl Into<String>,
        component_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            icon: None,
            renderer: ViewRenderer::Component(component_key.into()),
            allow_multiple: false,
        }
    }

    /// A view rendered by an external mount function
    pub fn external(id: impl Into<String>, name: impl Into<String>, mount: MountFn) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            icon: None,
            renderer: ViewRenderer::External(mount),
            allow_multiple: false,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn allow_multiple(mut self, allow: bool) -> Self {
        self.allow_multiple = allow;
        self
    }
}

/// Command action thunk. Commands are the only mechanism for
/// cross-plugin and keyboard-triggered invocation; the thunk may call
/// back into the registry (open views, close tabs).
pub type CommandAction = Arc<dyn Fn(&ExtensionRegistry) + Send + Sync>;

/// A globally addressable command
#[derive(Clone)]
pub struct Command {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub shortcut: Option<String>,
    pub action: CommandAction,
}

impl Command {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        action: impl Fn(&ExtensionRegistry) + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: None,
            shortcut: None,
            action: Arc::new(action),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_shortcut(mut self, shortcut: impl Into<String>) -> Self {
        self.shortcut = Some(shortcut.into());
        self
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("category", &self.category)
            .field("shortcut", &self.shortcut)
            .finish_non_exhaustive()
    }
}

/// A live instance of an opened view
#[derive(Debug, Clone, Serialize)]
pub struct Tab {
    pub id: Uuid,
    pub view_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub props: Value,
}
