//! Extension registry
//!
//! The central mutable store of everything plugins contribute, plus the
//! lifecycle of open tabs. A registry is constructed explicitly and
//! shared by reference (no ambient singleton), so tests and shells own
//! their own instances.
//!
//! Registration is idempotent on id: a later registration with the same
//! id replaces the earlier one, which is what re-activating a plugin
//! during development expects. Every logical mutation notifies
//! subscribers synchronously, exactly once, after the mutation is
//! applied; callbacks run with the state lock released so they may read
//! the registry.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::permissions::PermissionEnforcer;
use crate::types::{
    Command, CommandAction, SidebarItem, SidebarSection, StatusBarItem, Tab, ViewDefinition,
};

/// Handle returned by `subscribe`, accepted by `unsubscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: u64,
    callback: Arc<dyn Fn() + Send + Sync>,
}

#[derive(Default)]
struct RegistryState {
    sidebar_sections: Vec<SidebarSection>,
    sidebar_items: Vec<SidebarItem>,
    views: Vec<ViewDefinition>,
    /// view id -> owning plugin id, for capability-scoping mounted views
    view_owners: HashMap<String, String>,
    commands: Vec<Command>,
    status_bar_items: Vec<StatusBarItem>,
    tabs: Vec<Tab>,
    active_tab: Option<Uuid>,
}

/// The registry instance shared by the loader, shells, and plugin
/// contexts for one app session.
pub struct ExtensionRegistry {
    state: Mutex<RegistryState>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_subscriber_id: AtomicU64,
    enforcer: Arc<PermissionEnforcer>,
}

impl ExtensionRegistry {
    /// Create an empty registry with a fresh permission enforcer
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber_id: AtomicU64::new(1),
            enforcer: Arc::new(PermissionEnforcer::new()),
        }
    }

    /// The permission enforcer backing this registry
    pub fn enforcer(&self) -> Arc<PermissionEnforcer> {
        self.enforcer.clone()
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Register a callback invoked after every registry mutation.
    pub fn subscribe(&self, callback: impl Fn() + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .push(Subscriber {
                id,
                callback: Arc::new(callback),
            });
        SubscriptionId(id)
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, subscription: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock().expect("subscriber lock poisoned");
        let before = subscribers.len();
        subscribers.retain(|s| s.id != subscription.0);
        subscribers.len() != before
    }

    /// Notify all subscribers once. Callbacks are cloned out of the
    /// subscriber list first so they can subscribe/unsubscribe freely.
    fn notify(&self) {
        let callbacks: Vec<Arc<dyn Fn() + Send + Sync>> = {
            let subscribers = self.subscribers.lock().expect("subscriber lock poisoned");
            subscribers.iter().map(|s| s.callback.clone()).collect()
        };
        for callback in callbacks {
            callback();
        }
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    pub fn register_sidebar_section(&self, section: SidebarSection) {
        {
            let mut state = self.state.lock().expect("registry lock poisoned");
            upsert_by_id(&mut state.sidebar_sections, section, |s| &s.id);
        }
        self.notify();
    }

    pub fn register_sidebar_item(&self, item: SidebarItem) {
        {
            let mut state = self.state.lock().expect("registry lock poisoned");
            upsert_by_id(&mut state.sidebar_items, item, |i| &i.id);
        }
        self.notify();
    }

    /// Register a view. `owner` is the plugin id the view belongs to;
    /// it is recorded so mounted views can be capability-scoped later
    /// even when the registration call did not come through a
    /// plugin-identified code path.
    pub fn register_view(&self, view: ViewDefinition, owner: Option<&str>) {
        {
            let mut state = self.state.lock().expect("registry lock poisoned");
            if let Some(plugin_id) = owner {
                state
                    .view_owners
                    .insert(view.id.clone(), plugin_id.to_string());
            }
            upsert_by_id(&mut state.views, view, |v| &v.id);
        }
        self.notify();
    }

    pub fn register_command(&self, command: Command) {
        {
            let mut state = self.state.lock().expect("registry lock poisoned");
            upsert_by_id(&mut state.commands, command, |c| &c.id);
        }
        self.notify();
    }

    pub fn register_status_bar_item(&self, item: StatusBarItem) {
        {
            let mut state = self.state.lock().expect("registry lock poisoned");
            upsert_by_id(&mut state.status_bar_items, item, |i| &i.id);
        }
        self.notify();
    }

    // ------------------------------------------------------------------
    // Lookups (insertion order preserved)
    // ------------------------------------------------------------------

    pub fn sidebar_sections(&self) -> Vec<SidebarSection> {
        self.state
            .lock()
            .expect("registry lock poisoned")
            .sidebar_sections
            .clone()
    }

    pub fn sidebar_items(&self) -> Vec<SidebarItem> {
        self.state
            .lock()
            .expect("registry lock poisoned")
            .sidebar_items
            .clone()
    }

    pub fn views(&self) -> Vec<ViewDefinition> {
        self.state
            .lock()
            .expect("registry lock poisoned")
            .views
            .clone()
    }

    pub fn view(&self, view_id: &str) -> Option<ViewDefinition> {
        self.state
            .lock()
            .expect("registry lock poisoned")
            .views
            .iter()
            .find(|v| v.id == view_id)
            .cloned()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state
            .lock()
            .expect("registry lock poisoned")
            .commands
            .clone()
    }

    pub fn status_bar_items(&self) -> Vec<StatusBarItem> {
        self.state
            .lock()
            .expect("registry lock poisoned")
            .status_bar_items
            .clone()
    }

    /// The plugin that owns a view, if the registration recorded one
    pub fn plugin_id_for_view(&self, view_id: &str) -> Option<String> {
        self.state
            .lock()
            .expect("registry lock poisoned")
            .view_owners
            .get(view_id)
            .cloned()
    }

    /// Write-table grants for a plugin, for settings/uninstall UI
    pub fn plugin_write_tables(&self, plugin_id: &str) -> std::collections::HashSet<String> {
        self.enforcer.write_tables(plugin_id)
    }

    // ------------------------------------------------------------------
    // Tabs
    // ------------------------------------------------------------------

    pub fn tabs(&self) -> Vec<Tab> {
        self.state
            .lock()
            .expect("registry lock poisoned")
            .tabs
            .clone()
    }

    pub fn tab(&self, tab_id: Uuid) -> Option<Tab> {
        self.state
            .lock()
            .expect("registry lock poisoned")
            .tabs
            .iter()
            .find(|t| t.id == tab_id)
            .cloned()
    }

    pub fn active_tab(&self) -> Option<Uuid> {
        self.state.lock().expect("registry lock poisoned").active_tab
    }

    /// Open a view in a tab.
    ///
    /// Single-instance views re-activate their existing tab and take the
    /// new props; otherwise a fresh tab is appended and made active.
    /// Returns the tab id, or `None` if the view is not registered.
    pub fn open_view(&self, view_id: &str, props: Value) -> Option<Uuid> {
        let opened = {
            let mut guard = self.state.lock().expect("registry lock poisoned");
            let state = &mut *guard;

            let view = match state.views.iter().find(|v| v.id == view_id) {
                Some(view) => view.clone(),
                None => {
                    tracing::warn!(view_id, "Cannot open unregistered view");
                    return None;
                }
            };

            let existing_index = if view.allow_multiple {
                None
            } else {
                state.tabs.iter().position(|t| t.view_id == view_id)
            };

            let id = match existing_index {
                Some(index) => {
                    let tab = &mut state.tabs[index];
                    tab.props = props;
                    tab.id
                }
                None => {
                    let tab = Tab {
                        id: Uuid::new_v4(),
                        view_id: view.id.clone(),
                        title: view.name.clone(),
                        icon: view.icon.clone(),
                        props,
                    };
                    let id = tab.id;
                    state.tabs.push(tab);
                    id
                }
            };
            state.active_tab = Some(id);
            id
        };
        self.notify();
        Some(opened)
    }

    /// Make a tab active. Unknown ids are a no-op.
    pub fn set_active_tab(&self, tab_id: Uuid) {
        let changed = {
            let mut state = self.state.lock().expect("registry lock poisoned");
            if !state.tabs.iter().any(|t| t.id == tab_id) {
                tracing::debug!(%tab_id, "Ignoring activation of unknown tab");
                false
            } else if state.active_tab == Some(tab_id) {
                false
            } else {
                state.active_tab = Some(tab_id);
                true
            }
        };
        if changed {
            self.notify();
        }
    }

    /// Close a tab. If it was active, the tab now occupying the same
    /// index becomes active; closing the last tab falls back to the new
    /// last tab, and closing the only tab leaves nothing active. This
    /// determinism is what makes keyboard-driven close predictable.
    pub fn close_tab(&self, tab_id: Uuid) {
        {
            let mut guard = self.state.lock().expect("registry lock poisoned");
            let state = &mut *guard;
            let Some(index) = state.tabs.iter().position(|t| t.id == tab_id) else {
                tracing::debug!(%tab_id, "Ignoring close of unknown tab");
                return;
            };
            state.tabs.remove(index);

            if state.active_tab == Some(tab_id) {
                state.active_tab = state
                    .tabs
                    .get(index)
                    .or_else(|| state.tabs.last())
                    .map(|t| t.id);
            }
        }
        self.notify();
    }

    /// Execute a command by id. Unknown ids are logged and ignored -
    /// static keybindings may fire before the owning plugin activates.
    /// The thunk runs with the registry lock released, so it may open
    /// views or close tabs; those mutations notify on their own.
    pub fn execute_command(&self, command_id: &str) {
        let action: Option<CommandAction> = {
            let state = self.state.lock().expect("registry lock poisoned");
            state
                .commands
                .iter()
                .find(|c| c.id == command_id)
                .map(|c| c.action.clone())
        };

        match action {
            Some(action) => action(self),
            None => tracing::warn!(command_id, "Ignoring unknown command"),
        }
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace an element with the same id in place, or append
fn upsert_by_id<T>(items: &mut Vec<T>, item: T, id_of: impl Fn(&T) -> &str) {
    match items.iter().position(|existing| id_of(existing) == id_of(&item)) {
        Some(index) => items[index] = item,
        None => items.push(item),
    }
}
