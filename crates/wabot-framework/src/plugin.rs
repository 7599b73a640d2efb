//! Plugin system.
//!
//! A plugin is a value implementing [`Plugin`]. When loaded it receives a
//! [`Registrar`] and declares what it contributes:
//!
//! - **commands** go into the [`CommandRegistry`],
//! - **reply handlers** are appended to the [`ReplyChain`],
//! - **event handlers** receive every transport event with the live bot, each
//!   call in its own task.
//!
//! ```rust,ignore
//! struct Ping;
//!
//! impl Plugin for Ping {
//!     fn name(&self) -> &str {
//!         "ping"
//!     }
//!
//!     fn register(&self, r: &mut Registrar) {
//!         r.command(CommandSpec::new("ping", |args: DispatchArgs| async move {
//!             args.reply("pong").await?;
//!             Ok(())
//!         }));
//!     }
//! }
//! ```
//!
//! The [`PluginLoader`] holds the ordered plugin list supplied at startup.
//! [`load_all`](PluginLoader::load_all) may be called on every connection
//! open: plugins that are already loaded are skipped, so nothing is ever
//! registered twice.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};
use wabot_core::{BoxedBot, TransportEvent};

use crate::command::{CommandRegistry, CommandSpec};
use crate::reply::{ReplyChain, ReplyHandlerSpec};

// =============================================================================
// Event Handlers
// =============================================================================

/// Receives every transport event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles one event.
    ///
    /// Every call runs in its own spawned task: a handler that stalls delays
    /// neither the event stream nor the other handlers, and calls for
    /// consecutive events may overlap.
    async fn on_event(&self, bot: &BoxedBot, event: &TransportEvent);
}

/// A shared EventHandler trait object.
pub type BoxedEventHandler = Arc<dyn EventHandler>;

/// Fan-out list of event handlers.
#[derive(Default)]
pub struct EventHandlers {
    handlers: RwLock<Vec<BoxedEventHandler>>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, handler: BoxedEventHandler) {
        self.handlers.write().push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawns one task per handler for `event`, in registration order.
    ///
    /// Returns immediately; the handles are only needed by callers that want
    /// to wait for the handlers. Must be called within a tokio runtime.
    pub fn emit(&self, bot: &BoxedBot, event: &TransportEvent) -> Vec<JoinHandle<()>> {
        let handlers: Vec<BoxedEventHandler> = self.handlers.read().clone();
        if handlers.is_empty() {
            return Vec::new();
        }

        let event = Arc::new(event.clone());
        handlers
            .into_iter()
            .map(|handler| {
                let bot = Arc::clone(bot);
                let event = Arc::clone(&event);
                tokio::spawn(async move { handler.on_event(&bot, &event).await }.in_current_span())
            })
            .collect()
    }
}

// =============================================================================
// Plugin & Registrar
// =============================================================================

/// A unit of bot functionality.
pub trait Plugin: Send + Sync {
    /// Unique plugin name.
    fn name(&self) -> &str;

    /// Declares the plugin's commands and handlers.
    fn register(&self, registrar: &mut Registrar);
}

/// A shared Plugin trait object.
pub type BoxedPlugin = Arc<dyn Plugin>;

/// Collects what a plugin contributes during [`Plugin::register`].
#[derive(Default)]
pub struct Registrar {
    commands: Vec<CommandSpec>,
    reply_handlers: Vec<ReplyHandlerSpec>,
    event_handlers: Vec<BoxedEventHandler>,
}

impl Registrar {
    /// Declares a command.
    pub fn command(&mut self, spec: CommandSpec) -> &mut Self {
        self.commands.push(spec);
        self
    }

    /// Declares a reply handler.
    pub fn reply_handler(&mut self, spec: ReplyHandlerSpec) -> &mut Self {
        self.reply_handlers.push(spec);
        self
    }

    /// Declares an event handler.
    pub fn event_handler(&mut self, handler: impl EventHandler + 'static) -> &mut Self {
        self.event_handlers.push(Arc::new(handler));
        self
    }
}

// =============================================================================
// PluginLoader
// =============================================================================

/// Outcome of a [`PluginLoader::load_all`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Plugins loaded during this pass.
    pub loaded: Vec<String>,
    /// Plugins skipped because they were already loaded.
    pub skipped: Vec<String>,
    /// Commands rejected because of a name conflict.
    pub rejected_commands: Vec<String>,
}

/// Loads plugins into the shared registries.
pub struct PluginLoader {
    plugins: Vec<BoxedPlugin>,
    loaded: Mutex<HashSet<String>>,
    registry: Arc<CommandRegistry>,
    replies: Arc<ReplyChain>,
    events: Arc<EventHandlers>,
}

impl PluginLoader {
    /// Creates a loader feeding the given registries.
    pub fn new(
        registry: Arc<CommandRegistry>,
        replies: Arc<ReplyChain>,
        events: Arc<EventHandlers>,
    ) -> Self {
        Self {
            plugins: Vec::new(),
            loaded: Mutex::new(HashSet::new()),
            registry,
            replies,
            events,
        }
    }

    /// Appends a plugin to the load order.
    pub fn add(&mut self, plugin: impl Plugin + 'static) {
        self.plugins.push(Arc::new(plugin));
    }

    /// Appends an already shared plugin.
    pub fn add_shared(&mut self, plugin: BoxedPlugin) {
        self.plugins.push(plugin);
    }

    /// Appends a plugin (builder pattern).
    pub fn with(mut self, plugin: impl Plugin + 'static) -> Self {
        self.add(plugin);
        self
    }

    /// Returns the number of plugins known to the loader.
    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Returns `true` if the named plugin has been loaded.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.lock().contains(name)
    }

    /// Registers every plugin that is not loaded yet, in order.
    ///
    /// Command conflicts are logged and the conflicting command is skipped;
    /// the rest of the plugin still loads.
    pub fn load_all(&self) -> LoadReport {
        let mut report = LoadReport::default();

        for plugin in &self.plugins {
            let name = plugin.name().to_string();
            if !self.loaded.lock().insert(name.clone()) {
                debug!(plugin = %name, "Plugin already loaded, skipping");
                report.skipped.push(name);
                continue;
            }

            let mut registrar = Registrar::default();
            plugin.register(&mut registrar);

            let command_count = registrar.commands.len();
            for spec in registrar.commands {
                let pattern = spec.pattern().to_string();
                if let Err(e) = self.registry.register(spec) {
                    warn!(plugin = %name, command = %pattern, error = %e, "Skipping conflicting command");
                    report.rejected_commands.push(pattern);
                }
            }
            for spec in registrar.reply_handlers {
                self.replies.add(spec);
            }
            for handler in registrar.event_handlers {
                self.events.add(handler);
            }

            info!(plugin = %name, commands = command_count, "Plugin loaded");
            report.loaded.push(name);
        }

        report
    }
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLoader")
            .field("plugin_count", &self.plugins.len())
            .field("loaded", &self.loaded.lock().len())
            .finish()
    }
}
