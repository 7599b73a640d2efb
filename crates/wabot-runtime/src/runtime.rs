//! Runtime orchestration.
//!
//! [`BotRuntime`] wires the configuration into a running bot:
//!
//! ```text
//! WabotConfig ──▶ Dispatcher ◀── PluginLoader (menu, group-admin, user plugins)
//!      │              │
//!      │              └── MessageCache ──▶ DeletionReporter (event handler)
//!      ▼
//!  Supervisor ── Transport + SessionStore + SessionRestorer
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use wabot_runtime::BotRuntime;
//!
//! let runtime = BotRuntime::builder()
//!     .transport(my_transport)
//!     .plugin(MyPlugin)
//!     .build()?;
//!
//! // Runs until logout, Ctrl+C or SIGTERM.
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use wabot_core::BoxedTransport;
use wabot_framework::{
    BoxedPlugin, DeletionReporter, Dispatcher, EventHandlers, Plugin, PluginLoader,
};
use wabot_plugins::{GroupAdminPlugin, MenuPlugin};

use crate::config::{ConfigLoader, WabotConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::session::{BoxedSessionStore, FileSessionStore, SessionRestorer};
use crate::supervisor::{Shutdown, Supervisor, SupervisorConfig};

/// A fully wired bot.
pub struct BotRuntime {
    config: WabotConfig,
    dispatcher: Arc<Dispatcher>,
    events: Arc<EventHandlers>,
    supervisor: Arc<Supervisor>,
}

impl BotRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn config(&self) -> &WabotConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn event_handlers(&self) -> &Arc<EventHandlers> {
        &self.events
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Cancelling this token stops the runtime.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.supervisor.shutdown_token()
    }

    /// Runs until logout or a shutdown signal (Ctrl+C, or SIGTERM on unix).
    pub async fn run(&self) -> RuntimeResult<Shutdown> {
        let signal = shutdown_signal()?;
        self.run_until(signal).await
    }

    /// Runs until logout or until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<Shutdown>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.shutdown_token();
        let watcher = tokio::spawn(async move {
            tokio::select! {
                _ = shutdown => token.cancel(),
                _ = token.cancelled() => {}
            }
        });

        info!(
            prefix = %self.config.bot.prefix,
            commands = self.dispatcher.registry().len(),
            "wabot runtime is now running"
        );
        let result = self.supervisor.run().await;
        watcher.abort();

        let shutdown = result?;
        info!(reason = ?shutdown, "Runtime stopped");
        Ok(shutdown)
    }
}

/// Resolves on the first shutdown signal.
#[cfg(unix)]
fn shutdown_signal() -> RuntimeResult<impl Future<Output = ()> + Send + 'static> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .map_err(RuntimeError::Signal)?;

    Ok(async move {
        tokio::select! {
            result = signal::ctrl_c() => match result {
                Ok(()) => info!("Received Ctrl+C, shutting down"),
                Err(e) => {
                    error!(error = %e, "Failed to listen for Ctrl+C");
                    sigterm.recv().await;
                    info!("Received SIGTERM, shutting down");
                }
            },
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        }
    })
}

/// Resolves on the first shutdown signal.
#[cfg(not(unix))]
fn shutdown_signal() -> RuntimeResult<impl Future<Output = ()> + Send + 'static> {
    Ok(async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    })
}

impl std::fmt::Debug for BotRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotRuntime")
            .field("dispatcher", &self.dispatcher)
            .field("event_handlers", &self.events.len())
            .field("supervisor", &self.supervisor)
            .finish()
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`BotRuntime`].
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<WabotConfig>,
    transport: Option<BoxedTransport>,
    store: Option<BoxedSessionStore>,
    restorer: Option<SessionRestorer>,
    plugins: Vec<BoxedPlugin>,
    bundled_plugins: bool,
    init_logging: bool,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            config: None,
            transport: None,
            store: None,
            restorer: None,
            plugins: Vec::new(),
            bundled_plugins: true,
            init_logging: true,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Uses `config` as is, skipping file and environment loading.
    pub fn config(mut self, config: WabotConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the protocol implementation. Required.
    pub fn transport(mut self, transport: BoxedTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replaces the credential file store.
    pub fn session_store(mut self, store: BoxedSessionStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the restorer built from `[session]`.
    pub fn restorer(mut self, restorer: SessionRestorer) -> Self {
        self.restorer = Some(restorer);
        self
    }

    /// Adds a plugin, loaded after the bundled ones.
    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    /// Leaves out the bundled menu and group-admin plugins.
    pub fn without_bundled_plugins(mut self) -> Self {
        self.bundled_plugins = false;
        self
    }

    /// Leaves the global tracing subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> RuntimeResult<BotRuntime> {
        let config = match self.config {
            Some(config) => {
                crate::config::validate_config(&config)?;
                config
            }
            None => self.config_loader.load_validated()?,
        };

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let transport = self.transport.ok_or(RuntimeError::MissingTransport)?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(FileSessionStore::from_config(&config.session)));
        let restorer = self
            .restorer
            .unwrap_or_else(|| SessionRestorer::from_config(&config.session));

        let dispatcher = Arc::new(Dispatcher::new(config.bot.dispatcher_config()));
        let events = Arc::new(EventHandlers::new());
        events.add(Arc::new(DeletionReporter::new(
            Arc::clone(dispatcher.cache()),
            config.bot.operator_jid(),
        )));

        let mut loader = PluginLoader::new(
            Arc::clone(dispatcher.registry()),
            Arc::clone(dispatcher.replies()),
            Arc::clone(&events),
        );
        if self.bundled_plugins {
            loader.add(MenuPlugin::new(config.bot.menu_config()));
            loader.add(GroupAdminPlugin);
        }
        for plugin in self.plugins {
            loader.add_shared(plugin);
        }

        let supervisor = Supervisor::new(
            transport,
            store,
            Arc::clone(&dispatcher),
            Arc::new(loader),
            Arc::clone(&events),
        )
        .with_restorer(restorer)
        .with_config(SupervisorConfig::from(&config));

        info!(
            prefix = %config.bot.prefix,
            operator = %config.bot.operator,
            session_dir = %config.session.dir.display(),
            "Runtime built"
        );

        Ok(BotRuntime {
            config,
            dispatcher,
            events,
            supervisor: Arc::new(supervisor),
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
