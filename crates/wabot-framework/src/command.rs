//! Command registry.
//!
//! A [`CommandSpec`] binds a pattern (plus optional aliases) to a handler.
//! The [`CommandRegistry`] owns every registered spec and resolves command
//! names case-insensitively, with pattern and alias treated alike.
//!
//! ```rust,ignore
//! registry.register(
//!     CommandSpec::new("kick", kick)
//!         .alias("remove")
//!         .react("👢")
//!         .category("group")
//!         .description("Remove a member from the group"),
//! )?;
//!
//! assert!(registry.lookup("REMOVE").is_some());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{RegistrationError, RegistrationResult};
use crate::handler::{BoxedHandler, Handler, into_handler};

/// Category used when a command does not declare one.
pub const DEFAULT_CATEGORY: &str = "other";

// =============================================================================
// CommandSpec
// =============================================================================

/// A registered command.
#[derive(Clone)]
pub struct CommandSpec {
    pattern: String,
    aliases: Vec<String>,
    react: Option<String>,
    category: String,
    description: String,
    handler: BoxedHandler,
}

impl CommandSpec {
    /// Creates a command answering to `pattern`.
    ///
    /// The pattern is stored lower-cased.
    pub fn new(pattern: impl Into<String>, handler: impl Handler) -> Self {
        Self {
            pattern: pattern.into().trim().to_lowercase(),
            aliases: Vec::new(),
            react: None,
            category: DEFAULT_CATEGORY.to_string(),
            description: String::new(),
            handler: into_handler(handler),
        }
    }

    /// Adds an alias.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into().trim().to_lowercase());
        self
    }

    /// Sets the emoji reaction sent before the handler runs.
    pub fn react(mut self, emoji: impl Into<String>) -> Self {
        self.react = Some(emoji.into());
        self
    }

    /// Sets the category label.
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into().to_lowercase();
        self
    }

    /// Sets the description shown in the menu.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn reaction(&self) -> Option<&str> {
        self.react.as_deref()
    }

    pub fn handler(&self) -> &BoxedHandler {
        &self.handler
    }

    /// Returns the public description of this command.
    pub fn info(&self) -> CommandInfo {
        CommandInfo {
            pattern: self.pattern.clone(),
            aliases: self.aliases.clone(),
            category: self.category.clone(),
            description: self.description.clone(),
        }
    }

    /// Pattern followed by aliases.
    fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.pattern.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("pattern", &self.pattern)
            .field("aliases", &self.aliases)
            .field("react", &self.react)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

/// Catalog entry describing a registered command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInfo {
    pub pattern: String,
    pub aliases: Vec<String>,
    pub category: String,
    pub description: String,
}

// =============================================================================
// CommandRegistry
// =============================================================================

#[derive(Default)]
struct RegistryInner {
    /// Specs in registration order.
    specs: Vec<Arc<CommandSpec>>,
    /// Lower-cased pattern or alias → index into `specs`.
    names: HashMap<String, usize>,
}

/// Registry of every loaded command.
///
/// Registration happens at plugin-load time; lookups happen per message.
#[derive(Default)]
pub struct CommandRegistry {
    inner: RwLock<RegistryInner>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a command.
    ///
    /// Fails with [`RegistrationError::Conflict`] if the pattern or any alias
    /// is already taken, or if the spec repeats one of its own names. The
    /// registry is left unchanged on failure.
    pub fn register(&self, spec: CommandSpec) -> RegistrationResult<()> {
        if spec.pattern.is_empty() {
            return Err(RegistrationError::EmptyPattern);
        }

        let mut inner = self.inner.write();

        let mut seen: Vec<&str> = Vec::new();
        for name in spec.names() {
            if let Some(&idx) = inner.names.get(name) {
                return Err(RegistrationError::Conflict {
                    name: name.to_string(),
                    existing: inner.specs[idx].pattern.clone(),
                });
            }
            if seen.contains(&name) {
                return Err(RegistrationError::Conflict {
                    name: name.to_string(),
                    existing: spec.pattern.clone(),
                });
            }
            seen.push(name);
        }

        let idx = inner.specs.len();
        for name in spec.names() {
            inner.names.insert(name.to_string(), idx);
        }
        debug!(pattern = %spec.pattern, aliases = ?spec.aliases, "Registered command");
        inner.specs.push(Arc::new(spec));

        Ok(())
    }

    /// Resolves a command name or alias, case-insensitively.
    pub fn lookup(&self, name: &str) -> Option<Arc<CommandSpec>> {
        let key = name.trim().to_lowercase();
        let inner = self.inner.read();
        inner.names.get(&key).map(|&idx| Arc::clone(&inner.specs[idx]))
    }

    /// Returns `true` if the name or alias is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Returns the catalog of all commands in registration order.
    pub fn catalog(&self) -> Vec<CommandInfo> {
        self.inner.read().specs.iter().map(|s| s.info()).collect()
    }

    /// Returns the number of registered commands.
    pub fn len(&self) -> usize {
        self.inner.read().specs.len()
    }

    /// Returns `true` if no command is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("command_count", &self.len())
            .finish()
    }
}
