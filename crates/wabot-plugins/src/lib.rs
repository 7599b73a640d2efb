//! # Wabot Plugins
//!
//! Bundled command plugins.
//!
//! - [`GroupAdminPlugin`]: `kick`, `promote`, `demote`, `mute`, `unmute`, `invite`
//! - [`MenuPlugin`]: the categorized command menu
//!
//! ```rust,ignore
//! let loader = PluginLoader::new(registry, replies, events)
//!     .with(MenuPlugin::new(menu_config))
//!     .with(GroupAdminPlugin);
//! ```

pub mod group;
pub mod menu;

pub use group::GroupAdminPlugin;
pub use menu::{MenuConfig, MenuPlugin};
