//! Plugin config discovery and change notification.
//!
//! Plugin configs live at `<root>/<lowercased bot type>/<id>.{yaml,yml,json}`.
//! [`FileWatcher`] watches each bot's directory and calls the subscriber
//! registered for the changed file's identifier.

use std::{path::Path, sync::Arc};

use {async_trait::async_trait, sarah_common::BotType, sarah_config::RawConfig};

pub mod error;
pub mod file;

pub use {
    error::{Error, Result},
    file::FileWatcher,
};

/// Called with the path of a created or modified config file.
///
/// Invoked from the watcher task; implementations must return quickly.
pub type Callback = Arc<dyn Fn(&Path) + Send + Sync>;

#[async_trait]
pub trait ConfigWatcher: Send + Sync {
    /// Read the current config document for `(bot_type, id)`, if one exists.
    async fn read(&self, bot_type: &BotType, id: &str) -> Result<Option<RawConfig>>;

    /// Subscribe to changes of `(bot_type, id)`'s config file.
    async fn watch(&self, bot_type: &BotType, id: &str, callback: Callback) -> Result<()>;

    /// Drop every subscription registered for `bot_type`.
    async fn unwatch(&self, bot_type: &BotType) -> Result<()>;
}

/// Watcher used when no plugin config root is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullWatcher;

#[async_trait]
impl ConfigWatcher for NullWatcher {
    async fn read(&self, _bot_type: &BotType, _id: &str) -> Result<Option<RawConfig>> {
        Ok(None)
    }

    async fn watch(&self, _bot_type: &BotType, _id: &str, _callback: Callback) -> Result<()> {
        Ok(())
    }

    async fn unwatch(&self, _bot_type: &BotType) -> Result<()> {
        Ok(())
    }
}
