use std::path::{Path, PathBuf};

use {notify_debouncer_full::notify, sarah_common::BotType, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    #[error("already subscribed to {id} in {}", dir.display())]
    AlreadySubscribed { dir: PathBuf, id: String },

    #[error("config directory for {bot_type} is not available at {}: {source}", dir.display())]
    Directory {
        bot_type: BotType,
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The watcher task has stopped.
    #[error("config watcher is not running")]
    NotRunning,

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Config(#[from] sarah_config::Error),
}

impl Error {
    #[must_use]
    pub fn already_subscribed(dir: &Path, id: impl Into<String>) -> Self {
        Self::AlreadySubscribed {
            dir: dir.to_path_buf(),
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
