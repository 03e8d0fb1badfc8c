use {sarah_common::BotType, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    #[error("bot type {bot_type} is registered more than once")]
    DuplicateBot { bot_type: BotType },

    #[error("runner is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Config(#[from] sarah_config::Error),

    #[error(transparent)]
    Watcher(#[from] sarah_watcher::Error),
}

impl Error {
    #[must_use]
    pub fn duplicate_bot(bot_type: BotType) -> Self {
        Self::DuplicateBot { bot_type }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
