use std::sync::{Arc, RwLock};

use {sarah_common::BotType, serde::Serialize, tokio_util::sync::CancellationToken};

/// Snapshot of the runner and its bots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub running: bool,
    pub bots: Vec<BotStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotStatus {
    pub bot_type: BotType,
    pub running: bool,
}

#[derive(Default)]
struct Inner {
    /// Fired once the runner has finished; `None` until it starts.
    runner: Option<CancellationToken>,
    bots: Vec<(BotType, CancellationToken)>,
}

/// Cheap, cloneable read access to the runner's status.
///
/// Stop flags are cancellation tokens, so marking something stopped twice
/// is harmless.
#[derive(Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<Inner>>,
}

impl std::fmt::Debug for StatusHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.current(), f)
    }
}

impl StatusHandle {
    pub fn current(&self) -> Status {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Status {
            running: inner.runner.as_ref().is_some_and(|t| !t.is_cancelled()),
            bots: inner
                .bots
                .iter()
                .map(|(bot_type, stopped)| BotStatus {
                    bot_type: bot_type.clone(),
                    running: !stopped.is_cancelled(),
                })
                .collect(),
        }
    }

    /// Mark the runner started, returning its stop flag.
    pub(crate) fn start(&self) -> CancellationToken {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let stopped = CancellationToken::new();
        inner.runner = Some(stopped.clone());
        inner.bots.clear();
        stopped
    }

    /// Record a running bot, returning its stop flag.
    pub(crate) fn add_bot(&self, bot_type: BotType) -> CancellationToken {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let stopped = CancellationToken::new();
        inner.bots.push((bot_type, stopped.clone()));
        stopped
    }
}
