use std::sync::Arc;

use {async_trait::async_trait, sarah_common::BotType, tokio_util::sync::CancellationToken};

use crate::{
    error::{BlockedInputError, BotError},
    message::{Input, Output},
};

/// Hands an inbound input to the runtime without blocking.
pub type InputReceiver = Arc<dyn Fn(Input) -> Result<(), BlockedInputError> + Send + Sync>;

/// Reports adapter failures to the runner.
pub type ErrorNotifier = Arc<dyn Fn(BotError) + Send + Sync>;

/// Connection to one chat service.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn bot_type(&self) -> BotType;

    /// Receive messages until `cancel` fires, passing each to `receive`.
    ///
    /// A permanent failure is reported through `notify` as
    /// [`BotError::NonContinuable`], which stops the bot.
    async fn run(&self, cancel: CancellationToken, receive: InputReceiver, notify: ErrorNotifier);

    /// Deliver `output`. Called concurrently from worker tasks.
    async fn send_message(&self, output: Output);
}
