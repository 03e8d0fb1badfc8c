//! Bot runtime building blocks.
//!
//! - [`message`]: the input/output model exchanged with adapters
//! - [`command`]: commands and the ordered per-bot command list
//! - [`props`] / [`task`]: blueprints that build (and rebuild) commands and
//!   scheduled tasks from plugin config files
//! - [`context`]: per-sender conversational continuations
//! - [`bot`]: the [`Bot`] trait and its default implementation

pub mod adapter;
pub mod bot;
pub mod cache;
pub mod cell;
pub mod command;
pub mod context;
pub mod error;
pub mod message;
pub mod props;
pub mod stash;
pub mod task;

pub use {
    adapter::{Adapter, ErrorNotifier, InputReceiver},
    bot::{Bot, DefaultBot},
    cell::ConfigCell,
    command::{Command, CommandFn, CommandResponse, Commands},
    context::{
        ContextualFn, DefaultUserContextStore, SerializableArgument, UserContext,
        UserContextStore,
    },
    error::{BlockedInputError, BotError, Error, Result},
    message::{
        CommandHelp, CommandHelps, Destination, Input, InputMessage, Output, OutputContent,
    },
    props::{CommandProps, CommandPropsBuilder, Reload},
    stash::Stash,
    task::{
        ScheduledTask, ScheduledTaskConfig, ScheduledTaskProps, ScheduledTaskPropsBuilder,
        ScheduledTaskResult, TaskFn,
    },
};
