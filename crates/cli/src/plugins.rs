//! Demo plugins for the console bot.
//!
//! `greet` and `clock` read `<plugin_config_root>/stdio/{greet,clock}.yaml`
//! when a plugin config root is configured.

use std::{cmp::Ordering, fmt::Write, sync::Arc};

use {
    rand::Rng,
    regex::Regex,
    sarah_bot::{
        CommandProps, CommandResponse, ConfigCell, Destination, Input, ScheduledTaskConfig,
        ScheduledTaskProps, ScheduledTaskResult, Stash, UserContext,
    },
    serde::{Deserialize, Serialize},
};

use crate::stdio::BOT_TYPE;

pub fn stash() -> anyhow::Result<Stash> {
    let mut stash = Stash::new();
    stash
        .add_command_props(echo()?)
        .add_command_props(guess()?)
        .add_command_props(greet()?)
        .add_scheduled_task_props(clock()?);
    Ok(stash)
}

fn echo() -> anyhow::Result<CommandProps> {
    Ok(CommandProps::builder()
        .bot_type(BOT_TYPE)
        .identifier("echo")
        .match_pattern(Regex::new(r"^\.echo\s")?)
        .instruction("input \".echo foo\" to receive \"foo\"")
        .func(|input: Input| async move {
            let text = input.text().trim_start_matches(".echo").trim().to_string();
            Ok(CommandResponse::content(text))
        })
        .build()?)
}

// ── Guessing game ───────────────────────────────────────────────────────────

const MAX_NUMBER: u32 = 100;

fn guess() -> anyhow::Result<CommandProps> {
    Ok(CommandProps::builder()
        .bot_type(BOT_TYPE)
        .identifier("guess")
        .match_pattern(Regex::new(r"^\.guess$")?)
        .instruction("input \".guess\" to play a number guessing game")
        .func(|_| async {
            let secret = rand::rng().random_range(1..=MAX_NUMBER);
            Ok(
                CommandResponse::content(format!(
                    "I picked a number between 1 and {MAX_NUMBER}. Your guess?"
                ))
                .with_next(guess_turn(secret, 1)),
            )
        })
        .build()?)
}

/// Continuation for one turn of the game. Every answer except the right
/// one re-arms the next turn.
fn guess_turn(secret: u32, tries: u32) -> UserContext {
    UserContext::func(move |input: Input| async move {
        let Ok(guess) = input.text().trim().parse::<u32>() else {
            return Ok(CommandResponse::content("Numbers only. Send .abort to give up.")
                .with_next(guess_turn(secret, tries)));
        };
        let hint = match guess.cmp(&secret) {
            Ordering::Equal => {
                return Ok(CommandResponse::content(format!(
                    "Correct! {secret} in {tries} tries."
                )));
            },
            Ordering::Less => "higher",
            Ordering::Greater => "lower",
        };
        Ok(CommandResponse::content(hint).with_next(guess_turn(secret, tries + 1)))
    })
}

// ── Greeting ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GreetConfig {
    pub greeting: String,
}

impl Default for GreetConfig {
    fn default() -> Self {
        Self {
            greeting: "Hello".into(),
        }
    }
}

fn greet() -> anyhow::Result<CommandProps> {
    let config = Arc::new(ConfigCell::new(GreetConfig::default()));
    Ok(CommandProps::builder()
        .bot_type(BOT_TYPE)
        .identifier("greet")
        .match_pattern(Regex::new(r"^\.hello$")?)
        .instruction("input \".hello\" to be greeted")
        .live_configurable_func(config, |input: Input, config: Arc<GreetConfig>| async move {
            Ok(CommandResponse::content(format!(
                "{}, {}!",
                config.greeting,
                input.sender_key()
            )))
        })
        .build()?)
}

// ── Clock ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub schedule: String,
    pub room: String,
    /// `strftime` pattern.
    pub format: String,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            schedule: "@every 5m".into(),
            room: "clock".into(),
            format: "%Y-%m-%d %H:%M:%S UTC".into(),
        }
    }
}

impl ScheduledTaskConfig for ClockConfig {
    fn schedule(&self) -> Option<String> {
        Some(self.schedule.clone())
    }

    fn default_destination(&self) -> Option<Destination> {
        Some(Destination::Room(self.room.clone()))
    }
}

fn clock() -> anyhow::Result<ScheduledTaskProps> {
    Ok(ScheduledTaskProps::builder()
        .bot_type(BOT_TYPE)
        .identifier("clock")
        .configurable_func(ClockConfig::default(), |config: Arc<ClockConfig>| async move {
            let mut now = String::new();
            write!(now, "{}", chrono::Utc::now().format(&config.format))
                .map_err(|_| anyhow::anyhow!("invalid clock format {:?}", config.format))?;
            Ok(vec![ScheduledTaskResult::new(now)])
        })
        .build()?)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        sarah_bot::{InputMessage, OutputContent, ScheduledTask},
        sarah_common::BotType,
    };

    fn input(text: &str) -> Input {
        Input::Message(InputMessage::new(
            "me",
            text,
            Destination::User("me".into()),
        ))
    }

    async fn play(turn: UserContext, text: &str) -> (String, Option<UserContext>) {
        let UserContext::Func(next) = turn else {
            panic!("game turns are in-process continuations");
        };
        let response = next(input(text)).await.unwrap();
        let Some(OutputContent::Text(reply)) = response.content else {
            panic!("every turn replies");
        };
        (reply, response.user_context)
    }

    #[test]
    fn stash_registers_every_plugin() {
        let stash = stash().unwrap();
        let bot_type = BotType::from(BOT_TYPE);
        let ids: Vec<_> = stash
            .command_props(&bot_type)
            .iter()
            .map(|p| p.identifier().to_string())
            .collect();
        assert_eq!(ids, ["echo", "guess", "greet"]);
        assert_eq!(stash.scheduled_task_props(&bot_type).len(), 1);
    }

    #[tokio::test]
    async fn guessing_game_hints_until_solved() {
        let (reply, next) = play(guess_turn(42, 1), "50").await;
        assert_eq!(reply, "lower");
        let (reply, next) = play(next.unwrap(), "abc").await;
        assert!(reply.starts_with("Numbers only"));
        let (reply, next) = play(next.unwrap(), "10").await;
        assert_eq!(reply, "higher");
        let (reply, next) = play(next.unwrap(), "42").await;
        assert_eq!(reply, "Correct! 42 in 3 tries.");
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn clock_uses_configured_room() {
        let task = clock().unwrap().build(None).unwrap();
        assert_eq!(task.schedule(), "@every 5m");
        assert_eq!(
            task.default_destination(),
            Some(&Destination::Room("clock".into()))
        );
        assert_eq!(task.execute().await.unwrap().len(), 1);
    }
}
