use std::sync::Arc;

use {
    async_trait::async_trait,
    sarah_common::BotType,
    sarah_config::ContextCacheConfig,
    tokio_util::sync::CancellationToken,
    tracing::debug,
};

#[cfg(feature = "metrics")]
use sarah_metrics::{bots as bot_metrics, counter, labels};

use crate::{
    Result,
    adapter::{Adapter, ErrorNotifier, InputReceiver},
    command::{Command, CommandResponse, Commands},
    context::{DefaultUserContextStore, UserContextStore},
    message::{Input, Output, OutputContent},
};

#[async_trait]
pub trait Bot: Send + Sync {
    fn bot_type(&self) -> BotType;

    /// Handle one input: continue a pending conversation or run the first
    /// matching command, then send any resulting content.
    async fn respond(&self, input: Input) -> Result<()>;

    async fn send_message(&self, output: Output);

    /// Register `command`, replacing one with the same identifier.
    fn append_command(&self, command: Arc<dyn Command>);

    /// Run the underlying connection until `cancel` fires.
    async fn run(&self, cancel: CancellationToken, receive: InputReceiver, notify: ErrorNotifier);
}

/// [`Bot`] that delegates I/O to an [`Adapter`].
pub struct DefaultBot {
    adapter: Arc<dyn Adapter>,
    commands: Commands,
    store: Arc<dyn UserContextStore>,
}

impl DefaultBot {
    /// Bot with an in-memory context store using default expiry settings.
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self::with_store(
            adapter,
            Arc::new(DefaultUserContextStore::new(&ContextCacheConfig::default())),
        )
    }

    pub fn with_store(adapter: Arc<dyn Adapter>, store: Arc<dyn UserContextStore>) -> Self {
        Self {
            adapter,
            commands: Commands::new(),
            store,
        }
    }

    pub fn commands(&self) -> &Commands {
        &self.commands
    }
}

impl std::fmt::Debug for DefaultBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultBot")
            .field("bot_type", &self.adapter.bot_type())
            .field("commands", &self.commands)
            .finish()
    }
}

#[async_trait]
impl Bot for DefaultBot {
    fn bot_type(&self) -> BotType {
        self.adapter.bot_type()
    }

    async fn respond(&self, input: Input) -> Result<()> {
        let key = input.sender_key().to_string();
        #[cfg(feature = "metrics")]
        counter!(bot_metrics::INPUTS_TOTAL, labels::BOT_TYPE => self.bot_type().to_string())
            .increment(1);

        let response = match self.store.get(&key).await? {
            Some(next) => {
                // Continuations are single-use; the handler re-arms if needed.
                self.store.delete(&key).await?;
                if input.is_abort() {
                    debug!(sender = %key, "conversation aborted");
                    return Ok(());
                }
                #[cfg(feature = "metrics")]
                counter!(bot_metrics::CONTINUATIONS_TOTAL, labels::BOT_TYPE => self.bot_type().to_string())
                    .increment(1);
                Some(next(input.clone()).await?)
            },
            None if input.is_help() => Some(CommandResponse::content(OutputContent::Help(
                self.commands.helps(&input),
            ))),
            None => self.commands.execute_first_matched(input.clone()).await?,
        };

        let Some(response) = response else {
            return Ok(());
        };
        if let Some(next) = response.user_context {
            self.store.set(&key, next).await?;
        }
        if let Some(content) = response.content {
            self.adapter
                .send_message(Output::new(input.reply_to().clone(), content))
                .await;
        }
        Ok(())
    }

    async fn send_message(&self, output: Output) {
        self.adapter.send_message(output).await;
    }

    fn append_command(&self, command: Arc<dyn Command>) {
        self.commands.append(command);
    }

    async fn run(&self, cancel: CancellationToken, receive: InputReceiver, notify: ErrorNotifier) {
        self.adapter.run(cancel, receive, notify).await;
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            context::UserContext,
            message::{Destination, InputMessage},
            props::CommandProps,
        },
        regex::Regex,
        std::sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    #[derive(Default)]
    struct RecordingAdapter {
        sent: Mutex<Vec<Output>>,
    }

    impl RecordingAdapter {
        fn sent(&self) -> Vec<Output> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Adapter for RecordingAdapter {
        fn bot_type(&self) -> BotType {
            BotType::from("test")
        }

        async fn run(&self, cancel: CancellationToken, _: InputReceiver, _: ErrorNotifier) {
            cancel.cancelled().await;
        }

        async fn send_message(&self, output: Output) {
            self.sent.lock().unwrap().push(output);
        }
    }

    fn message(sender: &str, text: &str) -> InputMessage {
        InputMessage::new(sender, text, Destination::Room("general".into()))
    }

    fn setup() -> (
        Arc<RecordingAdapter>,
        Arc<DefaultUserContextStore>,
        DefaultBot,
    ) {
        let adapter = Arc::new(RecordingAdapter::default());
        let store = Arc::new(DefaultUserContextStore::new(&ContextCacheConfig {
            expires_in_secs: 60,
            cleanup_interval_secs: 0,
        }));
        let bot = DefaultBot::with_store(adapter.clone(), store.clone());
        (adapter, store, bot)
    }

    fn command(id: &str, pattern: &str, reply: &'static str) -> Arc<dyn Command> {
        CommandProps::builder()
            .bot_type("test")
            .identifier(id)
            .match_pattern(Regex::new(pattern).unwrap())
            .instruction(format!(".{id}"))
            .func(move |_| async move { Ok(CommandResponse::content(reply)) })
            .build()
            .unwrap()
            .build(None)
            .unwrap()
    }

    fn texts(outputs: &[Output]) -> Vec<String> {
        outputs
            .iter()
            .map(|o| match &o.content {
                OutputContent::Text(t) => t.clone(),
                other => format!("{other:?}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn replies_to_matching_command() {
        let (adapter, _, bot) = setup();
        bot.append_command(command("echo", r"^\.echo", "pong"));

        bot.respond(Input::Message(message("u1", ".echo hi")))
            .await
            .unwrap();
        let sent = adapter.sent();
        assert_eq!(texts(&sent), ["pong"]);
        assert_eq!(sent[0].destination, Destination::Room("general".into()));
    }

    #[tokio::test]
    async fn unmatched_input_is_silent() {
        let (adapter, _, bot) = setup();
        bot.append_command(command("echo", r"^\.echo", "pong"));

        bot.respond(Input::Message(message("u1", "hello")))
            .await
            .unwrap();
        assert!(adapter.sent().is_empty());
    }

    #[tokio::test]
    async fn help_lists_instructions() {
        let (adapter, _, bot) = setup();
        bot.append_command(command("echo", r"^\.echo", "pong"));
        bot.append_command(command("ping", r"^\.ping", "pong"));

        bot.respond(Input::Help(message("u1", ".help")))
            .await
            .unwrap();
        let sent = adapter.sent();
        let OutputContent::Help(helps) = &sent[0].content else {
            panic!("expected help output");
        };
        assert_eq!(helps.to_string(), "echo: .echo\nping: .ping");
    }

    #[tokio::test]
    async fn continuation_round_trip() {
        let (adapter, store, bot) = setup();
        let seen_context = Arc::new(Mutex::new(None));

        let probe_store = Arc::clone(&store);
        let probe = Arc::clone(&seen_context);
        let next = UserContext::func(move |input: Input| {
            let store = Arc::clone(&probe_store);
            let probe = Arc::clone(&probe);
            async move {
                // The stored entry must be gone before the continuation runs.
                let pending = store.get(input.sender_key()).await?.is_some();
                *probe.lock().unwrap() = Some(pending);
                Ok(CommandResponse::content(format!("you said {}", input.text())))
            }
        });
        let next = Mutex::new(Some(next));
        let start = CommandProps::builder()
            .bot_type("test")
            .identifier("start")
            .match_pattern(Regex::new(r"^\.start").unwrap())
            .instruction(".start")
            .func(move |_| {
                let next = next.lock().unwrap().take();
                async move {
                    Ok(CommandResponse {
                        content: None,
                        user_context: next,
                    })
                }
            })
            .build()
            .unwrap()
            .build(None)
            .unwrap();
        bot.append_command(start);

        bot.respond(Input::Message(message("u1", ".start")))
            .await
            .unwrap();
        assert!(adapter.sent().is_empty());

        bot.respond(Input::Message(message("u1", "blue")))
            .await
            .unwrap();
        assert_eq!(texts(&adapter.sent()), ["you said blue"]);
        assert_eq!(*seen_context.lock().unwrap(), Some(false));
        assert!(store.get("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn continuation_is_keyed_by_sender() {
        let (adapter, store, bot) = setup();
        bot.append_command(command("echo", r"^\.echo", "pong"));
        store
            .set(
                "u1",
                UserContext::func(|_| async { Ok(CommandResponse::content("continued")) }),
            )
            .await
            .unwrap();

        bot.respond(Input::Message(message("u2", ".echo")))
            .await
            .unwrap();
        bot.respond(Input::Message(message("u1", ".echo")))
            .await
            .unwrap();
        assert_eq!(texts(&adapter.sent()), ["pong", "continued"]);
    }

    #[tokio::test]
    async fn continuation_can_rearm() {
        let (adapter, store, bot) = setup();
        store
            .set(
                "u1",
                UserContext::func(|_| async {
                    Ok(CommandResponse::empty().with_next(UserContext::func(|_| async {
                        Ok(CommandResponse::content("second"))
                    })))
                }),
            )
            .await
            .unwrap();

        bot.respond(Input::Message(message("u1", "a"))).await.unwrap();
        assert!(store.get("u1").await.unwrap().is_some());
        bot.respond(Input::Message(message("u1", "b"))).await.unwrap();
        assert_eq!(texts(&adapter.sent()), ["second"]);
    }

    #[tokio::test]
    async fn abort_clears_context_without_running_it() {
        let (adapter, store, bot) = setup();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        store
            .set(
                "u1",
                UserContext::func(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(CommandResponse::content("should not run")) }
                }),
            )
            .await
            .unwrap();

        bot.respond(Input::Abort(message("u1", ".abort")))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(store.get("u1").await.unwrap().is_none());
        assert!(adapter.sent().is_empty());
    }

    #[tokio::test]
    async fn handler_errors_are_returned() {
        let (_, _, bot) = setup();
        let failing = CommandProps::builder()
            .bot_type("test")
            .identifier("fail")
            .match_fn(|_| true)
            .instruction("")
            .func(|_| async { Err(anyhow::anyhow!("upstream down")) })
            .build()
            .unwrap()
            .build(None)
            .unwrap();
        bot.append_command(failing);

        let err = bot
            .respond(Input::Message(message("u1", "anything")))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "upstream down");
    }
}
