use std::sync::{Arc, RwLock};

use {
    async_trait::async_trait,
    futures::future::BoxFuture,
    tracing::debug,
};

#[cfg(feature = "metrics")]
use sarah_metrics::{bots as bot_metrics, counter, labels};

use crate::{
    Result,
    context::UserContext,
    message::{CommandHelp, CommandHelps, Input, OutputContent},
};

/// Handler shared by every built command.
pub type CommandFn =
    Arc<dyn Fn(Input) -> BoxFuture<'static, anyhow::Result<CommandResponse>> + Send + Sync>;

/// Result of running a command or a continuation.
///
/// `content` is sent back to the input's reply destination. `user_context`
/// routes the sender's next input to a continuation instead of command
/// matching.
#[derive(Debug, Default)]
pub struct CommandResponse {
    pub content: Option<OutputContent>,
    pub user_context: Option<UserContext>,
}

impl CommandResponse {
    /// A response carrying `content` and no continuation.
    pub fn content(content: impl Into<OutputContent>) -> Self {
        Self {
            content: Some(content.into()),
            user_context: None,
        }
    }

    /// A response that produces no output.
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_next(mut self, next: UserContext) -> Self {
        self.user_context = Some(next);
        self
    }
}

#[async_trait]
pub trait Command: Send + Sync {
    fn identifier(&self) -> &str;

    /// Whether this command should handle `input`.
    fn matches(&self, input: &Input) -> bool;

    /// Usage text for help output. An empty string hides the command.
    fn instruction(&self, input: &Input) -> String;

    async fn execute(&self, input: Input) -> anyhow::Result<CommandResponse>;
}

/// Ordered command list of one bot. The first matching command wins.
#[derive(Default)]
pub struct Commands {
    inner: RwLock<Vec<Arc<dyn Command>>>,
}

impl std::fmt::Debug for Commands {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.identifiers()).finish()
    }
}

impl Commands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `command`, or replace the command with the same identifier
    /// while keeping its position.
    pub fn append(&self, command: Arc<dyn Command>) {
        let mut commands = self.inner.write().unwrap_or_else(|e| e.into_inner());
        match commands
            .iter_mut()
            .find(|c| c.identifier() == command.identifier())
        {
            Some(slot) => {
                debug!(identifier = command.identifier(), "replacing command");
                *slot = command;
            },
            None => commands.push(command),
        }
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<dyn Command>> {
        self.read()
            .iter()
            .find(|c| c.identifier() == identifier)
            .cloned()
    }

    pub fn find_first_matched(&self, input: &Input) -> Option<Arc<dyn Command>> {
        self.read().iter().find(|c| c.matches(input)).cloned()
    }

    /// Run the first command matching `input`.
    ///
    /// Returns `Ok(None)` when nothing matches.
    pub async fn execute_first_matched(&self, input: Input) -> Result<Option<CommandResponse>> {
        let Some(command) = self.find_first_matched(&input) else {
            return Ok(None);
        };
        debug!(identifier = command.identifier(), "executing command");
        #[cfg(feature = "metrics")]
        counter!(
            bot_metrics::COMMANDS_EXECUTED_TOTAL,
            labels::IDENTIFIER => command.identifier().to_string()
        )
        .increment(1);

        Ok(Some(command.execute(input).await?))
    }

    /// Instructions of every command with a non-empty instruction, in order.
    pub fn helps(&self, input: &Input) -> CommandHelps {
        CommandHelps(
            self.read()
                .iter()
                .filter_map(|c| {
                    let instruction = c.instruction(input);
                    (!instruction.is_empty()).then(|| CommandHelp {
                        identifier: c.identifier().to_string(),
                        instruction,
                    })
                })
                .collect(),
        )
    }

    pub fn identifiers(&self) -> Vec<String> {
        self.read()
            .iter()
            .map(|c| c.identifier().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<dyn Command>>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::message::{Destination, InputMessage},
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    struct Stub {
        id: &'static str,
        prefix: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl Stub {
        fn new(id: &'static str, prefix: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                id,
                prefix,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Command for Stub {
        fn identifier(&self) -> &str {
            self.id
        }

        fn matches(&self, input: &Input) -> bool {
            self.prefix.is_some_and(|p| input.text().starts_with(p))
        }

        fn instruction(&self, _input: &Input) -> String {
            match self.prefix {
                Some(p) => format!(".{p}"),
                None => String::new(),
            }
        }

        async fn execute(&self, _input: Input) -> anyhow::Result<CommandResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CommandResponse::content(self.id))
        }
    }

    fn input(text: &str) -> Input {
        Input::Message(InputMessage::new("u1", text, Destination::Room("r".into())))
    }

    #[tokio::test]
    async fn first_match_wins_in_registration_order() {
        let (a, b, c) = (
            Stub::new("a", None),
            Stub::new("b", Some("echo")),
            Stub::new("c", None),
        );
        let commands = Commands::new();
        commands.append(a.clone());
        commands.append(b.clone());
        commands.append(c.clone());

        let response = commands
            .execute_first_matched(input("echo foo"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.content, Some(OutputContent::Text("b".into())));
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
        assert_eq!(c.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn earlier_registration_wins_ties() {
        let commands = Commands::new();
        commands.append(Stub::new("first", Some("echo")));
        commands.append(Stub::new("second", Some("ec")));

        let matched = commands.find_first_matched(&input("echo")).unwrap();
        assert_eq!(matched.identifier(), "first");
    }

    #[tokio::test]
    async fn no_match_is_not_an_error() {
        let commands = Commands::new();
        commands.append(Stub::new("a", Some("echo")));
        assert!(
            commands
                .execute_first_matched(input("hello"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn append_replaces_same_identifier_in_place() {
        let commands = Commands::new();
        commands.append(Stub::new("a", None));
        commands.append(Stub::new("b", None));
        let replacement = Stub::new("a", Some("x"));
        commands.append(replacement.clone());

        assert_eq!(commands.identifiers(), ["a", "b"]);
        let current = commands.get("a").unwrap();
        assert!(Arc::ptr_eq(
            &current,
            &(replacement as Arc<dyn Command>)
        ));
    }

    #[test]
    fn helps_skip_empty_instructions() {
        let commands = Commands::new();
        commands.append(Stub::new("hidden", None));
        commands.append(Stub::new("echo", Some("echo")));

        let helps = commands.helps(&input(".help"));
        assert_eq!(helps.len(), 1);
        assert_eq!(helps.0[0].identifier, "echo");
    }
}
