//! Command blueprints.
//!
//! [`CommandProps`] describe how to build a command; the runner builds one
//! instance per bot at startup and again whenever the command's config file
//! changes. Three handler flavors exist:
//!
//! - [`CommandPropsBuilder::func`]: no config, never reloaded.
//! - [`CommandPropsBuilder::configurable_func`]: the handler receives an
//!   immutable config snapshot; a file change builds a new command instance.
//! - [`CommandPropsBuilder::live_configurable_func`]: the handler reads a
//!   shared [`ConfigCell`]; a file change publishes into the cell and the
//!   command instance stays the same.

use std::{fmt, future::Future, sync::Arc};

use {
    async_trait::async_trait,
    futures::FutureExt,
    regex::Regex,
    sarah_common::BotType,
    sarah_config::RawConfig,
    serde::{Serialize, de::DeserializeOwned},
};

use crate::{
    Error, Result,
    cell::ConfigCell,
    command::{Command, CommandFn, CommandResponse},
    message::Input,
};

type MatchFn = Arc<dyn Fn(&Input) -> bool + Send + Sync>;
type InstructionFn = Arc<dyn Fn(&Input) -> String + Send + Sync>;
type BuildFn = Arc<dyn Fn(Option<&RawConfig>) -> Result<CommandFn> + Send + Sync>;
type UpdateFn = Arc<dyn Fn(&RawConfig) -> Result<()> + Send + Sync>;

#[derive(Clone)]
enum Handler {
    Plain(CommandFn),
    Value(BuildFn),
    Live { func: CommandFn, update: UpdateFn },
}

/// Outcome of applying a changed config file to a command.
pub enum Reload {
    /// The existing instance picked up the new config.
    InPlace,
    /// A new instance replaces the old one.
    Rebuilt(Arc<dyn Command>),
}

impl fmt::Debug for Reload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InPlace => f.write_str("InPlace"),
            Self::Rebuilt(command) => write!(f, "Rebuilt({})", command.identifier()),
        }
    }
}

/// Immutable blueprint for one command of one bot type.
#[derive(Clone)]
pub struct CommandProps {
    bot_type: BotType,
    identifier: String,
    matcher: MatchFn,
    instruction: InstructionFn,
    handler: Handler,
}

impl fmt::Debug for CommandProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandProps")
            .field("bot_type", &self.bot_type)
            .field("identifier", &self.identifier)
            .field("configurable", &self.is_configurable())
            .finish()
    }
}

impl CommandProps {
    pub fn builder() -> CommandPropsBuilder {
        CommandPropsBuilder::default()
    }

    pub fn bot_type(&self) -> &BotType {
        &self.bot_type
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Whether the command reads a plugin config file.
    pub fn is_configurable(&self) -> bool {
        !matches!(self.handler, Handler::Plain(_))
    }

    /// Build a command, decoding `raw` over the blueprint's config first.
    ///
    /// Without a config file the blueprint's own config value is used.
    pub fn build(&self, raw: Option<&RawConfig>) -> Result<Arc<dyn Command>> {
        let func = match &self.handler {
            Handler::Plain(func) => Arc::clone(func),
            Handler::Value(build) => build(raw)?,
            Handler::Live { func, update } => {
                if let Some(raw) = raw {
                    update(raw)?;
                }
                Arc::clone(func)
            },
        };
        Ok(self.assemble(func))
    }

    /// Apply a changed config file.
    pub fn reload(&self, raw: &RawConfig) -> Result<Reload> {
        match &self.handler {
            Handler::Plain(_) => Ok(Reload::InPlace),
            Handler::Value(build) => Ok(Reload::Rebuilt(self.assemble(build(Some(raw))?))),
            Handler::Live { update, .. } => {
                update(raw)?;
                Ok(Reload::InPlace)
            },
        }
    }

    fn assemble(&self, func: CommandFn) -> Arc<dyn Command> {
        Arc::new(DefaultCommand {
            identifier: self.identifier.clone(),
            matcher: Arc::clone(&self.matcher),
            instruction: Arc::clone(&self.instruction),
            func,
        })
    }
}

struct DefaultCommand {
    identifier: String,
    matcher: MatchFn,
    instruction: InstructionFn,
    func: CommandFn,
}

#[async_trait]
impl Command for DefaultCommand {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn matches(&self, input: &Input) -> bool {
        (self.matcher)(input)
    }

    fn instruction(&self, input: &Input) -> String {
        (self.instruction)(input)
    }

    async fn execute(&self, input: Input) -> anyhow::Result<CommandResponse> {
        (self.func)(input).await
    }
}

/// Builder for [`CommandProps`].
#[derive(Default)]
pub struct CommandPropsBuilder {
    bot_type: Option<BotType>,
    identifier: Option<String>,
    matcher: Option<MatchFn>,
    instruction: Option<InstructionFn>,
    handler: Option<Handler>,
}

impl CommandPropsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn bot_type(mut self, bot_type: impl Into<BotType>) -> Self {
        self.bot_type = Some(bot_type.into());
        self
    }

    #[must_use]
    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Match inputs whose text matches `pattern`.
    #[must_use]
    pub fn match_pattern(mut self, pattern: Regex) -> Self {
        self.matcher = Some(Arc::new(move |input: &Input| pattern.is_match(input.text())));
        self
    }

    #[must_use]
    pub fn match_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Input) -> bool + Send + Sync + 'static,
    {
        self.matcher = Some(Arc::new(f));
        self
    }

    /// Fixed help text. Pass an empty string to hide the command from help.
    #[must_use]
    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        let instruction = instruction.into();
        self.instruction = Some(Arc::new(move |_: &Input| instruction.clone()));
        self
    }

    #[must_use]
    pub fn instruction_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Input) -> String + Send + Sync + 'static,
    {
        self.instruction = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn func<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Input) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<CommandResponse>> + Send + 'static,
    {
        self.handler = Some(Handler::Plain(Arc::new(move |input| f(input).boxed())));
        self
    }

    /// Handler with a config value. Each build decodes the config file over
    /// `config` and captures the result; a file change builds a new command.
    #[must_use]
    pub fn configurable_func<T, F, Fut>(mut self, config: T, f: F) -> Self
    where
        T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
        F: Fn(Input, Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<CommandResponse>> + Send + 'static,
    {
        let f = Arc::new(f);
        let build: BuildFn = Arc::new(move |raw: Option<&RawConfig>| {
            let snapshot = Arc::new(match raw {
                Some(raw) => raw.merge_into(&config)?,
                None => config.clone(),
            });
            let f = Arc::clone(&f);
            let func: CommandFn =
                Arc::new(move |input| f(input, Arc::clone(&snapshot)).boxed());
            Ok(func)
        });
        self.handler = Some(Handler::Value(build));
        self
    }

    /// Handler reading a shared config cell. A file change publishes into
    /// `cell`; the built command is never replaced.
    #[must_use]
    pub fn live_configurable_func<T, F, Fut>(mut self, cell: Arc<ConfigCell<T>>, f: F) -> Self
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: Fn(Input, Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<CommandResponse>> + Send + 'static,
    {
        let reader = Arc::clone(&cell);
        let func: CommandFn = Arc::new(move |input| f(input, reader.load()).boxed());
        let update: UpdateFn = Arc::new(move |raw: &RawConfig| {
            let next = raw.merge_into(cell.load().as_ref())?;
            cell.publish(next);
            Ok(())
        });
        self.handler = Some(Handler::Live { func, update });
        self
    }

    pub fn build(self) -> Result<CommandProps> {
        Ok(CommandProps {
            bot_type: self
                .bot_type
                .ok_or_else(|| Error::insufficient_argument("bot_type"))?,
            identifier: self
                .identifier
                .filter(|id| !id.is_empty())
                .ok_or_else(|| Error::insufficient_argument("identifier"))?,
            matcher: self
                .matcher
                .ok_or_else(|| Error::insufficient_argument("match_pattern or match_fn"))?,
            instruction: self
                .instruction
                .ok_or_else(|| Error::insufficient_argument("instruction or instruction_fn"))?,
            handler: self
                .handler
                .ok_or_else(|| Error::insufficient_argument("func"))?,
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::message::{Destination, InputMessage, OutputContent},
        sarah_config::ConfigFormat,
        serde::Deserialize,
    };

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct GreetConfig {
        greeting: String,
        punctuation: String,
    }

    fn greet_config() -> GreetConfig {
        GreetConfig {
            greeting: "hello".into(),
            punctuation: "!".into(),
        }
    }

    fn input(text: &str) -> Input {
        Input::Message(InputMessage::new("u1", text, Destination::Room("r".into())))
    }

    fn yaml(body: &str) -> RawConfig {
        RawConfig::new("greet.yaml", ConfigFormat::Yaml, body)
    }

    async fn reply_text(command: &Arc<dyn Command>) -> String {
        match command.execute(input(".greet")).await.unwrap().content {
            Some(OutputContent::Text(text)) => text,
            other => panic!("unexpected content: {other:?}"),
        }
    }

    async fn greet(_input: Input, config: Arc<GreetConfig>) -> anyhow::Result<CommandResponse> {
        Ok(CommandResponse::content(format!(
            "{}{}",
            config.greeting, config.punctuation
        )))
    }

    fn base() -> CommandPropsBuilder {
        CommandProps::builder()
            .bot_type("slack")
            .identifier("greet")
            .match_pattern(Regex::new(r"^\.greet").unwrap())
            .instruction(".greet")
    }

    #[test]
    fn build_reports_missing_fields() {
        let err = CommandProps::builder()
            .identifier("greet")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientArgument { field: "bot_type" }));

        let err = CommandProps::builder()
            .bot_type("slack")
            .identifier("greet")
            .match_fn(|_| true)
            .instruction("")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientArgument { field: "func" }));
    }

    #[tokio::test]
    async fn match_pattern_checks_text() {
        let props = base()
            .func(|_| async { Ok(CommandResponse::content("hi")) })
            .build()
            .unwrap();
        let command = props.build(None).unwrap();
        assert!(command.matches(&input(".greet me")));
        assert!(!command.matches(&input("greet")));
        assert!(!props.is_configurable());
    }

    #[tokio::test]
    async fn value_config_is_hydrated_and_rebuilt() {
        let props = base()
            .configurable_func(greet_config(), greet)
            .build()
            .unwrap();

        let original = props.build(None).unwrap();
        assert_eq!(reply_text(&original).await, "hello!");

        let hydrated = props.build(Some(&yaml("greeting: hi\n"))).unwrap();
        assert_eq!(reply_text(&hydrated).await, "hi!");

        let Reload::Rebuilt(rebuilt) = props.reload(&yaml("punctuation: '?'\n")).unwrap() else {
            panic!("value config must rebuild");
        };
        assert!(!Arc::ptr_eq(&original, &rebuilt));
        assert_eq!(reply_text(&rebuilt).await, "hello?");
        // The old instance keeps its snapshot.
        assert_eq!(reply_text(&original).await, "hello!");
    }

    #[tokio::test]
    async fn live_config_updates_in_place() {
        let cell = Arc::new(ConfigCell::new(greet_config()));
        let props = base()
            .live_configurable_func(Arc::clone(&cell), greet)
            .build()
            .unwrap();

        let command = props.build(None).unwrap();
        assert_eq!(reply_text(&command).await, "hello!");

        assert!(matches!(
            props.reload(&yaml("greeting: howdy\n")).unwrap(),
            Reload::InPlace
        ));
        assert_eq!(reply_text(&command).await, "howdy!");
        assert_eq!(cell.version(), 1);
    }

    #[tokio::test]
    async fn invalid_document_keeps_previous_config() {
        let cell = Arc::new(ConfigCell::new(greet_config()));
        let props = base()
            .live_configurable_func(Arc::clone(&cell), greet)
            .build()
            .unwrap();
        let command = props.build(None).unwrap();

        assert!(props.reload(&yaml("greeting: [not, a, string]\n")).is_err());
        assert_eq!(reply_text(&command).await, "hello!");
        assert_eq!(cell.version(), 0);
    }
}
