//! Scheduled task blueprints.
//!
//! Unlike commands, a scheduled task is always rebuilt when its config file
//! changes, since the config may carry the schedule itself.

use std::{fmt, future::Future, sync::Arc};

use {
    async_trait::async_trait,
    futures::{FutureExt, future::BoxFuture},
    sarah_common::BotType,
    sarah_config::RawConfig,
    serde::{Serialize, de::DeserializeOwned},
};

use crate::{
    Error, Result,
    message::{Destination, OutputContent},
};

/// One output of a task run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTaskResult {
    pub content: OutputContent,
    /// Overrides the task's default destination.
    pub destination: Option<Destination>,
}

impl ScheduledTaskResult {
    pub fn new(content: impl Into<OutputContent>) -> Self {
        Self {
            content: content.into(),
            destination: None,
        }
    }

    #[must_use]
    pub fn to(mut self, destination: Destination) -> Self {
        self.destination = Some(destination);
        self
    }
}

pub type TaskFn =
    Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<Vec<ScheduledTaskResult>>> + Send + Sync>;

#[async_trait]
pub trait ScheduledTask: Send + Sync {
    fn identifier(&self) -> &str;

    /// Schedule expression understood by the scheduler.
    fn schedule(&self) -> &str;

    /// Where results without their own destination go.
    fn default_destination(&self) -> Option<&Destination>;

    async fn execute(&self) -> anyhow::Result<Vec<ScheduledTaskResult>>;
}

/// Lets a task config supply the schedule and default destination.
pub trait ScheduledTaskConfig {
    fn schedule(&self) -> Option<String> {
        None
    }

    fn default_destination(&self) -> Option<Destination> {
        None
    }
}

struct Built {
    func: TaskFn,
    schedule: Option<String>,
    default_destination: Option<Destination>,
}

type BuildFn = Arc<dyn Fn(Option<&RawConfig>) -> Result<Built> + Send + Sync>;

#[derive(Clone)]
enum Handler {
    Plain(TaskFn),
    Configurable(BuildFn),
}

/// Immutable blueprint for one scheduled task of one bot type.
#[derive(Clone)]
pub struct ScheduledTaskProps {
    bot_type: BotType,
    identifier: String,
    schedule: Option<String>,
    default_destination: Option<Destination>,
    handler: Handler,
}

impl fmt::Debug for ScheduledTaskProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTaskProps")
            .field("bot_type", &self.bot_type)
            .field("identifier", &self.identifier)
            .field("schedule", &self.schedule)
            .field("configurable", &self.is_configurable())
            .finish()
    }
}

impl ScheduledTaskProps {
    pub fn builder() -> ScheduledTaskPropsBuilder {
        ScheduledTaskPropsBuilder::default()
    }

    pub fn bot_type(&self) -> &BotType {
        &self.bot_type
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn is_configurable(&self) -> bool {
        matches!(self.handler, Handler::Configurable(_))
    }

    /// Build a task, decoding `raw` over the blueprint's config first.
    ///
    /// The builder's schedule takes precedence over one supplied by the
    /// config; a task with neither is rejected.
    pub fn build(&self, raw: Option<&RawConfig>) -> Result<Arc<dyn ScheduledTask>> {
        let (func, schedule, default_destination) = match &self.handler {
            Handler::Plain(func) => (Arc::clone(func), None, None),
            Handler::Configurable(build) => {
                let built = build(raw)?;
                (built.func, built.schedule, built.default_destination)
            },
        };

        let schedule = self
            .schedule
            .clone()
            .or(schedule)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::insufficient_argument("schedule"))?;

        Ok(Arc::new(DefaultScheduledTask {
            identifier: self.identifier.clone(),
            schedule,
            default_destination: self.default_destination.clone().or(default_destination),
            func,
        }))
    }
}

struct DefaultScheduledTask {
    identifier: String,
    schedule: String,
    default_destination: Option<Destination>,
    func: TaskFn,
}

#[async_trait]
impl ScheduledTask for DefaultScheduledTask {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn schedule(&self) -> &str {
        &self.schedule
    }

    fn default_destination(&self) -> Option<&Destination> {
        self.default_destination.as_ref()
    }

    async fn execute(&self) -> anyhow::Result<Vec<ScheduledTaskResult>> {
        (self.func)().await
    }
}

/// Builder for [`ScheduledTaskProps`].
#[derive(Default)]
pub struct ScheduledTaskPropsBuilder {
    bot_type: Option<BotType>,
    identifier: Option<String>,
    schedule: Option<String>,
    default_destination: Option<Destination>,
    handler: Option<Handler>,
}

impl ScheduledTaskPropsBuilder {
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

    #[must_use]
    pub fn schedule(mut self, schedule: impl Into<String>) -> Self {
        self.schedule = Some(schedule.into());
        self
    }

    #[must_use]
    pub fn default_destination(mut self, destination: Destination) -> Self {
        self.default_destination = Some(destination);
        self
    }

    #[must_use]
    pub fn func<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<ScheduledTaskResult>>> + Send + 'static,
    {
        self.handler = Some(Handler::Plain(Arc::new(move || f().boxed())));
        self
    }

    /// Handler with a config value decoded from the task's config file on
    /// every build.
    #[must_use]
    pub fn configurable_func<T, F, Fut>(mut self, config: T, f: F) -> Self
    where
        T: ScheduledTaskConfig + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<ScheduledTaskResult>>> + Send + 'static,
    {
        let f = Arc::new(f);
        let build: BuildFn = Arc::new(move |raw: Option<&RawConfig>| {
            let snapshot = Arc::new(match raw {
                Some(raw) => raw.merge_into(&config)?,
                None => config.clone(),
            });
            let schedule = snapshot.schedule();
            let default_destination = snapshot.default_destination();
            let f = Arc::clone(&f);
            let func: TaskFn = Arc::new(move || f(Arc::clone(&snapshot)).boxed());
            Ok(Built {
                func,
                schedule,
                default_destination,
            })
        });
        self.handler = Some(Handler::Configurable(build));
        self
    }

    pub fn build(self) -> Result<ScheduledTaskProps> {
        let handler = self
            .handler
            .ok_or_else(|| Error::insufficient_argument("func"))?;
        let has_schedule = self.schedule.as_deref().is_some_and(|s| !s.trim().is_empty());
        // Plain tasks have no config that could provide a schedule.
        if matches!(handler, Handler::Plain(_)) && !has_schedule {
            return Err(Error::insufficient_argument("schedule"));
        }

        Ok(ScheduledTaskProps {
            bot_type: self
                .bot_type
                .ok_or_else(|| Error::insufficient_argument("bot_type"))?,
            identifier: self
                .identifier
                .filter(|id| !id.is_empty())
                .ok_or_else(|| Error::insufficient_argument("identifier"))?,
            schedule: self.schedule.filter(|_| has_schedule),
            default_destination: self.default_destination,
            handler,
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        sarah_config::ConfigFormat,
        serde::Deserialize,
    };

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    #[serde(default)]
    struct ReportConfig {
        schedule: String,
        room: String,
    }

    impl ScheduledTaskConfig for ReportConfig {
        fn schedule(&self) -> Option<String> {
            Some(self.schedule.clone())
        }

        fn default_destination(&self) -> Option<Destination> {
            (!self.room.is_empty()).then(|| Destination::Room(self.room.clone()))
        }
    }

    async fn report(config: Arc<ReportConfig>) -> anyhow::Result<Vec<ScheduledTaskResult>> {
        Ok(vec![ScheduledTaskResult::new(format!("report for {}", config.room))])
    }

    #[test]
    fn plain_task_requires_schedule() {
        let err = ScheduledTaskProps::builder()
            .bot_type("slack")
            .identifier("clock")
            .func(|| async { Ok(vec![]) })
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientArgument { field: "schedule" }));
    }

    #[tokio::test]
    async fn schedule_and_destination_come_from_config() {
        let props = ScheduledTaskProps::builder()
            .bot_type("slack")
            .identifier("report")
            .configurable_func(ReportConfig::default(), report)
            .build()
            .unwrap();

        // No file and an empty default schedule.
        assert!(matches!(
            props.build(None).err().unwrap(),
            Error::InsufficientArgument { field: "schedule" }
        ));

        let raw = RawConfig::new(
            "report.yaml",
            ConfigFormat::Yaml,
            "schedule: '@daily'\nroom: general\n",
        );
        let task = props.build(Some(&raw)).unwrap();
        assert_eq!(task.schedule(), "@daily");
        assert_eq!(
            task.default_destination(),
            Some(&Destination::Room("general".into()))
        );
        let results = task.execute().await.unwrap();
        assert_eq!(
            results[0].content,
            OutputContent::Text("report for general".into())
        );
    }

    #[test]
    fn builder_schedule_wins_over_config() {
        let props = ScheduledTaskProps::builder()
            .bot_type("slack")
            .identifier("report")
            .schedule("@hourly")
            .configurable_func(
                ReportConfig {
                    schedule: "@daily".into(),
                    room: String::new(),
                },
                report,
            )
            .build()
            .unwrap();
        let task = props.build(None).unwrap();
        assert_eq!(task.schedule(), "@hourly");
        assert!(task.default_destination().is_none());
    }
}
