use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use {
    sarah_bot::{Bot, CommandProps, ScheduledTask, ScheduledTaskProps, Stash},
    sarah_common::BotType,
    sarah_config::SarahConfig,
    sarah_cron::SchedulerHandle,
    sarah_watcher::ConfigWatcher,
    sarah_workers::Worker,
    tracing::warn,
};

use crate::{Error, Result, alert::Alerter, runner::Runner};

/// Collects everything a [`Runner`] needs.
///
/// The worker pool, scheduler and config watcher are optional; defaults are
/// created from the config when the runner starts.
#[derive(Default)]
pub struct RunnerBuilder {
    config: SarahConfig,
    bots: Vec<Arc<dyn Bot>>,
    stash: Stash,
    tasks: Vec<(BotType, Arc<dyn ScheduledTask>)>,
    alerters: Vec<Arc<dyn Alerter>>,
    worker: Option<Arc<dyn Worker>>,
    scheduler: Option<SchedulerHandle>,
    watcher: Option<Arc<dyn ConfigWatcher>>,
}

impl RunnerBuilder {
    pub fn new(config: SarahConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn bot(mut self, bot: Arc<dyn Bot>) -> Self {
        self.bots.push(bot);
        self
    }

    /// Add every blueprint from `stash`.
    #[must_use]
    pub fn stash(mut self, stash: Stash) -> Self {
        self.stash.merge(stash);
        self
    }

    #[must_use]
    pub fn command_props(mut self, props: CommandProps) -> Self {
        self.stash.add_command_props(props);
        self
    }

    #[must_use]
    pub fn scheduled_task_props(mut self, props: ScheduledTaskProps) -> Self {
        self.stash.add_scheduled_task_props(props);
        self
    }

    /// Schedule an already-built task. Such tasks have no config file and
    /// are never reloaded.
    #[must_use]
    pub fn scheduled_task(mut self, bot_type: impl Into<BotType>, task: Arc<dyn ScheduledTask>) -> Self {
        self.tasks.push((bot_type.into(), task));
        self
    }

    #[must_use]
    pub fn alerter(mut self, alerter: Arc<dyn Alerter>) -> Self {
        self.alerters.push(alerter);
        self
    }

    /// Use a custom worker instead of the default pool.
    #[must_use]
    pub fn worker(mut self, worker: Arc<dyn Worker>) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Schedule tasks on an already running scheduler. Its time zone wins
    /// over the configured one.
    #[must_use]
    pub fn scheduler(mut self, scheduler: SchedulerHandle) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Use a custom config watcher instead of the file watcher.
    #[must_use]
    pub fn watcher(mut self, watcher: Arc<dyn ConfigWatcher>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn build(self) -> Result<Runner> {
        self.config.validate()?;

        // Bot types sharing a config directory would shadow each other's
        // plugin configs.
        let mut seen = HashSet::new();
        let mut dirs = HashSet::new();
        for bot in &self.bots {
            let bot_type = bot.bot_type();
            if !dirs.insert(bot_type.config_dir_name()) {
                return Err(Error::duplicate_bot(bot_type));
            }
            seen.insert(bot_type);
        }

        let mut tasks: HashMap<BotType, Vec<Arc<dyn ScheduledTask>>> = HashMap::new();
        for (bot_type, task) in self.tasks {
            if !seen.contains(&bot_type) {
                warn!(%bot_type, identifier = task.identifier(), "scheduled task for unknown bot type");
            }
            tasks.entry(bot_type).or_default().push(task);
        }

        Ok(Runner::new(
            self.config,
            self.bots,
            self.stash,
            tasks,
            self.alerters,
            self.worker,
            self.scheduler,
            self.watcher,
        ))
    }
}
