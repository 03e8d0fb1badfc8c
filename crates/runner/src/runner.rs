use std::{
    collections::{BTreeSet, HashMap},
    panic::AssertUnwindSafe,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use {
    futures::FutureExt,
    sarah_bot::{
        BlockedInputError, Bot, BotError, ErrorNotifier, Input, InputReceiver, Output, Reload,
        ScheduledTask, Stash,
    },
    sarah_common::{
        BotType,
        panic::{capture_backtrace, panic_message},
    },
    sarah_config::SarahConfig,
    sarah_cron::{JobFn, SchedulerHandle},
    sarah_watcher::{Callback, ConfigWatcher, FileWatcher, NullWatcher},
    sarah_workers::{Job, Worker},
    tokio::{runtime::Handle, task::JoinSet},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use sarah_metrics::{
    bots as bot_metrics, counter, gauge, labels, runner as runner_metrics, tasks as task_metrics,
};

use crate::{
    Error, Result,
    alert::{Alerter, alert_all},
    status::{Status, StatusHandle},
};

/// Supervises every registered bot until cancelled.
///
/// Built with [`RunnerBuilder`](crate::RunnerBuilder).
pub struct Runner {
    config: SarahConfig,
    bots: Vec<Arc<dyn Bot>>,
    stash: Arc<Stash>,
    tasks: HashMap<BotType, Vec<Arc<dyn ScheduledTask>>>,
    alerters: Arc<[Arc<dyn Alerter>]>,
    worker: Option<Arc<dyn Worker>>,
    scheduler: Option<SchedulerHandle>,
    watcher: Option<Arc<dyn ConfigWatcher>>,
    status: StatusHandle,
    running: AtomicBool,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("bots", &self.bots.iter().map(|b| b.bot_type()).collect::<Vec<_>>())
            .field("status", &self.status.current())
            .finish()
    }
}

impl Runner {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: SarahConfig,
        bots: Vec<Arc<dyn Bot>>,
        stash: Stash,
        tasks: HashMap<BotType, Vec<Arc<dyn ScheduledTask>>>,
        alerters: Vec<Arc<dyn Alerter>>,
        worker: Option<Arc<dyn Worker>>,
        scheduler: Option<SchedulerHandle>,
        watcher: Option<Arc<dyn ConfigWatcher>>,
    ) -> Self {
        Self {
            config,
            bots,
            stash: Arc::new(stash),
            tasks,
            alerters: alerters.into(),
            worker,
            scheduler,
            watcher,
            status: StatusHandle::default(),
            running: AtomicBool::new(false),
        }
    }

    pub fn status(&self) -> Status {
        self.status.current()
    }

    /// Handle that keeps reporting status after the runner is moved.
    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Run every bot and block until all of them have stopped.
    ///
    /// Bots stop when `cancel` fires or individually after a non-continuable
    /// error. The default worker pool, scheduler and watcher live only for
    /// the duration of this call.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyRunning);
        }
        let result = self.run_bots(cancel).await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_bots(&self, cancel: CancellationToken) -> Result<()> {
        let tz = self.config.runner.time_zone()?;
        let root = cancel.child_token();
        let _shutdown = root.clone().drop_guard();

        let worker: Arc<dyn Worker> = match &self.worker {
            Some(worker) => Arc::clone(worker),
            None => sarah_workers::run(root.clone(), &self.config.worker),
        };
        let watcher: Arc<dyn ConfigWatcher> = match (&self.watcher, &self.config.runner.plugin_config_root) {
            (Some(watcher), _) => Arc::clone(watcher),
            (None, Some(dir)) => Arc::new(FileWatcher::run(root.clone(), dir)?),
            (None, None) => Arc::new(NullWatcher),
        };
        let scheduler = match &self.scheduler {
            Some(scheduler) => scheduler.clone(),
            None => sarah_cron::run_in(root.clone(), tz),
        };

        let stopped = self.status.start();
        info!(bots = self.bots.len(), timezone = %tz, "runner started");

        let mut set = JoinSet::new();
        for bot in &self.bots {
            let bot_type = bot.bot_type();
            let scope = Arc::new(BotScope {
                bot: Arc::clone(bot),
                bot_type: bot_type.clone(),
                cancel: root.child_token(),
                stash: Arc::clone(&self.stash),
                watcher: Arc::clone(&watcher),
                scheduler: scheduler.clone(),
            });
            let supervisor = Supervisor {
                scope,
                tasks: self.tasks.get(&bot_type).cloned().unwrap_or_default(),
                alerters: Arc::clone(&self.alerters),
                worker: Arc::clone(&worker),
                stopped: self.status.add_bot(bot_type),
            };
            set.spawn(supervisor.run());
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "bot supervisor failed");
            }
        }

        stopped.cancel();
        info!("runner stopped");
        Ok(())
    }
}

/// What a bot's supervisor and its config reload callbacks share.
struct BotScope {
    bot: Arc<dyn Bot>,
    bot_type: BotType,
    cancel: CancellationToken,
    stash: Arc<Stash>,
    watcher: Arc<dyn ConfigWatcher>,
    scheduler: SchedulerHandle,
}

impl BotScope {
    async fn register_commands(&self) {
        for props in self.stash.command_props(&self.bot_type) {
            let id = props.identifier();
            let Ok(raw) = self.read_config(id, props.is_configurable()).await else {
                continue;
            };
            match props.build(raw.as_ref()) {
                Ok(command) => self.bot.append_command(command),
                Err(e) => {
                    error!(bot_type = %self.bot_type, identifier = id, error = %e, "failed to build command");
                },
            }
        }
    }

    async fn register_tasks(&self, adhoc: Vec<Arc<dyn ScheduledTask>>) {
        for props in self.stash.scheduled_task_props(&self.bot_type) {
            let id = props.identifier();
            let Ok(raw) = self.read_config(id, props.is_configurable()).await else {
                continue;
            };
            match props.build(raw.as_ref()) {
                Ok(task) => self.schedule(task).await,
                Err(e) => {
                    error!(bot_type = %self.bot_type, identifier = id, error = %e, "failed to build scheduled task");
                },
            }
        }
        for task in adhoc {
            self.schedule(task).await;
        }
    }

    /// Read the config document for `id`. Read failures are logged and
    /// returned so the caller can skip the plugin.
    async fn read_config(
        &self,
        id: &str,
        configurable: bool,
    ) -> std::result::Result<Option<sarah_config::RawConfig>, sarah_watcher::Error> {
        if !configurable {
            return Ok(None);
        }
        self.watcher
            .read(&self.bot_type, id)
            .await
            .inspect_err(|e| {
                error!(bot_type = %self.bot_type, identifier = id, error = %e, "failed to read plugin config");
            })
    }

    async fn schedule(&self, task: Arc<dyn ScheduledTask>) {
        if let Err(e) = self.try_schedule(Arc::clone(&task)).await {
            error!(
                bot_type = %self.bot_type,
                identifier = task.identifier(),
                schedule = task.schedule(),
                error = %e,
                "failed to schedule task"
            );
        }
    }

    async fn try_schedule(&self, task: Arc<dyn ScheduledTask>) -> sarah_cron::Result<()> {
        let bot = Arc::clone(&self.bot);
        let bot_type = self.bot_type.clone();
        let job_task = Arc::clone(&task);
        let job: JobFn = Arc::new(move || {
            execute_task(Arc::clone(&bot), bot_type.clone(), Arc::clone(&job_task)).boxed()
        });
        self.scheduler
            .update(
                self.bot_type.clone(),
                task.identifier(),
                task.schedule(),
                job,
                &self.cancel,
            )
            .await
    }

    /// Subscribe to every configurable plugin of this bot.
    async fn watch_configs(self: &Arc<Self>) {
        let ids: BTreeSet<&str> = self
            .stash
            .command_props(&self.bot_type)
            .iter()
            .filter(|p| p.is_configurable())
            .map(|p| p.identifier())
            .chain(
                self.stash
                    .scheduled_task_props(&self.bot_type)
                    .iter()
                    .filter(|p| p.is_configurable())
                    .map(|p| p.identifier()),
            )
            .collect();

        let handle = Handle::current();
        for id in ids {
            let scope = Arc::clone(self);
            let handle = handle.clone();
            let owned_id = id.to_string();
            let callback: Callback = Arc::new(move |path: &Path| {
                if scope.cancel.is_cancelled() {
                    return;
                }
                debug!(bot_type = %scope.bot_type, path = %path.display(), "plugin config changed");
                let scope = Arc::clone(&scope);
                let id = owned_id.clone();
                // A reload still in flight when the bot stops is dropped.
                handle.spawn(async move {
                    tokio::select! {
                        biased;
                        () = scope.cancel.cancelled() => {},
                        () = scope.reload(&id) => {},
                    }
                });
            });
            if let Err(e) = self.watcher.watch(&self.bot_type, id, callback).await {
                warn!(bot_type = %self.bot_type, identifier = id, error = %e, "failed to watch plugin config");
            }
        }
    }

    /// Apply a changed config document to every command and task named `id`.
    ///
    /// Commands keep their previous version when the update fails. Tasks are
    /// rebuilt and rescheduled; a task that can no longer be built or
    /// scheduled is unscheduled.
    async fn reload(&self, id: &str) {
        let bot_type = &self.bot_type;
        let raw = match self.watcher.read(bot_type, id).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(%bot_type, identifier = id, "plugin config no longer present");
                return;
            },
            Err(e) => {
                warn!(%bot_type, identifier = id, error = %e, "failed to read changed plugin config");
                return;
            },
        };

        for props in self
            .stash
            .command_props(bot_type)
            .iter()
            .filter(|p| p.identifier() == id && p.is_configurable())
        {
            match props.reload(&raw) {
                Ok(Reload::InPlace) => {
                    info!(%bot_type, identifier = id, "command config updated");
                    record_reload(bot_type, id, "updated");
                },
                Ok(Reload::Rebuilt(command)) => {
                    self.bot.append_command(command);
                    info!(%bot_type, identifier = id, "command rebuilt");
                    record_reload(bot_type, id, "rebuilt");
                },
                Err(e) => {
                    warn!(%bot_type, identifier = id, error = %e, "failed to reload command; keeping previous version");
                    record_reload(bot_type, id, "failed");
                },
            }
        }

        for props in self
            .stash
            .scheduled_task_props(bot_type)
            .iter()
            .filter(|p| p.identifier() == id && p.is_configurable())
        {
            match props.build(Some(&raw)) {
                Ok(task) => match self.try_schedule(task).await {
                    Ok(()) => {
                        info!(%bot_type, identifier = id, "scheduled task rebuilt");
                        record_reload(bot_type, id, "rebuilt");
                        continue;
                    },
                    Err(e) => {
                        warn!(%bot_type, identifier = id, error = %e, "invalid schedule after reload; unscheduling task");
                    },
                },
                Err(e) => {
                    warn!(%bot_type, identifier = id, error = %e, "failed to rebuild scheduled task; unscheduling");
                },
            }
            record_reload(bot_type, id, "failed");
            if let Err(e) = self.scheduler.remove(bot_type.clone(), id).await {
                debug!(%bot_type, identifier = id, error = %e, "could not unschedule task");
            }
        }
    }
}

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
fn record_reload(bot_type: &BotType, id: &str, outcome: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(
        runner_metrics::CONFIG_RELOADS_TOTAL,
        labels::BOT_TYPE => bot_type.to_string(),
        labels::IDENTIFIER => id.to_string(),
        labels::OUTCOME => outcome
    )
    .increment(1);
}

/// Run one task and deliver its results.
async fn execute_task(bot: Arc<dyn Bot>, bot_type: BotType, task: Arc<dyn ScheduledTask>) {
    let results = match task.execute().await {
        Ok(results) => results,
        Err(e) => {
            error!(%bot_type, identifier = task.identifier(), error = %e, "scheduled task failed");
            #[cfg(feature = "metrics")]
            counter!(
                task_metrics::ERRORS_TOTAL,
                labels::BOT_TYPE => bot_type.to_string(),
                labels::IDENTIFIER => task.identifier().to_string()
            )
            .increment(1);
            return;
        },
    };

    for result in results {
        let Some(destination) = result
            .destination
            .or_else(|| task.default_destination().cloned())
        else {
            warn!(%bot_type, identifier = task.identifier(), "dropping task result without destination");
            continue;
        };
        bot.send_message(Output::new(destination, result.content))
            .await;
    }
}

struct Supervisor {
    scope: Arc<BotScope>,
    tasks: Vec<Arc<dyn ScheduledTask>>,
    alerters: Arc<[Arc<dyn Alerter>]>,
    worker: Arc<dyn Worker>,
    /// Status flag, fired once the bot has been torn down.
    stopped: CancellationToken,
}

impl Supervisor {
    async fn run(self) {
        let Self {
            scope,
            tasks,
            alerters,
            worker,
            stopped,
        } = self;
        let bot_type = scope.bot_type.clone();
        info!(%bot_type, "starting bot");
        #[cfg(feature = "metrics")]
        gauge!(runner_metrics::BOTS_RUNNING).increment(1.0);

        let notify = error_notifier(bot_type.clone(), scope.cancel.clone(), alerters);
        let receive = input_receiver(&scope, worker);

        scope.register_commands().await;
        scope.register_tasks(tasks).await;
        scope.watch_configs().await;

        let run = AssertUnwindSafe(scope.bot.run(scope.cancel.clone(), receive, notify.clone()))
            .catch_unwind();
        tokio::select! {
            biased;
            () = scope.cancel.cancelled() => {},
            outcome = run => {
                if let Err(payload) = outcome {
                    let message = panic_message(payload.as_ref());
                    let backtrace = capture_backtrace();
                    error!(%bot_type, panic = %message, "bot panicked");
                    notify(BotError::non_continuable(anyhow::anyhow!(
                        "bot panicked: {message}\n{backtrace}"
                    )));
                }
                scope.cancel.cancelled().await;
            },
        }

        match scope.watcher.unwatch(&bot_type).await {
            Ok(()) | Err(sarah_watcher::Error::NotRunning) => {},
            Err(e) => warn!(%bot_type, error = %e, "failed to unwatch plugin configs"),
        }
        if let Err(e) = scope.scheduler.remove_bot(bot_type.clone()).await {
            debug!(%bot_type, error = %e, "could not remove scheduled tasks");
        }
        stopped.cancel();
        #[cfg(feature = "metrics")]
        gauge!(runner_metrics::BOTS_RUNNING).decrement(1.0);
        info!(%bot_type, "bot stopped");
    }
}

/// Callback through which a bot reports errors.
///
/// The first non-continuable error cancels the bot and alerts; anything
/// reported after that is ignored.
fn error_notifier(
    bot_type: BotType,
    cancel: CancellationToken,
    alerters: Arc<[Arc<dyn Alerter>]>,
) -> ErrorNotifier {
    let handle = Handle::current();
    let fired = AtomicBool::new(false);
    Arc::new(move |error: BotError| {
        if !error.is_non_continuable() {
            warn!(%bot_type, error = %error, "bot reported an error");
            return;
        }
        if cancel.is_cancelled() || fired.swap(true, Ordering::SeqCst) {
            debug!(%bot_type, error = %error, "ignoring error from stopped bot");
            return;
        }

        error!(%bot_type, error = %error, "stopping bot");
        cancel.cancel();

        let alerters = Arc::clone(&alerters);
        let bot_type = bot_type.clone();
        handle.spawn(async move {
            match alert_all(&alerters, &bot_type, &error).await {
                Ok(()) => {
                    #[cfg(feature = "metrics")]
                    counter!(runner_metrics::ALERTS_SENT_TOTAL, labels::BOT_TYPE => bot_type.to_string())
                        .increment(alerters.len() as u64);
                },
                Err(errors) => {
                    error!(%bot_type, error = %errors, "failed to send alerts");
                    #[cfg(feature = "metrics")]
                    {
                        counter!(runner_metrics::ALERTS_FAILED_TOTAL, labels::BOT_TYPE => bot_type.to_string())
                            .increment(errors.len() as u64);
                        counter!(runner_metrics::ALERTS_SENT_TOTAL, labels::BOT_TYPE => bot_type.to_string())
                            .increment((alerters.len() - errors.len()) as u64);
                    }
                },
            }
        });
    })
}

/// Enqueue callback handed to the bot's adapter.
///
/// Each input becomes one worker job that is dropped if the bot stops
/// first. Refused inputs are reported with the current failure streak.
fn input_receiver(scope: &Arc<BotScope>, worker: Arc<dyn Worker>) -> InputReceiver {
    let scope = Arc::clone(scope);
    let failures = AtomicU64::new(0);
    Arc::new(move |input: Input| {
        let job_scope = Arc::clone(&scope);
        let job: Job = Box::pin(async move {
            let bot_type = &job_scope.bot_type;
            tokio::select! {
                biased;
                () = job_scope.cancel.cancelled() => {
                    debug!(%bot_type, "bot stopped before input was handled");
                },
                result = job_scope.bot.respond(input) => {
                    if let Err(e) = result {
                        error!(%bot_type, error = %e, "failed to respond to input");
                    }
                },
            }
        });

        match worker.enqueue(job) {
            Ok(()) => {
                failures.store(0, Ordering::SeqCst);
                Ok(())
            },
            Err(e) => {
                let continuous_count = failures.fetch_add(1, Ordering::SeqCst) + 1;
                warn!(bot_type = %scope.bot_type, continuous_count, error = %e, "input blocked");
                #[cfg(feature = "metrics")]
                counter!(bot_metrics::INPUTS_BLOCKED_TOTAL, labels::BOT_TYPE => scope.bot_type.to_string())
                    .increment(1);
                Err(BlockedInputError { continuous_count })
            },
        }
    })
}
