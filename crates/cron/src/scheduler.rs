use std::{collections::HashMap, panic::AssertUnwindSafe, sync::Arc};

use {
    chrono::Utc,
    chrono_tz::Tz,
    futures::{FutureExt, future::BoxFuture},
    sarah_common::{
        BotType,
        panic::{capture_backtrace, panic_message},
    },
    tokio::sync::{mpsc, oneshot},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info},
};

#[cfg(feature = "metrics")]
use sarah_metrics::{counter, gauge, labels, tasks as task_metrics};

use crate::{Error, Result, schedule::Schedule};

/// Job run on every fire. Each call produces a fresh future.
pub type JobFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// One active scheduler entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub identifier: String,
    pub schedule: String,
}

enum Request {
    Update {
        bot_type: BotType,
        identifier: String,
        schedule: Schedule,
        job: JobFn,
        owner: CancellationToken,
        reply: oneshot::Sender<Result<()>>,
    },
    Remove {
        bot_type: BotType,
        identifier: String,
        reply: oneshot::Sender<()>,
    },
    RemoveBot {
        bot_type: BotType,
        reply: oneshot::Sender<()>,
    },
    Entries {
        bot_type: BotType,
        reply: oneshot::Sender<Vec<Entry>>,
    },
}

/// Client side of the scheduler actor.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Request>,
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("running", &!self.tx.is_closed())
            .finish()
    }
}

impl SchedulerHandle {
    /// Schedule `job` for `(bot_type, identifier)`, replacing any entry already
    /// registered under that key.
    ///
    /// The entry stops for good once `owner` is cancelled; an update arriving
    /// after that returns [`Error::OwnerStopped`]. An empty or malformed
    /// `schedule` is rejected before reaching the actor, so an existing entry
    /// stays untouched.
    pub async fn update(
        &self,
        bot_type: BotType,
        identifier: impl Into<String>,
        schedule: &str,
        job: JobFn,
        owner: &CancellationToken,
    ) -> Result<()> {
        let schedule = Schedule::parse(schedule)?;
        let identifier = identifier.into();
        let owner = owner.clone();
        self.request(|reply| Request::Update {
            bot_type,
            identifier,
            schedule,
            job,
            owner,
            reply,
        })
        .await?
    }

    /// Remove one entry. Removing an unknown entry is a no-op.
    pub async fn remove(&self, bot_type: BotType, identifier: impl Into<String>) -> Result<()> {
        let identifier = identifier.into();
        self.request(|reply| Request::Remove {
            bot_type,
            identifier,
            reply,
        })
        .await
    }

    /// Remove every entry registered for `bot_type`.
    pub async fn remove_bot(&self, bot_type: BotType) -> Result<()> {
        self.request(|reply| Request::RemoveBot { bot_type, reply })
            .await
    }

    /// Active entries for `bot_type`, sorted by identifier.
    pub async fn entries(&self, bot_type: BotType) -> Result<Vec<Entry>> {
        self.request(|reply| Request::Entries { bot_type, reply })
            .await
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| Error::NotRunning)?;
        rx.await.map_err(|_| Error::NotRunning)
    }
}

/// Start the scheduler, evaluating cron expressions in the named IANA zone.
pub fn run(cancel: CancellationToken, timezone: &str) -> Result<SchedulerHandle> {
    let tz: Tz = timezone
        .parse()
        .map_err(|_| Error::unknown_timezone(timezone))?;
    Ok(run_in(cancel, tz))
}

/// Start the scheduler in an already-resolved zone.
///
/// Must be called from within a Tokio runtime. Once `cancel` fires every
/// entry stops and further handle calls return [`Error::NotRunning`].
pub fn run_in(cancel: CancellationToken, tz: Tz) -> SchedulerHandle {
    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(
        Actor {
            tz,
            cancel,
            entries: HashMap::new(),
        }
        .run(rx),
    );
    info!(timezone = %tz, "scheduler started");
    SchedulerHandle { tx }
}

struct Running {
    schedule: Schedule,
    /// Child of the owner's token.
    stop: CancellationToken,
}

struct Actor {
    tz: Tz,
    cancel: CancellationToken,
    entries: HashMap<(BotType, String), Running>,
}

impl Actor {
    async fn run(mut self, mut rx: mpsc::Receiver<Request>) {
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                request = rx.recv() => match request {
                    Some(request) => self.handle(request),
                    None => break,
                },
            }
        }
        for running in self.entries.values() {
            running.stop.cancel();
        }
        debug!("scheduler stopped");
    }

    fn handle(&mut self, request: Request) {
        // Entries whose owner went away are dead already.
        self.entries.retain(|_, running| !running.stop.is_cancelled());

        match request {
            Request::Update {
                bot_type,
                identifier,
                schedule,
                job,
                owner,
                reply,
            } => {
                if owner.is_cancelled() {
                    debug!(%bot_type, %identifier, "owner stopped; not scheduling");
                    let _ = reply.send(Err(Error::OwnerStopped));
                    return;
                }
                let key = (bot_type, identifier);
                if let Some(previous) = self.entries.remove(&key) {
                    previous.stop.cancel();
                    debug!(bot_type = %key.0, identifier = %key.1, "replacing scheduled task");
                }
                let stop = owner.child_token();
                tokio::spawn(fire_loop(
                    key.0.clone(),
                    key.1.clone(),
                    schedule.clone(),
                    self.tz,
                    job,
                    stop.clone(),
                ));
                info!(bot_type = %key.0, identifier = %key.1, schedule = %schedule, "task scheduled");
                self.entries.insert(key, Running { schedule, stop });
                let _ = reply.send(Ok(()));
            },
            Request::Remove {
                bot_type,
                identifier,
                reply,
            } => {
                if let Some(running) = self.entries.remove(&(bot_type, identifier)) {
                    running.stop.cancel();
                }
                let _ = reply.send(());
            },
            Request::RemoveBot { bot_type, reply } => {
                self.entries.retain(|(bt, _), running| {
                    let keep = *bt != bot_type;
                    if !keep {
                        running.stop.cancel();
                    }
                    keep
                });
                let _ = reply.send(());
            },
            Request::Entries { bot_type, reply } => {
                let mut entries: Vec<Entry> = self
                    .entries
                    .iter()
                    .filter(|((bt, _), _)| *bt == bot_type)
                    .map(|((_, identifier), running)| Entry {
                        identifier: identifier.clone(),
                        schedule: running.schedule.as_str().to_string(),
                    })
                    .collect();
                entries.sort_by(|a, b| a.identifier.cmp(&b.identifier));
                let _ = reply.send(entries);
            },
        }

        #[cfg(feature = "metrics")]
        gauge!(task_metrics::SCHEDULED).set(self.entries.len() as f64);
    }
}

async fn fire_loop(
    bot_type: BotType,
    identifier: String,
    schedule: Schedule,
    tz: Tz,
    job: JobFn,
    stop: CancellationToken,
) {
    loop {
        let Some(delay) = schedule.delay_from(Utc::now(), tz) else {
            info!(%bot_type, %identifier, "schedule has no future runs");
            return;
        };
        tokio::select! {
            () = stop.cancelled() => return,
            () = tokio::time::sleep(delay) => {},
        }

        debug!(%bot_type, %identifier, "firing scheduled task");
        #[cfg(feature = "metrics")]
        counter!(
            task_metrics::EXECUTIONS_TOTAL,
            labels::BOT_TYPE => bot_type.to_string(),
            labels::IDENTIFIER => identifier.clone()
        )
        .increment(1);

        let job = Arc::clone(&job);
        let (bot_type, identifier) = (bot_type.clone(), identifier.clone());
        tokio::spawn(async move {
            // Build the future inside the guarded block so a panicking
            // `JobFn` is caught as well.
            let run = AssertUnwindSafe(async move { job().await }).catch_unwind();
            if let Err(payload) = run.await {
                error!(
                    %bot_type,
                    %identifier,
                    panic = %panic_message(payload.as_ref()),
                    backtrace = %capture_backtrace(),
                    "scheduled task panicked"
                );
                #[cfg(feature = "metrics")]
                counter!(
                    task_metrics::ERRORS_TOTAL,
                    labels::BOT_TYPE => bot_type.to_string(),
                    labels::IDENTIFIER => identifier
                )
                .increment(1);
            }
        });
    }
}
