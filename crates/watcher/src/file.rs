use std::{
    collections::HashMap,
    panic::AssertUnwindSafe,
    path::{Path, PathBuf},
    time::Duration,
};

use {
    async_trait::async_trait,
    notify_debouncer_full::{
        DebounceEventResult, Debouncer, RecommendedCache, new_debouncer,
        notify::{EventKind, RecommendedWatcher, RecursiveMode},
    },
    sarah_common::{BotType, panic::panic_message},
    sarah_config::{RawConfig, plugin::plugin_id_from_path},
    tokio::sync::{mpsc, oneshot},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{Callback, ConfigWatcher, Error, Result};

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

enum Request {
    Subscribe {
        bot_type: BotType,
        id: String,
        callback: Callback,
        reply: oneshot::Sender<Result<()>>,
    },
    Unsubscribe {
        bot_type: BotType,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Watches `<root>/<bot type>/` directories for plugin config changes.
///
/// One filesystem watch is held per directory no matter how many identifiers
/// are subscribed in it. All subscription state lives in a single task.
#[derive(Debug, Clone)]
pub struct FileWatcher {
    base_dir: PathBuf,
    tx: mpsc::Sender<Request>,
}

impl FileWatcher {
    /// Start watching below `base_dir`.
    ///
    /// Must be called from within a Tokio runtime. The watcher stops once
    /// `cancel` fires; later calls return [`Error::NotRunning`].
    pub fn run(cancel: CancellationToken, base_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::run_with_debounce(cancel, base_dir, DEFAULT_DEBOUNCE)
    }

    pub fn run_with_debounce(
        cancel: CancellationToken,
        base_dir: impl Into<PathBuf>,
        debounce: Duration,
    ) -> Result<Self> {
        let base_dir = base_dir.into();
        let (event_tx, events) = mpsc::unbounded_channel();

        let debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let mut changed: Vec<PathBuf> = events
                        .into_iter()
                        .filter(|event| {
                            matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
                        })
                        .flat_map(|event| event.event.paths)
                        .collect();
                    changed.sort();
                    changed.dedup();
                    if !changed.is_empty() {
                        let _ = event_tx.send(changed);
                    }
                },
                Err(errors) => {
                    for e in errors {
                        warn!(error = %e, "config watcher error");
                    }
                },
            }
        })?;

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(
            Actor {
                base_dir: base_dir.clone(),
                debouncer,
                dirs: HashMap::new(),
            }
            .run(cancel, rx, events),
        );
        info!(base_dir = %base_dir.display(), "config watcher started");

        Ok(Self { base_dir, tx })
    }

    fn bot_dir(&self, bot_type: &BotType) -> PathBuf {
        self.base_dir.join(bot_type.config_dir_name())
    }

    async fn request(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<()>>) -> Request,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| Error::NotRunning)?;
        rx.await.map_err(|_| Error::NotRunning)?
    }
}

#[async_trait]
impl ConfigWatcher for FileWatcher {
    async fn read(&self, bot_type: &BotType, id: &str) -> Result<Option<RawConfig>> {
        Ok(RawConfig::find(&self.bot_dir(bot_type), id)?)
    }

    async fn watch(&self, bot_type: &BotType, id: &str, callback: Callback) -> Result<()> {
        let (bot_type, id) = (bot_type.clone(), id.to_string());
        self.request(|reply| Request::Subscribe {
            bot_type,
            id,
            callback,
            reply,
        })
        .await
    }

    async fn unwatch(&self, bot_type: &BotType) -> Result<()> {
        let bot_type = bot_type.clone();
        self.request(|reply| Request::Unsubscribe { bot_type, reply })
            .await
    }
}

struct Subscription {
    bot_type: BotType,
    id: String,
    callback: Callback,
}

struct Actor {
    base_dir: PathBuf,
    debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    dirs: HashMap<PathBuf, Vec<Subscription>>,
}

impl Actor {
    async fn run(
        mut self,
        cancel: CancellationToken,
        mut rx: mpsc::Receiver<Request>,
        mut events: mpsc::UnboundedReceiver<Vec<PathBuf>>,
    ) {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                request = rx.recv() => match request {
                    Some(Request::Subscribe { bot_type, id, callback, reply }) => {
                        let _ = reply.send(self.subscribe(bot_type, id, callback));
                    },
                    Some(Request::Unsubscribe { bot_type, reply }) => {
                        self.unsubscribe(&bot_type);
                        let _ = reply.send(Ok(()));
                    },
                    None => break,
                },
                Some(paths) = events.recv() => self.dispatch(&paths),
            }
        }
        debug!("config watcher stopped");
    }

    fn subscribe(&mut self, bot_type: BotType, id: String, callback: Callback) -> Result<()> {
        let dir = self.base_dir.join(bot_type.config_dir_name());
        // Events carry canonical paths on some platforms.
        let dir = dir.canonicalize().map_err(|source| Error::Directory {
            bot_type: bot_type.clone(),
            dir: dir.clone(),
            source,
        })?;

        match self.dirs.get_mut(&dir) {
            Some(subs) => {
                if subs.iter().any(|s| s.id == id) {
                    return Err(Error::already_subscribed(&dir, id));
                }
                subs.push(Subscription {
                    bot_type,
                    id,
                    callback,
                });
            },
            None => {
                self.debouncer.watch(&dir, RecursiveMode::NonRecursive)?;
                debug!(dir = %dir.display(), "watching config directory");
                self.dirs.insert(dir, vec![Subscription {
                    bot_type,
                    id,
                    callback,
                }]);
            },
        }
        Ok(())
    }

    fn unsubscribe(&mut self, bot_type: &BotType) {
        let mut emptied = Vec::new();
        for (dir, subs) in &mut self.dirs {
            subs.retain(|s| s.bot_type != *bot_type);
            if subs.is_empty() {
                emptied.push(dir.clone());
            }
        }
        for dir in emptied {
            self.dirs.remove(&dir);
            if let Err(e) = self.debouncer.unwatch(&dir) {
                warn!(dir = %dir.display(), error = %e, "failed to remove directory watch");
            } else {
                debug!(dir = %dir.display(), "stopped watching config directory");
            }
        }
    }

    fn dispatch(&self, paths: &[PathBuf]) {
        for path in paths {
            let Some(subs) = path.parent().and_then(|dir| self.dirs.get(dir)) else {
                continue;
            };
            let Some(id) = plugin_id_from_path(path) else {
                debug!(path = %path.display(), "ignoring unsupported config file");
                continue;
            };
            for sub in subs.iter().filter(|s| s.id == id) {
                notify(sub, path);
            }
        }
    }
}

fn notify(sub: &Subscription, path: &Path) {
    let call = std::panic::catch_unwind(AssertUnwindSafe(|| (sub.callback)(path)));
    if let Err(payload) = call {
        error!(
            bot_type = %sub.bot_type,
            id = %sub.id,
            panic = %panic_message(payload.as_ref()),
            "config change callback panicked"
        );
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::sync::Arc};

    fn slack() -> BotType {
        BotType::from("Slack")
    }

    fn setup() -> (tempfile::TempDir, CancellationToken, FileWatcher) {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("slack")).unwrap();
        let cancel = CancellationToken::new();
        let watcher =
            FileWatcher::run_with_debounce(cancel.clone(), root.path(), Duration::from_millis(50))
                .unwrap();
        (root, cancel, watcher)
    }

    fn channel_callback() -> (Callback, mpsc::UnboundedReceiver<PathBuf>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: Callback = Arc::new(move |path: &Path| {
            let _ = tx.send(path.to_path_buf());
        });
        (callback, rx)
    }

    #[tokio::test]
    async fn read_finds_document_in_lowercased_bot_dir() {
        let (root, cancel, watcher) = setup();
        std::fs::write(root.path().join("slack/echo.yaml"), "prefix: '>'\n").unwrap();

        let raw = watcher.read(&slack(), "echo").await.unwrap().unwrap();
        assert!(raw.body.contains("prefix"));
        assert!(watcher.read(&slack(), "missing").await.unwrap().is_none());
        assert!(
            watcher
                .read(&BotType::from("gitter"), "echo")
                .await
                .unwrap()
                .is_none()
        );
        cancel.cancel();
    }

    #[tokio::test]
    async fn notifies_matching_subscriber() {
        let (root, cancel, watcher) = setup();
        let (callback, mut rx) = channel_callback();
        watcher.watch(&slack(), "echo", callback).await.unwrap();

        std::fs::write(root.path().join("slack/notes.txt"), "ignored").unwrap();
        std::fs::write(root.path().join("slack/echo.yaml"), "prefix: '>'\n").unwrap();

        let path = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(path.file_name().unwrap(), "echo.yaml");
        cancel.cancel();
    }

    #[tokio::test]
    async fn duplicate_subscription_is_rejected() {
        let (_root, cancel, watcher) = setup();
        let (callback, _rx) = channel_callback();

        watcher
            .watch(&slack(), "echo", Arc::clone(&callback))
            .await
            .unwrap();
        let err = watcher.watch(&slack(), "echo", callback).await.unwrap_err();
        assert!(matches!(err, Error::AlreadySubscribed { .. }));

        // A different identifier in the same directory shares the watch.
        let (other, _rx) = channel_callback();
        watcher.watch(&slack(), "weather", other).await.unwrap();
        cancel.cancel();
    }

    #[tokio::test]
    async fn unwatch_allows_resubscribing() {
        let (_root, cancel, watcher) = setup();
        let (callback, _rx) = channel_callback();

        watcher
            .watch(&slack(), "echo", Arc::clone(&callback))
            .await
            .unwrap();
        watcher.unwatch(&slack()).await.unwrap();
        watcher.watch(&slack(), "echo", callback).await.unwrap();
        cancel.cancel();
    }

    #[tokio::test]
    async fn missing_bot_directory_is_an_error() {
        let (_root, cancel, watcher) = setup();
        let (callback, _rx) = channel_callback();
        let err = watcher
            .watch(&BotType::from("gitter"), "echo", callback)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Directory { .. }));
        cancel.cancel();
    }

    #[tokio::test]
    async fn calls_after_shutdown_return_not_running() {
        let (_root, cancel, watcher) = setup();
        cancel.cancel();
        tokio::task::yield_now().await;

        let err = watcher.unwatch(&slack()).await.unwrap_err();
        assert!(matches!(err, Error::NotRunning));
    }

    #[tokio::test]
    async fn null_watcher_accepts_everything() {
        let watcher = crate::NullWatcher;
        let (callback, _rx) = channel_callback();
        watcher.watch(&slack(), "echo", callback).await.unwrap();
        assert!(watcher.read(&slack(), "echo").await.unwrap().is_none());
        watcher.unwatch(&slack()).await.unwrap();
    }
}
