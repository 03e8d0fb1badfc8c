//! Per-sender conversational state.
//!
//! A command may answer with a continuation; the sender's next input is then
//! routed to it instead of command matching. Continuations are single-use:
//! the bot deletes the stored entry before calling it.

use std::{fmt, future::Future, sync::Arc};

use {
    async_trait::async_trait,
    futures::{FutureExt, future::BoxFuture},
    sarah_config::ContextCacheConfig,
    serde::{Deserialize, Serialize},
};

use crate::{Error, Result, cache::ExpiringCache, command::CommandResponse, message::Input};

/// In-process continuation.
pub type ContextualFn =
    Arc<dyn Fn(Input) -> BoxFuture<'static, anyhow::Result<CommandResponse>> + Send + Sync>;

/// Continuation described by data, for stores that persist contexts outside
/// the process. The store resolves `func_identifier` back to a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializableArgument {
    pub func_identifier: String,
    pub argument: serde_json::Value,
}

#[derive(Clone)]
pub enum UserContext {
    Func(ContextualFn),
    Serializable(SerializableArgument),
}

impl UserContext {
    /// Wrap an async closure as an in-process continuation.
    pub fn func<F, Fut>(f: F) -> Self
    where
        F: Fn(Input) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<CommandResponse>> + Send + 'static,
    {
        Self::Func(Arc::new(move |input| f(input).boxed()))
    }

    pub fn serializable(func_identifier: impl Into<String>, argument: serde_json::Value) -> Self {
        Self::Serializable(SerializableArgument {
            func_identifier: func_identifier.into(),
            argument,
        })
    }
}

impl fmt::Debug for UserContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Func(_) => f.write_str("UserContext::Func(..)"),
            Self::Serializable(arg) => f.debug_tuple("UserContext::Serializable").field(arg).finish(),
        }
    }
}

/// Storage for pending continuations, keyed by sender key.
#[async_trait]
pub trait UserContextStore: Send + Sync {
    /// The continuation stored for `key`, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<ContextualFn>>;

    /// Store `context` for `key`, replacing any previous one.
    async fn set(&self, key: &str, context: UserContext) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn flush(&self) -> Result<()>;
}

/// Store backed by an in-memory expiring cache.
///
/// Only [`UserContext::Func`] can be stored.
pub struct DefaultUserContextStore {
    cache: Arc<ExpiringCache<UserContext>>,
}

impl DefaultUserContextStore {
    pub fn new(config: &ContextCacheConfig) -> Self {
        Self {
            cache: ExpiringCache::with_sweeper(config.expires_in(), config.cleanup_interval()),
        }
    }

    /// Use an existing cache, e.g. one shared with other components.
    pub fn with_cache(cache: Arc<ExpiringCache<UserContext>>) -> Self {
        Self { cache }
    }
}

impl fmt::Debug for DefaultUserContextStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultUserContextStore")
            .field("entries", &self.cache.len())
            .field("ttl", &self.cache.ttl())
            .finish()
    }
}

#[async_trait]
impl UserContextStore for DefaultUserContextStore {
    async fn get(&self, key: &str) -> Result<Option<ContextualFn>> {
        match self.cache.get(key) {
            None => Ok(None),
            Some(UserContext::Func(f)) => Ok(Some(f)),
            Some(UserContext::Serializable(_)) => Err(Error::unsupported_context(key)),
        }
    }

    async fn set(&self, key: &str, context: UserContext) -> Result<()> {
        match context {
            UserContext::Func(_) => {
                self.cache.insert(key, context);
                Ok(())
            },
            UserContext::Serializable(_) => Err(Error::unsupported_context(key)),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.remove(key);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.cache.clear();
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::message::{Destination, InputMessage},
        std::time::Duration,
    };

    fn store() -> DefaultUserContextStore {
        DefaultUserContextStore::new(&ContextCacheConfig {
            expires_in_secs: 60,
            cleanup_interval_secs: 0,
        })
    }

    fn reply(text: &'static str) -> UserContext {
        UserContext::func(move |_input| async move { Ok(CommandResponse::content(text)) })
    }

    #[tokio::test]
    async fn absent_key_is_not_an_error() {
        assert!(store().get("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_get_and_delete() {
        let store = store();
        store.set("u1", reply("second turn")).await.unwrap();

        let next = store.get("u1").await.unwrap().unwrap();
        let input = Input::Message(InputMessage::new("u1", "hi", Destination::User("u1".into())));
        let response = next(input).await.unwrap();
        assert_eq!(
            response.content,
            Some(crate::message::OutputContent::Text("second turn".into()))
        );

        store.delete("u1").await.unwrap();
        assert!(store.get("u1").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn contexts_expire() {
        let store = store();
        store.set("u1", reply("late")).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(store.get("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_serializable_context() {
        let err = store()
            .set("u1", UserContext::serializable("guess", serde_json::json!(42)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedContext { .. }));
    }

    #[tokio::test]
    async fn foreign_entry_in_shared_cache_is_a_typed_error() {
        let cache = Arc::new(ExpiringCache::new(Duration::from_secs(60)));
        cache.insert("u1", UserContext::serializable("guess", serde_json::json!(42)));
        let store = DefaultUserContextStore::with_cache(cache);

        let err = store.get("u1").await.err().unwrap();
        assert!(matches!(err, Error::UnsupportedContext { key } if key == "u1"));
    }

    #[tokio::test]
    async fn flush_drops_everything() {
        let store = store();
        store.set("u1", reply("a")).await.unwrap();
        store.set("u2", reply("b")).await.unwrap();
        store.flush().await.unwrap();
        assert!(store.get("u1").await.unwrap().is_none());
        assert!(store.get("u2").await.unwrap().is_none());
    }
}
