//! Notification of fatal bot errors to operators.

use std::{any::Any, fmt, panic::AssertUnwindSafe, sync::Arc};

use {
    async_trait::async_trait,
    futures::FutureExt,
    sarah_bot::BotError,
    sarah_common::{
        BotType,
        panic::{PanicPayload, panic_message},
    },
};

#[async_trait]
pub trait Alerter: Send + Sync {
    /// Tell someone that `bot_type` stopped because of `error`.
    async fn alert(&self, bot_type: &BotType, error: &BotError) -> anyhow::Result<()>;
}

/// One failed alerter invocation.
pub enum AlertError {
    Failed(anyhow::Error),
    /// The alerter panicked; holds the original panic value.
    Panicked(PanicPayload),
}

impl AlertError {
    /// The value passed to `panic!`/`panic_any`, if the alerter panicked.
    pub fn panic_payload(&self) -> Option<&(dyn Any + Send)> {
        match self {
            Self::Panicked(payload) => Some(payload.as_ref()),
            Self::Failed(_) => None,
        }
    }
}

impl fmt::Debug for AlertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
            Self::Panicked(payload) => f
                .debug_tuple("Panicked")
                .field(&panic_message(payload.as_ref()))
                .finish(),
        }
    }
}

impl fmt::Display for AlertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(e) => write!(f, "{e:#}"),
            Self::Panicked(payload) => {
                write!(f, "alerter panicked: {}", panic_message(payload.as_ref()))
            },
        }
    }
}

/// Every failed alerter invocation, in call order.
#[derive(Debug)]
pub struct AlertErrors(pub Vec<AlertError>);

impl AlertErrors {
    pub fn iter(&self) -> impl Iterator<Item = &AlertError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AlertErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} alerter(s) failed", self.0.len())?;
        for e in &self.0 {
            write!(f, "; {e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AlertErrors {}

/// Call every alerter in order.
///
/// A failing or panicking alerter does not stop the others; all failures
/// are returned together.
pub async fn alert_all(
    alerters: &[Arc<dyn Alerter>],
    bot_type: &BotType,
    error: &BotError,
) -> Result<(), AlertErrors> {
    let mut errors = Vec::new();
    for alerter in alerters {
        match AssertUnwindSafe(alerter.alert(bot_type, error))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {},
            Ok(Err(e)) => errors.push(AlertError::Failed(e)),
            Err(payload) => errors.push(AlertError::Panicked(payload)),
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AlertErrors(errors))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    #[derive(Debug, PartialEq)]
    struct PagerDown(&'static str);

    impl fmt::Display for PagerDown {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "pager down: {}", self.0)
        }
    }

    impl std::error::Error for PagerDown {}

    struct Panicking;

    #[async_trait]
    impl Alerter for Panicking {
        async fn alert(&self, _: &BotType, _: &BotError) -> anyhow::Result<()> {
            std::panic::panic_any(PagerDown("panicked"))
        }
    }

    struct Failing;

    #[async_trait]
    impl Alerter for Failing {
        async fn alert(&self, _: &BotType, _: &BotError) -> anyhow::Result<()> {
            Err(PagerDown("returned").into())
        }
    }

    #[derive(Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl Alerter for Counting {
        async fn alert(&self, _: &BotType, _: &BotError) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn aggregates_failures_in_call_order() {
        let ok = Arc::new(Counting::default());
        let alerters: Vec<Arc<dyn Alerter>> =
            vec![Arc::new(Panicking), Arc::new(Failing), ok.clone()];
        let error = BotError::non_continuable(anyhow::anyhow!("connection lost"));

        let errors = alert_all(&alerters, &BotType::from("slack"), &error)
            .await
            .unwrap_err();

        assert_eq!(errors.len(), 2);
        let payload = errors.0[0].panic_payload().unwrap();
        assert_eq!(
            payload.downcast_ref::<PagerDown>(),
            Some(&PagerDown("panicked"))
        );
        let AlertError::Failed(e) = &errors.0[1] else {
            panic!("second entry should be a returned error");
        };
        assert_eq!(e.downcast_ref::<PagerDown>(), Some(&PagerDown("returned")));
        assert_eq!(ok.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_succeeding_is_ok() {
        let alerters: Vec<Arc<dyn Alerter>> = vec![Arc::new(Counting::default())];
        let error = BotError::non_continuable(anyhow::anyhow!("x"));
        alert_all(&alerters, &BotType::from("slack"), &error)
            .await
            .unwrap();
    }
}
