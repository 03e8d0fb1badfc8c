use std::net::SocketAddr;

use {anyhow::Result, tracing::info};

/// Handle to the installed recorder.
#[derive(Clone)]
pub struct MetricsHandle {
    #[cfg(feature = "prometheus")]
    prometheus: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl MetricsHandle {
    fn noop() -> Self {
        Self {
            #[cfg(feature = "prometheus")]
            prometheus: None,
        }
    }

    /// Current metrics in Prometheus text format, empty when nothing is
    /// being recorded.
    #[must_use]
    pub fn render(&self) -> String {
        #[cfg(feature = "prometheus")]
        if let Some(handle) = &self.prometheus {
            return handle.render();
        }
        String::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsRecorderConfig {
    pub enabled: bool,
    /// Labels attached to every series, e.g. `("instance", "bot-1")`.
    pub global_labels: Vec<(String, String)>,
    /// Serve the Prometheus scrape endpoint on this address.
    pub listen: Option<SocketAddr>,
}

/// Install the process-wide recorder.
///
/// Call once at startup, from within a Tokio runtime when `listen` is set.
/// Without the `prometheus` feature, or with `enabled = false`, nothing is
/// installed and every `counter!`/`gauge!` in the runtime crates is a no-op.
pub fn init_metrics(config: MetricsRecorderConfig) -> Result<MetricsHandle> {
    if !config.enabled {
        info!("metrics collection is disabled");
        return Ok(MetricsHandle::noop());
    }

    #[cfg(feature = "prometheus")]
    {
        let builder = config.global_labels.into_iter().fold(
            metrics_exporter_prometheus::PrometheusBuilder::new(),
            |builder, (key, value)| builder.add_global_label(key, value),
        );
        let handle = match config.listen {
            Some(addr) => {
                let (recorder, exporter) = builder.with_http_listener(addr).build()?;
                let handle = recorder.handle();
                metrics::set_global_recorder(recorder)
                    .map_err(|_| anyhow::anyhow!("a metrics recorder is already installed"))?;
                tokio::spawn(async move {
                    if let Err(e) = exporter.await {
                        tracing::error!(error = ?e, "prometheus exporter stopped");
                    }
                });
                info!(%addr, "serving prometheus metrics");
                handle
            },
            None => builder.install_recorder()?,
        };
        describe();
        info!("prometheus recorder installed");
        Ok(MetricsHandle {
            prometheus: Some(handle),
        })
    }

    #[cfg(not(feature = "prometheus"))]
    {
        info!("built without an exporter; metrics are not recorded");
        Ok(MetricsHandle::noop())
    }
}

#[cfg(feature = "prometheus")]
fn describe() {
    use {
        crate::definitions::{bots, runner, tasks, workers},
        metrics::{describe_counter, describe_gauge},
    };

    describe_gauge!(workers::QUEUE_DEPTH, "Jobs waiting for a free worker");
    describe_counter!(workers::JOBS_ENQUEUED_TOTAL, "Jobs accepted by the worker pool");
    describe_counter!(workers::JOBS_OVERFLOWED_TOTAL, "Jobs refused because the pool was full");
    describe_counter!(workers::JOBS_PANICKED_TOTAL, "Jobs that panicked");
    describe_counter!(bots::INPUTS_TOTAL, "Inputs handed to a bot");
    describe_counter!(bots::COMMANDS_EXECUTED_TOTAL, "Command executions");
    describe_counter!(bots::CONTINUATIONS_TOTAL, "Inputs answered by a stored continuation");
    describe_counter!(bots::INPUTS_BLOCKED_TOTAL, "Inputs dropped by a refusing worker");
    describe_counter!(tasks::EXECUTIONS_TOTAL, "Scheduled task executions");
    describe_counter!(tasks::ERRORS_TOTAL, "Scheduled task executions that failed");
    describe_gauge!(tasks::SCHEDULED, "Scheduled entries");
    describe_gauge!(runner::BOTS_RUNNING, "Bots currently running");
    describe_counter!(runner::ALERTS_SENT_TOTAL, "Alerts delivered");
    describe_counter!(runner::ALERTS_FAILED_TOTAL, "Alerter calls that failed");
    describe_counter!(runner::CONFIG_RELOADS_TOTAL, "Plugin config reloads by outcome");
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_recorder_renders_empty() {
        let handle = init_metrics(MetricsRecorderConfig::default()).unwrap();
        assert!(handle.render().is_empty());
    }

    // Installs the process-wide recorder; keep it the only test that does.
    #[cfg(feature = "prometheus")]
    #[tokio::test]
    async fn listener_exports_recorded_metrics() {
        let handle = init_metrics(MetricsRecorderConfig {
            enabled: true,
            global_labels: vec![("instance".into(), "test".into())],
            listen: Some(([127, 0, 0, 1], 0).into()),
        })
        .unwrap();

        metrics::counter!(crate::workers::JOBS_ENQUEUED_TOTAL).increment(2);
        let rendered = handle.render();
        assert!(rendered.contains("sarah_worker_jobs_enqueued_total{instance=\"test\"} 2"));
        assert!(rendered.contains("# HELP sarah_worker_jobs_enqueued_total"));
    }
}
