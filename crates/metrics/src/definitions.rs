//! Metric name and label definitions.
//!
//! Every metric the runtime records is named here so the exported surface is
//! documented in one place.

/// Worker pool metrics
pub mod workers {
    /// Jobs waiting for a free worker, sampled by the supervisor
    pub const QUEUE_DEPTH: &str = "sarah_worker_queue_depth";
    /// Jobs accepted by the pool
    pub const JOBS_ENQUEUED_TOTAL: &str = "sarah_worker_jobs_enqueued_total";
    /// Jobs rejected because the queue was full
    pub const JOBS_OVERFLOWED_TOTAL: &str = "sarah_worker_jobs_overflowed_total";
    /// Jobs that panicked while running
    pub const JOBS_PANICKED_TOTAL: &str = "sarah_worker_jobs_panicked_total";
}

/// Bot / command metrics
pub mod bots {
    /// Inputs handed to a bot
    pub const INPUTS_TOTAL: &str = "sarah_bot_inputs_total";
    /// Command executions, labelled by command identifier
    pub const COMMANDS_EXECUTED_TOTAL: &str = "sarah_bot_commands_executed_total";
    /// Inputs routed to a stored conversational continuation
    pub const CONTINUATIONS_TOTAL: &str = "sarah_bot_continuations_total";
    /// Inputs dropped because the worker pool refused them
    pub const INPUTS_BLOCKED_TOTAL: &str = "sarah_bot_inputs_blocked_total";
}

/// Scheduled task metrics
pub mod tasks {
    /// Scheduled task executions
    pub const EXECUTIONS_TOTAL: &str = "sarah_task_executions_total";
    /// Scheduled task executions that returned an error or panicked
    pub const ERRORS_TOTAL: &str = "sarah_task_errors_total";
    /// Number of currently scheduled entries
    pub const SCHEDULED: &str = "sarah_tasks_scheduled";
}

/// Runner metrics
pub mod runner {
    /// Bots currently running
    pub const BOTS_RUNNING: &str = "sarah_runner_bots_running";
    /// Alerts delivered
    pub const ALERTS_SENT_TOTAL: &str = "sarah_runner_alerts_sent_total";
    /// Alerter invocations that failed or panicked
    pub const ALERTS_FAILED_TOTAL: &str = "sarah_runner_alerts_failed_total";
    /// Plugin config reloads, labelled by outcome
    pub const CONFIG_RELOADS_TOTAL: &str = "sarah_runner_config_reloads_total";
}

/// Common label keys
pub mod labels {
    pub const BOT_TYPE: &str = "bot_type";
    pub const IDENTIFIER: &str = "identifier";
    pub const OUTCOME: &str = "outcome";
}
