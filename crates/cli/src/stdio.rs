//! Line-oriented console adapter.
//!
//! Every stdin line is one input from a single console user. `.help` and
//! `.abort` are turned into the corresponding marker inputs.

use {
    async_trait::async_trait,
    sarah_bot::{
        Adapter, BotError, Destination, ErrorNotifier, Input, InputMessage, InputReceiver, Output,
        OutputContent,
    },
    sarah_common::BotType,
    tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

pub const BOT_TYPE: &str = "stdio";

pub struct StdioAdapter {
    user: String,
}

impl StdioAdapter {
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }
}

#[async_trait]
impl Adapter for StdioAdapter {
    fn bot_type(&self) -> BotType {
        BotType::from(BOT_TYPE)
    }

    async fn run(&self, cancel: CancellationToken, receive: InputReceiver, notify: ErrorNotifier) {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                line = lines.next_line() => line,
            };
            match line {
                Ok(Some(line)) => {
                    let text = line.trim();
                    if text.is_empty() {
                        continue;
                    }
                    if let Err(e) = receive(parse_input(&self.user, text)) {
                        warn!(continuous_count = e.continuous_count, "console input dropped");
                    }
                },
                Ok(None) => {
                    debug!("stdin closed");
                    notify(BotError::non_continuable(anyhow::anyhow!("stdin closed")));
                    return;
                },
                Err(e) => {
                    notify(BotError::non_continuable(e));
                    return;
                },
            }
        }
    }

    async fn send_message(&self, output: Output) {
        let line = format!("{}\n", format_output(&output));
        let mut stdout = tokio::io::stdout();
        if let Err(e) = stdout.write_all(line.as_bytes()).await {
            warn!(error = %e, "failed to write to stdout");
            return;
        }
        let _ = stdout.flush().await;
    }
}

fn parse_input(user: &str, text: &str) -> Input {
    let message = InputMessage::new(user, text, Destination::User(user.to_string()));
    match text {
        ".help" => Input::Help(message),
        ".abort" => Input::Abort(message),
        _ => Input::Message(message),
    }
}

fn format_output(output: &Output) -> String {
    let body = match &output.content {
        OutputContent::Text(text) => text.clone(),
        OutputContent::Help(helps) => helps.to_string(),
        OutputContent::Raw(value) => value.to_string(),
    };
    match &output.destination {
        Destination::User(_) => body,
        other => format!("[{other}] {body}"),
    }
}
