//! The terminal as a conversation partner.

use async_trait::async_trait;
use parley_core::{Partner, PartnerId};
use std::io::{BufRead, Write};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Partner whose messages are printed to stdout.
#[derive(Debug, Default)]
pub struct ConsolePartner {
    id: PartnerId,
}

impl ConsolePartner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Partner<String> for ConsolePartner {
    fn id(&self) -> PartnerId {
        self.id
    }

    fn send(&self, message: String) {
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{message}").and_then(|()| stdout.flush()) {
            warn!("Failed to write prompt: {e}");
        }
    }
}

/// Source of partner replies.
#[async_trait]
pub trait ReplySource: Send {
    /// The next reply. `None` once the partner has gone away.
    async fn next_reply(&mut self) -> Option<String>;
}

/// Lines read from stdin on a dedicated thread.
///
/// The reader thread is never joined, so a pending terminal read cannot hold
/// up shutdown.
#[derive(Debug)]
pub struct StdinSource {
    lines: mpsc::UnboundedReceiver<String>,
}

impl StdinSource {
    #[must_use]
    pub fn spawn() -> Self {
        let (tx, lines) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {e}");
                        break;
                    }
                }
            }
            debug!("stdin closed");
        });
        Self { lines }
    }
}

#[async_trait]
impl ReplySource for StdinSource {
    async fn next_reply(&mut self) -> Option<String> {
        self.lines.recv().await
    }
}
