//! Terminal input
//!
//! Stdin is read on its own thread and forwarded over a channel so the
//! session can wait for a line and for Ctrl-C at the same time.

use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One thing the user did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Line(String),
    Eof,
    Interrupt,
}

pub struct Input {
    lines: mpsc::UnboundedReceiver<String>,
    interrupts: mpsc::UnboundedReceiver<()>,
}

impl Input {
    /// Read stdin and watch for Ctrl-C; an interrupt also raises `cancel`
    pub fn stdin(cancel: Arc<AtomicBool>) -> Self {
        let (line_tx, lines) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if line_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Stopped reading stdin: {}", e);
                        break;
                    }
                }
            }
            debug!("stdin closed");
        });

        let (interrupt_tx, interrupts) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                cancel.store(true, Ordering::SeqCst);
                if interrupt_tx.send(()).is_err() {
                    break;
                }
            }
        });

        Self { lines, interrupts }
    }

    /// Fixed lines followed by EOF (demo script, tests)
    pub fn scripted<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (line_tx, receiver) = mpsc::unbounded_channel::<String>();
        for line in lines {
            let _ = line_tx.send(line.into());
        }

        // Both senders drop here: EOF after the script, interrupts never fire
        let (_, interrupts) = mpsc::unbounded_channel();
        Self {
            lines: receiver,
            interrupts,
        }
    }

    /// Next line, end of input or an interrupt, whichever comes first
    pub async fn next(&mut self) -> InputEvent {
        tokio::select! {
            biased;
            Some(()) = self.interrupts.recv() => InputEvent::Interrupt,
            line = self.lines.recv() => match line {
                Some(line) => InputEvent::Line(line),
                None => InputEvent::Eof,
            },
        }
    }
}
