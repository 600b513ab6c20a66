// Console sink
//
// Newline-delimited JSON to stdout, or stderr for error-severity events.
// The whole batch is formatted before the stream lock is taken.

use std::io::Write;

use async_trait::async_trait;
use auditcore_core::{Batch, Level, TransportError};

use crate::Transport;

/// Which stream receives a given event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleStream {
    /// Everything to stdout.
    Stdout,
    /// Everything to stderr.
    Stderr,
    /// WARN and below to stdout, ERROR and FATAL to stderr.
    SplitByLevel,
}

pub struct ConsoleTransport {
    stream: ConsoleStream,
}

impl ConsoleTransport {
    pub fn new(stream: ConsoleStream) -> Self {
        Self { stream }
    }

    fn render(&self, batch: &Batch) -> Result<(Vec<u8>, Vec<u8>), TransportError> {
        let mut out = Vec::new();
        let mut err = Vec::new();
        for event in batch.events() {
            let line = serde_json::to_vec(event)?;
            let target = match self.stream {
                ConsoleStream::Stdout => &mut out,
                ConsoleStream::Stderr => &mut err,
                ConsoleStream::SplitByLevel => {
                    if event.level >= Level::Error {
                        &mut err
                    } else {
                        &mut out
                    }
                }
            };
            target.extend_from_slice(&line);
            target.push(b'\n');
        }
        Ok((out, err))
    }
}

impl Default for ConsoleTransport {
    fn default() -> Self {
        Self::new(ConsoleStream::SplitByLevel)
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, batch: &Batch) -> Result<(), TransportError> {
        let (out, err) = self.render(batch)?;
        if !out.is_empty() {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&out)?;
            stdout.flush()?;
        }
        if !err.is_empty() {
            let mut stderr = std::io::stderr().lock();
            stderr.write_all(&err)?;
            stderr.flush()?;
        }
        Ok(())
    }
}
