//! Operator input/output boundary.
//!
//! MFA device selection, one-time passcodes, and manual CAPTCHA transcription
//! all need a human in the loop. The trait keeps that interaction injectable
//! so the flow can run headless under a replacement implementation; the
//! console default is constructed per session instance, never shared.

use std::io::{self, Write};

use async_trait::async_trait;

/// Two-operation boundary for surfacing messages and collecting input.
#[async_trait]
pub trait OperatorIo: Send + Sync {
    /// Emit a message without blocking the flow.
    fn echo(&self, message: &str);

    /// Block until the operator supplies a line of input.
    async fn prompt(&self, message: &str) -> io::Result<String>;
}

/// Console-backed operator IO reading from stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleIo;

impl ConsoleIo {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OperatorIo for ConsoleIo {
    fn echo(&self, message: &str) {
        println!("{message}");
    }

    async fn prompt(&self, message: &str) -> io::Result<String> {
        let message = message.to_string();
        // Stdin reads block; keep them off the async executor.
        tokio::task::spawn_blocking(move || {
            print!("{message}: ");
            io::stdout().flush()?;
            let mut line = String::new();
            io::stdin().read_line(&mut line)?;
            Ok(line.trim().to_string())
        })
        .await
        .map_err(io::Error::other)?
    }
}
