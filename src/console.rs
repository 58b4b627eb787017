//! Line-oriented operator console.
//!
//! Operator-facing output goes through here rather than the log so that
//! prompts and replies interleave correctly on a terminal.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// ANSI bold, used to make the model's command stand out.
pub fn bold(s: &str) -> String {
    format!("\x1b[1;1m{s}\x1b[0m")
}

#[async_trait]
pub trait Console: Send {
    /// Print `prompt` without a trailing newline, then read one line with
    /// the newline removed. EOF means the operator hung up and is an error.
    async fn read_line(&mut self, prompt: &str) -> io::Result<String>;
    async fn write_line(&mut self, line: &str) -> io::Result<()>;
}

/// The real terminal.
pub struct StdConsole {
    stdin: BufReader<tokio::io::Stdin>,
    stdout: tokio::io::Stdout,
}

impl StdConsole {
    pub fn new() -> Self {
        Self {
            stdin: BufReader::new(tokio::io::stdin()),
            stdout: tokio::io::stdout(),
        }
    }
}

impl Default for StdConsole {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Console for StdConsole {
    async fn read_line(&mut self, prompt: &str) -> io::Result<String> {
        self.stdout.write_all(prompt.as_bytes()).await?;
        self.stdout.flush().await?;
        let mut line = String::new();
        let read = self.stdin.read_line(&mut line).await?;
        if read == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed"));
        }
        Ok(line.trim_end_matches(['\n', '\r']).to_owned())
    }

    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.stdout.write_all(line.as_bytes()).await?;
        self.stdout.write_all(b"\n").await?;
        self.stdout.flush().await?;
        Ok(())
    }
}
