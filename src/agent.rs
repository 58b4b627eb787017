//! The control loop: describe the page, ask the model, run the command,
//! re-detect, remember.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::time::sleep;
use tracing::debug;

use crate::config::AgentConfig;
use crate::console::{Console, bold};
use crate::device::{DeviceControl, DeviceError, PageDetector};
use crate::exec::{CommandExecutor, ExecError};
use crate::history::HistoryLog;
use crate::model::{self, CompletionModel, ModelError};
use crate::page::PageSnapshot;
use crate::prompt;

const SEPARATOR: &str = "=========================================================";

#[derive(Debug, Error)]
pub enum AgentError {
    /// No page at startup, or none within the timeout after a command.
    /// Unrecoverable: the loop must never run against an unknown screen.
    #[error("Failed to detect current page")]
    DetectionFailure,
    #[error("no objective to pursue")]
    ObjectiveMissing,
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("command failed: {0}")]
    Command(ExecError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("console error: {0}")]
    Io(#[from] std::io::Error),
}

/// Drives the device toward the operator's objective, one model-suggested
/// command per iteration.
pub struct Agent {
    config: AgentConfig,
    detector: Arc<dyn PageDetector>,
    executor: CommandExecutor,
    model: Arc<dyn CompletionModel>,
    console: Box<dyn Console>,
    history: HistoryLog,
    objective: Option<String>,
    page: Option<PageSnapshot>,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        detector: Arc<dyn PageDetector>,
        device: Arc<dyn DeviceControl>,
        model: Arc<dyn CompletionModel>,
        console: Box<dyn Console>,
    ) -> Self {
        let executor = CommandExecutor::new(device, config.settle_delay);
        Self {
            config,
            detector,
            executor,
            model,
            console,
            history: HistoryLog::new(),
            objective: None,
            page: None,
        }
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// Detect the starting page, take the objective, then iterate until a
    /// fatal error or operator interrupt. There is no success terminal
    /// state; the loop is deliberately unbounded.
    pub async fn run(&mut self) -> Result<(), AgentError> {
        let page = self.detector.poll_page().await?;
        self.page = Some(page.ok_or(AgentError::DetectionFailure)?);
        self.read_objective().await?;
        loop {
            self.step().await?;
        }
    }

    /// One full iteration: prompt, query, confirm, execute, re-detect,
    /// record.
    async fn step(&mut self) -> Result<(), AgentError> {
        let page = self.page.take().ok_or(AgentError::DetectionFailure)?;
        let objective = self.objective.clone().ok_or(AgentError::ObjectiveMissing)?;

        let description = page.describe();
        let block = prompt::build_block(
            &objective,
            &description,
            &page.command_signatures(),
            &self.history,
        );
        if self.config.verbose {
            self.console.write_line("").await?;
            self.console.write_line(SEPARATOR).await?;
            self.console.write_line(&block).await?;
            self.console.write_line(SEPARATOR).await?;
        } else {
            self.console
                .write_line(&format!("CURRENT PAGE: {description}"))
                .await?;
        }

        let started = Instant::now();
        let reply = self.model.complete(&prompt::with_intro(&block)).await?;
        if self.config.verbose {
            self.console
                .write_line(&format!(
                    "openai api took {:.2}s",
                    started.elapsed().as_secs_f64()
                ))
                .await?;
        }

        let candidate = model::first_line(&reply).to_owned();
        self.console
            .write_line(&format!("MODEL COMMAND: {}", bold(&candidate)))
            .await?;

        let chosen = if self.config.interactive {
            let entered = self
                .console
                .read_line("Enter a command to run (or press return to run the model's command above):\n")
                .await?;
            let entered = entered.trim();
            if entered.is_empty() {
                candidate
            } else {
                entered.to_owned()
            }
        } else {
            candidate
        };

        let mut error_kind = None;
        let authoritative = match self.executor.run(&chosen, &page).await {
            Ok(outcome) => {
                if let Some(text) = outcome.printed {
                    self.console.write_line(&text).await?;
                }
                outcome.page
            }
            Err(err) => match err.recoverable_kind() {
                Some(kind) => {
                    debug!(kind = kind.name(), "recoverable command failure");
                    self.console
                        .write_line(&format!("{}: {err}", kind.name()))
                        .await?;
                    error_kind = Some(kind);
                    None
                }
                None => return Err(AgentError::Command(err)),
            },
        };

        let new_page = match authoritative {
            Some(page) => {
                debug!("adopting the page returned by the command");
                page
            }
            None => self.wait_for_page().await?,
        };

        let outcome_text = match error_kind {
            Some(kind) => kind.name().to_owned(),
            None => new_page.describe(),
        };
        self.history.append(description, chosen, outcome_text);
        self.page = Some(new_page);
        Ok(())
    }

    /// Take the objective from the operator. An empty line keeps the
    /// previous objective; with confirmation prompts off, a previous
    /// objective is reused without asking.
    async fn read_objective(&mut self) -> Result<(), AgentError> {
        if self.objective.is_some() && !self.config.interactive {
            return Ok(());
        }
        let message = if self.objective.is_some() {
            "Objective (or press return to use previous objective): "
        } else {
            "Objective: "
        };
        let entered = self.console.read_line(message).await?;
        if !entered.trim().is_empty() {
            self.objective = Some(entered.trim().to_owned());
        }
        if self.objective.is_none() {
            return Err(AgentError::ObjectiveMissing);
        }
        Ok(())
    }

    /// Poll the detector until it reports a page, bounded by the detection
    /// timeout.
    async fn wait_for_page(&self) -> Result<PageSnapshot, AgentError> {
        let deadline = Instant::now() + self.config.detect_timeout;
        loop {
            if let Some(page) = self.detector.poll_page().await? {
                return Ok(page);
            }
            if Instant::now() >= deadline {
                return Err(AgentError::DetectionFailure);
            }
            sleep(self.config.detect_poll_interval).await;
        }
    }
}
