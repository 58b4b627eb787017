//! An interactive agent that drives a set-top-box GUI application toward an
//! operator-supplied objective. Each iteration describes the current page,
//! enumerates the commands available on it, asks a completion model for the
//! next command, executes it against the live device, and records the outcome
//! so the model can see how it got here.

pub mod agent;
pub mod command;
pub mod config;
pub mod console;
pub mod device;
pub mod exec;
pub mod history;
pub mod model;
pub mod page;
pub mod prompt;

pub use agent::{Agent, AgentError};
pub use command::{Command, Key, ParseError};
pub use config::AgentConfig;
pub use console::{Console, StdConsole};
pub use device::{DeviceControl, DeviceError, HttpDeviceClient, PageDetector};
pub use exec::{CommandExecutor, ExecError, ExecErrorKind, ExecOutcome};
pub use history::{HistoryEntry, HistoryLog};
pub use model::{CompletionModel, ModelError, OpenAiClient};
pub use page::{ActionSpec, AttrValue, PageSnapshot, ParamSpec, ParamType};
