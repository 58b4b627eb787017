//! Executes one command per iteration against the live device.
//!
//! A command is parsed into the closed grammar, validated against the
//! current page's declared actions and attributes, and only then allowed to
//! touch the device. Four failure kinds are recoverable; they are reported
//! under the names the model already knows from its prompt history. All
//! other failures end the run.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;

use crate::command::{self, Command, ParseError};
use crate::device::{DeviceControl, DeviceError};
use crate::page::{ActionSpec, AttrValue, PageSnapshot};

/// The recoverable failure kinds. The names feed back into prompts and
/// history, so they keep the spelling the production prompts used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecErrorKind {
    Syntax,
    UndefinedName,
    UndefinedAttribute,
    MissingResource,
}

impl ExecErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ExecErrorKind::Syntax => "SyntaxError",
            ExecErrorKind::UndefinedName => "NameError",
            ExecErrorKind::UndefinedAttribute => "AttributeError",
            ExecErrorKind::MissingResource => "FileNotFoundError",
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("invalid syntax: {0}")]
    Syntax(String),
    #[error("name '{0}' is not defined")]
    UndefinedName(String),
    #[error("{0}")]
    UndefinedAttribute(String),
    #[error("{0}")]
    MissingResource(String),
    #[error("assertion failed: page.{attribute} is {actual}, expected {expected}")]
    AssertionFailed {
        attribute: String,
        actual: String,
        expected: String,
    },
    #[error("page.{action}() {message}")]
    Signature { action: String, message: String },
    #[error(transparent)]
    Device(DeviceError),
}

impl ExecError {
    /// The whitelisted kind, or `None` for errors that must end the run.
    pub fn recoverable_kind(&self) -> Option<ExecErrorKind> {
        match self {
            ExecError::Syntax(_) => Some(ExecErrorKind::Syntax),
            ExecError::UndefinedName(_) => Some(ExecErrorKind::UndefinedName),
            ExecError::UndefinedAttribute(_) => Some(ExecErrorKind::UndefinedAttribute),
            ExecError::MissingResource(_) => Some(ExecErrorKind::MissingResource),
            ExecError::AssertionFailed { .. }
            | ExecError::Signature { .. }
            | ExecError::Device(_) => None,
        }
    }
}

impl From<ParseError> for ExecError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Syntax(message) => ExecError::Syntax(message),
            ParseError::UndefinedName(name) => ExecError::UndefinedName(name),
        }
    }
}

impl From<DeviceError> for ExecError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::MissingResource(message) => ExecError::MissingResource(message),
            other => ExecError::Device(other),
        }
    }
}

/// What a successful command produced.
#[derive(Debug, Default)]
pub struct ExecOutcome {
    /// Output of `print(...)`, destined for the operator.
    pub printed: Option<String>,
    /// Resulting page as reported by the device, kept only when visible.
    /// Authoritative: the loop may adopt it without re-detecting.
    pub page: Option<PageSnapshot>,
}

pub struct CommandExecutor {
    device: Arc<dyn DeviceControl>,
    settle_delay: Duration,
}

impl CommandExecutor {
    pub fn new(device: Arc<dyn DeviceControl>, settle_delay: Duration) -> Self {
        Self {
            device,
            settle_delay,
        }
    }

    /// Run one command against `page`. The settle delay is always incurred
    /// before returning, so the UI has finished transitioning by the time
    /// the caller re-detects the page.
    pub async fn run(
        &self,
        command_text: &str,
        page: &PageSnapshot,
    ) -> Result<ExecOutcome, ExecError> {
        let result = self.run_parsed(command_text, page).await;
        sleep(self.settle_delay).await;
        result
    }

    async fn run_parsed(
        &self,
        command_text: &str,
        page: &PageSnapshot,
    ) -> Result<ExecOutcome, ExecError> {
        match command::parse(command_text)? {
            Command::Press(key) => {
                self.device.press(key).await?;
                Ok(ExecOutcome::default())
            }
            Command::LaunchApp { name } => {
                let canonical = command::canonical_app_name(&name);
                let result = self.device.launch_app(&canonical).await?;
                Ok(ExecOutcome {
                    printed: None,
                    page: visible_only(result),
                })
            }
            Command::ReadAttribute { name } => {
                let value = lookup_attribute(page, &name)?;
                Ok(ExecOutcome {
                    printed: Some(value.plain()),
                    page: None,
                })
            }
            Command::AssertEquals {
                attribute,
                expected,
            } => {
                let actual = lookup_attribute(page, &attribute)?;
                if *actual != expected {
                    return Err(ExecError::AssertionFailed {
                        actual: actual.repr(),
                        expected: expected.repr(),
                        attribute,
                    });
                }
                Ok(ExecOutcome::default())
            }
            Command::Invoke { action, args } => {
                if action.starts_with('_') {
                    return Err(undefined_attribute(page, &action));
                }
                let spec = page
                    .action(&action)
                    .ok_or_else(|| undefined_attribute(page, &action))?;
                check_signature(spec, &args)?;
                let result = self.device.invoke_action(&action, &args).await?;
                Ok(ExecOutcome {
                    printed: None,
                    page: visible_only(result),
                })
            }
        }
    }
}

fn visible_only(page: Option<PageSnapshot>) -> Option<PageSnapshot> {
    page.filter(|p| p.is_visible)
}

fn undefined_attribute(page: &PageSnapshot, name: &str) -> ExecError {
    ExecError::UndefinedAttribute(format!(
        "'{}' object has no attribute '{}'",
        page.class_name(),
        name
    ))
}

fn lookup_attribute<'a>(page: &'a PageSnapshot, name: &str) -> Result<&'a AttrValue, ExecError> {
    page.attribute(name)
        .ok_or_else(|| undefined_attribute(page, name))
}

fn check_signature(spec: &ActionSpec, args: &[AttrValue]) -> Result<(), ExecError> {
    if args.len() != spec.params.len() {
        return Err(ExecError::Signature {
            action: spec.name.clone(),
            message: format!(
                "takes {} arguments but {} were given",
                spec.params.len(),
                args.len()
            ),
        });
    }
    for (param, arg) in spec.params.iter().zip(args) {
        if !param.ty.accepts(arg) {
            return Err(ExecError::Signature {
                action: spec.name.clone(),
                message: format!(
                    "argument '{}' expects {}, got {}",
                    param.name,
                    param.ty,
                    arg.type_name()
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::time::Instant;

    use async_trait::async_trait;
    use indexmap::IndexMap;

    use crate::command::Key;
    use crate::page::{ParamSpec, ParamType};

    #[derive(Default)]
    struct FakeDevice {
        calls: Mutex<Vec<String>>,
        next_page: Mutex<Option<PageSnapshot>>,
        missing: Mutex<Option<String>>,
        broken: Mutex<bool>,
    }

    impl FakeDevice {
        fn take_failure(&self) -> Option<DeviceError> {
            if *self.broken.lock().unwrap() {
                return Some(DeviceError::Status {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    message: "detector crashed".to_owned(),
                });
            }
            self.missing
                .lock()
                .unwrap()
                .take()
                .map(DeviceError::MissingResource)
        }
    }

    #[async_trait]
    impl DeviceControl for FakeDevice {
        async fn press(&self, key: Key) -> Result<(), DeviceError> {
            self.calls.lock().unwrap().push(format!("press {}", key.name()));
            match self.take_failure() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        async fn launch_app(&self, name: &str) -> Result<Option<PageSnapshot>, DeviceError> {
            self.calls.lock().unwrap().push(format!("launch {name}"));
            match self.take_failure() {
                Some(err) => Err(err),
                None => Ok(self.next_page.lock().unwrap().take()),
            }
        }

        async fn invoke_action(
            &self,
            name: &str,
            args: &[AttrValue],
        ) -> Result<Option<PageSnapshot>, DeviceError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("action {name}/{}", args.len()));
            match self.take_failure() {
                Some(err) => Err(err),
                None => Ok(self.next_page.lock().unwrap().take()),
            }
        }
    }

    fn carousel_page() -> PageSnapshot {
        let mut attributes = IndexMap::new();
        attributes.insert(
            "selected_title".to_owned(),
            AttrValue::Str("Godzilla vs. Kong".to_owned()),
        );
        attributes.insert("index".to_owned(), AttrValue::Float(3.0));
        PageSnapshot {
            type_path: "tests.appletv.pages.Carousel".to_owned(),
            is_visible: true,
            frame: None,
            attributes,
            actions: vec![
                ActionSpec {
                    name: "select_title".to_owned(),
                    params: vec![ParamSpec {
                        name: "title".to_owned(),
                        ty: ParamType::Str,
                    }],
                },
                ActionSpec {
                    name: "_refresh".to_owned(),
                    params: vec![],
                },
            ],
        }
    }

    fn executor(device: &Arc<FakeDevice>) -> CommandExecutor {
        CommandExecutor::new(device.clone() as Arc<dyn DeviceControl>, Duration::ZERO)
    }

    #[tokio::test]
    async fn alias_is_resolved_before_the_launch_call() {
        let device = Arc::new(FakeDevice::default());
        let exec = executor(&device);
        exec.run(r#"launch_app("youtube")"#, &carousel_page())
            .await
            .unwrap();
        assert_eq!(device.calls.lock().unwrap().as_slice(), ["launch YouTube"]);
    }

    #[tokio::test]
    async fn unrecognized_app_name_passes_through_unchanged() {
        let device = Arc::new(FakeDevice::default());
        let exec = executor(&device);
        exec.run(r#"launch_app("My Custom App")"#, &carousel_page())
            .await
            .unwrap();
        assert_eq!(
            device.calls.lock().unwrap().as_slice(),
            ["launch My Custom App"]
        );
    }

    #[tokio::test]
    async fn press_reaches_the_device() {
        let device = Arc::new(FakeDevice::default());
        let exec = executor(&device);
        exec.run(r#"press("KEY_DOWN")"#, &carousel_page())
            .await
            .unwrap();
        assert_eq!(device.calls.lock().unwrap().as_slice(), ["press KEY_DOWN"]);
    }

    #[tokio::test]
    async fn print_reads_the_attribute_value() {
        let device = Arc::new(FakeDevice::default());
        let exec = executor(&device);
        let outcome = exec
            .run("print(page.selected_title)", &carousel_page())
            .await
            .unwrap();
        assert_eq!(outcome.printed.as_deref(), Some("Godzilla vs. Kong"));
        assert!(device.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_attribute_is_recoverable() {
        let device = Arc::new(FakeDevice::default());
        let exec = executor(&device);
        let err = exec
            .run("print(page.nonexistent)", &carousel_page())
            .await
            .unwrap_err();
        assert_eq!(err.recoverable_kind(), Some(ExecErrorKind::UndefinedAttribute));
        assert_eq!(err.recoverable_kind().unwrap().name(), "AttributeError");
        assert_eq!(
            err.to_string(),
            "'Carousel' object has no attribute 'nonexistent'"
        );
    }

    #[tokio::test]
    async fn assertion_passes_on_equal_value() {
        let device = Arc::new(FakeDevice::default());
        let exec = executor(&device);
        exec.run(
            "assert page.selected_title == 'Godzilla vs. Kong'",
            &carousel_page(),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn assertion_compares_ints_and_floats() {
        let device = Arc::new(FakeDevice::default());
        let exec = executor(&device);
        exec.run("assert page.index == 3", &carousel_page())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn assertion_mismatch_is_fatal() {
        let device = Arc::new(FakeDevice::default());
        let exec = executor(&device);
        let err = exec
            .run("assert page.selected_title == 'Dune'", &carousel_page())
            .await
            .unwrap_err();
        assert!(err.recoverable_kind().is_none());
        assert!(matches!(err, ExecError::AssertionFailed { .. }));
    }

    #[tokio::test]
    async fn unknown_action_is_an_attribute_error() {
        let device = Arc::new(FakeDevice::default());
        let exec = executor(&device);
        let err = exec
            .run("page.open_settings()", &carousel_page())
            .await
            .unwrap_err();
        assert_eq!(err.recoverable_kind(), Some(ExecErrorKind::UndefinedAttribute));
        assert!(device.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn internal_actions_are_hidden() {
        let device = Arc::new(FakeDevice::default());
        let exec = executor(&device);
        let err = exec.run("page._refresh()", &carousel_page()).await.unwrap_err();
        assert_eq!(err.recoverable_kind(), Some(ExecErrorKind::UndefinedAttribute));
    }

    #[tokio::test]
    async fn arity_mismatch_is_fatal() {
        let device = Arc::new(FakeDevice::default());
        let exec = executor(&device);
        let err = exec
            .run("page.select_title('Dune', 2)", &carousel_page())
            .await
            .unwrap_err();
        assert!(err.recoverable_kind().is_none());
        assert!(matches!(err, ExecError::Signature { .. }));
        assert!(device.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn argument_type_mismatch_is_fatal() {
        let device = Arc::new(FakeDevice::default());
        let exec = executor(&device);
        let err = exec
            .run("page.select_title(42)", &carousel_page())
            .await
            .unwrap_err();
        assert!(err.recoverable_kind().is_none());
        assert!(matches!(err, ExecError::Signature { .. }));
    }

    #[tokio::test]
    async fn valid_action_call_reaches_the_device() {
        let device = Arc::new(FakeDevice::default());
        let exec = executor(&device);
        exec.run("page.select_title('Dune')", &carousel_page())
            .await
            .unwrap();
        assert_eq!(
            device.calls.lock().unwrap().as_slice(),
            ["action select_title/1"]
        );
    }

    #[tokio::test]
    async fn missing_resource_maps_to_file_not_found() {
        let device = Arc::new(FakeDevice::default());
        *device.missing.lock().unwrap() = Some("No app named 'Netflix' on this device".to_owned());
        let exec = executor(&device);
        let err = exec
            .run(r#"launch_app("Netflix")"#, &carousel_page())
            .await
            .unwrap_err();
        assert_eq!(err.recoverable_kind(), Some(ExecErrorKind::MissingResource));
        assert_eq!(err.recoverable_kind().unwrap().name(), "FileNotFoundError");
    }

    #[tokio::test]
    async fn device_transport_failures_are_fatal() {
        let device = Arc::new(FakeDevice::default());
        *device.broken.lock().unwrap() = true;
        let exec = executor(&device);
        let err = exec
            .run(r#"press("KEY_OK")"#, &carousel_page())
            .await
            .unwrap_err();
        assert!(err.recoverable_kind().is_none());
        assert!(matches!(err, ExecError::Device(_)));
    }

    #[tokio::test]
    async fn visible_result_page_is_authoritative() {
        let device = Arc::new(FakeDevice::default());
        let mut next = carousel_page();
        next.type_path = "tests.appletv.pages.YouTubeHome".to_owned();
        *device.next_page.lock().unwrap() = Some(next);
        let exec = executor(&device);
        let outcome = exec
            .run(r#"launch_app("youtube")"#, &carousel_page())
            .await
            .unwrap();
        assert!(outcome.page.is_some());
    }

    #[tokio::test]
    async fn non_visible_result_page_is_discarded() {
        let device = Arc::new(FakeDevice::default());
        let mut next = carousel_page();
        next.is_visible = false;
        *device.next_page.lock().unwrap() = Some(next);
        let exec = executor(&device);
        let outcome = exec
            .run(r#"launch_app("youtube")"#, &carousel_page())
            .await
            .unwrap();
        assert!(outcome.page.is_none());
    }

    #[tokio::test]
    async fn settle_delay_is_always_incurred() {
        let device = Arc::new(FakeDevice::default());
        let exec = CommandExecutor::new(
            device.clone() as Arc<dyn DeviceControl>,
            Duration::from_millis(50),
        );
        let start = Instant::now();
        let _ = exec.run("not even close to valid ???", &carousel_page()).await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
