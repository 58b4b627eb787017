//! Page snapshots as reported by the detection service, and the canonical
//! text rendering of them that we feed to the model.

use std::fmt;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static VISIBLE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"is_visible=True(, )?").unwrap());
static FRAME_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"_frame=<([^>]+)>(, )?").unwrap());
static APP_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^tests\.([a-z]+)\.pages").unwrap());

/// An attribute value extracted from the screen.
///
/// Rendered in Python literal syntax (`'quoted'`, `True`, `None`, `3.0`)
/// because that is the convention the model's prompt examples use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl AttrValue {
    /// Literal form, as it appears inside a page description.
    pub fn repr(&self) -> String {
        match self {
            AttrValue::Null => "None".to_owned(),
            AttrValue::Bool(true) => "True".to_owned(),
            AttrValue::Bool(false) => "False".to_owned(),
            AttrValue::Int(n) => n.to_string(),
            AttrValue::Float(x) => float_repr(*x),
            AttrValue::Str(s) => format!("'{}'", escape_single_quoted(s)),
        }
    }

    /// Unquoted form, used when printing an attribute for the operator.
    pub fn plain(&self) -> String {
        match self {
            AttrValue::Str(s) => s.clone(),
            other => other.repr(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Null => "None",
            AttrValue::Bool(_) => "bool",
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::Str(_) => "str",
        }
    }
}

impl PartialEq for AttrValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AttrValue::Null, AttrValue::Null) => true,
            (AttrValue::Bool(a), AttrValue::Bool(b)) => a == b,
            (AttrValue::Int(a), AttrValue::Int(b)) => a == b,
            (AttrValue::Float(a), AttrValue::Float(b)) => a == b,
            // Numeric comparison crosses the int/float divide, as it does in
            // the assertions the model writes.
            (AttrValue::Int(a), AttrValue::Float(b)) | (AttrValue::Float(b), AttrValue::Int(a)) => {
                *a as f64 == *b
            }
            (AttrValue::Str(a), AttrValue::Str(b)) => a == b,
            _ => false,
        }
    }
}

fn float_repr(x: f64) -> String {
    if x.is_finite() && x.fract() == 0.0 {
        format!("{x:.1}")
    } else {
        x.to_string()
    }
}

fn escape_single_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

/// Parameter types an action can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Str,
    Int,
    Float,
    Bool,
}

impl ParamType {
    pub fn accepts(&self, value: &AttrValue) -> bool {
        match self {
            ParamType::Str => matches!(value, AttrValue::Str(_)),
            ParamType::Int => matches!(value, AttrValue::Int(_)),
            ParamType::Bool => matches!(value, AttrValue::Bool(_)),
            // An int argument is fine where a float is declared.
            ParamType::Float => matches!(value, AttrValue::Float(_) | AttrValue::Int(_)),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamType::Str => "str",
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::Bool => "bool",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
}

/// One action a page declares, with its typed parameters.
///
/// Declared up front by the detection service rather than discovered by
/// reflection, so the catalog is a table lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
}

/// A point-in-time view of the screen, fully materialized at detection time.
///
/// Never mutated; each detection produces a fresh snapshot that supersedes
/// the previous one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSnapshot {
    /// Fully qualified page-object type, e.g. `tests.appletv.pages.Home`.
    #[serde(rename = "type")]
    pub type_path: String,
    pub is_visible: bool,
    /// Back-reference to the video frame the snapshot was extracted from.
    #[serde(default)]
    pub frame: Option<String>,
    /// Attribute values in declaration order.
    #[serde(default)]
    pub attributes: IndexMap<String, AttrValue>,
    /// Actions callable from this page, in declaration order.
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
}

impl PageSnapshot {
    pub fn class_name(&self) -> &str {
        self.type_path.rsplit('.').next().unwrap_or(&self.type_path)
    }

    /// App segment of the type path, or `"unknown"` for paths that don't
    /// follow the `tests.<app>.pages` layout.
    pub fn app_name(&self) -> &str {
        APP_NAME
            .captures(&self.type_path)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .unwrap_or("unknown")
    }

    /// Full structured representation, before any stripping. Includes the
    /// visibility marker and the frame back-reference.
    pub fn raw_repr(&self) -> String {
        let mut parts = Vec::with_capacity(2 + self.attributes.len());
        parts.push(format!(
            "is_visible={}",
            if self.is_visible { "True" } else { "False" }
        ));
        if let Some(frame) = &self.frame {
            parts.push(format!("_frame=<{frame}>"));
        }
        for (name, value) in &self.attributes {
            parts.push(format!("{name}={}", value.repr()));
        }
        format!("<{}({})>", self.class_name(), parts.join(", "))
    }

    /// Canonical single-line description: noise stripped, app name prefixed.
    pub fn describe(&self) -> String {
        let stripped = strip_noise(&self.raw_repr());
        format!("<{}.{}", self.app_name(), &stripped[1..])
    }

    /// Signatures of the public actions, in declaration order. Internal
    /// actions (leading underscore) are hidden from the model.
    pub fn command_signatures(&self) -> Vec<String> {
        self.actions
            .iter()
            .filter(|action| !action.name.starts_with('_'))
            .map(|action| {
                let params = action
                    .params
                    .iter()
                    .map(|p| format!("{}: {}", p.name, p.ty))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("page.{}({params})", action.name)
            })
            .collect()
    }

    pub fn action(&self, name: &str) -> Option<&ActionSpec> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }
}

/// Remove the visibility marker and the frame back-reference from a page
/// representation. Idempotent.
pub fn strip_noise(repr: &str) -> String {
    let s = VISIBLE_MARKER.replace_all(repr, "");
    FRAME_REF.replace_all(&s, "").into_owned()
}
