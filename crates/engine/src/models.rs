//! Core domain models for the flow engine.
//!
//! These types are the source of truth for what a flow looks like in
//! memory.  They (de)serialise to/from the node/edge JSON the flow editor
//! stores (`{ "nodes": [...], "edges": [...] }`), with each step's loosely
//! typed `data` object parsed into a payload keyed by step kind.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Body used for an action step whose message is absent or blank.
pub const PLACEHOLDER_MESSAGE: &str = "No message";

// ---------------------------------------------------------------------------
// ActionPayload
// ---------------------------------------------------------------------------

/// Data carried by an `action` step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionPayload {
    /// Raw message as entered in the editor.
    pub message: Option<String>,
}

impl ActionPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: Some(message.into()) }
    }

    /// The text actually sent: the message exactly as entered, or
    /// [`PLACEHOLDER_MESSAGE`] when it is missing or only whitespace.
    pub fn effective_message(&self) -> &str {
        match self.message.as_deref() {
            Some(msg) if !msg.trim().is_empty() => msg,
            _ => PLACEHOLDER_MESSAGE,
        }
    }

    fn from_data(data: Option<&Value>) -> Self {
        let message = data
            .and_then(|d| d.get("message"))
            .and_then(Value::as_str)
            .map(str::to_owned);
        Self { message }
    }

    fn to_data(&self) -> Value {
        match &self.message {
            Some(msg) => json!({ "message": msg }),
            None => json!({}),
        }
    }
}

// ---------------------------------------------------------------------------
// DelayPayload
// ---------------------------------------------------------------------------

/// How a delay step expresses its wait.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DelayMode {
    /// Wait until a fixed instant.
    Specific,
    /// Wait for `amount * unit`.
    #[default]
    Relative,
    /// Any mode text the engine does not understand. Waits zero.
    Other(String),
}

impl DelayMode {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "specific" => Self::Specific,
            "relative" => Self::Relative,
            _ => Self::Other(raw.to_owned()),
        }
    }

    fn as_str(&self) -> &str {
        match self {
            Self::Specific => "specific",
            Self::Relative => "relative",
            Self::Other(raw) => raw,
        }
    }
}

/// Unit of a relative delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayUnit {
    Minutes,
    Hours,
    Days,
}

impl DelayUnit {
    /// Length of one unit in milliseconds.
    pub fn millis(self) -> u64 {
        match self {
            Self::Minutes => 60_000,
            Self::Hours => 3_600_000,
            Self::Days => 86_400_000,
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "minutes" => Some(Self::Minutes),
            "hours" => Some(Self::Hours),
            "days" => Some(Self::Days),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Minutes => "minutes",
            Self::Hours => "hours",
            Self::Days => "days",
        }
    }
}

/// Data carried by a `delay` step.
///
/// Every field is optional on the wire; missing or malformed values are kept
/// as `None` and later yield a zero wait (see [`crate::delay::compute_delay`]).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DelayPayload {
    pub mode: DelayMode,
    pub specific_instant: Option<DateTime<Utc>>,
    pub relative_amount: Option<f64>,
    pub relative_unit: Option<DelayUnit>,
}

impl DelayPayload {
    /// Wait `amount` units.
    pub fn relative(amount: f64, unit: DelayUnit) -> Self {
        Self {
            mode: DelayMode::Relative,
            relative_amount: Some(amount),
            relative_unit: Some(unit),
            ..Self::default()
        }
    }

    /// Wait until `instant`.
    pub fn specific(instant: DateTime<Utc>) -> Self {
        Self {
            mode: DelayMode::Specific,
            specific_instant: Some(instant),
            ..Self::default()
        }
    }

    fn from_data(data: Option<&Value>) -> Self {
        let field = |name: &str| data.and_then(|d| d.get(name));

        let mode = field("mode")
            .and_then(Value::as_str)
            .map(DelayMode::parse)
            .unwrap_or_default();

        let specific_instant = field("specificDateTime")
            .and_then(Value::as_str)
            .and_then(parse_instant);

        // The editor writes a number, older documents carry numeric strings.
        let relative_amount = field("relativeValue")
            .and_then(|v| match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            })
            .filter(|v| v.is_finite());

        let relative_unit = field("relativeUnit")
            .and_then(Value::as_str)
            .and_then(DelayUnit::parse);

        Self { mode, specific_instant, relative_amount, relative_unit }
    }

    fn to_data(&self) -> Value {
        let mut data = Map::new();
        data.insert("mode".into(), json!(self.mode.as_str()));
        if let Some(instant) = self.specific_instant {
            data.insert("specificDateTime".into(), json!(instant.to_rfc3339()));
        }
        if let Some(amount) = self.relative_amount {
            data.insert("relativeValue".into(), json!(amount));
        }
        if let Some(unit) = self.relative_unit {
            data.insert("relativeUnit".into(), json!(unit.as_str()));
        }
        Value::Object(data)
    }
}

/// Accepts RFC 3339 as well as the zone-less `datetime-local` form the editor
/// produces, which is read as UTC.
fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(instant.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// What a step does, with its kind-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    Start,
    End,
    Action(ActionPayload),
    Delay(DelayPayload),
    /// A kind the engine does not recognise; the raw kind text is kept.
    Unrecognized(String),
}

impl StepKind {
    /// Parse a kind name (case-insensitive) and its `data` object.
    pub fn parse(kind: &str, data: Option<&Value>) -> Self {
        match kind.trim().to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "end" => Self::End,
            "action" => Self::Action(ActionPayload::from_data(data)),
            "delay" => Self::Delay(DelayPayload::from_data(data)),
            _ => Self::Unrecognized(kind.to_owned()),
        }
    }

    /// Kind name as written on the wire.
    pub fn name(&self) -> &str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Action(_) => "action",
            Self::Delay(_) => "delay",
            Self::Unrecognized(raw) => raw,
        }
    }
}

/// A single node in the flow chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawStep", into = "RawStep")]
pub struct Step {
    /// Unique identifier within this flow (referenced by connections).
    pub id: String,
    pub kind: StepKind,
}

impl Step {
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        Self { id: id.into(), kind }
    }

    pub fn start(id: impl Into<String>) -> Self {
        Self::new(id, StepKind::Start)
    }

    pub fn end(id: impl Into<String>) -> Self {
        Self::new(id, StepKind::End)
    }

    pub fn action(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(id, StepKind::Action(ActionPayload::new(message)))
    }

    pub fn delay(id: impl Into<String>, payload: DelayPayload) -> Self {
        Self::new(id, StepKind::Delay(payload))
    }

    pub fn is_start(&self) -> bool {
        matches!(self.kind, StepKind::Start)
    }
}

/// Wire shape of a step. `position` and other editor fields are dropped.
#[derive(Serialize, Deserialize)]
struct RawStep {
    id: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl From<RawStep> for Step {
    fn from(raw: RawStep) -> Self {
        let kind = StepKind::parse(&raw.kind, raw.data.as_ref());
        Self { id: raw.id, kind }
    }
}

impl From<Step> for RawStep {
    fn from(step: Step) -> Self {
        let data = match &step.kind {
            StepKind::Action(payload) => Some(payload.to_data()),
            StepKind::Delay(payload) => Some(payload.to_data()),
            _ => None,
        };
        Self { kind: step.kind.name().to_owned(), id: step.id, data }
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Directed edge from one step to the next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
}

impl Connection {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self { id: None, source: source.into(), target: target.into() }
    }
}

// ---------------------------------------------------------------------------
// FlowModel
// ---------------------------------------------------------------------------

/// A complete flow definition, read-only for the duration of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowModel {
    #[serde(rename = "nodes", alias = "steps", default)]
    pub steps: Vec<Step>,
    #[serde(rename = "edges", alias = "connections", default)]
    pub connections: Vec<Connection>,
}

impl FlowModel {
    pub fn new(steps: Vec<Step>, connections: Vec<Connection>) -> Self {
        Self { steps, connections }
    }

    /// Convenience constructor for testing: chains `steps` in order.
    pub fn linear(steps: Vec<Step>) -> Self {
        let connections = steps
            .windows(2)
            .map(|w| Connection::new(w[0].id.clone(), w[1].id.clone()))
            .collect();
        Self { steps, connections }
    }
}

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

/// Per-run input. Never shared between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunContext {
    /// Where action notifications are delivered.
    #[serde(alias = "recipientEmail")]
    pub recipient_address: String,
}

impl RunContext {
    pub fn new(recipient_address: impl Into<String>) -> Self {
        Self { recipient_address: recipient_address.into() }
    }
}
