//! Turns the model's free-form reply into a list of [`Finding`]s.
//!
//! The reply is supposed to be a JSON array but often is not: it may be
//! wrapped in a markdown fence, be a single object, span many lines or carry
//! trailing commas. [`Normalizer::repair`] runs an ordered list of pure
//! string transforms over it and [`Normalizer::normalize`] parses the result.
//! When parsing still fails the repaired text is kept for diagnosis.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

pub const OPENING_FENCE: &str = "```json";
pub const CLOSING_FENCE: &str = "```";

static TRAILING_COMMA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*}").unwrap());

// ── Finding ──────────────────────────────────────────────────────────────────

/// One privacy-risk assessment. Fields the model left out stay `None` and are
/// omitted again on output; unknown keys are carried through untouched.
/// Field values are kept as the model wrote them, so an `answer` of `25` or a
/// list of strings survives as-is.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Finding {
    #[serde(
        default,
        deserialize_with = "lenient_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_texts: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_images: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Section ids such as `1.1` sometimes come back as JSON numbers. Any other
/// non-null value is kept as its JSON text.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

impl Finding {
    fn has_required_keys(&self) -> bool {
        let id_filled = self.id.as_deref().is_some_and(|s| !s.trim().is_empty());
        id_filled && self.question.as_ref().is_some_and(is_filled)
    }
}

// ── Result type ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidJson,
}

impl FailureKind {
    pub fn message(self) -> &'static str {
        match self {
            FailureKind::InvalidJson => "Invalid JSON format",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NormalizationResult {
    Findings(Vec<Finding>),
    Failed { kind: FailureKind, raw_text: String },
}

impl NormalizationResult {
    pub fn is_failed(&self) -> bool {
        matches!(self, NormalizationResult::Failed { .. })
    }
}

#[derive(Serialize)]
struct Diagnostic<'a> {
    error: &'static str,
    raw_response: &'a str,
}

impl Serialize for NormalizationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NormalizationResult::Findings(findings) => findings.serialize(serializer),
            NormalizationResult::Failed { kind, raw_text } => Diagnostic {
                error: kind.message(),
                raw_response: raw_text,
            }
            .serialize(serializer),
        }
    }
}

// ── Repair steps ─────────────────────────────────────────────────────────────

pub type RepairStep = fn(&str) -> String;

pub fn trim(text: &str) -> String {
    text.trim().to_string()
}

/// Drops the opening marker and the last three characters, assuming a
/// closing fence is always there. A truncated reply loses its tail.
pub fn unfence_fixed(text: &str) -> String {
    match text.strip_prefix(OPENING_FENCE) {
        Some(body) => drop_last_chars(body, CLOSING_FENCE.len()).to_string(),
        None => text.to_string(),
    }
}

/// Like [`unfence_fixed`], but only removes a tail that really is a fence.
pub fn unfence_guarded(text: &str) -> String {
    match text.strip_prefix(OPENING_FENCE) {
        Some(body) => {
            let body = body.trim_end();
            body.strip_suffix(CLOSING_FENCE).unwrap_or(body).to_string()
        }
        None => text.to_string(),
    }
}

fn drop_last_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return s;
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &s[..idx],
        None => "",
    }
}

/// Removes every line break, not only the outer ones.
pub fn strip_newlines(text: &str) -> String {
    text.replace(&['\n', '\r'][..], "").trim().to_string()
}

/// Anything not already an array gets wrapped in brackets: a lone object
/// becomes a one-element array, bare comma-separated objects become a list.
pub fn coerce_array(text: &str) -> String {
    if text.starts_with('[') {
        text.to_string()
    } else {
        format!("[{}]", text)
    }
}

pub fn strip_trailing_commas(text: &str) -> String {
    TRAILING_COMMA_RE.replace_all(text, "}").into_owned()
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FencePolicy {
    #[default]
    Fixed,
    Guarded,
}

impl FencePolicy {
    fn step(self) -> RepairStep {
        match self {
            FencePolicy::Fixed => unfence_fixed,
            FencePolicy::Guarded => unfence_guarded,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    pub fence: FencePolicy,
    /// Reject findings without a non-empty `id` and `question`.
    pub strict: bool,
}

impl Normalizer {
    pub fn new(fence: FencePolicy, strict: bool) -> Self {
        Self { fence, strict }
    }

    pub fn steps(&self) -> [(&'static str, RepairStep); 5] {
        [
            ("trim", trim),
            ("unfence", self.fence.step()),
            ("strip_newlines", strip_newlines),
            ("coerce_array", coerce_array),
            ("strip_trailing_commas", strip_trailing_commas),
        ]
    }

    pub fn repair(&self, raw: &str) -> String {
        self.steps()
            .iter()
            .fold(raw.to_string(), |text, (name, step)| {
                let next = step(&text);
                if next != text {
                    tracing::debug!(step = *name, len = next.len(), "repair step rewrote reply");
                }
                next
            })
    }

    pub fn normalize(&self, raw: &str) -> NormalizationResult {
        let repaired = self.repair(raw);
        match self.parse(&repaired) {
            Ok(findings) => NormalizationResult::Findings(findings),
            Err(reason) => {
                tracing::warn!(%reason, "model reply is not a finding list after repair");
                NormalizationResult::Failed {
                    kind: FailureKind::InvalidJson,
                    raw_text: repaired,
                }
            }
        }
    }

    fn parse(&self, repaired: &str) -> Result<Vec<Finding>, String> {
        let findings: Vec<Finding> =
            serde_json::from_str(repaired).map_err(|e| e.to_string())?;
        if self.strict {
            if let Some(pos) = findings.iter().position(|f| !f.has_required_keys()) {
                return Err(format!("finding #{} lacks id or question", pos));
            }
        }
        Ok(findings)
    }
}
