use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::status::Status;

// ---------------------------------------------------------------------------
// ItemValue
// ---------------------------------------------------------------------------

/// Scalar value of a memory item.
///
/// Serialized untagged, so YAML `true`, `3`, `0.5` and `canary` map to the
/// matching variant.
///
/// Equality is by meaning: `Integer(30)` equals `Float(30.0)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ItemValue {
    /// Interpret free-form input (e.g. a command-line argument).
    ///
    /// `true`/`false` become booleans, integral input becomes an integer,
    /// other numeric input becomes a float, and everything else stays text.
    /// Zero-padded input such as `007` stays text.
    pub fn parse_loose(raw: &str) -> Self {
        match raw {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        if is_zero_padded(raw) {
            return Self::Text(raw.to_string());
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Self::Integer(i);
        }
        match raw.parse::<f64>() {
            Ok(f) if f.is_finite() => Self::Float(f),
            _ => Self::Text(raw.to_string()),
        }
    }

    /// Returns `true` for empty text or a non-finite float.
    pub fn is_degenerate(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::Float(f) => !f.is_finite(),
            Self::Bool(_) | Self::Integer(_) => false,
        }
    }
}

impl PartialEq for ItemValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Integer(i), Self::Float(f)) | (Self::Float(f), Self::Integer(i)) => {
                integral_float(*f) == Some(*i)
            }
            _ => false,
        }
    }
}

/// The integer a float holds exactly, if any.
fn integral_float(f: f64) -> Option<i64> {
    // 2^63 is exactly representable; every integral float below it fits.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    (f.is_finite() && f.fract() == 0.0 && f >= -LIMIT && f < LIMIT).then(|| f as i64)
}

fn is_zero_padded(raw: &str) -> bool {
    let digits = raw.strip_prefix(['-', '+']).unwrap_or(raw);
    let mut chars = digits.chars();
    chars.next() == Some('0') && chars.next().is_some_and(|c| c.is_ascii_digit())
}

impl fmt::Display for ItemValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ItemValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for ItemValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for ItemValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for ItemValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Deployment environment a fact applies to. `All` matches every env.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Env {
    All,
    Prod,
    Staging,
    Dev,
}

impl Env {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Prod => "prod",
            Self::Staging => "staging",
            Self::Dev => "dev",
        }
    }
}

impl fmt::Display for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Env {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "prod" => Ok(Self::Prod),
            "staging" => Ok(Self::Staging),
            "dev" => Ok(Self::Dev),
            other => Err(TypeError::UnknownEnv(other.to_string())),
        }
    }
}

/// Where a fact applies. Unset `service`/`region` means "any".
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub env: Env,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl Scope {
    /// Scope covering every environment, service, and region.
    pub fn all() -> Self {
        Self::env(Env::All)
    }

    /// Scope limited to one environment.
    pub fn env(env: Env) -> Self {
        Self {
            env,
            service: None,
            region: None,
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "env={}", self.env)?;
        if let Some(service) = &self.service {
            write!(f, " service={service}")?;
        }
        if let Some(region) = &self.region {
            write!(f, " region={region}")?;
        }
        Ok(())
    }
}

/// Curator confidence in a fact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl FromStr for Confidence {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(TypeError::UnknownConfidence(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryItem
// ---------------------------------------------------------------------------

/// A durable, identified fact record.
///
/// `topic` + `key` name the logical slot the fact fills. Field order here is
/// the serialized order on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub topic: String,
    pub key: String,
    pub value: ItemValue,
    pub status: Status,
    pub source: String,
    pub effective_from: NaiveDate,
    pub expires: NaiveDate,
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl MemoryItem {
    /// Create a pending item with an `all` scope and no optional fields.
    pub fn new(
        id: impl Into<String>,
        topic: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<ItemValue>,
        source: impl Into<String>,
        effective_from: NaiveDate,
        expires: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            key: key.into(),
            value: value.into(),
            status: Status::Pending,
            source: source.into(),
            effective_from,
            expires,
            scope: Scope::all(),
            updated: None,
            confidence: None,
            next: None,
        }
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Returns `true` if the validity window ended before `today`.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expires < today
    }

    /// Append a note to `next`, separated from any existing note by `; `.
    pub fn annotate_next(&mut self, note: &str) {
        self.next = Some(match self.next.take() {
            Some(existing) if !existing.trim().is_empty() => format!("{existing}; {note}"),
            _ => note.to_string(),
        });
    }

    /// Deterministic persistence order: topic, then key, then id.
    pub fn storage_order(&self, other: &Self) -> Ordering {
        self.topic
            .cmp(&other.topic)
            .then_with(|| self.key.cmp(&other.key))
            .then_with(|| self.id.cmp(&other.id))
    }
}
