use serde::{Deserialize, Serialize};

/// Provenance prefixes accepted when no configuration overrides them.
pub const DEFAULT_SOURCE_PREFIXES: &[&str] = &[
    "user:",
    "session:",
    "chat:",
    "doc:",
    "file:",
    "import:",
    "manual:",
    "capture:",
    "triage:",
    "http://",
    "https://",
];

/// Configuration for the audit engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// A `source` must start with one of these and carry something after it.
    pub allowed_source_prefixes: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            allowed_source_prefixes: DEFAULT_SOURCE_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl AuditConfig {
    /// Returns `true` if `source` is a non-empty, allow-listed provenance.
    pub fn is_allowed_source(&self, source: &str) -> bool {
        let source = source.trim();
        self.allowed_source_prefixes
            .iter()
            .any(|prefix| source.len() > prefix.len() && source.starts_with(prefix.as_str()))
    }
}
