use std::collections::BTreeMap;
use std::fmt::Write as _;

use memgov_types::{Env, MemoryItem, Status};

/// Renders the runtime read-projection consumed by agents.
///
/// The store hands the renderer the active items only, in persistence
/// order. Output must be a pure function of the input so that repeated
/// commits of the same state write identical bytes.
pub trait ProjectionRenderer: Send + Sync {
    fn render(&self, active: &[MemoryItem]) -> String;
}

/// Markdown projection: one section per topic, one bullet per item.
#[derive(Clone, Copy, Debug, Default)]
pub struct MarkdownProjection;

impl ProjectionRenderer for MarkdownProjection {
    fn render(&self, active: &[MemoryItem]) -> String {
        let mut out = String::from("# Memory\n\n");
        out.push_str("<!-- Generated by memgov from MEMORY.yml. Do not edit by hand. -->\n");

        let mut by_topic: BTreeMap<&str, Vec<&MemoryItem>> = BTreeMap::new();
        for item in active.iter().filter(|i| i.status == Status::Active) {
            by_topic.entry(item.topic.as_str()).or_default().push(item);
        }

        if by_topic.is_empty() {
            out.push_str("\n_No active memory items._\n");
            return out;
        }

        for (topic, items) in by_topic {
            let _ = write!(out, "\n## {topic}\n\n");
            for item in items {
                let _ = write!(out, "- **{}**: {}", item.key, item.value);
                let mut notes = Vec::new();
                if item.scope.env != Env::All || item.scope.service.is_some() || item.scope.region.is_some() {
                    notes.push(item.scope.to_string());
                }
                notes.push(format!("{} to {}", item.effective_from, item.expires));
                notes.push(item.id.clone());
                let _ = writeln!(out, " _({})_", notes.join("; "));
            }
        }
        out
    }
}
