//! Field-level validation of raw item records.
//!
//! Every field of a record is checked and every problem collected, so a
//! single pass tells the curator everything wrong with a record. Provenance
//! is deliberately not validated here: a record with a bad `source` still
//! becomes an item and is flagged by the `no-source` check instead.

use chrono::NaiveDate;
use serde_yaml::{Mapping, Value};

use memgov_types::{
    validate_item_id, Confidence, Env, ItemValue, MemoryItem, Scope, Status,
};

use crate::error::{AuditError, Result};

const KNOWN_FIELDS: &[&str] = &[
    "id",
    "topic",
    "key",
    "value",
    "status",
    "source",
    "effective_from",
    "expires",
    "scope",
    "updated",
    "confidence",
    "next",
];

const SCOPE_FIELDS: &[&str] = &["env", "service", "region"];

/// Everything wrong with one record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordErrors {
    pub index: usize,
    /// The record's id if it had a string one, valid or not.
    pub id: Option<String>,
    pub errors: Vec<String>,
}

/// Split a YAML document into raw records.
///
/// An empty document or explicit `null` is an empty list.
pub fn parse_document(yaml: &str) -> Result<Vec<Value>> {
    if yaml.trim().is_empty() {
        return Ok(Vec::new());
    }
    let doc: Value = serde_yaml::from_str(yaml).map_err(|e| AuditError::Yaml(e.to_string()))?;
    match doc {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(records) => Ok(records),
        other => Err(AuditError::NotAList {
            found: kind_of(&other),
        }),
    }
}

/// Validate one raw record into a [`MemoryItem`].
pub fn parse_record(index: usize, record: &Value) -> std::result::Result<MemoryItem, RecordErrors> {
    let Value::Mapping(map) = record else {
        return Err(RecordErrors {
            index,
            id: None,
            errors: vec![format!("record must be a mapping, found {}", kind_of(record))],
        });
    };

    let mut errors = Vec::new();
    let raw_id = map.get("id").and_then(Value::as_str).map(str::to_string);

    for key in map.keys() {
        match key.as_str() {
            Some(name) if KNOWN_FIELDS.contains(&name) => {}
            Some(name) => errors.push(format!("unknown field `{name}`")),
            None => errors.push(format!("non-string field name ({})", kind_of(key))),
        }
    }

    let id = required_str(map, "id", &mut errors).and_then(|id| match validate_item_id(id) {
        Ok(()) => Some(id.to_string()),
        Err(e) => {
            errors.push(e.to_string());
            None
        }
    });
    let topic = required_non_empty(map, "topic", &mut errors);
    let key = required_non_empty(map, "key", &mut errors);
    let value = parse_value(map, &mut errors);
    let status = required_str(map, "status", &mut errors).and_then(|s| {
        s.parse::<Status>()
            .map_err(|e| errors.push(e.to_string()))
            .ok()
    });
    let source = map
        .get("source")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    let effective_from = required_date(map, "effective_from", &mut errors);
    let expires = required_date(map, "expires", &mut errors);
    if let (Some(from), Some(to)) = (effective_from, expires) {
        if from > to {
            errors.push(format!("effective_from {from} is after expires {to}"));
        }
    }
    let scope = parse_scope(map, &mut errors);
    let updated = optional_str(map, "updated", &mut errors).and_then(|s| date_field("updated", s, &mut errors));
    let confidence = optional_str(map, "confidence", &mut errors).and_then(|s| {
        s.parse::<Confidence>()
            .map_err(|e| errors.push(e.to_string()))
            .ok()
    });
    let next = optional_str(map, "next", &mut errors).map(str::to_string);

    match (id, topic, key, value, status, effective_from, expires, scope) {
        (Some(id), Some(topic), Some(key), Some(value), Some(status), Some(effective_from), Some(expires), Some(scope))
            if errors.is_empty() =>
        {
            Ok(MemoryItem {
                id,
                topic,
                key,
                value,
                status,
                source,
                effective_from,
                expires,
                scope,
                updated,
                confidence,
                next,
            })
        }
        _ => Err(RecordErrors {
            index,
            id: raw_id,
            errors,
        }),
    }
}

fn parse_value(map: &Mapping, errors: &mut Vec<String>) -> Option<ItemValue> {
    match map.get("value") {
        None => {
            errors.push("missing field `value`".into());
            None
        }
        Some(Value::Bool(b)) => Some(ItemValue::Bool(*b)),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Some(ItemValue::Integer(i)),
            None => match n.as_f64() {
                Some(f) if f.is_finite() => Some(ItemValue::Float(f)),
                _ => {
                    errors.push(format!("`value` {n} is not a finite number"));
                    None
                }
            },
        },
        Some(Value::String(s)) => Some(ItemValue::Text(s.clone())),
        Some(other) => {
            errors.push(format!("`value` must be a scalar, found {}", kind_of(other)));
            None
        }
    }
}

fn parse_scope(map: &Mapping, errors: &mut Vec<String>) -> Option<Scope> {
    let scope = match map.get("scope") {
        None => {
            errors.push("missing field `scope`".into());
            return None;
        }
        Some(Value::Mapping(scope)) => scope,
        Some(other) => {
            errors.push(format!("`scope` must be a mapping, found {}", kind_of(other)));
            return None;
        }
    };

    for key in scope.keys() {
        match key.as_str() {
            Some(name) if SCOPE_FIELDS.contains(&name) => {}
            Some(name) => errors.push(format!("unknown scope field `{name}`")),
            None => errors.push(format!("non-string scope field name ({})", kind_of(key))),
        }
    }

    let env = match scope.get("env") {
        Some(Value::String(s)) => match s.parse::<Env>() {
            Ok(env) => Some(env),
            Err(e) => {
                errors.push(e.to_string());
                None
            }
        },
        Some(other) => {
            errors.push(format!("`scope.env` must be a string, found {}", kind_of(other)));
            None
        }
        None => {
            errors.push("missing field `scope.env`".into());
            None
        }
    };
    let service = optional_str(scope, "service", errors).map(str::to_string);
    let region = optional_str(scope, "region", errors).map(str::to_string);

    env.map(|env| Scope {
        env,
        service,
        region,
    })
}

fn required_str<'a>(map: &'a Mapping, field: &str, errors: &mut Vec<String>) -> Option<&'a str> {
    match map.get(field) {
        Some(Value::String(s)) => Some(s.as_str()),
        Some(other) => {
            errors.push(format!("`{field}` must be a string, found {}", kind_of(other)));
            None
        }
        None => {
            errors.push(format!("missing field `{field}`"));
            None
        }
    }
}

fn required_non_empty(map: &Mapping, field: &str, errors: &mut Vec<String>) -> Option<String> {
    let s = required_str(map, field, errors)?;
    if s.trim().is_empty() {
        errors.push(format!("`{field}` must not be empty"));
        return None;
    }
    Some(s.to_string())
}

fn optional_str<'a>(map: &'a Mapping, field: &str, errors: &mut Vec<String>) -> Option<&'a str> {
    match map.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.as_str()),
        Some(other) => {
            errors.push(format!("`{field}` must be a string, found {}", kind_of(other)));
            None
        }
    }
}

fn required_date(map: &Mapping, field: &str, errors: &mut Vec<String>) -> Option<NaiveDate> {
    let raw = required_str(map, field, errors)?;
    date_field(field, raw, errors)
}

fn date_field(field: &str, raw: &str, errors: &mut Vec<String>) -> Option<NaiveDate> {
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            errors.push(format!("`{field}` {raw:?} is not a YYYY-MM-DD date"));
            None
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r#"
id: MEM-2024-01-001
topic: deploy
key: mode
value: canary
status: pending
source: session:2024-01-01
effective_from: 2024-01-01
expires: 2024-06-01
scope:
  env: prod
  service: api
confidence: high
"#;

    fn record(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn parses_complete_record() {
        let item = parse_record(0, &record(GOOD)).unwrap();
        assert_eq!(item.id, "MEM-2024-01-001");
        assert_eq!(item.value, ItemValue::from("canary"));
        assert_eq!(item.status, Status::Pending);
        assert_eq!(item.scope, Scope::env(Env::Prod).with_service("api"));
        assert_eq!(item.confidence, Some(Confidence::High));
        assert_eq!(item.updated, None);
    }

    #[test]
    fn numeric_and_boolean_values() {
        let item = parse_record(0, &record(&GOOD.replace("value: canary", "value: 3"))).unwrap();
        assert_eq!(item.value, ItemValue::Integer(3));
        let item = parse_record(0, &record(&GOOD.replace("value: canary", "value: 0.5"))).unwrap();
        assert_eq!(item.value, ItemValue::Float(0.5));
        let item = parse_record(0, &record(&GOOD.replace("value: canary", "value: true"))).unwrap();
        assert_eq!(item.value, ItemValue::Bool(true));
    }

    #[test]
    fn missing_source_still_parses() {
        let yaml = GOOD.replace("source: session:2024-01-01\n", "");
        let item = parse_record(0, &record(&yaml)).unwrap();
        assert_eq!(item.source, "");
    }

    #[test]
    fn collects_every_field_error() {
        let yaml = r#"
id: MEM-2024-13-001
topic: ""
value: [a, b]
status: archived
effective_from: 2024-06-01
expires: soon
scope:
  env: qa
  cluster: x
extra: 1
"#;
        let err = parse_record(4, &record(yaml)).unwrap_err();
        assert_eq!(err.index, 4);
        assert_eq!(err.id.as_deref(), Some("MEM-2024-13-001"));
        let joined = err.errors.join("\n");
        for needle in [
            "unknown field `extra`",
            "month must be between 01 and 12",
            "`topic` must not be empty",
            "missing field `key`",
            "`value` must be a scalar",
            "unknown status",
            "`expires` \"soon\"",
            "unknown env",
            "unknown scope field `cluster`",
        ] {
            assert!(joined.contains(needle), "missing {needle:?} in:\n{joined}");
        }
    }

    #[test]
    fn inverted_window_is_a_schema_error() {
        let yaml = GOOD.replace("expires: 2024-06-01", "expires: 2023-12-31");
        let err = parse_record(0, &record(&yaml)).unwrap_err();
        assert!(err.errors[0].contains("is after expires"));
    }

    #[test]
    fn non_mapping_record() {
        let err = parse_record(2, &Value::String("oops".into())).unwrap_err();
        assert_eq!(err.id, None);
        assert!(err.errors[0].contains("found string"));
    }

    #[test]
    fn document_shapes() {
        assert!(parse_document("").unwrap().is_empty());
        assert!(parse_document("~\n").unwrap().is_empty());
        assert!(parse_document("[]\n").unwrap().is_empty());
        assert_eq!(parse_document("- a\n- b\n").unwrap().len(), 2);
        assert!(matches!(
            parse_document("id: x\n").unwrap_err(),
            AuditError::NotAList { found: "mapping" }
        ));
        assert!(matches!(
            parse_document("- [unclosed\n").unwrap_err(),
            AuditError::Yaml(_)
        ));
    }

    #[test]
    fn serialized_items_parse_back() {
        let item = parse_record(0, &record(GOOD)).unwrap();
        let yaml = serde_yaml::to_string(&vec![item.clone()]).unwrap();
        let records = parse_document(&yaml).unwrap();
        assert_eq!(parse_record(0, &records[0]).unwrap(), item);
    }
}
