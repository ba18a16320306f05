//! Memory item identifier format.
//!
//! Valid identifiers look like `MEM-2024-01-001`:
//! - The literal prefix `MEM-`
//! - A four-digit year
//! - A two-digit month between `01` and `12`
//! - A sequence number of at least three digits

use crate::error::TypeError;

const PREFIX: &str = "MEM-";

/// Validate a memory item identifier, returning `Ok(())` if well-formed.
///
/// # Examples
///
/// ```
/// use memgov_types::validate_item_id;
///
/// assert!(validate_item_id("MEM-2024-01-001").is_ok());
/// assert!(validate_item_id("MEM-2024-13-001").is_err());
/// assert!(validate_item_id("mem-2024-01-001").is_err());
/// ```
pub fn validate_item_id(id: &str) -> Result<(), TypeError> {
    let invalid = |reason: &str| TypeError::InvalidItemId {
        id: id.to_string(),
        reason: reason.to_string(),
    };

    let rest = id
        .strip_prefix(PREFIX)
        .ok_or_else(|| invalid("must start with 'MEM-'"))?;

    let mut parts = rest.split('-');
    let (year, month, seq) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(y), Some(m), Some(s), None) => (y, m, s),
        _ => return Err(invalid("expected MEM-YYYY-MM-NNN")),
    };

    if year.len() != 4 || !all_digits(year) {
        return Err(invalid("year must be four digits"));
    }
    if month.len() != 2 || !all_digits(month) {
        return Err(invalid("month must be two digits"));
    }
    if !matches!(month.parse::<u8>(), Ok(1..=12)) {
        return Err(invalid("month must be between 01 and 12"));
    }
    if seq.len() < 3 || !all_digits(seq) {
        return Err(invalid("sequence must be at least three digits"));
    }

    Ok(())
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
