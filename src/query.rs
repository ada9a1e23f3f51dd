// Query Builder - parameterized SQL fragments from field/value intents
//
// Values never reach the SQL text: every value becomes a bound parameter and
// the only text emitted is a column key or a caller-provided fragment, both of
// which are checked before use.
//
// Conditions are ordered slices of `(key, value)` pairs, so the rendered
// fragment order always matches the input order.

use rusqlite::types::Value;

use crate::error::{Error, Result};

/// Clause returned when no condition applies, so callers can always append
/// `WHERE <clause>`.
pub const ALWAYS_TRUE: &str = "1=1";

/// Build a `WHERE` body from `(key, value)` conditions.
///
/// - `None` and `Some(Value::Null)` are skipped (no filter), never `IS NULL`.
/// - A key present in `param_map` uses its fragment (e.g. `"t.transaction_date >= ?"`),
///   otherwise `"key = ?"`.
/// - Returns `("1=1", [])` when nothing applies.
pub fn build_where_clause(
    conditions: &[(&str, Option<Value>)],
    param_map: &[(&str, &str)],
) -> Result<(String, Vec<Value>)> {
    let mut fragments = Vec::new();
    let mut params = Vec::new();

    for (key, value) in conditions {
        let value = match value {
            Some(Value::Null) | None => continue,
            Some(value) => value,
        };

        let fragment = match lookup(param_map, key) {
            Some(custom) => {
                check_fragment(key, custom)?;
                custom.to_string()
            }
            None => {
                check_identifier(key)?;
                format!("{} = ?", key)
            }
        };

        fragments.push(fragment);
        params.push(value.clone());
    }

    if fragments.is_empty() {
        return Ok((ALWAYS_TRUE.to_string(), Vec::new()));
    }

    Ok((fragments.join(" AND "), params))
}

/// Build a `SET` body from `(key, value)` assignments.
///
/// - `None` means "omit": the column is left untouched.
/// - `Some(Value::Null)` means "clear": the column is set to NULL explicitly.
/// - Keys listed in `exclude` (e.g. the primary key) never appear.
/// - Returns `("", [])` when nothing remains; callers must treat that as a no-op.
pub fn build_update_clause(
    data: &[(&str, Option<Value>)],
    exclude: &[&str],
) -> Result<(String, Vec<Value>)> {
    let mut fragments = Vec::new();
    let mut params = Vec::new();

    for (key, value) in data {
        let Some(value) = value else { continue };
        if exclude.contains(key) {
            continue;
        }

        check_identifier(key)?;
        fragments.push(format!("{} = ?", key));
        params.push(value.clone());
    }

    Ok((fragments.join(", "), params))
}

/// Append an extra literal condition (one that takes no parameter, such as
/// `e.superseded_by IS NULL`) to a clause produced by [`build_where_clause`].
pub fn and_literal(clause: &str, literal: &str) -> String {
    if clause == ALWAYS_TRUE {
        literal.to_string()
    } else {
        format!("{} AND {}", clause, literal)
    }
}

fn lookup<'a>(param_map: &[(&str, &'a str)], key: &str) -> Option<&'a str> {
    param_map
        .iter()
        .find(|(candidate, _)| *candidate == key)
        .map(|(_, fragment)| *fragment)
}

/// Column keys are interpolated, so they must be plain (optionally qualified)
/// identifiers.
fn check_identifier(key: &str) -> Result<()> {
    if is_identifier(key) {
        Ok(())
    } else {
        Err(Error::InvalidFragment {
            key: key.to_string(),
            fragment: key.to_string(),
        })
    }
}

pub(crate) fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Custom fragments bind exactly one value and must end with its placeholder.
fn check_fragment(key: &str, fragment: &str) -> Result<()> {
    let placeholders = fragment.matches('?').count();
    if placeholders == 1 && fragment.trim_end().ends_with('?') {
        Ok(())
    } else {
        Err(Error::InvalidFragment {
            key: key.to_string(),
            fragment: fragment.to_string(),
        })
    }
}
