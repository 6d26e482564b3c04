//! Row decoder for the portability export.
//!
//! Each source line carries 19 positional fields separated by `;`. The
//! [`COLUMNS`] table is the single description of how each field is coerced.
//! [`decode_line`] applies it in Rust for the fallback loader and
//! [`transform_select_list`] renders the same rules as SQL for the bulk
//! loader, so both paths persist identical rows for identical input.
//!
//! Coercion never fails a record:
//!
//! - numeric fields become `NULL` unless they are 1 to 18 ASCII digits
//! - the phone number becomes `NULL` unless it is 1 to 15 ASCII digits
//! - the zero timestamp `0000-00-00 00:00:00` becomes `NULL`
//! - text is truncated to the column width, like an explicit `::VARCHAR(n)`
//!
//! The only rejection is a wrong field count.

use serde::Serialize;

/// Destination table for decoded rows.
pub const DESTINATION_TABLE: &str = "portability_history";

pub const FIELD_COUNT: usize = 19;

pub const FIELD_DELIMITER: char = ';';

/// Placeholder the export uses for "no date".
pub const ZERO_TIMESTAMP: &str = "0000-00-00 00:00:00";

/// Longest digit string accepted for a generic numeric field; always fits `BIGINT`.
pub const MAX_NUMERIC_DIGITS: usize = 18;

/// Longest digit string accepted for the phone number field.
pub const MAX_PHONE_DIGITS: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// `VARCHAR(n)`, kept as-is and truncated to `n` characters
    Text(usize),
    /// `BIGINT` flag or code
    Numeric,
    /// `BIGINT` full phone number
    Phone,
    /// `VARCHAR(n)` that may hold the zero timestamp
    Timestamp(usize),
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> ColumnSpec {
    ColumnSpec { name, kind }
}

/// Destination columns in source field order.
pub const COLUMNS: [ColumnSpec; FIELD_COUNT] = [
    col("origin_spid", ColumnKind::Text(10)),
    col("flag_1", ColumnKind::Numeric),
    col("created_label", ColumnKind::Text(50)),
    col("phone_number", ColumnKind::Phone),
    col("code_1", ColumnKind::Numeric),
    col("target_spid", ColumnKind::Text(10)),
    col("operator_code", ColumnKind::Text(10)),
    col("combined_code", ColumnKind::Text(10)),
    col("flag_2", ColumnKind::Numeric),
    col("flag_3", ColumnKind::Numeric),
    col("status", ColumnKind::Text(20)),
    col("flag_4", ColumnKind::Numeric),
    col("updated_label", ColumnKind::Text(50)),
    col("flag_5", ColumnKind::Numeric),
    col("cleared_at_1", ColumnKind::Timestamp(50)),
    col("flag_6", ColumnKind::Numeric),
    col("flag_7", ColumnKind::Numeric),
    col("flag_8", ColumnKind::Numeric),
    col("cleared_at_2", ColumnKind::Timestamp(50)),
];

const PHONE_INDEX: usize = 3;

/// One typed destination value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(Option<String>),
    Int(Option<i64>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Text(None) | FieldValue::Int(None))
    }
}

/// Why a line could not become a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeRejection {
    FieldCountMismatch { found: usize },
    InvalidEncoding,
}

impl std::fmt::Display for DecodeRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeRejection::FieldCountMismatch { found } => {
                write!(f, "expected {} fields, found {}", FIELD_COUNT, found)
            },
            DecodeRejection::InvalidEncoding => f.write_str("line is not valid UTF-8"),
        }
    }
}

/// A decoded portability row, values in [`COLUMNS`] order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortabilityRecord {
    values: Vec<FieldValue>,
}

impl PortabilityRecord {
    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        COLUMNS
            .iter()
            .position(|c| c.name == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn phone_number(&self) -> Option<i64> {
        match self.values.get(PHONE_INDEX) {
            Some(FieldValue::Int(value)) => *value,
            _ => None,
        }
    }

    /// Serialise back to a source line; nulls become empty fields.
    pub fn to_line(&self) -> String {
        let fields: Vec<String> = self
            .values
            .iter()
            .map(|v| match v {
                FieldValue::Text(Some(s)) => s.clone(),
                FieldValue::Int(Some(n)) => n.to_string(),
                FieldValue::Text(None) | FieldValue::Int(None) => String::new(),
            })
            .collect();
        fields.join(";")
    }
}

/// Decode one line. A trailing `\n` or `\r\n` is ignored.
pub fn decode_line(line: &str) -> Result<PortabilityRecord, DecodeRejection> {
    let line = line.trim_end_matches(&['\n', '\r'][..]);
    let fields: Vec<&str> = line.split(FIELD_DELIMITER).collect();

    if fields.len() != FIELD_COUNT {
        return Err(DecodeRejection::FieldCountMismatch {
            found: fields.len(),
        });
    }

    let values = COLUMNS
        .iter()
        .zip(fields)
        .map(|(spec, raw)| coerce(spec.kind, raw))
        .collect();

    Ok(PortabilityRecord { values })
}

/// Decode raw bytes as read from a chunk file.
pub fn decode_bytes(line: &[u8]) -> Result<PortabilityRecord, DecodeRejection> {
    let text = std::str::from_utf8(line).map_err(|_| DecodeRejection::InvalidEncoding)?;
    decode_line(text)
}

pub fn coerce(kind: ColumnKind, raw: &str) -> FieldValue {
    match kind {
        ColumnKind::Text(width) => FieldValue::Text(Some(truncate_chars(raw, width))),
        ColumnKind::Numeric => FieldValue::Int(parse_digits(raw, MAX_NUMERIC_DIGITS)),
        ColumnKind::Phone => FieldValue::Int(parse_digits(raw, MAX_PHONE_DIGITS)),
        ColumnKind::Timestamp(width) => {
            if raw == ZERO_TIMESTAMP {
                FieldValue::Text(None)
            } else {
                FieldValue::Text(Some(truncate_chars(raw, width)))
            }
        },
    }
}

fn parse_digits(raw: &str, max_digits: usize) -> Option<i64> {
    if raw.is_empty() || raw.len() > max_digits || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

fn truncate_chars(raw: &str, width: usize) -> String {
    match raw.char_indices().nth(width) {
        Some((byte_idx, _)) => raw[..byte_idx].to_string(),
        None => raw.to_string(),
    }
}

// ============================================================================
// SQL rendering of the same rules
// ============================================================================

/// Staging column name for a 0-based field position: `f01` .. `f19`.
pub fn staging_column(index: usize) -> String {
    format!("f{:02}", index + 1)
}

pub fn staging_columns() -> Vec<String> {
    (0..FIELD_COUNT).map(staging_column).collect()
}

/// Comma separated destination column list.
pub fn destination_columns() -> String {
    COLUMNS.iter().map(|c| c.name).collect::<Vec<_>>().join(", ")
}

fn transform_expr(kind: ColumnKind, source: &str) -> String {
    match kind {
        ColumnKind::Text(width) => format!("{source}::VARCHAR({width})"),
        ColumnKind::Numeric => format!(
            "CASE WHEN {source} ~ '^[0-9]{{1,{MAX_NUMERIC_DIGITS}}}$' THEN {source}::BIGINT END"
        ),
        ColumnKind::Phone => format!(
            "CASE WHEN {source} ~ '^[0-9]{{1,{MAX_PHONE_DIGITS}}}$' THEN {source}::BIGINT END"
        ),
        ColumnKind::Timestamp(width) => format!(
            "CASE WHEN {source} = '{ZERO_TIMESTAMP}' THEN NULL ELSE {source}::VARCHAR({width}) END"
        ),
    }
}

/// SELECT list turning all-text staging columns into destination values.
pub fn transform_select_list() -> String {
    COLUMNS
        .iter()
        .enumerate()
        .map(|(i, spec)| transform_expr(spec.kind, &staging_column(i)))
        .collect::<Vec<_>>()
        .join(",\n    ")
}

/// Parameterised single-row INSERT used by the fallback loader.
pub fn insert_statement() -> String {
    let params = (1..=FIELD_COUNT)
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        DESTINATION_TABLE,
        destination_columns(),
        params
    )
}
