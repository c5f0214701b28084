//! Null-safe row access and entity mapping.
//!
//! Mappers read rows through [`SqlRow`], which surfaces every column as
//! `Option<T>`. A [`RowReader`] walks the declared column list in order so
//! that each entity consumes exactly the columns it selected.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tokio_postgres::types::{FromSql, Kind, Type};
use uuid::Uuid;

/// Errors raised while turning a row into an entity.
///
/// Any of these aborts the whole row; no partial entity is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// Row width differs from the entity's declared columns.
    ColumnCount { expected: usize, found: usize },
    /// A required column was NULL.
    UnexpectedNull { column: String },
    /// A column value could not be decoded into the field type.
    Decode { column: String, message: String },
    /// The mapper finished without reading every declared column.
    UnconsumedColumns { remaining: usize },
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ColumnCount { expected, found } => {
                write!(f, "Expected {} columns, row has {}", expected, found)
            }
            Self::UnexpectedNull { column } => {
                write!(f, "Required column `{}` is NULL", column)
            }
            Self::Decode { column, message } => {
                write!(f, "Cannot decode column `{}`: {}", column, message)
            }
            Self::UnconsumedColumns { remaining } => {
                write!(f, "{} declared columns were not read", remaining)
            }
        }
    }
}

impl std::error::Error for MappingError {}

/// Column-level decode failure, before the column name is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnError(pub String);

impl ColumnError {
    fn mismatch(expected: &str, found: impl fmt::Display) -> Self {
        Self(format!("expected {}, found {}", expected, found))
    }
}

/// A tabular row whose columns are addressed by position.
///
/// NULL is always reported as `Ok(None)`; implementations never hand out a
/// raw null.
pub trait SqlRow {
    /// Number of columns in the row.
    fn column_count(&self) -> usize;

    fn text(&self, idx: usize) -> Result<Option<String>, ColumnError>;

    fn timestamp(&self, idx: usize) -> Result<Option<DateTime<Utc>>, ColumnError>;

    fn float(&self, idx: usize) -> Result<Option<f64>, ColumnError>;

    fn boolean(&self, idx: usize) -> Result<Option<bool>, ColumnError>;

    /// Array column, either native or in its `{a,b,c}` text form.
    fn text_array(&self, idx: usize) -> Result<Option<Vec<String>>, ColumnError> {
        Ok(self.text(idx)?.map(|s| parse_postgres_array(&s)))
    }
}

/// Parse the PostgreSQL text form of an array (`{A,B,C}`) into its elements.
///
/// Elements are trimmed; `{}` and blank input yield an empty vector.
/// Double-quoted elements keep embedded commas and honour backslash escapes.
pub fn parse_postgres_array(raw: &str) -> Vec<String> {
    let inner = raw.trim().trim_start_matches('{').trim_end_matches('}');
    if inner.trim().is_empty() {
        return Vec::new();
    }

    let mut items = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = inner.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => quoted = !quoted,
            '\\' if quoted => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ',' if !quoted => {
                items.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    items.push(current.trim().to_string());

    items
}

/// The instant Go-style and `0001-01-01` sentinels use for "never set".
pub fn zero_timestamp() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Format a timestamp in the wire profile (`2024-01-15T10:30:00Z`).
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Sequential cursor over a row's declared columns.
pub struct RowReader<'r, R: ?Sized> {
    row: &'r R,
    columns: &'static [&'static str],
    pos: usize,
}

impl<'r, R: SqlRow + ?Sized> RowReader<'r, R> {
    /// Start reading `row`, which must have exactly `columns.len()` columns.
    pub fn new(row: &'r R, columns: &'static [&'static str]) -> Result<Self, MappingError> {
        let found = row.column_count();
        if found != columns.len() {
            return Err(MappingError::ColumnCount {
                expected: columns.len(),
                found,
            });
        }
        Ok(Self {
            row,
            columns,
            pos: 0,
        })
    }

    /// Advance to the next column and decode it with `read`.
    fn next<T>(
        &mut self,
        read: impl FnOnce(&R, usize) -> Result<Option<T>, ColumnError>,
    ) -> Result<(&'static str, Option<T>), MappingError> {
        let idx = self.pos;
        let column = *self
            .columns
            .get(idx)
            .ok_or(MappingError::ColumnCount {
                expected: self.columns.len(),
                found: idx + 1,
            })?;
        self.pos += 1;

        let value = read(self.row, idx).map_err(|ColumnError(message)| MappingError::Decode {
            column: column.to_string(),
            message,
        })?;
        Ok((column, value))
    }

    fn required<T>(
        &mut self,
        read: impl FnOnce(&R, usize) -> Result<Option<T>, ColumnError>,
    ) -> Result<T, MappingError> {
        match self.next(read)? {
            (_, Some(value)) => Ok(value),
            (column, None) => Err(MappingError::UnexpectedNull {
                column: column.to_string(),
            }),
        }
    }

    pub fn required_text(&mut self) -> Result<String, MappingError> {
        self.required(R::text)
    }

    pub fn optional_text(&mut self) -> Result<Option<String>, MappingError> {
        Ok(self.next(R::text)?.1)
    }

    pub fn required_bool(&mut self) -> Result<bool, MappingError> {
        self.required(R::boolean)
    }

    pub fn optional_float(&mut self) -> Result<Option<f64>, MappingError> {
        Ok(self.next(R::float)?.1)
    }

    /// Required timestamp, formatted for the wire.
    pub fn required_timestamp(&mut self) -> Result<String, MappingError> {
        self.required(R::timestamp).map(|ts| format_timestamp(&ts))
    }

    /// Optional timestamp; NULL and the zero instant both map to `None`.
    pub fn optional_timestamp(&mut self) -> Result<Option<String>, MappingError> {
        let zero = zero_timestamp();
        Ok(self
            .next(R::timestamp)?
            .1
            .filter(|ts| *ts != zero)
            .map(|ts| format_timestamp(&ts)))
    }

    /// Array column; NULL maps to an empty vector.
    pub fn text_array(&mut self) -> Result<Vec<String>, MappingError> {
        Ok(self.next(R::text_array)?.1.unwrap_or_default())
    }

    /// Required text column parsed with `FromStr` (enum labels).
    pub fn required_parsed<T>(&mut self) -> Result<T, MappingError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let idx = self.pos;
        let raw = self.required_text()?;
        raw.parse().map_err(|e: T::Err| MappingError::Decode {
            column: self.columns[idx].to_string(),
            message: e.to_string(),
        })
    }

    /// Finish reading; every declared column must have been consumed.
    pub fn finish(self) -> Result<(), MappingError> {
        let remaining = self.columns.len() - self.pos;
        if remaining > 0 {
            return Err(MappingError::UnconsumedColumns { remaining });
        }
        Ok(())
    }
}

/// A domain entity backed by one table.
pub trait Entity: Sized {
    /// Table the entity lives in.
    const TABLE: &'static str;

    /// Columns the mapper consumes, in order.
    const COLUMNS: &'static [&'static str];

    /// Map one row. All-or-nothing.
    fn from_row<R: SqlRow + ?Sized>(row: &R) -> Result<Self, MappingError>;

    /// Comma-separated column list for `SELECT` and `RETURNING`.
    fn select_list() -> String {
        Self::COLUMNS.join(", ")
    }
}

/// Map a row that may not exist. A missing row is `Ok(None)`, not an error.
pub fn map_optional<E: Entity, R: SqlRow + ?Sized>(
    row: Option<&R>,
) -> Result<Option<E>, MappingError> {
    row.map(E::from_row).transpose()
}

/// Text-like column decoder that also accepts PostgreSQL enum labels.
struct Label(String);

impl<'a> FromSql<'a> for Label {
    fn from_sql(
        ty: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        if matches!(ty.kind(), Kind::Enum(_)) {
            return Ok(Label(std::str::from_utf8(raw)?.to_string()));
        }
        String::from_sql(ty, raw).map(Label)
    }

    fn accepts(ty: &Type) -> bool {
        matches!(ty.kind(), Kind::Enum(_)) || <String as FromSql>::accepts(ty)
    }
}

impl SqlRow for tokio_postgres::Row {
    fn column_count(&self) -> usize {
        self.len()
    }

    fn text(&self, idx: usize) -> Result<Option<String>, ColumnError> {
        let ty = self.columns()[idx].type_();
        if *ty == Type::UUID {
            return self
                .try_get::<_, Option<Uuid>>(idx)
                .map(|v| v.map(|u| u.to_string()))
                .map_err(|e| ColumnError(e.to_string()));
        }
        self.try_get::<_, Option<Label>>(idx)
            .map(|v| v.map(|Label(s)| s))
            .map_err(|e| ColumnError(e.to_string()))
    }

    fn timestamp(&self, idx: usize) -> Result<Option<DateTime<Utc>>, ColumnError> {
        let ty = self.columns()[idx].type_();
        let decoded = if *ty == Type::TIMESTAMPTZ {
            self.try_get::<_, Option<DateTime<Utc>>>(idx)
        } else if *ty == Type::TIMESTAMP {
            self.try_get::<_, Option<NaiveDateTime>>(idx)
                .map(|v| v.map(|dt| Utc.from_utc_datetime(&dt)))
        } else if *ty == Type::DATE {
            self.try_get::<_, Option<NaiveDate>>(idx).map(|v| {
                v.and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|dt| Utc.from_utc_datetime(&dt))
            })
        } else {
            return Err(ColumnError::mismatch("timestamp", ty));
        };
        decoded.map_err(|e| ColumnError(e.to_string()))
    }

    fn float(&self, idx: usize) -> Result<Option<f64>, ColumnError> {
        let ty = self.columns()[idx].type_();
        let decoded = if *ty == Type::FLOAT8 {
            self.try_get::<_, Option<f64>>(idx)
        } else if *ty == Type::FLOAT4 {
            self.try_get::<_, Option<f32>>(idx)
                .map(|v| v.map(f64::from))
        } else if *ty == Type::NUMERIC {
            return match self.try_get::<_, Option<Decimal>>(idx) {
                Ok(Some(d)) => d
                    .to_f64()
                    .map(Some)
                    .ok_or_else(|| ColumnError(format!("numeric {} out of f64 range", d))),
                Ok(None) => Ok(None),
                Err(e) => Err(ColumnError(e.to_string())),
            };
        } else {
            return Err(ColumnError::mismatch("float", ty));
        };
        decoded.map_err(|e| ColumnError(e.to_string()))
    }

    fn boolean(&self, idx: usize) -> Result<Option<bool>, ColumnError> {
        self.try_get::<_, Option<bool>>(idx)
            .map_err(|e| ColumnError(e.to_string()))
    }

    fn text_array(&self, idx: usize) -> Result<Option<Vec<String>>, ColumnError> {
        if let Kind::Array(_) = self.columns()[idx].type_().kind() {
            return self
                .try_get::<_, Option<Vec<String>>>(idx)
                .map_err(|e| ColumnError(e.to_string()));
        }
        Ok(self.text(idx)?.map(|s| parse_postgres_array(&s)))
    }
}

/// A single column value held in memory.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Text(String),
    Timestamp(DateTime<Utc>),
    Float(f64),
    Bool(bool),
}

impl SqlValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Text(_) => "text",
            Self::Timestamp(_) => "timestamp",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
        }
    }
}

/// In-memory row, used by fakes and tests in place of a live cursor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueRow(pub Vec<SqlValue>);

impl ValueRow {
    fn get(&self, idx: usize) -> Result<&SqlValue, ColumnError> {
        self.0
            .get(idx)
            .ok_or_else(|| ColumnError(format!("no column at index {}", idx)))
    }
}

impl SqlRow for ValueRow {
    fn column_count(&self) -> usize {
        self.0.len()
    }

    fn text(&self, idx: usize) -> Result<Option<String>, ColumnError> {
        match self.get(idx)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(s) => Ok(Some(s.clone())),
            other => Err(ColumnError::mismatch("text", other.kind())),
        }
    }

    fn timestamp(&self, idx: usize) -> Result<Option<DateTime<Utc>>, ColumnError> {
        match self.get(idx)? {
            SqlValue::Null => Ok(None),
            SqlValue::Timestamp(ts) => Ok(Some(*ts)),
            other => Err(ColumnError::mismatch("timestamp", other.kind())),
        }
    }

    fn float(&self, idx: usize) -> Result<Option<f64>, ColumnError> {
        match self.get(idx)? {
            SqlValue::Null => Ok(None),
            SqlValue::Float(v) => Ok(Some(*v)),
            other => Err(ColumnError::mismatch("float", other.kind())),
        }
    }

    fn boolean(&self, idx: usize) -> Result<Option<bool>, ColumnError> {
        match self.get(idx)? {
            SqlValue::Null => Ok(None),
            SqlValue::Bool(v) => Ok(Some(*v)),
            other => Err(ColumnError::mismatch("bool", other.kind())),
        }
    }
}
