use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{EnumMatchMode, FilterConfig, StringCaseStrategy};
use crate::model::errors::FilterValidationError;

/// Declared value type of a filterable property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Bool,
    Int,
    Float,
    String,
    Date,
    DateTime,
    /// Enum-typed property; the string names the enum for diagnostics.
    Enum(String),
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Bool => f.write_str("bool"),
            FieldType::Int => f.write_str("int"),
            FieldType::Float => f.write_str("float"),
            FieldType::String => f.write_str("string"),
            FieldType::Date => f.write_str("date"),
            FieldType::DateTime => f.write_str("datetime"),
            FieldType::Enum(name) => write!(f, "enum {name}"),
        }
    }
}

/// A filter literal. Values are advisory at definition time; coercion against
/// the property's declared type happens when the condition is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    List(Vec<FilterValue>),
    Range(Box<FilterValue>, Box<FilterValue>),
}

impl FilterValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FilterValue::Null)
    }

    pub fn range(low: impl Into<FilterValue>, high: impl Into<FilterValue>) -> Self {
        FilterValue::Range(Box::new(low.into()), Box::new(high.into()))
    }

    /// Short type tag used in coercion error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            FilterValue::Null => "null",
            FilterValue::Bool(_) => "bool",
            FilterValue::Int(_) => "int",
            FilterValue::Float(_) => "float",
            FilterValue::Str(_) => "string",
            FilterValue::Date(_) => "date",
            FilterValue::DateTime(_) => "datetime",
            FilterValue::List(_) => "list",
            FilterValue::Range(_, _) => "range",
        }
    }

    pub fn from_json(value: &Value) -> FilterValue {
        match value {
            Value::Null => FilterValue::Null,
            Value::Bool(b) => FilterValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FilterValue::Int(i)
                } else {
                    FilterValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => FilterValue::Str(s.clone()),
            Value::Array(items) => {
                FilterValue::List(items.iter().map(FilterValue::from_json).collect())
            }
            Value::Object(_) => FilterValue::Str(value.to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FilterValue::Null => Value::Null,
            FilterValue::Bool(b) => Value::Bool(*b),
            FilterValue::Int(i) => Value::from(*i),
            FilterValue::Float(f) => Value::from(*f),
            FilterValue::Str(s) => Value::from(s.clone()),
            FilterValue::Date(d) => Value::from(d.to_string()),
            FilterValue::DateTime(dt) => Value::from(dt.to_rfc3339()),
            FilterValue::List(items) => Value::Array(items.iter().map(|v| v.to_json()).collect()),
            FilterValue::Range(low, high) => Value::Array(vec![low.to_json(), high.to_json()]),
        }
    }

    /// Coerce a scalar value to the declared field type, applying the string
    /// case strategy and enum match mode from `config`.
    pub fn coerce(
        &self,
        property: &str,
        ty: &FieldType,
        config: &FilterConfig,
    ) -> Result<FilterValue, FilterValidationError> {
        let fail = || FilterValidationError::Coercion {
            property: property.to_string(),
            expected: ty.to_string(),
            actual: self.kind().to_string(),
        };

        match (ty, self) {
            (_, FilterValue::Null) => Ok(FilterValue::Null),
            (FieldType::Bool, FilterValue::Bool(b)) => Ok(FilterValue::Bool(*b)),
            (FieldType::Int, FilterValue::Int(i)) => Ok(FilterValue::Int(*i)),
            (FieldType::Float, FilterValue::Int(i)) => Ok(FilterValue::Float(*i as f64)),
            (FieldType::Float, FilterValue::Float(f)) => Ok(FilterValue::Float(*f)),
            (FieldType::String, FilterValue::Str(s)) => {
                Ok(FilterValue::Str(apply_case(s, config.string_case_strategy)))
            }
            (FieldType::Date, FilterValue::Date(d)) => Ok(FilterValue::Date(*d)),
            (FieldType::Date, FilterValue::Str(s)) => s
                .parse::<NaiveDate>()
                .map(FilterValue::Date)
                .map_err(|_| fail()),
            (FieldType::DateTime, FilterValue::DateTime(dt)) => Ok(FilterValue::DateTime(*dt)),
            (FieldType::DateTime, FilterValue::Str(s)) => DateTime::parse_from_rfc3339(s)
                .map(|dt| FilterValue::DateTime(dt.with_timezone(&Utc)))
                .map_err(|_| fail()),
            (FieldType::Enum(_), FilterValue::Str(s)) => {
                let normalized = match config.enum_match_mode {
                    EnumMatchMode::CaseSensitive => s.clone(),
                    EnumMatchMode::CaseInsensitive => s.to_uppercase(),
                };
                Ok(FilterValue::Str(normalized))
            }
            _ => Err(fail()),
        }
    }
}

fn apply_case(s: &str, strategy: StringCaseStrategy) -> String {
    match strategy {
        StringCaseStrategy::None => s.to_string(),
        StringCaseStrategy::Lower => s.to_lowercase(),
        StringCaseStrategy::Upper => s.to_uppercase(),
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        FilterValue::Bool(v)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Int(v)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        FilterValue::Int(v as i64)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        FilterValue::Float(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Str(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Str(v)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(items: Vec<T>) -> Self {
        FilterValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<NaiveDate> for FilterValue {
    fn from(v: NaiveDate) -> Self {
        FilterValue::Date(v)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(v: DateTime<Utc>) -> Self {
        FilterValue::DateTime(v)
    }
}
