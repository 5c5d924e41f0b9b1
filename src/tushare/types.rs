use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Single cell of an upstream row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Ordering used when sorting rows by a column. Text compares lexically,
    /// numbers numerically, and null sorts first.
    pub fn cmp_loose(&self, other: &Scalar) -> Ordering {
        match (self, other) {
            (Scalar::Text(a), Scalar::Text(b)) => a.cmp(b),
            (Scalar::Null, Scalar::Null) => Ordering::Equal,
            (Scalar::Null, _) => Ordering::Less,
            (_, Scalar::Null) => Ordering::Greater,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                _ => a.to_string().cmp(&b.to_string()),
            },
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<Value> for Scalar {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Scalar::Null,
            Value::Bool(b) => Scalar::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Scalar::Int(i),
                None => n.as_f64().map(Scalar::Float).unwrap_or(Scalar::Null),
            },
            Value::String(s) => Scalar::Text(s),
            // Nested values are not expected from tabular endpoints
            other => Scalar::Text(other.to_string()),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

/// One record of an upstream table, keeping the upstream column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, Scalar)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.cells.push((field.into(), value.into()));
        self
    }

    pub fn get(&self, field: &str) -> Option<&Scalar> {
        self.cells.iter().find(|(k, _)| k == field).map(|(_, v)| v)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Scalar::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl FromIterator<(String, Scalar)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Scalar)>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (k, v) in &self.cells {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Zip the column names against each value list. Width is the shorter of the
/// two; anything past it is dropped.
pub fn rows_from_columns(fields: &[String], items: Vec<Vec<Value>>) -> Vec<Row> {
    items
        .into_iter()
        .map(|values| {
            fields
                .iter()
                .cloned()
                .zip(values.into_iter().map(Scalar::from))
                .collect()
        })
        .collect()
}

/// Body POSTed to the upstream endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamRequest<'a> {
    pub api_name: &'a str,
    pub token: &'a str,
    pub params: &'a Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Option<UpstreamData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamData {
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub items: Vec<Vec<Value>>,
}

/// A single upstream query as issued by tools.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub api_name: String,
    pub params: Map<String, Value>,
    pub fields: Option<String>,
    pub token: Option<String>,
}

impl QueryRequest {
    pub fn new(api_name: impl Into<String>) -> Self {
        Self {
            api_name: api_name.into(),
            ..Default::default()
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = Some(fields.join(","));
        self
    }
}

/// Uniform result of one upstream call.
#[derive(Debug, Clone, Serialize)]
pub struct QueryEnvelope {
    pub error: Option<String>,
    pub api_name: String,
    pub fields: Option<Vec<String>>,
    pub rows: Vec<Row>,
    pub raw: Option<Value>,
}

impl QueryEnvelope {
    pub fn success(
        api_name: impl Into<String>,
        fields: Vec<String>,
        rows: Vec<Row>,
        raw: Option<Value>,
    ) -> Self {
        Self {
            error: None,
            api_name: api_name.into(),
            fields: Some(fields),
            rows,
            raw,
        }
    }

    pub fn failure(api_name: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            error: Some(error.to_string()),
            api_name: api_name.into(),
            fields: None,
            rows: Vec::new(),
            raw: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
