//! Named parameter values exchanged between search strategies and models.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::ParamError;

/// A concrete parameter value produced by a search strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Json(serde_json::Value),
}

/// A full parameter assignment, keyed by parameter name.
pub type Params = HashMap<String, ParameterValue>;

impl ParameterValue {
    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Json(v) => v.as_f64(),
        }
    }

    /// Integer view; floats are accepted only when they carry no fraction.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            Self::Float(_) => None,
            Self::Json(v) => v.as_i64(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Json(v) => v.as_str(),
            _ => None,
        }
    }

    /// Integer view that reports a typed binding error for `name`.
    pub fn expect_i64(&self, name: &str) -> Result<i64, ParamError> {
        self.as_i64().ok_or_else(|| ParamError::InvalidType {
            name: name.to_string(),
            expected: "integer".to_string(),
        })
    }

    /// String view that reports a typed binding error for `name`.
    pub fn expect_str(&self, name: &str) -> Result<&str, ParamError> {
        self.as_str().ok_or_else(|| ParamError::InvalidType {
            name: name.to_string(),
            expected: "string".to_string(),
        })
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        Self::Json(serde_json::Value::String(v.to_string()))
    }
}

/// Render a parameter assignment with keys in sorted order.
pub fn format_params(params: &Params) -> String {
    let mut keys: Vec<&String> = params.keys().collect();
    keys.sort();
    let body: Vec<String> = keys
        .into_iter()
        .map(|k| format!("{k}={}", params[k]))
        .collect();
    format!("{{{}}}", body.join(", "))
}
