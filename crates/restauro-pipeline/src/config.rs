//! Pipeline interchange format.
//!
//! A saved pipeline is a JSON array of `[name, params]` pairs:
//!
//! ```json
//! [["Filtro Mediano", 3], ["Filtro Homomorphic", {"low": 0.5, "high": 1.5, "cutoff": 30}]]
//! ```
//!
//! Loading only checks the shape. Names and parameters are checked by
//! [`registry::resolve`](crate::registry::resolve) when the pipeline
//! runs, so a file naming an unknown filter still loads.

use crate::filter::Filter;
use crate::registry::FilterSpec;

/// Errors reading or writing the interchange format.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The text is not a JSON array of `[name, params]` pairs.
    #[error("malformed filter configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize a pipeline.
///
/// # Errors
///
/// Returns [`ConfigError::Json`] if a parameter cannot be represented
/// in JSON.
pub fn to_json(specs: &[FilterSpec]) -> Result<String, ConfigError> {
    Ok(serde_json::to_string_pretty(specs)?)
}

/// Serialize a typed pipeline through its canonical specs.
///
/// # Errors
///
/// See [`to_json`].
pub fn filters_to_json(filters: &[Filter]) -> Result<String, ConfigError> {
    let specs: Vec<FilterSpec> = filters.iter().map(Filter::to_spec).collect();
    to_json(&specs)
}

/// Parse a pipeline.
///
/// # Errors
///
/// Returns [`ConfigError::Json`] if `text` is not an array of
/// `[name, params]` pairs.
pub fn from_json(text: &str) -> Result<Vec<FilterSpec>, ConfigError> {
    Ok(serde_json::from_str(text)?)
}
