//! Query filters for `*.query` methods.

use serde_json::{json, Value};

/// Accumulates `[field, op, value]` triples for a middleware query.
#[derive(Debug, Default, Clone)]
pub struct QueryFilter {
    filters: Vec<Value>,
    options: serde_json::Map<String, Value>,
}

impl QueryFilter {
    /// Create an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Match `field == value`.
    #[must_use]
    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(json!([field, "=", value.into()]));
        self
    }

    /// Ask the server to include extra details (e.g. `retrieve_config`).
    #[must_use]
    pub fn extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        let extra = self
            .options
            .entry("extra")
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if let Value::Object(map) = extra {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    /// Positional parameters for the query call.
    #[must_use]
    pub fn into_params(self) -> Vec<Value> {
        let mut params = vec![Value::Array(self.filters)];
        if !self.options.is_empty() {
            params.push(Value::Object(self.options));
        }
        params
    }
}
