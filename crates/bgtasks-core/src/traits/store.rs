//! Durable key-value store trait.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::Result;

/// Small-scalar store that survives process restarts.
///
/// Implementations only need raw `get`/`set`; each call must be atomic per key.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: &str, value: Value) -> Result<()>;

    fn get_string(&self, key: &str) -> Option<String> {
        self.get(key)?.as_str().map(str::to_string)
    }

    fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.set(key, Value::String(value.to_string()))
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key)?.as_i64()
    }

    fn set_int(&self, key: &str, value: i64) -> Result<()> {
        self.set(key, Value::from(value))
    }

    /// String-keyed map of doubles. Non-numeric entries are dropped.
    fn get_double_map(&self, key: &str) -> Option<HashMap<String, f64>> {
        let obj = self.get(key)?;
        let obj = obj.as_object()?;
        Some(
            obj.iter()
                .filter_map(|(k, v)| v.as_f64().map(|f| (k.clone(), f)))
                .collect(),
        )
    }

    fn set_double_map(&self, key: &str, value: &HashMap<String, f64>) -> Result<()> {
        let map = value
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(*v)))
            .collect::<serde_json::Map<_, _>>();
        self.set(key, Value::Object(map))
    }
}
