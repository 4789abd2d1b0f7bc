//! Named statistics reported by training and evaluation.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// A map of named floating-point statistics with stable iteration order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Metrics {
    #[serde(flatten)]
    data: BTreeMap<String, f64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for `key`, or `NaN` when it has not been set.
    pub fn get(&self, key: &str) -> f64 {
        self.data.get(key).copied().unwrap_or(f64::NAN)
    }

    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.data.insert(key.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.data.iter().map(|(k, &v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{key} = {value}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_read_as_nan() {
        let mut metrics = Metrics::new();
        metrics.set("loss", 0.25);
        assert_eq!(metrics.get("loss"), 0.25);
        assert!(metrics.get("precision").is_nan());
    }

    #[test]
    fn display_lists_entries_in_key_order() {
        let mut metrics = Metrics::new();
        metrics.set("count", 2.0);
        metrics.set("loss", 0.5);
        assert_eq!(metrics.to_string(), "count = 2, loss = 0.5");
    }
}
