use crate::error::{PipelineError, PipelineResult};
use crate::registry::ConfigSchema;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Configuration handed to a process's `configure` step.
///
/// Values may arrive as JSON scalars or as configuration text ("2.5",
/// "true"); typed lookups accept either form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigBlock {
    process: String,
    values: Map<String, Value>,
    /// Numeric `(min, max)` limits taken from the schema
    bounds: BTreeMap<String, (Option<f64>, Option<f64>)>,
}

impl ConfigBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object; `null` yields an empty block.
    pub fn from_json(process: impl Into<String>, config: Value) -> PipelineResult<Self> {
        let process = process.into();
        let values = match config {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(PipelineError::config(
                    process,
                    format!("config must be an object, got {}", other),
                ))
            }
        };
        Ok(Self {
            process,
            values,
            bounds: BTreeMap::new(),
        })
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn set_process_name(&mut self, process: impl Into<String>) {
        self.process = process.into();
    }

    pub fn process_name(&self) -> &str {
        &self.process
    }

    /// Fill in schema defaults for every key the caller did not set and
    /// adopt the schema's numeric limits.
    pub fn merge_defaults(&mut self, schema: &[ConfigSchema]) {
        for entry in schema {
            self.values
                .entry(entry.key.clone())
                .or_insert_with(|| Value::String(entry.default.clone()));
            if entry.min.is_some() || entry.max.is_some() {
                self.bounds.insert(entry.key.clone(), (entry.min, entry.max));
            }
        }
    }

    fn check_bounds(&self, key: &str, raw: &Value) -> PipelineResult<()> {
        let Some(&(min, max)) = self.bounds.get(key) else {
            return Ok(());
        };
        let Some(number) = f64::from_config(raw) else {
            return Ok(());
        };

        if let Some(min) = min.filter(|min| number < *min) {
            return Err(PipelineError::config(
                &self.process,
                format!("'{}' must be at least {}, got {}", key, min, number),
            ));
        }
        if let Some(max) = max.filter(|max| number > *max) {
            return Err(PipelineError::config(
                &self.process,
                format!("'{}' must be at most {}, got {}", key, max, number),
            ));
        }
        Ok(())
    }

    pub fn has_value(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    /// Typed lookup of a required value.
    pub fn value<T: ConfigValue>(&self, key: &str) -> PipelineResult<T> {
        let raw = self.values.get(key).ok_or_else(|| {
            PipelineError::config(&self.process, format!("missing required value '{}'", key))
        })?;

        self.check_bounds(key, raw)?;
        T::from_config(raw).ok_or_else(|| {
            PipelineError::config(
                &self.process,
                format!("value '{}' for '{}' is not a valid {}", raw, key, T::TYPE_NAME),
            )
        })
    }

    /// Typed lookup falling back to `default` when the key is absent.
    pub fn value_or<T: ConfigValue>(&self, key: &str, default: T) -> PipelineResult<T> {
        if self.has_value(key) {
            self.value(key)
        } else {
            Ok(default)
        }
    }
}

/// Conversion from a raw configuration value.
pub trait ConfigValue: Sized {
    const TYPE_NAME: &'static str;

    fn from_config(value: &Value) -> Option<Self>;
}

impl ConfigValue for f64 {
    const TYPE_NAME: &'static str = "number";

    fn from_config(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

macro_rules! impl_integer_config_value {
    ($($ty:ty),*) => {
        $(
            impl ConfigValue for $ty {
                const TYPE_NAME: &'static str = "integer";

                fn from_config(value: &Value) -> Option<Self> {
                    match value {
                        Value::Number(n) => n
                            .as_i64()
                            .and_then(|v| <$ty>::try_from(v).ok())
                            .or_else(|| n.as_u64().and_then(|v| <$ty>::try_from(v).ok())),
                        Value::String(s) => s.trim().parse().ok(),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_integer_config_value!(u32, u64, usize, i64);

impl ConfigValue for bool {
    const TYPE_NAME: &'static str = "boolean";

    fn from_config(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl ConfigValue for String {
    const TYPE_NAME: &'static str = "string";

    fn from_config(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}
