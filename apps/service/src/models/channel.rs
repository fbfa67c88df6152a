use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A configured notification destination
///
/// `kind` stays a plain string: channels of a kind this build has no notifier
/// for are still loadable and are skipped at dispatch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationChannel {
    pub id: Uuid,
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl NotificationChannel {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, config: Value) -> Self {
        let config = match config {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { id: Uuid::new_v4(), name: name.into(), kind: kind.into(), config }
    }

    /// Non-empty string setting. Numbers and booleans are rendered as text so
    /// hand-edited configs like `"smtpPort": 587` still work.
    pub fn setting(&self, key: &str) -> Option<String> {
        match self.config.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// List setting, accepting either an array or a comma separated string
    pub fn list_setting(&self, key: &str) -> Vec<String> {
        match self.config.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            Some(Value::String(s)) => {
                s.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
            }
            _ => Vec::new(),
        }
    }
}
