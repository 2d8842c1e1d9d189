use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One ingested item, kept exactly as the upstream sent it.
///
/// The pipeline only ever looks at the id (to advance pagination cursors) and
/// the creation timestamp (to name output files); every other field is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Value);

impl Record {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Raw `created_at` string. v2 payloads nest the post under `data`.
    pub fn created_at(&self) -> Option<&str> {
        self.field("created_at").and_then(Value::as_str)
    }

    /// Numeric post id, read from `id` or, failing that, `id_str`.
    pub fn id(&self) -> Option<u64> {
        let from_id = self.field("id").and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        });

        from_id.or_else(|| {
            self.field("id_str")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
        })
    }

    fn field(&self, name: &str) -> Option<&Value> {
        self.0
            .get(name)
            .or_else(|| self.0.get("data").and_then(|data| data.get(name)))
    }
}

impl From<Value> for Record {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Queue saturation notice sent by the streaming endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StallWarning {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub percent_full: Option<u64>,
}

/// What a single line of a streaming response turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Record(Record),
    Disconnect { code: i64, reason: String },
    StallWarning(StallWarning),
    /// Anything else the endpoint interleaves (limit notices, deletes, ...).
    Control(Value),
}

impl StreamItem {
    pub fn classify(value: Value) -> Self {
        if let Some(event) = value.get("disconnect") {
            let code = event.get("code").and_then(Value::as_i64).unwrap_or(-1);
            let reason = event
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("no reason given")
                .to_string();
            return StreamItem::Disconnect { code, reason };
        }

        if let Some(warning) = value.get("warning") {
            if let Ok(warning) = serde_json::from_value::<StallWarning>(warning.clone()) {
                return StreamItem::StallWarning(warning);
            }
        }

        if value.get("text").is_some() || value.get("data").is_some() {
            return StreamItem::Record(Record::new(value));
        }

        StreamItem::Control(value)
    }
}
