//! Bounded, newest-first diagnostic log of gateway traffic.
//!
//! Every request, response and error that passes through the gateway lands
//! here. Front-ends read the entries back for display; the log is never
//! persisted.

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Default number of retained entries.
pub const DEBUG_LOG_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugKind {
    Request,
    Response,
    Error,
}

impl DebugKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::Error => "error",
        }
    }
}

/// One logged gateway event. Payload keys are flattened next to the header
/// fields when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugEntry {
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: DebugKind,
    pub provider: String,
    pub model: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl DebugEntry {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

#[derive(Debug)]
struct Inner {
    entries: VecDeque<DebugEntry>,
    enabled: bool,
}

/// Fixed-capacity log shared between the gateway and the UI.
#[derive(Debug)]
pub struct DebugRecorder {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl DebugRecorder {
    /// Capacities above [`DEBUG_LOG_CAPACITY`] are clamped to it.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(DEBUG_LOG_CAPACITY);
        Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::with_capacity(capacity),
                enabled: true,
            }),
            capacity,
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.enabled = enabled;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().map(|i| i.enabled).unwrap_or(false)
    }

    /// Record an entry at the head, evicting the oldest past capacity.
    /// A `duration` payload field is converted to seconds with one decimal.
    pub fn log(&self, kind: DebugKind, provider: &str, model: &str, payload: Map<String, Value>) {
        self.log_at(Local::now(), kind, provider, model, payload);
    }

    fn log_at<Tz: TimeZone>(
        &self,
        now: DateTime<Tz>,
        kind: DebugKind,
        provider: &str,
        model: &str,
        mut payload: Map<String, Value>,
    ) where
        Tz::Offset: std::fmt::Display,
    {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if !inner.enabled || self.capacity == 0 {
            return;
        }

        if let Some(ms) = payload.get("duration").and_then(Value::as_u64) {
            payload.insert(
                "duration".into(),
                Value::String(format_duration(Duration::from_millis(ms))),
            );
        }

        inner.entries.push_front(DebugEntry {
            timestamp: format_timestamp(&now),
            kind,
            provider: provider.to_owned(),
            model: model.to_owned(),
            payload,
        });
        while inner.entries.len() > self.capacity {
            inner.entries.pop_back();
        }
    }

    /// Snapshot of all entries, newest first.
    pub fn entries(&self) -> Vec<DebugEntry> {
        self.inner
            .lock()
            .map(|i| i.entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.entries.clear();
        }
    }
}

impl Default for DebugRecorder {
    fn default() -> Self {
        Self::new(DEBUG_LOG_CAPACITY)
    }
}

/// Seconds with one decimal, e.g. `1.2`.
pub fn format_duration(elapsed: Duration) -> String {
    format!("{:.1}", elapsed.as_secs_f64())
}

/// `MM/DD/YYYY, HH:MM:SS ±HH:MM` on a 24-hour clock. The zone is always the
/// numeric UTC offset.
pub fn format_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%m/%d/%Y, %H:%M:%S %:z").to_string()
}

/// Render a payload for display. Raw mode is compact single-line JSON;
/// pretty mode indents and turns escaped `\n` / `\t` into real ones.
pub fn format_json(value: &Value, pretty: bool) -> String {
    if value.is_null() {
        return String::new();
    }
    if !pretty {
        return value.to_string();
    }
    let rendered = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    rendered.replace("\\n", "\n").replace("\\t", "\t")
}
