// packages/agent/src/capture/payload.rs
//! Per-domain captured payloads
//!
//! Payloads are immutable once captured. Each carries a short textual
//! projection used for interactive search.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Truncated copy of a request or response body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodySnapshot {
    /// Body text (lossy UTF-8), at most the configured snapshot size
    pub text: String,

    /// Original body length in bytes
    pub total_len: usize,

    /// Whether `text` was cut short
    pub truncated: bool,
}

impl BodySnapshot {
    /// Capture at most `limit` bytes of `body`
    pub fn capture(body: &[u8], limit: usize) -> Self {
        let kept = &body[..body.len().min(limit)];
        Self {
            text: String::from_utf8_lossy(kept).into_owned(),
            total_len: body.len(),
            truncated: body.len() > limit,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_len == 0
    }
}

/// Outbound request as observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: BodySnapshot,
}

/// Response as observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: BodySnapshot,
}

/// One finalized network exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkExchange {
    /// Correlation id (ULID) assigned when the request left the host
    pub correlation_id: String,
    pub request: RequestSnapshot,

    /// Present when the transport (or a mock) produced a response
    pub response: Option<ResponseSnapshot>,

    /// Transport failure, if any
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,

    /// Served from the mock table instead of the real transport
    pub mocked: bool,
}

impl NetworkExchange {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
            && self
                .response
                .as_ref()
                .map(|r| (200..400).contains(&r.status))
                .unwrap_or(false)
    }

    pub(crate) fn search_text(&self) -> String {
        let status = self
            .response
            .as_ref()
            .map(|r| r.status.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{} {} {} {}",
            self.request.method,
            self.request.url,
            status,
            self.error.as_deref().unwrap_or("")
        )
    }
}

/// Marker carried by a lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleMarker {
    Allocated,
    Deallocated,
    PossibleLeak,
}

impl fmt::Display for LifecycleMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleMarker::Allocated => write!(f, "allocated"),
            LifecycleMarker::Deallocated => write!(f, "deallocated"),
            LifecycleMarker::PossibleLeak => write!(f, "possible leak"),
        }
    }
}

/// Lifecycle observation for a tracked object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Identity of the tracked object (allocation address at track time)
    pub object_id: u64,
    pub category: String,
    pub label: String,
    pub marker: LifecycleMarker,
    pub first_seen: DateTime<Utc>,
    pub deallocated: bool,

    /// Time between first sighting and this event
    pub alive_for_ms: u64,
}

impl LifecycleEvent {
    pub(crate) fn search_text(&self) -> String {
        format!("{} {} {}", self.category, self.label, self.marker)
    }
}

/// Geographic coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

/// Where a location answer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    Real,
    Simulated,
}

/// One position query observed by the location interceptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationQuery {
    pub source: LocationSource,

    /// Coordinate handed back to the caller
    pub coordinate: Option<Coordinate>,

    /// Simulated override in effect, if any
    pub simulated: Option<Coordinate>,
}

impl LocationQuery {
    pub fn used_real_location(&self) -> bool {
        self.source == LocationSource::Real
    }

    pub(crate) fn search_text(&self) -> String {
        let coordinate = self
            .coordinate
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unavailable".to_string());
        match self.source {
            LocationSource::Real => format!("real {}", coordinate),
            LocationSource::Simulated => format!("simulated {}", coordinate),
        }
    }
}

/// Fault origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FaultKind {
    /// Fatal signal delivered to the process
    Signal { number: i32, name: String },

    /// Uncaught panic
    Panic,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::Signal { name, number } => write!(f, "signal {} ({})", name, number),
            FaultKind::Panic => write!(f, "panic"),
        }
    }
}

/// Captured fault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultReport {
    pub kind: FaultKind,
    pub reason: String,
    pub backtrace: Vec<String>,
    pub thread: Option<String>,

    /// Source location for panics
    pub location: Option<String>,
    pub captured_at: DateTime<Utc>,

    /// Loaded from the durable slot on a later start
    pub recovered: bool,

    /// Capture was interrupted by a nested fault
    pub partial: bool,

    /// The panic was caught and the run went on past the grace period
    #[serde(default)]
    pub survived: bool,
}

impl FaultReport {
    pub(crate) fn search_text(&self) -> String {
        format!(
            "{} {} {}",
            self.kind,
            self.reason,
            self.location.as_deref().unwrap_or("")
        )
    }
}

/// Output stream tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamTag {
    Stdout,
    Stderr,
}

impl StreamTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamTag::Stdout => "stdout",
            StreamTag::Stderr => "stderr",
        }
    }
}

/// One line written to a console stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleLine {
    pub stream: StreamTag,
    pub text: String,
    pub sequence: u64,
}

impl ConsoleLine {
    pub(crate) fn search_text(&self) -> String {
        format!("{} {}", self.stream.as_str(), self.text)
    }
}

/// Kind of UI interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiEventKind {
    Tap,
    LongPress,
    Swipe,
    Key,
    Other(String),
}

impl fmt::Display for UiEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UiEventKind::Tap => write!(f, "tap"),
            UiEventKind::LongPress => write!(f, "long press"),
            UiEventKind::Swipe => write!(f, "swipe"),
            UiEventKind::Key => write!(f, "key"),
            UiEventKind::Other(name) => write!(f, "{}", name),
        }
    }
}

/// UI event dispatched by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiEvent {
    pub kind: UiEventKind,

    /// Name of the element that received the event
    pub target: String,
    pub position: Option<(f64, f64)>,
}

impl UiEvent {
    pub fn new(kind: UiEventKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            position: None,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some((x, y));
        self
    }

    pub(crate) fn search_text(&self) -> String {
        format!("{} {}", self.kind, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_snapshot_truncates() {
        let body = b"0123456789";
        let snapshot = BodySnapshot::capture(body, 4);
        assert_eq!(snapshot.text, "0123");
        assert_eq!(snapshot.total_len, 10);
        assert!(snapshot.truncated);

        let full = BodySnapshot::capture(body, 100);
        assert_eq!(full.text, "0123456789");
        assert!(!full.truncated);
    }

    #[test]
    fn test_fault_report_serde() {
        let report = FaultReport {
            kind: FaultKind::Signal {
                number: 6,
                name: "SIGABRT".to_string(),
            },
            reason: "abort".to_string(),
            backtrace: vec!["frame 0".to_string()],
            thread: Some("main".to_string()),
            location: None,
            captured_at: Utc::now(),
            recovered: false,
            partial: false,
            survived: false,
        };

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"type\":\"signal\""));
        let decoded: FaultReport = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, report);

        // Slots written before the survival flag existed still load
        let mut older: serde_json::Value = serde_json::from_str(&json).unwrap();
        older.as_object_mut().unwrap().remove("survived");
        let decoded: FaultReport = serde_json::from_value(older).unwrap();
        assert!(!decoded.survived);
    }

    #[test]
    fn test_location_search_text() {
        let query = LocationQuery {
            source: LocationSource::Simulated,
            coordinate: Some(Coordinate::new(10.0, 20.0)),
            simulated: Some(Coordinate::new(10.0, 20.0)),
        };
        assert!(query.search_text().starts_with("simulated 10.000000"));
        assert!(!query.used_real_location());
    }
}
