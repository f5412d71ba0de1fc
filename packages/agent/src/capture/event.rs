// packages/agent/src/capture/event.rs
//! Domain-tagged captured events

use crate::capture::payload::{
    ConsoleLine, FaultReport, LifecycleEvent, LocationQuery, NetworkExchange, UiEvent,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Diagnostic domain, one capture store each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Network,
    Lifecycle,
    Location,
    Fault,
    Console,
    Interaction,
}

impl Domain {
    pub const ALL: [Domain; 6] = [
        Domain::Network,
        Domain::Lifecycle,
        Domain::Location,
        Domain::Fault,
        Domain::Console,
        Domain::Interaction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Network => "network",
            Domain::Lifecycle => "lifecycle",
            Domain::Location => "location",
            Domain::Fault => "fault",
            Domain::Console => "console",
            Domain::Interaction => "interaction",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload sum type, one variant per domain
#[derive(Debug, Clone)]
pub enum Payload {
    Network(Arc<NetworkExchange>),
    Lifecycle(Arc<LifecycleEvent>),
    Location(Arc<LocationQuery>),
    Fault(Arc<FaultReport>),
    Console(Arc<ConsoleLine>),
    Interaction(Arc<UiEvent>),
}

impl Payload {
    pub fn domain(&self) -> Domain {
        match self {
            Payload::Network(_) => Domain::Network,
            Payload::Lifecycle(_) => Domain::Lifecycle,
            Payload::Location(_) => Domain::Location,
            Payload::Fault(_) => Domain::Fault,
            Payload::Console(_) => Domain::Console,
            Payload::Interaction(_) => Domain::Interaction,
        }
    }

    /// Textual projection used by search
    pub fn search_text(&self) -> String {
        match self {
            Payload::Network(exchange) => exchange.search_text(),
            Payload::Lifecycle(event) => event.search_text(),
            Payload::Location(query) => query.search_text(),
            Payload::Fault(report) => report.search_text(),
            Payload::Console(line) => line.search_text(),
            Payload::Interaction(event) => event.search_text(),
        }
    }
}

/// Common event shape handed to the presentation layer
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    /// Per-domain ordinal; defines presentation order
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub domain: Domain,
    pub payload: Payload,
}

impl CapturedEvent {
    /// Case-insensitive substring match on the textual projection
    pub fn matches(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        self.payload
            .search_text()
            .to_lowercase()
            .contains(&needle.to_lowercase())
    }
}

/// Types that can be held in a capture store
pub trait Capturable: Send + Sync + 'static {
    /// Domain of the owning store
    const DOMAIN: Domain;

    /// Lift a stored payload into the domain sum type
    fn to_payload(item: &Arc<Self>) -> Payload;
}

impl Capturable for NetworkExchange {
    const DOMAIN: Domain = Domain::Network;

    fn to_payload(item: &Arc<Self>) -> Payload {
        Payload::Network(Arc::clone(item))
    }
}

impl Capturable for LifecycleEvent {
    const DOMAIN: Domain = Domain::Lifecycle;

    fn to_payload(item: &Arc<Self>) -> Payload {
        Payload::Lifecycle(Arc::clone(item))
    }
}

impl Capturable for LocationQuery {
    const DOMAIN: Domain = Domain::Location;

    fn to_payload(item: &Arc<Self>) -> Payload {
        Payload::Location(Arc::clone(item))
    }
}

impl Capturable for FaultReport {
    const DOMAIN: Domain = Domain::Fault;

    fn to_payload(item: &Arc<Self>) -> Payload {
        Payload::Fault(Arc::clone(item))
    }
}

impl Capturable for ConsoleLine {
    const DOMAIN: Domain = Domain::Console;

    fn to_payload(item: &Arc<Self>) -> Payload {
        Payload::Console(Arc::clone(item))
    }
}

impl Capturable for UiEvent {
    const DOMAIN: Domain = Domain::Interaction;

    fn to_payload(item: &Arc<Self>) -> Payload {
        Payload::Interaction(Arc::clone(item))
    }
}
