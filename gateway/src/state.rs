use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use intellivue_proto::MacAddr;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

// ─── Shared State Types ───────────────────────────────────────────────────────

/// Monitor registry, keyed by MAC (the canonical monitor identity).
/// Written by the session engine on every beacon, read by the HTTP API.
pub type SharedMonitors = Arc<RwLock<HashMap<MacAddr, Monitor>>>;

/// Subscription registry, keyed by subscription id. Written by the HTTP
/// API, read by the dispatcher on every poll reply.
pub type SharedSubscriptions = Arc<RwLock<HashMap<Uuid, Subscription>>>;

// ─── Domain Records ───────────────────────────────────────────────────────────

/// A monitor we have seen a discovery beacon from. Never evicted by the
/// engine; `last_seen` refreshes on every beacon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub mac_address: MacAddr,
    pub host: IpAddr,
    pub port: u16,
    pub last_seen: DateTime<Utc>,
}

/// Binds a webhook URL to a monitor MAC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub monitor_id: MacAddr,
    pub url: String,
    pub subscription_id: Uuid,
}

/// One decoded vital-sign reading as delivered to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub physio_id: String,
    pub state: Vec<String>,
    pub unit_code: String,
    pub value: f64,
}

/// Webhook body: all valid observations from one poll reply.
#[derive(Debug, Clone, Serialize)]
pub struct ObservationPayload {
    pub monitor_id: MacAddr,
    pub datetime: DateTime<Utc>,
    pub observations: Vec<Observation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_to_webhook_shape() {
        let payload = ObservationPayload {
            monitor_id: "06:08:06:08:00:01".parse().unwrap(),
            datetime: DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z").unwrap().into(),
            observations: vec![Observation {
                physio_id: "NOM_PULS_OXIM_SAT_O2".into(),
                state: vec![],
                unit_code: "NOM_DIM_PERCENT".into(),
                value: 98.0,
            }],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["monitor_id"], "06:08:06:08:00:01");
        assert_eq!(json["observations"][0]["physio_id"], "NOM_PULS_OXIM_SAT_O2");
        assert_eq!(json["observations"][0]["value"], 98.0);
        assert!(json["datetime"].as_str().unwrap().starts_with("2024-05-01T12:00:00"));
    }
}
