//! Capability snapshot endpoint.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use unmark_models::CapabilitySnapshot;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CapabilitiesQuery {
    /// Force a re-probe even when the cache is fresh
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Serialize)]
pub struct CapabilitiesResponse {
    #[serde(flatten)]
    pub snapshot: CapabilitySnapshot,
    /// `true` when the returned snapshot is past its TTL
    pub stale: bool,
}

/// `GET /api/capabilities` — what this host can do right now.
///
/// Reads report the cached snapshot (with its staleness) rather than
/// re-probing; `refresh=true` forces a fresh probe.
pub async fn get_capabilities(
    State(state): State<AppState>,
    Query(query): Query<CapabilitiesQuery>,
) -> Json<CapabilitiesResponse> {
    let (snapshot, stale) = if query.refresh {
        (state.capabilities.snapshot(true).await, false)
    } else {
        match state.capabilities.peek().await {
            Some(peeked) => peeked,
            // Cold cache: the first reader pays for the probe
            None => (state.capabilities.snapshot(false).await, false),
        }
    };

    Json(CapabilitiesResponse {
        snapshot: (*snapshot).clone(),
        stale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use unmark_models::{EncoderCapability, ToolAvailability};

    #[test]
    fn test_response_flattens_snapshot() {
        let response = CapabilitiesResponse {
            snapshot: CapabilitySnapshot {
                platform: "linux".to_string(),
                arch: "x86_64".to_string(),
                gpus: vec!["NVIDIA GeForce RTX 3060".to_string()],
                working_encoders: vec![EncoderCapability {
                    name: "h264_nvenc".to_string(),
                    hardware: true,
                    verified: true,
                }],
                tools: ToolAvailability::default(),
                probed_at: Utc::now(),
            },
            stale: true,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["platform"], "linux");
        assert_eq!(json["working_encoders"][0]["name"], "h264_nvenc");
        assert_eq!(json["stale"], true);
    }
}
