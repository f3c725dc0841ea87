//! Monitor frames streamed to per-investigation observers.
//!
//! The core produces these frames; transport, auth, and backpressure belong
//! to the wrapping service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Frame categories emitted over a monitor channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Audit,
    Routing,
    Safety,
    AgentResult,
    ToolResult,
    Completion,
}

/// One JSON frame on the `/investigation/<id>/monitor` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorFrame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    pub timestamp: DateTime<Utc>,
    pub investigation_id: String,
    pub payload: serde_json::Value,
}

impl MonitorFrame {
    pub fn new(kind: FrameKind, investigation_id: &str, payload: serde_json::Value) -> Self {
        MonitorFrame {
            kind,
            timestamp: Utc::now(),
            investigation_id: investigation_id.to_string(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_serializes_with_type_tag() {
        let frame = MonitorFrame::new(
            FrameKind::Routing,
            "inv-1",
            serde_json::json!({"next_node": "network_agent"}),
        );
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "routing");
        assert_eq!(json["investigation_id"], "inv-1");
    }
}
