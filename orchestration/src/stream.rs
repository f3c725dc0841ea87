//! Monitor frame emission.
//!
//! The executor pushes frames into a `MonitorSink`; the bounded-channel
//! implementation here drops frames rather than block the investigation
//! when the observer falls behind.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use inquest_contracts::MonitorFrame;

use crate::ports::MonitorSink;

/// Bounded-channel monitor sink.
pub struct ChannelMonitor {
    tx: mpsc::Sender<MonitorFrame>,
}

impl ChannelMonitor {
    /// Creates the sink and the receiving half for the observer.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<MonitorFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (ChannelMonitor { tx }, rx)
    }
}

#[async_trait]
impl MonitorSink for ChannelMonitor {
    async fn emit(&self, frame: MonitorFrame) {
        if let Err(err) = self.tx.try_send(frame) {
            match err {
                mpsc::error::TrySendError::Full(frame) => {
                    warn!(
                        investigation_id = %frame.investigation_id,
                        "monitor channel full; frame dropped"
                    );
                }
                mpsc::error::TrySendError::Closed(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inquest_contracts::FrameKind;

    #[tokio::test]
    async fn frames_flow_through_channel() {
        let (sink, mut rx) = ChannelMonitor::new(8);
        sink.emit(MonitorFrame::new(
            FrameKind::Audit,
            "inv-1",
            serde_json::json!({"entry": "start"}),
        ))
        .await;

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.kind, FrameKind::Audit);
        assert_eq!(frame.investigation_id, "inv-1");
    }

    #[tokio::test]
    async fn full_channel_drops_instead_of_blocking() {
        let (sink, mut rx) = ChannelMonitor::new(1);
        for i in 0..5 {
            sink.emit(MonitorFrame::new(
                FrameKind::Routing,
                "inv-1",
                serde_json::json!({"i": i}),
            ))
            .await;
        }
        // Only the first frame fit.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
