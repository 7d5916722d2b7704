//! Upstream state reporting
//!
//! Device state reaches the platform two ways: after every successful
//! EXECUTE, and whenever a device pushes an unsolicited state update to the
//! push listener. Both go through a [`StateReporter`], which stamps each
//! report with a fresh request id and hands it to a [`StateSink`].

use crate::codec::{self, CodecError};
use crate::platform::StateReport;
use crate::protocol::{DeviceReply, Envelope, StateMap};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// Errors that can occur while pushing a report upstream
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    #[error("Upstream rejected report {request_id}: {reason}")]
    Rejected { request_id: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("No acknowledgement for report {request_id} within {timeout_ms}ms")]
    Timeout { request_id: String, timeout_ms: u64 },
}

/// Destination of state reports
#[async_trait]
pub trait StateSink: Send + Sync {
    /// Deliver one report, returning once upstream acknowledged it
    async fn push(&self, report: &StateReport) -> Result<(), ReportError>;

    fn name(&self) -> &'static str;
}

/// Builds and sends state reports for one agent user
pub struct StateReporter {
    sink: Arc<dyn StateSink>,
    agent_user_id: String,
    next_request_id: AtomicU64,
}

impl StateReporter {
    pub fn new(sink: Arc<dyn StateSink>, agent_user_id: impl Into<String>) -> Self {
        Self {
            sink,
            agent_user_id: agent_user_id.into(),
            next_request_id: AtomicU64::new(1),
        }
    }

    pub fn agent_user_id(&self) -> &str {
        &self.agent_user_id
    }

    /// Report one device's state upstream
    pub async fn report(
        &self,
        device_id: &str,
        states: StateMap,
    ) -> Result<StateReport, ReportError> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let report = StateReport::new(
            request_id.to_string(),
            self.agent_user_id.as_str(),
            device_id,
            states,
        );

        self.sink.push(&report).await?;

        info!(
            request_id,
            device_id,
            sink = self.sink.name(),
            "State reported"
        );
        Ok(report)
    }
}

/// Receive unsolicited state pushes from devices and report each upstream
///
/// Every push is reported on its own task so a slow upstream never holds up
/// the socket. Runs until the task is aborted.
pub async fn run_push_listener(socket: UdpSocket, reporter: Arc<StateReporter>) {
    let mut buf = vec![0u8; codec::MAX_DATAGRAM_SIZE];

    loop {
        let (n, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!(error = %e, "State push receive error");
                continue;
            }
        };

        let push: Envelope<DeviceReply> = match codec::decode_datagram(&buf[..n]) {
            Ok(push) => push,
            Err(e) => {
                warn!(%from, error = %e, "Dropping malformed state push");
                continue;
            }
        };

        debug!(%from, device_id = %push.payload.device_id, "State push received");

        let reporter = reporter.clone();
        tokio::spawn(async move {
            let DeviceReply { device_id, states } = push.payload;
            if let Err(e) = reporter.report(&device_id, states).await {
                warn!(device_id = %device_id, error = %e, "Failed to report pushed state");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct ChannelSink {
        tx: mpsc::UnboundedSender<StateReport>,
        fail: bool,
    }

    #[async_trait]
    impl StateSink for ChannelSink {
        async fn push(&self, report: &StateReport) -> Result<(), ReportError> {
            if self.fail {
                return Err(ReportError::Unavailable("offline".into()));
            }
            let _ = self.tx.send(report.clone());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "channel"
        }
    }

    fn reporter(fail: bool) -> (Arc<StateReporter>, mpsc::UnboundedReceiver<StateReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(ChannelSink { tx, fail });
        (Arc::new(StateReporter::new(sink, "user01")), rx)
    }

    fn states(value: serde_json::Value) -> StateMap {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_report_uses_fresh_request_ids() {
        let (reporter, mut rx) = reporter(false);

        let first = reporter.report("soundbar", states(json!({"on": true}))).await.unwrap();
        let second = reporter.report("soundbar", states(json!({"on": false}))).await.unwrap();

        assert_eq!(first.request_id, "1");
        assert_eq!(second.request_id, "2");
        assert_eq!(first.agent_user_id, "user01");
        assert_eq!(rx.recv().await.unwrap(), first);
        assert_eq!(rx.recv().await.unwrap().payload.devices.states["soundbar"]["on"], false);
    }

    #[tokio::test]
    async fn test_report_surfaces_sink_failure() {
        let (reporter, _rx) = reporter(true);
        let result = reporter.report("soundbar", StateMap::new()).await;
        assert!(matches!(result, Err(ReportError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_push_listener_reports_pushes() {
        let (reporter, mut rx) = reporter(false);
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let listen_addr = socket.local_addr().unwrap();
        let listener = tokio::spawn(run_push_listener(socket, reporter));

        let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        device.send_to(b"garbage", listen_addr).await.unwrap();
        let push = json!({"msgId": 0, "payload": {"device_id": "soundbar", "states": {"on": true}}});
        device
            .send_to(push.to_string().as_bytes(), listen_addr)
            .await
            .unwrap();

        let report = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no report")
            .unwrap();
        assert_eq!(report.payload.devices.states["soundbar"]["on"], true);
        assert_eq!(report.request_id, "1");

        listener.abort();
    }
}
