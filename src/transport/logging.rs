use super::RequestSink;
use crate::protocol::OutboundRequest;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Logs outbound requests and keeps only a count.
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    dispatched: Arc<AtomicU64>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }
}

impl RequestSink for LogSink {
    fn dispatch(&self, request: OutboundRequest) {
        match request.body() {
            Ok(body) => info!("POST {} {}", request.path(), body),
            Err(e) => warn!("POST {} <unencodable: {}>", request.path(), e),
        }
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }
}
