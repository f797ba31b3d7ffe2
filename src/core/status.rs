use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Where the readiness signal came from, for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadySource {
    /// Exchange and queues declared on the AMQP broker.
    Amqp,
    /// In-process broker, ready as soon as it exists.
    Memory,
}

impl ReadySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadySource::Amqp => "amqp",
            ReadySource::Memory => "memory",
        }
    }
}

/// Readiness flag shared by the startup path and the status endpoint.
///
/// The bridge is ready once the broker topology has been declared; until
/// then `/status/ready` answers 503 so load balancers keep traffic away.
#[derive(Debug, Clone, Default)]
pub struct Readiness {
    ready: Arc<AtomicBool>,
}

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_ready(&self, source: ReadySource) {
        self.ready.store(true, Ordering::SeqCst);
        log::info!(
            "Broker topology declared via {}, bridge is ready",
            source.as_str()
        );
    }

    pub fn mark_unavailable(&self, reason: &str) {
        self.ready.store(false, Ordering::SeqCst);
        log::warn!("Bridge not ready: {reason}");
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
