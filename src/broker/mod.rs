//! Broker topology and transports
//!
//! One durable direct exchange routes to two durable queues, each bound
//! to a single fixed routing key. [`AmqpBroker`] speaks AMQP 0-9-1 to a
//! real broker; [`MemoryBroker`] keeps the same contract in process.

pub mod amqp;
pub mod memory;

pub use amqp::AmqpBroker;
pub use memory::MemoryBroker;

use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};

use crate::{config, core::envelope::Lane};

static PUBLISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "bridge_published_total",
        "Envelopes handed to the broker per lane",
        &["lane", "outcome"]
    )
    .unwrap()
});

static DELIVERIES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "bridge_deliveries_total",
        "Deliveries settled by lane consumers",
        &["lane", "outcome"]
    )
    .unwrap()
});

pub(crate) fn record_publish(lane: Lane, ok: bool) {
    PUBLISHED
        .with_label_values(&[lane.as_str(), if ok { "ok" } else { "failed" }])
        .inc();
}

pub(crate) fn record_delivery(lane: Lane, acked: bool) {
    DELIVERIES
        .with_label_values(&[lane.as_str(), if acked { "ack" } else { "reject" }])
        .inc();
}

/// Names making up the exchange/queue contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub exchange: String,
    pub knowledge_queue: String,
    pub action_queue: String,
}

impl Topology {
    pub fn queue(&self, lane: Lane) -> &str {
        match lane {
            Lane::Knowledge => &self.knowledge_queue,
            Lane::Action => &self.action_queue,
        }
    }

    /// (queue, routing key) pairs, one per lane.
    pub fn bindings(&self) -> impl Iterator<Item = (&str, &'static str)> {
        Lane::ALL
            .into_iter()
            .map(move |lane| (self.queue(lane), lane.routing_key()))
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self::from(&config::Broker::default())
    }
}

impl From<&config::Broker> for Topology {
    fn from(cfg: &config::Broker) -> Self {
        Self {
            exchange: cfg.exchange.clone(),
            knowledge_queue: cfg.knowledge_queue.clone(),
            action_queue: cfg.action_queue.clone(),
        }
    }
}
