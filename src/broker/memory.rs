use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use log::{error, info, warn};
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    watch,
};

use super::{record_delivery, record_publish, Topology};
use crate::{
    core::{
        envelope::{Lane, RequestEnvelope},
        error::BridgeResult,
        traits::{DeliveryHandler, MessageBroker},
    },
    transport_error,
};

type Receiver = UnboundedReceiver<Vec<u8>>;

struct LaneQueue {
    sender: UnboundedSender<Vec<u8>>,
    // taken by the single active consumer, returned when it stops
    receiver: Mutex<Option<Receiver>>,
    acked: AtomicUsize,
    rejected: AtomicUsize,
}

impl LaneQueue {
    fn new() -> Self {
        let (sender, receiver) = unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            acked: AtomicUsize::new(0),
            rejected: AtomicUsize::new(0),
        }
    }
}

/// In-process broker with the same contract as the AMQP transport.
///
/// Queues buffer envelopes until a consumer attaches, each queue admits
/// one consumer, and a delivery is settled before the next one is handed
/// out. `disconnect` makes publishes fail and ends running consume loops.
pub struct MemoryBroker {
    topology: Topology,
    queues: HashMap<Lane, LaneQueue>,
    link: watch::Sender<bool>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(Topology::default())
    }
}

impl MemoryBroker {
    pub fn new(topology: Topology) -> Self {
        let queues = Lane::ALL
            .into_iter()
            .map(|lane| (lane, LaneQueue::new()))
            .collect();
        let (link, _) = watch::channel(true);
        Self {
            topology,
            queues,
            link,
        }
    }

    fn queue(&self, lane: Lane) -> &LaneQueue {
        // every lane is inserted at construction
        &self.queues[&lane]
    }

    pub fn is_connected(&self) -> bool {
        *self.link.borrow()
    }

    /// Simulate losing the broker connection.
    pub fn disconnect(&self) {
        warn!("Memory broker disconnected");
        self.link.send_replace(false);
    }

    pub fn reconnect(&self) {
        info!("Memory broker reconnected");
        self.link.send_replace(true);
    }

    /// Enqueue raw bytes as a producer outside this crate would.
    pub fn publish_raw(&self, lane: Lane, payload: Vec<u8>) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.queue(lane).sender.send(payload).is_ok()
    }

    pub fn acked(&self, lane: Lane) -> usize {
        self.queue(lane).acked.load(Ordering::SeqCst)
    }

    pub fn rejected(&self, lane: Lane) -> usize {
        self.queue(lane).rejected.load(Ordering::SeqCst)
    }

    fn take_receiver(&self, lane: Lane) -> BridgeResult<ReceiverGuard<'_>> {
        let mut slot = self
            .queue(lane)
            .receiver
            .lock()
            .map_err(|_| transport_error!("queue '{}' lock poisoned", self.topology.queue(lane)))?;
        match slot.take() {
            Some(receiver) => Ok(ReceiverGuard {
                slot: &self.queue(lane).receiver,
                receiver: Some(receiver),
            }),
            None => Err(transport_error!(
                "queue '{}' already has a consumer",
                self.topology.queue(lane)
            )),
        }
    }
}

/// Hands the queue back when a consume loop ends or is dropped.
struct ReceiverGuard<'a> {
    slot: &'a Mutex<Option<Receiver>>,
    receiver: Option<Receiver>,
}

impl ReceiverGuard<'_> {
    async fn recv(&mut self) -> Option<Vec<u8>> {
        match self.receiver.as_mut() {
            Some(receiver) => receiver.recv().await,
            None => None,
        }
    }
}

impl Drop for ReceiverGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = self.receiver.take();
        }
    }
}

#[async_trait]
impl MessageBroker for MemoryBroker {
    async fn declare_topology(&self) -> BridgeResult<()> {
        if !self.is_connected() {
            return Err(transport_error!("memory broker is disconnected"));
        }
        info!(
            "Declared in-process exchange '{}' with queues '{}' and '{}'",
            self.topology.exchange, self.topology.knowledge_queue, self.topology.action_queue
        );
        Ok(())
    }

    async fn publish(&self, lane: Lane, envelope: &RequestEnvelope) -> bool {
        let ok = match envelope.to_json() {
            Ok(payload) => self.publish_raw(lane, payload),
            Err(e) => {
                error!("Failed to encode envelope '{}': {e}", envelope.correlation_id);
                false
            }
        };
        if ok {
            info!("Envelope '{}' published to {lane} lane", envelope.correlation_id);
        } else {
            error!("Failed to publish envelope '{}'", envelope.correlation_id);
        }
        record_publish(lane, ok);
        ok
    }

    async fn consume(&self, lane: Lane, handler: Arc<dyn DeliveryHandler>) -> BridgeResult<()> {
        let queue_name = self.topology.queue(lane).to_string();
        let mut link = self.link.subscribe();
        if !*link.borrow_and_update() {
            return Err(transport_error!("memory broker is disconnected"));
        }

        let mut receiver = self.take_receiver(lane)?;
        let counters = self.queue(lane);
        info!("Started consuming from '{queue_name}'");

        loop {
            let payload = tokio::select! {
                biased;
                changed = link.changed() => {
                    if changed.is_err() || !*link.borrow_and_update() {
                        return Err(transport_error!("Connection lost while consuming '{}'", queue_name));
                    }
                    continue;
                }
                payload = receiver.recv() => payload,
            };

            let Some(payload) = payload else {
                return Err(transport_error!("Queue '{}' closed", queue_name));
            };

            let outcome = match RequestEnvelope::from_json(&payload) {
                Ok(envelope) => handler.handle(envelope).await,
                Err(e) => Err(e.into()),
            };

            match outcome {
                Ok(()) => {
                    counters.acked.fetch_add(1, Ordering::SeqCst);
                    record_delivery(lane, true);
                }
                Err(e) => {
                    error!("Error processing delivery on '{queue_name}': {e}");
                    counters.rejected.fetch_add(1, Ordering::SeqCst);
                    record_delivery(lane, false);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::error::BridgeError;

    struct Recorder {
        seen: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl DeliveryHandler for Recorder {
        async fn handle(&self, envelope: RequestEnvelope) -> BridgeResult<()> {
            self.seen.lock().unwrap().push(envelope.correlation_id.clone());
            if self.fail_on.as_deref() == Some(envelope.correlation_id.as_str()) {
                return Err(BridgeError::Processing("boom".to_string()));
            }
            Ok(())
        }
    }

    fn envelope(id: &str) -> RequestEnvelope {
        RequestEnvelope {
            correlation_id: id.to_string(),
            text: "hi".to_string(),
            caller_id: "default_user".to_string(),
            token: None,
            channel: "web".to_string(),
        }
    }

    async fn settle(broker: &MemoryBroker, lane: Lane, total: usize) {
        for _ in 0..200 {
            if broker.acked(lane) + broker.rejected(lane) >= total {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("deliveries on {lane} did not settle");
    }

    #[tokio::test]
    async fn test_buffered_before_consumer_and_routed_by_lane() {
        let broker = Arc::new(MemoryBroker::default());
        assert!(broker.publish(Lane::Knowledge, &envelope("k1")).await);
        assert!(broker.publish(Lane::Action, &envelope("a1")).await);
        assert!(broker.publish(Lane::Knowledge, &envelope("k2")).await);

        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            fail_on: None,
        });
        let task = {
            let broker = broker.clone();
            let recorder = recorder.clone();
            tokio::spawn(async move { broker.consume(Lane::Knowledge, recorder).await })
        };

        settle(&broker, Lane::Knowledge, 2).await;
        assert_eq!(*recorder.seen.lock().unwrap(), vec!["k1", "k2"]);
        assert_eq!(broker.acked(Lane::Action), 0);
        task.abort();
    }

    #[tokio::test]
    async fn test_handler_error_and_bad_payload_are_rejected() {
        let broker = Arc::new(MemoryBroker::default());
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            fail_on: Some("bad".to_string()),
        });
        let task = {
            let broker = broker.clone();
            let recorder = recorder.clone();
            tokio::spawn(async move { broker.consume(Lane::Action, recorder).await })
        };

        assert!(broker.publish(Lane::Action, &envelope("bad")).await);
        assert!(broker.publish_raw(Lane::Action, b"not json".to_vec()));
        assert!(broker.publish(Lane::Action, &envelope("good")).await);

        settle(&broker, Lane::Action, 3).await;
        assert_eq!(broker.rejected(Lane::Action), 2);
        assert_eq!(broker.acked(Lane::Action), 1);
        assert_eq!(*recorder.seen.lock().unwrap(), vec!["bad", "good"]);
        task.abort();
    }

    #[tokio::test]
    async fn test_disconnect_fails_publish_and_ends_consumer() {
        let broker = Arc::new(MemoryBroker::default());
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            fail_on: None,
        });
        let task = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.consume(Lane::Knowledge, recorder).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        broker.disconnect();
        assert!(!broker.publish(Lane::Knowledge, &envelope("lost")).await);
        assert!(broker.declare_topology().await.is_err());

        let result = task.await.unwrap();
        assert!(matches!(result, Err(BridgeError::Transport(_))));

        // queue is handed back for a supervised restart
        broker.reconnect();
        assert!(broker.take_receiver(Lane::Knowledge).is_ok());
    }

    #[tokio::test]
    async fn test_single_consumer_per_queue() {
        let broker = MemoryBroker::default();
        let _held = broker.take_receiver(Lane::Action).unwrap();
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            fail_on: None,
        });
        let result = broker.consume(Lane::Action, recorder).await;
        assert!(matches!(result, Err(BridgeError::Transport(_))));
    }
}
