//! Lane consumer workers
//!
//! Each lane gets a [`LaneConsumer`] that drains its queue through the
//! broker and hands every decoded envelope to a [`DeliveryHandler`]. The
//! handlers always write exactly one result to the correlation store
//! before they return, so a delivery is never acknowledged without one.

pub mod action;
pub mod knowledge;

pub use action::ActionWorker;
pub use knowledge::KnowledgeWorker;

use std::{any::Any, future::Future, panic::AssertUnwindSafe, sync::Arc};

use async_trait::async_trait;
use futures::FutureExt;
use log::{error, info};
use pingora_core::{server::ShutdownWatch, services::background::BackgroundService};

use crate::{
    core::{
        envelope::Lane,
        error::BridgeResult,
        traits::{DeliveryHandler, MessageBroker},
    },
    processing_error,
};

/// Runs a handler future, turning a panic into a processing error.
pub(crate) async fn guarded<F, T>(fut: F) -> BridgeResult<T>
where
    F: Future<Output = BridgeResult<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(processing_error!("handler panicked: {}", panic_message(&*panic))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

/// Background service owning one lane's consume loop.
pub struct LaneConsumer {
    lane: Lane,
    broker: Arc<dyn MessageBroker>,
    handler: Arc<dyn DeliveryHandler>,
}

impl LaneConsumer {
    pub fn new(
        lane: Lane,
        broker: Arc<dyn MessageBroker>,
        handler: Arc<dyn DeliveryHandler>,
    ) -> Self {
        Self {
            lane,
            broker,
            handler,
        }
    }

    pub fn lane(&self) -> Lane {
        self.lane
    }

    /// Consume until shutdown (`Ok`) or until the broker link is lost.
    /// There is no internal retry; a lost lane stays down.
    pub async fn run(&self, mut shutdown: ShutdownWatch) -> BridgeResult<()> {
        info!("Starting {} lane consumer", self.lane);
        tokio::select! {
            biased;
            _ = async {
                loop {
                    if shutdown.changed().await.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            } => {
                info!("Shutdown signal received, stopping {} lane consumer", self.lane);
                Ok(())
            }
            result = self.broker.consume(self.lane, self.handler.clone()) => result,
        }
    }
}

#[async_trait]
impl BackgroundService for LaneConsumer {
    async fn start(&self, shutdown: ShutdownWatch) {
        if let Err(e) = self.run(shutdown).await {
            error!("{} lane consumer stopped: {e}", self.lane);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Call-counting collaborator doubles shared by worker and
    //! orchestrator tests.

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::core::{
        envelope::Intent,
        error::{BridgeError, BridgeResult},
        traits::{ActionExecutor, ActionOutcome, Authorizer, Classification, Classifier, KnowledgeBase},
    };

    #[derive(Clone, Copy, PartialEq)]
    pub enum Behaviour {
        Normal,
        Fail,
        Panic,
    }

    pub struct StubClassifier {
        pub intent: Intent,
        pub confidence: f64,
        pub behaviour: Behaviour,
        pub classify_calls: AtomicUsize,
        pub generate_calls: AtomicUsize,
    }

    impl StubClassifier {
        pub fn new(intent: Intent, confidence: f64) -> Self {
            Self {
                intent,
                confidence,
                behaviour: Behaviour::Normal,
                classify_calls: AtomicUsize::new(0),
                generate_calls: AtomicUsize::new(0),
            }
        }

        pub fn with_behaviour(mut self, behaviour: Behaviour) -> Self {
            self.behaviour = behaviour;
            self
        }

        pub fn classify_calls(&self) -> usize {
            self.classify_calls.load(Ordering::SeqCst)
        }

        pub fn generate_calls(&self) -> usize {
            self.generate_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Classifier for StubClassifier {
        async fn classify(&self, _text: &str) -> BridgeResult<Classification> {
            self.classify_calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Normal => Ok(Classification::new(self.intent, self.confidence)),
                Behaviour::Fail => Err(BridgeError::Processing("model offline".to_string())),
                Behaviour::Panic => panic!("classifier exploded"),
            }
        }

        async fn generate_response(&self, text: &str, intent: Intent) -> BridgeResult<String> {
            self.generate_calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("generated {intent} reply to '{text}'"))
        }
    }

    pub struct StubKnowledge {
        pub answer: Option<String>,
        pub calls: AtomicUsize,
    }

    impl StubKnowledge {
        pub fn new(answer: Option<&str>) -> Self {
            Self {
                answer: answer.map(str::to_string),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl KnowledgeBase for StubKnowledge {
        async fn search(&self, _text: &str, _intent: Intent) -> BridgeResult<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.clone())
        }
    }

    /// Accepts `valid` and `orphan`; only `valid` maps to an identity.
    pub struct StubAuthorizer;

    impl Authorizer for StubAuthorizer {
        fn is_authorized(&self, token: &str) -> bool {
            matches!(token, "valid" | "orphan")
        }

        fn identity_from_token(&self, token: &str) -> Option<String> {
            (token == "valid").then(|| "alice".to_string())
        }
    }

    pub struct StubExecutor {
        pub calls: AtomicUsize,
    }

    impl StubExecutor {
        pub fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ActionExecutor for StubExecutor {
        async fn execute(
            &self,
            intent: Intent,
            _text: &str,
            identity: &str,
        ) -> BridgeResult<ActionOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ActionOutcome {
                message: format!("{intent} done for {identity}"),
                action: Some(intent.as_str().to_string()),
            })
        }
    }
}
