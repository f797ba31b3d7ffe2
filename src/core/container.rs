//! Dependency injection container
//!
//! Owns the correlation store, the broker and the collaborators, and
//! hands out the orchestrator and the lane services wired to them. No
//! component reaches for a global.

use std::sync::Arc;

use log::{info, warn};

use super::{
    error::BridgeResult,
    status::{Readiness, ReadySource},
    traits::{ActionExecutor, Authorizer, Classifier, KnowledgeBase, MessageBroker},
    Lane,
};
use crate::{
    broker::{AmqpBroker, MemoryBroker, Topology},
    collaborator::{
        DenyAllAuthorizer, FileKnowledgeBase, JwtAuthorizer, MockActionExecutor,
        RuleBasedClassifier,
    },
    config::{self, BrokerKind, Config},
    correlation::{CorrelationReaper, CorrelationStore},
    orchestration::{LaneRouter, RequestOrchestrator},
    worker::{ActionWorker, KnowledgeWorker, LaneConsumer},
};

/// Collaborators plugged into the lanes.
pub struct Collaborators {
    pub classifier: Arc<dyn Classifier>,
    pub knowledge: Arc<dyn KnowledgeBase>,
    pub authorizer: Arc<dyn Authorizer>,
    pub executor: Arc<dyn ActionExecutor>,
}

impl Collaborators {
    /// Reference implementations configured from `cfg`.
    pub fn from_config(cfg: &Config) -> BridgeResult<Self> {
        let authorizer: Arc<dyn Authorizer> = match &cfg.auth {
            Some(auth) => Arc::new(JwtAuthorizer::new(auth)?),
            None => {
                warn!("No auth section configured, every action request will be refused");
                Arc::new(DenyAllAuthorizer)
            }
        };

        Ok(Self {
            classifier: Arc::new(RuleBasedClassifier::new()),
            knowledge: Arc::new(FileKnowledgeBase::load(&cfg.knowledge.dir)),
            authorizer,
            executor: Arc::new(MockActionExecutor::new()),
        })
    }
}

/// Main dependency injection container
pub struct BridgeContainer {
    store: Arc<CorrelationStore>,
    broker: Arc<dyn MessageBroker>,
    ready_source: ReadySource,
    collaborators: Collaborators,
    orchestrator: Arc<RequestOrchestrator>,
    readiness: Readiness,
    correlation: config::Correlation,
}

impl BridgeContainer {
    pub fn from_config(cfg: &Config) -> BridgeResult<Self> {
        let (broker, ready_source): (Arc<dyn MessageBroker>, _) = match cfg.broker.kind {
            BrokerKind::Amqp => (Arc::new(AmqpBroker::new(&cfg.broker)), ReadySource::Amqp),
            BrokerKind::Memory => (
                Arc::new(MemoryBroker::new(Topology::from(&cfg.broker))),
                ReadySource::Memory,
            ),
        };

        Ok(Self::with_components(
            broker,
            ready_source,
            Collaborators::from_config(cfg)?,
            LaneRouter::new(&cfg.routing.action_keywords)?,
            cfg.correlation.clone(),
        ))
    }

    /// Create a container with custom components
    pub fn with_components(
        broker: Arc<dyn MessageBroker>,
        ready_source: ReadySource,
        collaborators: Collaborators,
        router: LaneRouter,
        correlation: config::Correlation,
    ) -> Self {
        let store = Arc::new(CorrelationStore::new());
        let orchestrator = Arc::new(RequestOrchestrator::new(
            router,
            broker.clone(),
            store.clone(),
            collaborators.authorizer.clone(),
            correlation.wait_policy(),
        ));

        Self {
            store,
            broker,
            ready_source,
            collaborators,
            orchestrator,
            readiness: Readiness::new(),
            correlation,
        }
    }

    pub fn store(&self) -> Arc<CorrelationStore> {
        self.store.clone()
    }

    pub fn broker(&self) -> Arc<dyn MessageBroker> {
        self.broker.clone()
    }

    pub fn orchestrator(&self) -> Arc<RequestOrchestrator> {
        self.orchestrator.clone()
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness.clone()
    }

    /// Declare the exchange and queues, flipping readiness on success.
    pub async fn declare_topology(&self) -> BridgeResult<()> {
        match self.broker.declare_topology().await {
            Ok(()) => {
                self.readiness.mark_ready(self.ready_source);
                Ok(())
            }
            Err(e) => {
                self.readiness.mark_unavailable(&e.to_string());
                Err(e)
            }
        }
    }

    pub fn knowledge_consumer(&self) -> LaneConsumer {
        let worker = KnowledgeWorker::new(
            self.collaborators.classifier.clone(),
            self.collaborators.knowledge.clone(),
            self.store.clone(),
        );
        LaneConsumer::new(Lane::Knowledge, self.broker.clone(), Arc::new(worker))
    }

    pub fn action_consumer(&self) -> LaneConsumer {
        let worker = ActionWorker::new(
            self.collaborators.authorizer.clone(),
            self.collaborators.classifier.clone(),
            self.collaborators.executor.clone(),
            self.store.clone(),
        );
        LaneConsumer::new(Lane::Action, self.broker.clone(), Arc::new(worker))
    }

    pub fn reaper(&self) -> CorrelationReaper {
        info!(
            "Correlation window {}ms, reaping every {}ms",
            self.correlation.deadline_ms, self.correlation.reap_interval_ms
        );
        CorrelationReaper::new(
            self.store.clone(),
            self.correlation.reap_window(),
            self.correlation.reap_interval(),
        )
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::watch;

    use super::*;
    use crate::{
        collaborator::action::CardStatus,
        core::envelope::{ChatRequest, Intent},
    };

    const SECRET: &str = "scenario-secret";

    fn test_config() -> Config {
        Config::from_yaml(&format!(
            r#"
---
broker:
  kind: memory
correlation:
  deadline_ms: 2000
  poll_interval_ms: 50
auth:
  secret: {SECRET}
knowledge:
  dir: /nonexistent/lanebridge-kb
"#
        ))
        .unwrap()
    }

    struct Harness {
        container: BridgeContainer,
        broker: Arc<MemoryBroker>,
        executor: Arc<MockActionExecutor>,
        authorizer: Arc<JwtAuthorizer>,
        shutdown: watch::Sender<bool>,
    }

    async fn harness() -> Harness {
        let _ = env_logger::builder().is_test(true).try_init();
        let cfg = test_config();
        let broker = Arc::new(MemoryBroker::default());
        let executor = Arc::new(MockActionExecutor::new());
        let authorizer = Arc::new(JwtAuthorizer::new(cfg.auth.as_ref().unwrap()).unwrap());
        let collaborators = Collaborators {
            classifier: Arc::new(RuleBasedClassifier::new()),
            knowledge: Arc::new(FileKnowledgeBase::load(&cfg.knowledge.dir)),
            authorizer: authorizer.clone(),
            executor: executor.clone(),
        };
        let container = BridgeContainer::with_components(
            broker.clone(),
            ReadySource::Memory,
            collaborators,
            LaneRouter::default(),
            cfg.correlation.clone(),
        );

        container.declare_topology().await.unwrap();
        let (shutdown, rx) = watch::channel(false);
        for consumer in [container.knowledge_consumer(), container.action_consumer()] {
            let rx = rx.clone();
            tokio::spawn(async move { consumer.run(rx).await });
        }

        Harness {
            container,
            broker,
            executor,
            authorizer,
            shutdown,
        }
    }

    #[tokio::test]
    async fn test_from_config_builds_memory_bridge() {
        let container = BridgeContainer::from_config(&test_config()).unwrap();
        assert!(!container.readiness().is_ready());
        container.declare_topology().await.unwrap();
        assert!(container.readiness().is_ready());
        assert_eq!(container.orchestrator().policy().deadline.as_millis(), 2000);
    }

    #[tokio::test]
    async fn test_authorized_block_card() {
        let h = harness().await;
        let token = h.authorizer.issue_token("default_user").unwrap();

        let response = h
            .container
            .orchestrator()
            .submit(ChatRequest::new("Please block my card").with_token(token))
            .await
            .unwrap();

        assert_eq!(response.intent, Intent::BlockCard);
        assert_eq!(response.action_taken.as_deref(), Some("BLOCK_CARD"));
        assert_eq!(response.confidence, 0.9);
        assert_eq!(
            h.executor.account("default_user").unwrap().card_status,
            CardStatus::Blocked
        );
        assert!(h.container.store().is_empty());
        h.shutdown.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_unauthenticated_action_is_refused() {
        let h = harness().await;

        let response = h
            .container
            .orchestrator()
            .submit(ChatRequest::new("block my card"))
            .await
            .unwrap();

        assert_eq!(response.intent, Intent::AuthorizationRequired);
        assert_eq!(response.confidence, 1.0);
        assert_eq!(response.action_taken, None);
        assert_eq!(
            h.executor.account("default_user").unwrap().card_status,
            CardStatus::Active
        );
        h.shutdown.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_greeting_on_knowledge_lane() {
        let h = harness().await;

        let response = h
            .container
            .orchestrator()
            .submit(ChatRequest::new("hi there"))
            .await
            .unwrap();

        assert_eq!(response.intent, Intent::Greeting);
        assert_eq!(response.confidence, 0.95);
        assert_eq!(response.action_taken, None);
        assert!(response.response.starts_with("Hello!"));
        assert_eq!(h.broker.acked(Lane::Knowledge), 1);
        assert_eq!(h.broker.acked(Lane::Action), 0);
        h.shutdown.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_broker_unreachable() {
        let h = harness().await;
        h.broker.disconnect();

        let err = h
            .container
            .orchestrator()
            .submit(ChatRequest::new("block my card"))
            .await
            .unwrap_err();

        assert!(err.is_transport());
        assert!(h.container.store().is_empty());
        assert!(h.container.declare_topology().await.is_err());
        assert!(!h.container.readiness().is_ready());
    }
}
