//! Request orchestration
//!
//! Turns one synchronous chat request into a publish on the right lane
//! followed by a bounded wait for the matching result.

use std::{sync::Arc, time::Instant};

use log::{info, warn};
use once_cell::sync::Lazy;
use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};
use uuid::Uuid;

use super::router::LaneRouter;
use crate::{
    core::{
        envelope::{ChatRequest, ChatResponse, RequestEnvelope},
        error::{BridgeError, BridgeResult},
        traits::{Authorizer, MessageBroker},
    },
    correlation::{CorrelationStore, WaitPolicy},
};

static REQUEST_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "bridge_request_latency_ms",
        "Publish-to-result latency of answered requests in milliseconds",
        &["lane"],
        vec![5.0, 25.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap()
});

static REQUEST_TIMEOUTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "bridge_request_timeouts_total",
        "Requests whose wait deadline elapsed without a result",
        &["lane"]
    )
    .unwrap()
});

/// Publishes requests and waits for their results.
pub struct RequestOrchestrator {
    router: LaneRouter,
    broker: Arc<dyn MessageBroker>,
    store: Arc<CorrelationStore>,
    authorizer: Arc<dyn Authorizer>,
    policy: WaitPolicy,
}

impl RequestOrchestrator {
    pub fn new(
        router: LaneRouter,
        broker: Arc<dyn MessageBroker>,
        store: Arc<CorrelationStore>,
        authorizer: Arc<dyn Authorizer>,
        policy: WaitPolicy,
    ) -> Self {
        Self {
            router,
            broker,
            store,
            authorizer,
            policy,
        }
    }

    pub fn policy(&self) -> WaitPolicy {
        self.policy
    }

    /// Resolve the caller: a token that names an identity wins over the
    /// caller id supplied in the request body.
    fn caller_id(&self, request: &ChatRequest) -> String {
        request
            .token
            .as_deref()
            .and_then(|token| self.authorizer.identity_from_token(token))
            .unwrap_or_else(|| request.caller_id.clone())
    }

    pub async fn submit(&self, request: ChatRequest) -> BridgeResult<ChatResponse> {
        if request.message.trim().is_empty() {
            return Err(BridgeError::Validation("message must not be empty".to_string()));
        }

        let correlation_id = Uuid::new_v4().to_string();
        let lane = self.router.route(&request.message);
        let envelope = RequestEnvelope {
            correlation_id: correlation_id.clone(),
            caller_id: self.caller_id(&request),
            text: request.message,
            token: request.token,
            channel: request.channel,
        };

        let started = Instant::now();
        if !self.broker.publish(lane, &envelope).await {
            return Err(BridgeError::Transport(
                "Message queue service unavailable".to_string(),
            ));
        }

        match self.store.wait_for(&correlation_id, self.policy).await {
            Some(result) => {
                let elapsed = started.elapsed().as_secs_f64() * 1000.0;
                REQUEST_LATENCY
                    .with_label_values(&[lane.as_str()])
                    .observe(elapsed);
                info!(
                    correlation_id = correlation_id.as_str(), lane = lane.as_str();
                    "Request answered in {elapsed:.1}ms"
                );
                Ok(result.into())
            }
            None => {
                REQUEST_TIMEOUTS.with_label_values(&[lane.as_str()]).inc();
                warn!(
                    correlation_id = correlation_id.as_str(), lane = lane.as_str();
                    "Request timed out after {:?}",
                    self.policy.deadline
                );
                Err(BridgeError::Timeout(format!(
                    "no result for '{correlation_id}' within {:?}",
                    self.policy.deadline
                )))
            }
        }
    }
}
