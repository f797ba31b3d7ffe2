//! Core traits for bridge components
//!
//! The broker and the four collaborators sit behind these interfaces so
//! lane workers and the orchestrator never depend on a concrete transport,
//! model or identity provider.

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    envelope::{Intent, Lane, RequestEnvelope},
    error::BridgeResult,
};

/// Intent and confidence produced by a classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f64,
}

impl Classification {
    pub fn new(intent: Intent, confidence: f64) -> Self {
        Self { intent, confidence }
    }
}

/// Message and action tag returned by an action executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub message: String,
    pub action: Option<String>,
}

/// Resolves the intent of a request and generates free-form answers.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> BridgeResult<Classification>;

    async fn generate_response(&self, text: &str, intent: Intent) -> BridgeResult<String>;
}

/// Canned answer lookup.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn search(&self, text: &str, intent: Intent) -> BridgeResult<Option<String>>;
}

/// Token verification.
pub trait Authorizer: Send + Sync {
    fn is_authorized(&self, token: &str) -> bool;

    fn identity_from_token(&self, token: &str) -> Option<String>;
}

/// Side-effecting business actions.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(
        &self,
        intent: Intent,
        text: &str,
        identity: &str,
    ) -> BridgeResult<ActionOutcome>;
}

/// Processes one decoded delivery. Returning `Ok` acknowledges it.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, envelope: RequestEnvelope) -> BridgeResult<()>;
}

/// Exchange/queue contract plus publish and per-lane consume primitives.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Declare the exchange and both queues and bind them. Idempotent.
    async fn declare_topology(&self) -> BridgeResult<()>;

    /// Publish an envelope on a lane. Never errors; `false` means the
    /// broker could not be reached even after one reconnect attempt.
    async fn publish(&self, lane: Lane, envelope: &RequestEnvelope) -> bool;

    /// Drain a lane with one outstanding delivery at a time. Only returns
    /// when the lane's connection is lost.
    async fn consume(&self, lane: Lane, handler: Arc<dyn DeliveryHandler>) -> BridgeResult<()>;
}
