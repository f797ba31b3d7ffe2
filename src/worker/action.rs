use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info, warn};

use super::guarded;
use crate::{
    core::{
        envelope::{RequestEnvelope, ResultEnvelope},
        error::BridgeResult,
        traits::{ActionExecutor, Authorizer, Classifier, DeliveryHandler},
    },
    correlation::CorrelationStore,
};

const LOGIN_REQUIRED: &str =
    "You need to be authorized to perform this action. Please signup or login first.";
const INVALID_TOKEN: &str = "Invalid authentication token. Please login again.";
const NOT_AN_ACTION: &str =
    "This appears to be a knowledge query. Please use the knowledge base chat.";
const ERROR_RESPONSE: &str = "Sorry, I encountered an error processing your action.";

/// Executes side-effecting requests from the action lane.
///
/// Nothing reaches the classifier or the executor until the envelope's
/// token has been verified and resolved to an identity.
pub struct ActionWorker {
    authorizer: Arc<dyn Authorizer>,
    classifier: Arc<dyn Classifier>,
    executor: Arc<dyn ActionExecutor>,
    store: Arc<CorrelationStore>,
}

impl ActionWorker {
    pub fn new(
        authorizer: Arc<dyn Authorizer>,
        classifier: Arc<dyn Classifier>,
        executor: Arc<dyn ActionExecutor>,
        store: Arc<CorrelationStore>,
    ) -> Self {
        Self {
            authorizer,
            classifier,
            executor,
            store,
        }
    }

    fn gate(&self, envelope: &RequestEnvelope) -> Result<String, ResultEnvelope> {
        let id = &envelope.correlation_id;
        let token = match envelope.token.as_deref() {
            Some(token) if self.authorizer.is_authorized(token) => token,
            _ => {
                warn!("Unauthorized action request '{id}'");
                return Err(ResultEnvelope::authorization_required(id, LOGIN_REQUIRED));
            }
        };

        self.authorizer.identity_from_token(token).ok_or_else(|| {
            warn!("Token on action request '{id}' carries no identity");
            ResultEnvelope::authorization_required(id, INVALID_TOKEN)
        })
    }

    async fn act(&self, envelope: &RequestEnvelope, identity: &str) -> BridgeResult<ResultEnvelope> {
        let classification = self.classifier.classify(&envelope.text).await?;
        let id = &envelope.correlation_id;

        if !classification.intent.is_action() {
            info!(
                "Action request '{id}' classified as {}, deflecting",
                classification.intent
            );
            return Ok(ResultEnvelope::new(
                id,
                NOT_AN_ACTION,
                classification.intent,
                classification.confidence,
            ));
        }

        let outcome = self
            .executor
            .execute(classification.intent, &envelope.text, identity)
            .await?;
        info!(
            "Executed {} for '{identity}' on request '{id}'",
            classification.intent
        );
        Ok(ResultEnvelope::new(
            id,
            outcome.message,
            classification.intent,
            classification.confidence,
        )
        .with_action(outcome.action))
    }
}

#[async_trait]
impl DeliveryHandler for ActionWorker {
    async fn handle(&self, envelope: RequestEnvelope) -> BridgeResult<()> {
        info!("Processing action request '{}'", envelope.correlation_id);
        let result = match self.gate(&envelope) {
            Err(denied) => denied,
            Ok(identity) => match guarded(self.act(&envelope, &identity)).await {
                Ok(result) => result,
                Err(e) => {
                    error!("Action request '{}' failed: {e}", envelope.correlation_id);
                    ResultEnvelope::error(&envelope.correlation_id, ERROR_RESPONSE)
                }
            },
        };
        self.store.put(result);
        Ok(())
    }
}
