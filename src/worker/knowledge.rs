use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info};

use super::guarded;
use crate::{
    core::{
        envelope::{RequestEnvelope, ResultEnvelope},
        error::BridgeResult,
        traits::{Classifier, DeliveryHandler, KnowledgeBase},
    },
    correlation::CorrelationStore,
};

const ERROR_RESPONSE: &str = "Sorry, I encountered an error processing your request.";

/// Answers informational requests from the knowledge lane.
pub struct KnowledgeWorker {
    classifier: Arc<dyn Classifier>,
    knowledge: Arc<dyn KnowledgeBase>,
    store: Arc<CorrelationStore>,
}

impl KnowledgeWorker {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        knowledge: Arc<dyn KnowledgeBase>,
        store: Arc<CorrelationStore>,
    ) -> Self {
        Self {
            classifier,
            knowledge,
            store,
        }
    }

    async fn answer(&self, envelope: &RequestEnvelope) -> BridgeResult<ResultEnvelope> {
        let classification = self.classifier.classify(&envelope.text).await?;
        debug!(
            "Knowledge request '{}' classified as {} ({:.2})",
            envelope.correlation_id, classification.intent, classification.confidence
        );

        let response = match self
            .knowledge
            .search(&envelope.text, classification.intent)
            .await?
        {
            Some(answer) => answer,
            None => {
                self.classifier
                    .generate_response(&envelope.text, classification.intent)
                    .await?
            }
        };

        Ok(ResultEnvelope::new(
            &envelope.correlation_id,
            response,
            classification.intent,
            classification.confidence,
        ))
    }
}

#[async_trait]
impl DeliveryHandler for KnowledgeWorker {
    async fn handle(&self, envelope: RequestEnvelope) -> BridgeResult<()> {
        info!("Processing knowledge request '{}'", envelope.correlation_id);
        let result = match guarded(self.answer(&envelope)).await {
            Ok(result) => result,
            Err(e) => {
                error!(
                    "Knowledge request '{}' failed: {e}",
                    envelope.correlation_id
                );
                ResultEnvelope::error(&envelope.correlation_id, ERROR_RESPONSE)
            }
        };
        self.store.put(result);
        Ok(())
    }
}
