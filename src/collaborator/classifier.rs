use async_trait::async_trait;
use log::debug;

use crate::core::{
    envelope::Intent,
    error::BridgeResult,
    traits::{Classification, Classifier},
};

/// Keyword group and the classification it yields, in priority order.
const RULES: &[(&[&str], Intent, f64)] = &[
    (
        &["delivery", "track", "card status", "when will i receive"],
        Intent::CheckDeliveryStatus,
        0.9,
    ),
    (
        &["block", "cancel", "disable", "deactivate"],
        Intent::BlockCard,
        0.9,
    ),
    (
        &["statement", "download", "bill", "invoice"],
        Intent::DownloadStatement,
        0.85,
    ),
    (
        &["emi", "installment", "convert", "pay in parts"],
        Intent::ConvertToEmi,
        0.9,
    ),
    (
        &["due", "overdue", "outstanding", "pending payment"],
        Intent::CheckDueAmount,
        0.9,
    ),
    (
        &["hello", "hi", "hey", "good morning", "good afternoon"],
        Intent::Greeting,
        0.95,
    ),
    (
        &["account", "limit", "balance", "credit limit"],
        Intent::AccountInfo,
        0.8,
    ),
    (
        &["transaction", "payment", "purchase", "failed"],
        Intent::TransactionQuery,
        0.8,
    ),
];

const FALLBACK_CONFIDENCE: f64 = 0.7;

/// Substring keyword classifier with canned replies.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedClassifier;

impl RuleBasedClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify_text(&self, text: &str) -> Classification {
        let lowered = text.to_lowercase();
        RULES
            .iter()
            .find(|(words, _, _)| words.iter().any(|w| lowered.contains(w)))
            .map(|(_, intent, confidence)| Classification::new(*intent, *confidence))
            .unwrap_or_else(|| Classification::new(Intent::KnowledgeQuery, FALLBACK_CONFIDENCE))
    }

    fn canned_reply(intent: Intent) -> &'static str {
        match intent {
            Intent::Greeting => {
                "Hello! I'm your credit card assistant. I can answer questions about your account, bills and repayments, or help you block a card, track a delivery and convert purchases to EMI."
            }
            Intent::AccountInfo => {
                "Your credit limit and available balance are shown under Account in the app. Ask me to check your dues for the latest figures."
            }
            Intent::TransactionQuery => {
                "Failed transactions are usually reversed within 5-7 working days. If a charge looks wrong, you can raise a dispute from the Transactions page."
            }
            Intent::BillQuery | Intent::DownloadStatement => {
                "Your monthly statement is generated on the billing date and can be downloaded once you are logged in."
            }
            Intent::RepaymentQuery | Intent::CheckDueAmount => {
                "You can repay through net banking, UPI or auto-debit. Paying the full amount by the due date avoids interest charges."
            }
            _ => {
                "I'm here to help with your credit card queries. Could you please rephrase your question?"
            }
        }
    }
}

#[async_trait]
impl Classifier for RuleBasedClassifier {
    async fn classify(&self, text: &str) -> BridgeResult<Classification> {
        let classification = self.classify_text(text);
        debug!(
            "Rule classifier picked {} ({:.2})",
            classification.intent, classification.confidence
        );
        Ok(classification)
    }

    async fn generate_response(&self, _text: &str, intent: Intent) -> BridgeResult<String> {
        Ok(Self::canned_reply(intent).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_priority() {
        let classifier = RuleBasedClassifier::new();
        let cases = [
            ("Please block my card", Intent::BlockCard, 0.9),
            ("track my card delivery", Intent::CheckDeliveryStatus, 0.9),
            ("download my statement", Intent::DownloadStatement, 0.85),
            ("convert this purchase to EMI", Intent::ConvertToEmi, 0.9),
            ("what is my overdue amount", Intent::CheckDueAmount, 0.9),
            ("hi there", Intent::Greeting, 0.95),
            ("what is my credit limit", Intent::AccountInfo, 0.8),
            ("my payment failed", Intent::TransactionQuery, 0.8),
            ("what are reward points", Intent::KnowledgeQuery, 0.7),
        ];
        for (text, intent, confidence) in cases {
            let c = classifier.classify_text(text);
            assert_eq!(c.intent, intent, "{text}");
            assert_eq!(c.confidence, confidence, "{text}");
        }
    }

    #[tokio::test]
    async fn test_generated_greeting() {
        let classifier = RuleBasedClassifier::new();
        let reply = classifier
            .generate_response("hi there", Intent::Greeting)
            .await
            .unwrap();
        assert!(reply.starts_with("Hello!"));

        let reply = classifier
            .generate_response("???", Intent::KnowledgeQuery)
            .await
            .unwrap();
        assert!(reply.contains("rephrase"));
    }
}
