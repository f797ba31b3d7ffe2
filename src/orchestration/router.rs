//! Lane routing
//!
//! Classifies request text into a processing lane by scanning an ordered
//! keyword list. The scan is pure: no caller identity, time or state
//! influences the decision.

use log::info;

use crate::core::{
    envelope::Lane,
    error::{BridgeError, BridgeResult},
};

/// Action-indicating keywords in priority order.
pub const DEFAULT_ACTION_KEYWORDS: &[&str] = &[
    "block",
    "cancel",
    "disable",
    "deactivate",
    "delivery",
    "track",
    "status",
    "emi",
    "installment",
    "convert",
    "statement",
    "download",
    "bill",
    "due",
    "overdue",
    "outstanding",
];

const LOG_PREVIEW_CHARS: usize = 50;

/// Keyword router deciding between the action and knowledge lanes
#[derive(Debug, Clone)]
pub struct LaneRouter {
    keywords: Vec<String>,
}

impl Default for LaneRouter {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_ACTION_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

impl LaneRouter {
    /// Build a router from a custom keyword list; order is the tie-break.
    pub fn new<I, S>(keywords: I) -> BridgeResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        if keywords.is_empty() {
            return Err(BridgeError::Configuration(
                "at least one action keyword is required".to_string(),
            ));
        }

        Ok(Self { keywords })
    }

    /// First keyword found in `text`, if any.
    pub fn matched_keyword(&self, text: &str) -> Option<&str> {
        let lowered = text.to_lowercase();
        self.keywords
            .iter()
            .find(|keyword| lowered.contains(keyword.as_str()))
            .map(String::as_str)
    }

    pub fn route(&self, text: &str) -> Lane {
        let preview: String = text.chars().take(LOG_PREVIEW_CHARS).collect();
        match self.matched_keyword(text) {
            Some(keyword) => {
                info!("Message routed to action lane on '{keyword}': {preview}");
                Lane::Action
            }
            None => {
                info!("Message routed to knowledge lane: {preview}");
                Lane::Knowledge
            }
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_keywords_select_action_lane() {
        let router = LaneRouter::default();
        assert_eq!(router.route("please block my card"), Lane::Action);
        assert_eq!(router.route("Where is my DELIVERY?"), Lane::Action);
        assert_eq!(router.route("convert it to EMI"), Lane::Action);
    }

    #[test]
    fn test_no_keyword_selects_knowledge_lane() {
        let router = LaneRouter::default();
        assert_eq!(router.route("hi there"), Lane::Knowledge);
        assert_eq!(router.route("what is a credit limit?"), Lane::Knowledge);
        assert_eq!(router.route(""), Lane::Knowledge);
    }

    #[test]
    fn test_route_is_deterministic() {
        let router = LaneRouter::default();
        let texts = ["track my statement", "hello", "what is overdue interest"];
        for text in texts {
            let first = router.route(text);
            for _ in 0..10 {
                assert_eq!(router.route(text), first);
            }
        }
    }

    #[test]
    fn test_keyword_order_is_priority() {
        let router = LaneRouter::default();
        // "statement" and "download" both match, "statement" comes first
        assert_eq!(
            router.matched_keyword("download my statement"),
            Some("statement")
        );
        // substring match: "due" inside "overdue" loses to nothing earlier
        assert_eq!(router.matched_keyword("overdue amount"), Some("due"));
    }

    #[test]
    fn test_custom_keywords() {
        let router = LaneRouter::new(["  Refund ", "dispute"]).unwrap();
        assert_eq!(router.keywords(), &["refund".to_string(), "dispute".to_string()]);
        assert_eq!(router.route("I want a REFUND"), Lane::Action);
        assert_eq!(router.route("block my card"), Lane::Knowledge);
    }

    #[test]
    fn test_empty_keywords_rejected() {
        assert!(LaneRouter::new(Vec::<String>::new()).is_err());
        assert!(LaneRouter::new(["   "]).is_err());
    }
}
