use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;

use crate::core::{envelope::Intent, error::BridgeResult, traits::KnowledgeBase};

/// Category files in scan order.
pub const CATEGORIES: &[&str] = &[
    "account",
    "delivery",
    "transactions",
    "bills",
    "repayments",
    "collections",
];

const MIN_TOKEN_CHARS: usize = 3;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub faqs: Vec<Faq>,
    #[serde(default)]
    pub topics: Vec<Topic>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Faq {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Topic {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// FAQ lookup over the JSON category files in a directory.
#[derive(Debug, Default)]
pub struct FileKnowledgeBase {
    categories: Vec<(String, Category)>,
}

fn category_for(intent: Intent) -> Option<&'static str> {
    match intent {
        Intent::AccountInfo => Some("account"),
        Intent::CheckDeliveryStatus => Some("delivery"),
        Intent::TransactionQuery => Some("transactions"),
        Intent::BillQuery => Some("bills"),
        Intent::RepaymentQuery => Some("repayments"),
        Intent::CheckDueAmount => Some("collections"),
        _ => None,
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_lowercase)
}

impl FileKnowledgeBase {
    /// Load every known category file under `dir`. Missing or broken
    /// files are skipped with a warning.
    pub fn load<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        let mut categories = Vec::new();

        for name in CATEGORIES {
            let path: PathBuf = dir.join(format!("{name}.json"));
            let raw = match fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(_) => {
                    warn!("Knowledge base file not found: {}", path.display());
                    continue;
                }
            };
            match serde_json::from_str::<Category>(&raw) {
                Ok(category) => {
                    info!("Loaded knowledge base: {name}.json");
                    categories.push((name.to_string(), category));
                }
                Err(e) => warn!("Skipping malformed knowledge base file {}: {e}", path.display()),
            }
        }

        Self { categories }
    }

    pub fn from_categories(categories: Vec<(String, Category)>) -> Self {
        Self { categories }
    }

    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|(name, _)| name.as_str())
    }

    fn category(&self, name: &str) -> Option<&Category> {
        self.categories
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    fn search_category(category: &Category, query: &HashSet<String>) -> Option<String> {
        let hit = |text: &str| tokens(text).any(|t| query.contains(&t));

        category
            .faqs
            .iter()
            .find(|faq| hit(&faq.question))
            .map(|faq| faq.answer.clone())
            .or_else(|| {
                category
                    .topics
                    .iter()
                    .find(|topic| hit(&topic.name))
                    .map(|topic| topic.description.clone())
            })
    }

    pub fn lookup(&self, text: &str, intent: Intent) -> Option<String> {
        let query: HashSet<String> = tokens(text).collect();
        if query.is_empty() {
            return None;
        }

        if let Some(category) = category_for(intent).and_then(|name| self.category(name)) {
            return Self::search_category(category, &query);
        }

        self.categories
            .iter()
            .find_map(|(_, category)| Self::search_category(category, &query))
    }
}

#[async_trait]
impl KnowledgeBase for FileKnowledgeBase {
    async fn search(&self, text: &str, intent: Intent) -> BridgeResult<Option<String>> {
        let answer = self.lookup(text, intent);
        debug!(
            "Knowledge lookup for {intent}: {}",
            if answer.is_some() { "hit" } else { "miss" }
        );
        Ok(answer)
    }
}
