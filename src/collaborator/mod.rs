//! Reference collaborators
//!
//! Simple implementations of the classifier, knowledge base, authorizer
//! and action executor seams so the bridge runs end to end. Production
//! deployments swap these for model-backed or remote services.

pub mod action;
pub mod auth;
pub mod classifier;
pub mod knowledge;

pub use action::MockActionExecutor;
pub use auth::{DenyAllAuthorizer, JwtAuthorizer};
pub use classifier::RuleBasedClassifier;
pub use knowledge::FileKnowledgeBase;
