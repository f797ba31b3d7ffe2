//! Synchronous request bridge over a publish/subscribe broker.
//!
//! Callers submit a chat request and block for its answer while the
//! request travels through one of two broker lanes: knowledge for
//! informational questions, action for side-effecting operations.
//! Results come back through an in-process correlation store.

pub mod broker;
pub mod collaborator;
pub mod config;
pub mod core;
pub mod correlation;
pub mod logging;
pub mod orchestration;
pub mod service;
pub(crate) mod utils;
pub mod worker;
