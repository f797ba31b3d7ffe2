//! Core abstractions for the bridge
//!
//! Wire types, the error taxonomy, readiness state, the dependency
//! container and the traits that decouple workers from their
//! collaborators.

pub mod container;
pub mod envelope;
pub mod error;
pub mod status;
pub mod traits;

pub use container::BridgeContainer;
pub use envelope::{ChatRequest, ChatResponse, Intent, Lane, RequestEnvelope, ResultEnvelope};
pub use error::{BridgeError, BridgeResult};
pub use status::{Readiness, ReadySource};
pub use traits::*;
