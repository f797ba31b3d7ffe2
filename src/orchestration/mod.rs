//! Request orchestration layer
//!
//! Lane routing plus the publish-and-wait flow that sits behind the
//! synchronous front door.

pub mod executor;
pub mod router;

pub use executor::RequestOrchestrator;
pub use router::LaneRouter;
