//! Trust scoring for inbound tracking events
//!
//! [`TrustScorer`] is a pure function of the request context: no I/O, no
//! shared state, and missing inputs simply contribute nothing. It is safe to
//! call from any number of concurrent event handlers.

mod scorer;

pub use scorer::{TrustAction, TrustAssessment, TrustScorer};
