//! Coverage Controller
//!
//! Drives composite scoring across the whole entity universe in bounded
//! batches, loosening history requirements pass by pass until no more
//! entities become scoreable. Rankings are computed once every pass has
//! finished, over the complete set of scores.

pub mod audit;
pub mod controller;
pub mod policy;
pub mod summary;

pub use audit::{audit_scores, ScoreAudit};
pub use controller::CoverageController;
pub use policy::RelaxationPolicy;
pub use summary::{CoverageSummary, PassSummary, Termination};
