//! Core domain types for fund evaluation.

pub mod fund;
pub mod portfolio;
pub mod score;
pub mod series;

pub use fund::*;
pub use portfolio::*;
pub use score::*;
pub use series::*;
