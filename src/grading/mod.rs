//! Grade aggregation
//!
//! `calc` holds the arithmetic, `engine` applies it to stored scores.

pub mod calc;
pub mod engine;

pub use calc::{GradingPolicy, WeightedScore};
pub use engine::{CriterionBreakdown, GradeEngine, RecalculationSummary};
