pub mod analyzer;
pub mod batch;
pub mod verdict;

pub use crate::domain::model::{AnalysisResult, MessageOutcome, RiskScores};
pub use crate::domain::ports::BackendAdapter;
pub use crate::utils::error::Result;
