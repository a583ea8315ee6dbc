pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod server;
pub mod utils;

pub use config::{BackendKind, GatewayConfig, ModerationOptions, Settings};
pub use crate::core::{analyzer::Analyzer, batch::BatchCoordinator, verdict::ScoreTable};
pub use domain::model::{AnalysisResult, MessageOutcome, RiskDimension, RiskScores};
pub use domain::ports::BackendAdapter;
pub use utils::error::{BackendError, GatewayError, Result};
