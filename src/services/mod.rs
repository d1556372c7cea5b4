pub mod bandit;
pub mod context;
pub mod diversifier;
pub mod persistence;
pub mod providers;
pub mod ranker;
pub mod recommendations;
pub mod reward;
pub mod trainer;
pub mod vocabulary;

pub use recommendations::{EngineSettings, LoadReport, RecommendationEngine};
