pub mod game;
pub mod recommendation;
pub mod session;

pub use game::{parse_term_list, InstalledGame};
pub use recommendation::{
    LaunchRequest, Recommendation, RecommendationQuery, RecommendationResponse, ScoreBreakdown,
};
pub use session::{SessionEnd, SessionId, SessionRecord, SessionUpdateOutcome};
