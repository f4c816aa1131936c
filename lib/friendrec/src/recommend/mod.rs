//! People-you-may-know by mutual friend count.
//!
//! The map side ([`emit::CandidateEmitter`]) turns each edge-list line into
//! [`record::FriendRecord`]s keyed by the user they concern. The reduce side
//! ([`reduce::RecommendationReducer`]) folds one user's records into a
//! [`reduce::CandidateTally`] and ranks the survivors. Neither side depends on
//! the engine that moves records between them.

pub mod emit;
pub mod parse;
pub mod record;
pub mod reduce;

pub use emit::{emit_candidates, CandidateEmitter, ParsePolicy};
pub use parse::{parse_line, EdgeLine};
pub use record::{FriendRecord, MutualMarker, UserId};
pub use reduce::{
    recommend_for, CandidateTally, RankedCandidate, Recommendation, RecommendationReducer, TallyEntry,
    DEFAULT_MAX_RECOMMENDATIONS,
};
