pub mod follow_state;
pub mod keyword_rule;
pub mod organism;
pub mod organism_rule;
pub mod sector;
pub mod tender;

pub use follow_state::FollowState;
pub use keyword_rule::KeywordRule;
pub use organism::Organism;
pub use organism_rule::OrganismRule;
pub use sector::Sector;
pub use tender::{
    DetailCandidate, DetailRecord, ScoreCandidate, ScoreUpdate, Tender, TenderUpsert,
    ACTIVE_STATE_TEXTS, CLOSED_STATE_TEXT,
};
