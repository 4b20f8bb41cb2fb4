pub mod cache;
pub mod normalize;
pub mod score;
pub mod snapshot;

pub use cache::{RulesCache, RulesSource};
pub use normalize::normalize;
pub use score::{combine, score_phase1, score_phase2, Phase1Input, ScoreResult, REJECTED_SCORE, SECOND_CALL_BONUS};
pub use snapshot::{KeywordRule, OrganismRuleKind, RulesCacheSnapshot};
