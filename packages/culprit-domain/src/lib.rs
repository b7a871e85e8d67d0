pub mod adjust;
pub mod mapping;
pub mod model;
pub mod normalize;
pub mod planner;
pub mod ranking;
pub mod scoring;
pub mod time_serde;

pub use adjust::{Adjustment, AppliedAdjustment};
pub use mapping::MappingSnapshot;
pub use model::{
	Candidate, Incident, LiveInterval, OrgInfo, RawComment, RawRecord, SearchOptions,
	TimelineEntry,
};
pub use normalize::Normalizer;
pub use planner::{PlannedQuery, QueryKind, plan_queries};
pub use ranking::{RankingItem, SubScores, normalize_weights, rank_candidates, score_candidate};
pub use scoring::SubScore;
