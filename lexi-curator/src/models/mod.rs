//! Data models for lexi-curator

pub mod batch;
pub mod candidate;
pub mod record;

pub use batch::{
    BatchConfig, BatchSession, BatchState, BatchSummary, InvalidTransition, StateTransition,
    VocabularyItem,
};
pub use candidate::{Candidate, NeutralReason, ScoreResult, ScoreSource, ScoredCandidate};
pub use record::{
    ActivityEntry, AuditAction, AuditEntry, CurationRecord, CurationStatus, LibraryStatistics,
    NewCandidateRecord, QueueEntry, QueueStats, QueueStatus, RecordFilter,
};
