//! Bidirectional contact sync
//!
//! The engine orchestrates import (external to local) and export (local
//! to external) phases across all connected accounts, with conflict
//! detection, archive-before-delete, and per-account failure isolation.

mod archive;
mod conflict;
mod engine;
mod google;
mod nicknames;
mod notes;
mod scheduler;
mod source;

pub use archive::ArchiveManager;
pub use conflict::{plan_merge, MergePlan};
pub use engine::{PhaseResult, ReviewResolution, SyncEngine, SyncReport};
pub use google::{GooglePeopleSource, GoogleSourceFactory};
pub use nicknames::{given_names_equivalent, names_equivalent, normalize_name};
pub use notes::{merge_external_note, provenance_tag, truncate_for_remote};
pub use scheduler::{due_slot, next_run_times, Scheduler};
pub use source::{
    call_with_retry, ContactPayload, ContactSource, ExternalContact, RetryPolicy, SourceError,
    SourceFactory,
};
