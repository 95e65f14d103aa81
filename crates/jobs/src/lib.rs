//! Dataset-to-story jobs: the lifecycle state machine and its result artifact.
//!
//! ## Design
//!
//! - A job is created in `processing` and leaves it only through a
//!   [`JobTransition`] applied by [`Job::apply`]
//! - `completed` is terminal; `failed` is terminal but retriable, and a retry
//!   re-enters `processing` on the same job id
//! - Every transition checks the current status before mutating, so stores can
//!   serialize writes per job and run the same check under their lock
//! - Duplicate terminal signals are reported as [`TransitionOutcome::Duplicate`]
//!   so callers can skip side effects
//!
//! ## Components
//!
//! - `Job`: the durable job record
//! - `JobTransition`: every mutation a job can undergo
//! - `RetryPolicy`: the attempt ceiling
//! - `Story`: the artifact created once per completed job
//! - `JobStatusView`: read-only projection for polling clients

pub mod code;
pub mod job;
pub mod retry;
pub mod source;
pub mod story;
pub mod transition;
pub mod view;

pub use code::ErrorCode;
pub use job::{AttemptOutcome, AttemptRecord, Job, JobError, JobStatus, Stage};
pub use retry::RetryPolicy;
pub use source::{DatasetFormat, SourceHandle};
pub use story::{CompletionPayload, DatasetMetadata, Narratives, Story};
pub use transition::{DiscardReason, JobTransition, TransitionError, TransitionOutcome};
pub use view::JobStatusView;
