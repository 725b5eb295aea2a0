//! Recovery retry policies.
//!
//! Groups the knobs used by [`Orchestrator::recover`](crate::Orchestrator::recover)
//! when it restarts a FAILED service.
//!
//! ## Contents
//! - [`RecoveryPolicy`] how many attempts and which backoff to use
//! - [`BackoffPolicy`] how the delay between attempts grows (first / factor / max + jitter)
//! - [`JitterPolicy`] randomization so several recovering services do not retry in lockstep
//!
//! ```text
//! recover(name)
//!   attempt 0 ──fail──► sleep(backoff.next(0)) ──► attempt 1 ──fail──► sleep(backoff.next(1)) ...
//!   stops after max_attempts, on success, on a Fatal error, or when the runtime is cancelled
//! ```

mod backoff;
mod jitter;
mod recovery;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use recovery::RecoveryPolicy;
