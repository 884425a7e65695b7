//! Error types surfaced to the caller.
//!
//! Only configuration errors, mesh-conformity errors, and worker failures
//! abort a batch. Per-photon numeric faults and detector-buffer overflow
//! are recovered locally and reported as counts in
//! [`SimOutput`](crate::dispatch::SimOutput).

use thiserror::Error;

/// Batch-level failure.
#[derive(Debug, Error)]
pub enum SimError {
  /// Invalid configuration, detected before dispatch.
  #[error("invalid configuration: {0}")]
  Config(String),

  /// Mesh tables violate a structural invariant.
  #[error("mesh error: {0}")]
  Mesh(String),

  /// A worker died mid-batch; the error flag was raised and the batch
  /// aborted at the reduction barrier.
  #[error("worker failed: {0}")]
  Worker(String),
}
