//! Shared constants for the transport core.
//!
//! Physical constants use millimeters and seconds throughout: optical
//! coefficients are 1/mm, positions are mm, times are seconds.
//!
//! # Face Convention
//!
//! ```text
//! Element node order is canonicalized so the signed volume
//! det[v1-v0, v2-v0, v3-v0] is positive. Face f is opposite node f:
//!
//!   face 0 = (1, 2, 3)     face 2 = (0, 1, 3)
//!   face 1 = (0, 3, 2)     face 3 = (0, 2, 1)
//!
//! Each triple is wound counter-clockwise seen from OUTSIDE the tet, so
//! cross(b - a, c - a) is the outward face normal. With plane offset
//! d = n . a, a point p strictly inside satisfies d - n . p > 0 on all
//! four faces, and barycentric coordinates fall out of the four plane
//! evaluations directly.
//! ```

/// Speed of light in vacuum, mm/s.
pub const C0_MM_PER_S: f64 = 299_792_458_000.0;

/// Reciprocal speed of light, s/mm.
pub const R_C0: f64 = 1.0 / C0_MM_PER_S;

/// Distance epsilon for face-hit tests (mm). Exit distances at or below
/// this are treated as "re-entering the face just crossed" and ignored.
pub const EPS_RAY: f64 = 1e-9;

/// Generic small epsilon for direction/anisotropy degeneracy tests.
pub const EPS: f64 = 1e-6;

/// Offset added to uniform draws before taking -ln to avoid ln(0).
pub const EPS_LOG: f64 = 1e-20;

/// Margin subtracted from the time window end when clipping a move, so a
/// clipped photon never lands exactly on t1.
pub const TIME_CLIP_MARGIN: f64 = 1e-15;

/// Barycentric tolerance for the enclosing-element test at launch.
pub const BARY_TOLERANCE: f64 = 1e-4;

/// Fraction of the photon-to-centroid distance used to nudge a photon
/// with a degenerate intersection back toward the element interior.
pub const FIX_PHOTON: f64 = 1e-3;

/// Maximum nudge-and-retrace attempts before a photon is marked errored.
pub const MAX_TRACE_RETRIES: u32 = 3;

/// Local node indices of each face, wound CCW seen from outside.
/// Face f is opposite node f (see module docs).
pub const FACE_NODES: [[usize; 3]; 4] = [[1, 2, 3], [0, 3, 2], [0, 1, 3], [0, 2, 1]];

/// Face index used to mark "no face" (fresh launch or scatter end).
pub const FACE_NONE: i32 = -1;

/// Face index used to mark a time-window exit.
pub const FACE_TIME_EXIT: i32 = -2;

/// Per-photon debug event bitmask. Matching events are emitted through
/// `tracing::trace!` when the corresponding bit is set in
/// [`SimConfig::debug`](crate::config::SimConfig).
pub mod debug {
  /// Photon moves (one event per step).
  pub const MOVE: u32 = 1;
  /// Ray/tet intersection results.
  pub const RAY_POLY: u32 = 2;
  /// Barycentric coordinates at launch.
  pub const BARY: u32 = 4;
  /// Weight updates.
  pub const WEIGHT: u32 = 8;
  /// Distances at face crossings.
  pub const DIST: u32 = 16;
  /// Photon entering an element.
  pub const TRACING_IN: u32 = 32;
  /// Photon leaving an element.
  pub const TRACING_OUT: u32 = 64;
  /// Degenerate (edge/vertex) hits and fix-up retries.
  pub const EDGE: u32 = 128;
  /// Accumulator deposits.
  pub const ACCUM: u32 = 256;
  /// Time-of-flight updates.
  pub const TIME: u32 = 512;
  /// Reflection/refraction events.
  pub const REFLECT: u32 = 1024;
  /// Dispatcher progress.
  pub const PROGRESS: u32 = 2048;
  /// Photon termination.
  pub const EXIT: u32 = 4096;
}

#[cfg(test)]
#[path = "constants_test.rs"]
mod constants_test;
