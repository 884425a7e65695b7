//! Ray-tet exit search.
//!
//! Given a photon position strictly inside (or on a face of) the current
//! element and a unit direction, find the face through which the ray
//! leaves and the travel distance to it. Four interchangeable methods are
//! provided; on a conforming mesh they produce identical element
//! transitions and differ only in arithmetic:
//!
//! - [`badouel`]: classic per-face rejection loop, scalar.
//! - [`branchless_badouel`]: all four faces in `DVec4` lane arithmetic,
//!   invalid lanes masked to +∞ (the engine default and the stepping
//!   kernel of the Cartesian-grid method).
//! - [`plucker`]: Plücker-style triple-product sign tests per face.
//! - [`havel`]: plane-distance test with an explicit containment check of
//!   the hit point in the face triangle.
//!
//! The entry face never re-matches: its plane evaluation is ~0 on entry,
//! so its travel distance falls below the
//! [`EPS_RAY`](crate::constants::EPS_RAY) cutoff (and its directional dot
//! is negative).

use glam::DVec3;

use crate::config::RayMethod;
use crate::constants::FACE_NONE;
use crate::mesh::TetMesh;

mod badouel;
mod plucker;

pub use badouel::{badouel, branchless_badouel};
pub use plucker::{havel, plucker};

/// Result of an exit search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayExit {
  /// Distance to the exit face, mm. Infinite when no face matched
  /// (degenerate geometry; the engine nudges and retries).
  pub t: f64,
  /// Exit face index 0..3, or [`FACE_NONE`] when no face matched.
  pub face: i32,
}

impl RayExit {
  pub(crate) const NONE: Self = Self {
    t: f64::INFINITY,
    face: FACE_NONE,
  };

  /// True when a face was found.
  #[inline]
  pub fn found(&self) -> bool {
    self.face >= 0 && self.t.is_finite()
  }
}

/// Exit search with the configured method. [`RayMethod::Grid`] steps with
/// the branch-less kernel; its voxel accumulation lives in the
/// accumulator.
#[inline]
pub fn pick_exit(method: RayMethod, mesh: &TetMesh, e: u32, p: DVec3, v: DVec3) -> RayExit {
  match method {
    RayMethod::Plucker => plucker(mesh, e, p, v),
    RayMethod::Havel => havel(mesh, e, p, v),
    RayMethod::Badouel => badouel(mesh, e, p, v),
    RayMethod::BranchlessBadouel | RayMethod::Grid => branchless_badouel(mesh, e, p, v),
  }
}
