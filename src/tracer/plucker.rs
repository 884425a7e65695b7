//! Plücker and Havel exit searches over the element's node coordinates.

use glam::DVec3;

use crate::constants::{EPS_RAY, FACE_NODES};
use crate::mesh::TetMesh;

use super::RayExit;

/// Sign tolerance for the edge side-products.
const SIDE_TOL: f64 = 1e-12;

/// Plücker-style search: a ray leaves through the face whose three edge
/// side-products (scalar triple products of the direction with the
/// vertex fan around the ray origin) share the outward sign.
///
/// The face windings in [`FACE_NODES`] are CCW seen from outside, so an
/// exiting ray sees all three products non-negative.
pub fn plucker(mesh: &TetMesh, e: u32, p: DVec3, v: DVec3) -> RayExit {
  let pts = mesh.elem_points(e);
  let planes = mesh.planes(e);
  let mut best = RayExit::NONE;

  for face in 0..4 {
    let a = pts[FACE_NODES[face][0]] - p;
    let b = pts[FACE_NODES[face][1]] - p;
    let c = pts[FACE_NODES[face][2]] - p;

    let w0 = v.dot(a.cross(b));
    let w1 = v.dot(b.cross(c));
    let w2 = v.dot(c.cross(a));
    if w0 < -SIDE_TOL || w1 < -SIDE_TOL || w2 < -SIDE_TOL {
      continue;
    }

    let n = planes.normal(face);
    let s = n.dot(v);
    if s <= 0.0 {
      continue;
    }
    let t = (planes.d.to_array()[face] - n.dot(p)) / s;
    if t > EPS_RAY && t < best.t {
      best = RayExit {
        t,
        face: face as i32,
      };
    }
  }
  best
}

/// Havel-style search: plane distance per face, then an explicit
/// containment check of the hit point in the face triangle via its
/// barycentric solve.
pub fn havel(mesh: &TetMesh, e: u32, p: DVec3, v: DVec3) -> RayExit {
  let pts = mesh.elem_points(e);
  let planes = mesh.planes(e);
  let mut best = RayExit::NONE;

  for face in 0..4 {
    let n = planes.normal(face);
    let s = n.dot(v);
    if s <= 0.0 {
      continue;
    }
    let t = (planes.d.to_array()[face] - n.dot(p)) / s;
    if t <= EPS_RAY || t >= best.t {
      continue;
    }

    let hit = p + v * t;
    let a = pts[FACE_NODES[face][0]];
    let ab = pts[FACE_NODES[face][1]] - a;
    let ac = pts[FACE_NODES[face][2]] - a;
    let ah = hit - a;

    // 2x2 Gram solve for the in-face barycentrics.
    let d00 = ab.dot(ab);
    let d01 = ab.dot(ac);
    let d11 = ac.dot(ac);
    let h0 = ah.dot(ab);
    let h1 = ah.dot(ac);
    let det = d00 * d11 - d01 * d01;
    if det.abs() < f64::MIN_POSITIVE {
      continue;
    }
    let alpha = (d11 * h0 - d01 * h1) / det;
    let beta = (d00 * h1 - d01 * h0) / det;

    const TOL: f64 = 1e-9;
    if alpha >= -TOL && beta >= -TOL && alpha + beta <= 1.0 + TOL {
      best = RayExit {
        t,
        face: face as i32,
      };
    }
  }
  best
}
