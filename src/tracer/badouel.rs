//! Badouel-style exit searches over the precomputed face-plane table.

use glam::{DVec3, DVec4};

use crate::constants::EPS_RAY;
use crate::mesh::TetMesh;

use super::RayExit;

/// Classic Badouel: walk the four faces, reject early on direction and
/// distance, keep the nearest remaining hit.
pub fn badouel(mesh: &TetMesh, e: u32, p: DVec3, v: DVec3) -> RayExit {
  let planes = mesh.planes(e);
  let mut best = RayExit::NONE;
  for face in 0..4 {
    let n = planes.normal(face);
    let s = n.dot(v);
    if s <= 0.0 {
      // Ray moves away from (or parallel to) this face.
      continue;
    }
    let t = (planes.d.to_array()[face] - n.dot(p)) / s;
    if t <= EPS_RAY || t >= best.t {
      continue;
    }
    best = RayExit {
      t,
      face: face as i32,
    };
  }
  best
}

/// Branch-less Badouel: evaluate `S = n·v` and `T = (d − n·p)/S` for all
/// four faces in lane arithmetic, mask lanes with `S ≤ 0` or `T ≤ ε` to
/// +∞, and take the minimum lane.
pub fn branchless_badouel(mesh: &TetMesh, e: u32, p: DVec3, v: DVec3) -> RayExit {
  let planes = mesh.planes(e);
  let s = planes.dir_dot(v);
  let t = planes.eval(p) / s;

  let valid = s.cmpgt(DVec4::ZERO) & t.cmpgt(DVec4::splat(EPS_RAY));
  let t = DVec4::select(valid, t, DVec4::INFINITY);

  let t_min = t.min_element();
  if !t_min.is_finite() {
    return RayExit::NONE;
  }
  let lanes = t.to_array();
  // min_element returned one of the lanes, so the search cannot fail.
  let face = lanes.iter().position(|&x| x == t_min).unwrap() as i32;
  RayExit { t: t_min, face }
}
