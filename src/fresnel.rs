//! Reflection and refraction at refractive-index mismatches.
//!
//! Invoked when a photon crosses a face whose far side has a different
//! index (another medium or the background void). Total internal
//! reflection is deterministic; otherwise the unpolarized Fresnel
//! reflectance splits the photon stochastically into a reflected or
//! transmitted branch. All returned directions are renormalized.

use glam::DVec3;

use crate::rng::RandomStream;

/// Outcome of an index-mismatch interaction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Interaction {
  /// Photon stays in the current element with the mirrored direction.
  Reflected(DVec3),
  /// Photon continues into the far medium with the bent direction.
  Transmitted(DVec3),
}

/// Unpolarized Fresnel reflectance for incidence cosine `cos_i` from
/// index `n1` into `n2`. Returns 1 under total internal reflection.
pub fn reflectance(n1: f64, n2: f64, cos_i: f64) -> f64 {
  let eta = n1 / n2;
  let k = eta * eta * (1.0 - cos_i * cos_i);
  if k >= 1.0 {
    return 1.0;
  }
  let cos_t = (1.0 - k).sqrt();
  let rs = (n1 * cos_i - n2 * cos_t) / (n1 * cos_i + n2 * cos_t);
  let rp = (n1 * cos_t - n2 * cos_i) / (n1 * cos_t + n2 * cos_i);
  0.5 * (rs * rs + rp * rp)
}

/// Mirror `dir` about the face with outward unit `normal`.
#[inline]
pub fn reflect(dir: DVec3, normal: DVec3) -> DVec3 {
  (dir - normal * (2.0 * dir.dot(normal))).normalize()
}

/// Resolve an interaction at a face. `normal` is the outward unit normal
/// of the face being crossed (so `dir · normal > 0` on the way out),
/// `n1` the index on the photon's side, `n2` the far side.
pub fn interact(rng: &mut RandomStream, dir: DVec3, normal: DVec3, n1: f64, n2: f64) -> Interaction {
  let cos_i = dir.dot(normal).abs().min(1.0);
  let eta = n1 / n2;
  let k = eta * eta * (1.0 - cos_i * cos_i);

  if k >= 1.0 {
    // Total internal reflection keeps all the energy.
    return Interaction::Reflected(reflect(dir, normal));
  }

  let cos_t = (1.0 - k).sqrt();
  let r = {
    let rs = (n1 * cos_i - n2 * cos_t) / (n1 * cos_i + n2 * cos_t);
    let rp = (n1 * cos_t - n2 * cos_i) / (n1 * cos_t + n2 * cos_i);
    0.5 * (rs * rs + rp * rp)
  };

  if rng.next_reflect_test() <= r {
    Interaction::Reflected(reflect(dir, normal))
  } else {
    // Bend across the interface; with the outward normal on the exit
    // side, the tangential component scales by eta and the normal
    // component becomes cos_t.
    let t = dir * eta + normal * (cos_t - eta * cos_i);
    Interaction::Transmitted(t.normalize())
  }
}

#[cfg(test)]
#[path = "fresnel_test.rs"]
mod fresnel_test;
