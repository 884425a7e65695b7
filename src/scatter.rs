//! Henyey-Greenstein scattering.
//!
//! Draws a deflection cosine from the HG phase function, an azimuth, and
//! rotates the propagation direction into the frame of the old one. The
//! rotation has a closed form except at |v_z| → 1, where the frame is
//! degenerate and the axes are replaced directly.

use glam::DVec3;

use crate::constants::EPS;
use crate::rng::RandomStream;

/// One scattering event: sampled deflection applied to `dir`.
pub struct Deflection {
  /// New unit propagation direction.
  pub dir: DVec3,
  /// Sampled polar cosine (for momentum-transfer bookkeeping).
  pub cos_theta: f64,
}

/// Sample an HG deflection of `dir` for anisotropy `g`.
pub fn sample(rng: &mut RandomStream, dir: DVec3, g: f64) -> Deflection {
  let cos_theta = rng.next_cos_theta_hg(g);
  let phi = rng.next_azimuth();
  Deflection {
    dir: rotate(dir, cos_theta, phi),
    cos_theta,
  }
}

/// Rotate unit vector `v` by polar angle (cos θ) and azimuth φ about
/// itself.
pub fn rotate(v: DVec3, cos_theta: f64, phi: f64) -> DVec3 {
  let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
  let (sin_phi, cos_phi) = phi.sin_cos();

  if v.z.abs() > 1.0 - EPS {
    // Degenerate frame: the old direction is the z axis.
    let sign = v.z.signum();
    return DVec3::new(
      sin_theta * cos_phi,
      sign * sin_theta * sin_phi,
      sign * cos_theta,
    );
  }

  let rho = (1.0 - v.z * v.z).sqrt();
  let out = DVec3::new(
    sin_theta * (v.x * v.z * cos_phi - v.y * sin_phi) / rho + v.x * cos_theta,
    sin_theta * (v.y * v.z * cos_phi + v.x * sin_phi) / rho + v.y * cos_theta,
    -sin_theta * cos_phi * rho + v.z * cos_theta,
  );
  // Rounding can drift the norm after many scatters.
  out.normalize()
}

#[cfg(test)]
#[path = "scatter_test.rs"]
mod scatter_test;
