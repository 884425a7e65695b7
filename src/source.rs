//! Photon launch: source models and initial element determination.
//!
//! Every model fills `(position, direction, weight)` from the photon's
//! own random stream, then the launcher locates the enclosing element by
//! scanning the candidate list (starting-element hint, then the source
//! element list, then the whole mesh) for the first tet whose
//! barycentrics are all non-negative within tolerance.
//!
//! Area sources place photons on a parameterized footprint
//! (`pos + u·param1 + v·param2`); directional sources optionally steer
//! toward (or away from) a focal point at `pos + focus·dir`.

use glam::DVec3;

use crate::config::{SimConfig, SourceKind, SpecularMode};
use crate::constants::{BARY_TOLERANCE, EPS};
use crate::fresnel;
use crate::mesh::TetMesh;
use crate::rng::RandomStream;

/// A launched photon, before the engine takes over.
#[derive(Clone, Debug)]
pub struct Launch {
  pub pos: DVec3,
  pub dir: DVec3,
  /// Statistical weight after any launch-time specular loss.
  pub weight: f64,
  /// Weight removed by the deterministic specular reflection (0 when
  /// disabled or index-matched).
  pub specular_loss: f64,
  /// Enclosing element (1-based), 0 when none was found.
  pub elem: u32,
  /// Barycentric coordinates of the launch position in `elem`.
  pub bary: [f64; 4],
}

/// Orthonormal frame (u, v) perpendicular to a unit axis.
fn frame(axis: DVec3) -> (DVec3, DVec3) {
  let helper = if axis.x.abs() < 0.9 { DVec3::X } else { DVec3::Y };
  let u = axis.cross(helper).normalize();
  let v = axis.cross(u);
  (u, v)
}

/// Unit vector at polar angle (cos θ) and azimuth φ around `axis`.
fn from_polar(axis: DVec3, cos_theta: f64, phi: f64) -> DVec3 {
  let (u, v) = frame(axis);
  let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
  let (sin_phi, cos_phi) = phi.sin_cos();
  (u * (sin_theta * cos_phi) + v * (sin_theta * sin_phi) + axis * cos_theta).normalize()
}

/// Uniform direction on the unit sphere.
fn isotropic_dir(rng: &mut RandomStream) -> DVec3 {
  let cos_theta = 2.0 * rng.next_uniform() - 1.0;
  from_polar(DVec3::Z, cos_theta, rng.next_azimuth())
}

/// Periodic modulation weight used by the Fourier sources, clamped into
/// [0, 1].
fn fourier_weight(kx: f64, ky: f64, u: f64, v: f64, phase: f64, amplitude: f64) -> f64 {
  let w = ((2.0 * std::f64::consts::PI * (kx * u + ky * v) + phase).cos() * amplitude + 1.0) * 0.5;
  w.clamp(0.0, 1.0)
}

/// Sample position, direction, and weight for one photon.
fn sample_source(cfg: &SimConfig, rng: &mut RandomStream) -> (DVec3, DVec3, f64) {
  let src = &cfg.source;
  let p1 = src.param1;
  let p2 = src.param2;

  let (mut pos, mut dir, mut weight) = (src.pos, src.dir, 1.0);

  match src.kind {
    SourceKind::Pencil => {}
    SourceKind::Isotropic => {
      dir = isotropic_dir(rng);
    }
    SourceKind::Cone => {
      // Uniform over the spherical cap of half-angle param1.x.
      let cos_min = p1.x.cos();
      let cos_theta = 1.0 - rng.next_uniform() * (1.0 - cos_min);
      dir = from_polar(src.dir, cos_theta, rng.next_azimuth());
    }
    SourceKind::Arcsine => {
      // Zenith uniform in angle rather than in solid angle.
      let theta = rng.next_uniform() * std::f64::consts::PI;
      dir = from_polar(src.dir, theta.cos(), rng.next_azimuth());
    }
    SourceKind::ZGaussian => {
      // Gaussian angular profile with spread param1.x (radians).
      let theta = p1.x * (-2.0 * (rng.next_uniform() + crate::constants::EPS_LOG).ln()).sqrt();
      dir = from_polar(src.dir, theta.cos(), rng.next_azimuth());
    }
    SourceKind::Gaussian => {
      // Radial offset for an intensity profile exp(-2 r² / w0²).
      let w0 = p1.x;
      let r = w0 * ((-(rng.next_uniform() + crate::constants::EPS_LOG).ln()) * 0.5).sqrt();
      let phi = rng.next_azimuth();
      let (u, v) = frame(src.dir);
      let radial = u * phi.cos() + v * phi.sin();
      pos += radial * r;
      if p1.y > 1e-5 {
        // Rayleigh-range correction: tilt grows linearly with r.
        dir = (src.dir + radial * (r / p1.y)).normalize();
      }
    }
    SourceKind::Disk => {
      let r = p1.x * rng.next_uniform().sqrt();
      let phi = rng.next_azimuth();
      let (u, v) = frame(src.dir);
      pos += u * (r * phi.cos()) + v * (r * phi.sin());
    }
    SourceKind::Planar | SourceKind::Pattern | SourceKind::Fourier => {
      let (u, v) = (rng.next_uniform(), rng.next_uniform());
      pos += p1.truncate() * u + p2.truncate() * v;
      match src.kind {
        SourceKind::Pattern => {
          // Validation guarantees the image is present.
          weight = src.pattern.as_ref().map(|p| p.value(u, v)).unwrap_or(1.0);
        }
        SourceKind::Fourier => {
          weight = fourier_weight(p1.w, p2.w, u, v, 0.0, 1.0);
        }
        _ => {}
      }
    }
    SourceKind::FourierX | SourceKind::FourierX2D => {
      // One explicit edge; the second spans perpendicular to it with
      // length param1.w.
      let v1 = p1.truncate();
      let v2 = src.dir.cross(v1).normalize() * p1.w;
      let (u, v) = (rng.next_uniform(), rng.next_uniform());
      pos += v1 * u + v2 * v;
      weight = match src.kind {
        SourceKind::FourierX => fourier_weight(p2.x, p2.y, u, v, p2.z, p2.w),
        _ => {
          // Separable 2D modulation with per-axis phases.
          let two_pi = 2.0 * std::f64::consts::PI;
          let m = (two_pi * p2.x * u + p2.z).cos() * (two_pi * p2.y * v + p2.w).cos();
          ((m + 1.0) * 0.5).clamp(0.0, 1.0)
        }
      };
    }
    SourceKind::Line | SourceKind::Slit => {
      let t = rng.next_uniform();
      pos += p1.truncate() * t;
      if matches!(src.kind, SourceKind::Line) {
        // Radiate perpendicular to the line axis at a random azimuth.
        let axis = p1.truncate().normalize();
        let (u, v) = frame(axis);
        let phi = rng.next_azimuth();
        dir = u * phi.cos() + v * phi.sin();
      }
    }
  }

  // Focus steering for directional sources: converge on (or diverge
  // from) the focal point at srcpos + focus·srcdir.
  if src.focus.abs() > EPS && uses_focus(src.kind) {
    let focal = src.pos + src.dir * src.focus;
    dir = if src.focus > 0.0 {
      (focal - pos).normalize()
    } else {
      (pos - focal).normalize()
    };
  }

  (pos, dir, weight)
}

fn uses_focus(kind: SourceKind) -> bool {
  matches!(
    kind,
    SourceKind::Planar
      | SourceKind::Pattern
      | SourceKind::Fourier
      | SourceKind::FourierX
      | SourceKind::FourierX2D
      | SourceKind::Disk
      | SourceKind::Gaussian
      | SourceKind::Slit
      | SourceKind::Line
  )
}

/// Launch one photon: sample the source, locate the enclosing element,
/// and apply the deterministic specular loss when configured.
pub fn launch(mesh: &TetMesh, cfg: &SimConfig, rng: &mut RandomStream) -> Launch {
  let (pos, dir, weight) = sample_source(cfg, rng);

  let hint = (cfg.e0 > 0).then_some(cfg.e0);
  // Without an explicit source-element list, fall back to a full scan.
  let scan_all = cfg.src_elems.is_empty();
  let candidates = hint
    .into_iter()
    .chain(cfg.src_elems.iter().copied())
    .chain((1..=mesh.elem_count() as u32).filter(move |_| scan_all));
  let elem = mesh.enclosing_element(pos, candidates, BARY_TOLERANCE).unwrap_or(0);

  let (bary, weight, specular_loss) = if elem > 0 {
    let bary = mesh.barycentric(elem, pos);
    let n_in = mesh.medium_of(elem).n;
    if !matches!(cfg.specular, SpecularMode::Ignore) && (n_in - cfg.n_out).abs() > EPS {
      // Normal-incidence Fresnel loss applied by the launcher.
      let r = fresnel::reflectance(cfg.n_out, n_in, 1.0);
      (bary, weight * (1.0 - r), weight * r)
    } else {
      (bary, weight, 0.0)
    }
  } else {
    ([0.0; 4], weight, 0.0)
  };

  Launch {
    pos,
    dir,
    weight,
    specular_loss,
    elem,
    bary,
  }
}

#[cfg(test)]
#[path = "source_test.rs"]
mod source_test;
