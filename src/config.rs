//! Simulation configuration.
//!
//! [`SimConfig`] is the read-only record handed to the dispatcher. It is
//! built in code with `with_*` builder methods (file/CLI parsing is an
//! external collaborator) and validated once before dispatch; workers
//! only ever see it by shared reference.

use glam::{DVec3, DVec4};

use crate::constants::EPS;
use crate::error::SimError;
use crate::mesh::{Detector, TetMesh};

/// Ray-tet intersection method for the stepping loop.
///
/// All methods produce the same element transitions on a conforming
/// mesh; they differ in how the exit face and distance are computed, and
/// the grid method additionally deposits onto a Cartesian voxel grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RayMethod {
  /// Plücker-coordinate sign tests per face.
  Plucker,
  /// Plane-distance test with per-face containment check.
  Havel,
  /// Classic Badouel with early rejects, scalar arithmetic.
  Badouel,
  /// Branch-less Badouel evaluating all four faces in lane arithmetic.
  BranchlessBadouel,
  /// Branch-less Badouel stepping with Cartesian-grid accumulation.
  Grid,
}

/// Quantity accumulated into the output field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputType {
  /// Deposited energy divided by local absorption (time-resolved flux).
  Flux,
  /// Deposited energy per site (time-integrated within each gate).
  Fluence,
  /// Raw deposited energy.
  Energy,
  /// Replay-weighted deposits divided by local absorption.
  Jacobian,
  /// Pathlength-weighted deposits `w · L`.
  WeightedPath,
  /// Scatter-order-weighted deposits `w · n_scat`.
  WeightedScatter,
}

/// Spatial basis of the output field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BasisOrder {
  /// Constant per element; one site per tet.
  Element,
  /// Piecewise-linear; one site per mesh node.
  Node,
}

/// Handling of the specular reflection at launch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpecularMode {
  /// No launch-time Fresnel loss.
  Ignore,
  /// Deterministic launch loss `w ← w·(1−R)` when the launch element's
  /// index differs from the background.
  InitialLoss,
  /// As `InitialLoss`, and photons transmitting into a void neighbor at
  /// an interior interface terminate instead of continuing.
  TerminateIntoVoid,
}

/// Source pattern image for `pattern` sources, row-major `height × width`.
#[derive(Clone, Debug)]
pub struct Pattern {
  pub width: usize,
  pub height: usize,
  pub data: Vec<f32>,
}

impl Pattern {
  /// Pattern value under footprint coordinates `(u, v) ∈ [0,1)²`.
  #[inline]
  pub fn value(&self, u: f64, v: f64) -> f64 {
    let x = ((u * self.width as f64) as usize).min(self.width - 1);
    let y = ((v * self.height as f64) as usize).min(self.height - 1);
    self.data[y * self.width + x] as f64
  }
}

/// Source model selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
  Pencil,
  Isotropic,
  Cone,
  Gaussian,
  Planar,
  Pattern,
  Fourier,
  FourierX,
  FourierX2D,
  Arcsine,
  Disk,
  ZGaussian,
  Line,
  Slit,
}

/// Source descriptor: kind plus position, direction, focus, and the two
/// packed parameter 4-vectors whose meaning depends on the kind.
#[derive(Clone, Debug)]
pub struct SourceDesc {
  pub kind: SourceKind,
  /// Launch position (or footprint corner for area sources), mm.
  pub pos: DVec3,
  /// Launch direction, unit length.
  pub dir: DVec3,
  /// Focal distance along `dir`; 0 disables focus steering, negative
  /// diverges from the mirrored focal point.
  pub focus: f64,
  pub param1: DVec4,
  pub param2: DVec4,
  /// Pattern image, required by `SourceKind::Pattern`.
  pub pattern: Option<Pattern>,
}

impl SourceDesc {
  /// Pencil beam at `pos` along `dir`.
  pub fn pencil(pos: DVec3, dir: DVec3) -> Self {
    Self {
      kind: SourceKind::Pencil,
      pos,
      dir,
      focus: 0.0,
      param1: DVec4::ZERO,
      param2: DVec4::ZERO,
      pattern: None,
    }
  }

  pub fn with_kind(mut self, kind: SourceKind) -> Self {
    self.kind = kind;
    self
  }

  pub fn with_params(mut self, param1: DVec4, param2: DVec4) -> Self {
    self.param1 = param1;
    self.param2 = param2;
    self
  }

  pub fn with_focus(mut self, focus: f64) -> Self {
    self.focus = focus;
    self
  }

  pub fn with_pattern(mut self, pattern: Pattern) -> Self {
    self.pattern = Some(pattern);
    self
  }
}

/// Cartesian output grid for [`RayMethod::Grid`].
#[derive(Clone, Copy, Debug)]
pub struct GridSpec {
  /// Lower corner of the grid, mm.
  pub nmin: DVec3,
  /// Resolution in voxels per mm (voxel edge is `1/dstep`).
  pub dstep: f64,
  /// Voxel counts per axis.
  pub dims: [usize; 3],
}

impl GridSpec {
  /// Number of voxels.
  pub fn site_count(&self) -> usize {
    self.dims[0] * self.dims[1] * self.dims[2]
  }

  /// Volume of one voxel, mm³.
  pub fn voxel_volume(&self) -> f64 {
    let edge = 1.0 / self.dstep;
    edge * edge * edge
  }

  /// Row-major voxel index of a point, or None outside the grid.
  #[inline]
  pub fn voxel_index(&self, p: DVec3) -> Option<usize> {
    let q = (p - self.nmin) * self.dstep;
    if q.x < 0.0 || q.y < 0.0 || q.z < 0.0 {
      return None;
    }
    let (ix, iy, iz) = (q.x as usize, q.y as usize, q.z as usize);
    if ix >= self.dims[0] || iy >= self.dims[1] || iz >= self.dims[2] {
      return None;
    }
    Some((ix * self.dims[1] + iy) * self.dims[2] + iz)
  }
}

/// Saved per-photon replay inputs: initial RNG states with the matching
/// detected weights and arrival times from a prior seed-saving run.
#[derive(Clone, Debug, Default)]
pub struct ReplayInput {
  pub states: Vec<[u64; 2]>,
  pub weights: Vec<f64>,
  pub times: Vec<f64>,
}

/// Read-only simulation configuration for one batch.
#[derive(Clone, Debug)]
pub struct SimConfig {
  /// Total photon count.
  pub nphoton: u64,
  /// User seed combined with the global photon index per stream.
  pub seed: u32,

  /// Time window start, s.
  pub tstart: f64,
  /// Time window end, s.
  pub tend: f64,
  /// Gate width, s.
  pub tstep: f64,

  /// Background refractive index outside the mesh.
  pub n_out: f64,

  /// Weight threshold below which Russian roulette engages.
  pub min_weight: f64,
  /// Roulette survival factor (survivors multiply weight by this).
  pub roulette_size: f64,

  /// Consider reflection/refraction at index-mismatch faces.
  pub do_reflect: bool,
  /// Scale the output field at the end of the batch.
  pub do_normalize: bool,
  /// Capture detected photons.
  pub save_det: bool,
  /// Append exit position/direction to detected records.
  pub save_exit: bool,
  /// Save the initial RNG state of detected photons.
  pub save_seed: bool,
  /// Accumulate per-medium momentum transfer.
  pub save_momentum: bool,
  /// Advance time-of-flight while traversing void elements.
  pub void_time: bool,
  /// Use shared atomic field adds instead of worker-local buffers.
  pub atomic_field: bool,

  pub specular: SpecularMode,
  pub basis: BasisOrder,
  pub method: RayMethod,
  pub output: OutputType,

  pub source: SourceDesc,
  pub detectors: Vec<Detector>,
  /// Detected-photon buffer capacity.
  pub max_detected: usize,

  /// Starting element hint (1-based); 0 means "search candidates".
  pub e0: u32,
  /// Candidate launch elements; empty means all elements.
  pub src_elems: Vec<u32>,

  /// Output grid, required by [`RayMethod::Grid`].
  pub grid: Option<GridSpec>,
  /// Replay inputs; present switches launch to saved RNG states.
  pub replay: Option<ReplayInput>,

  /// Worker count; 0 uses the rayon pool width.
  pub workers: usize,
  /// Debug event bitmask (see [`crate::constants::debug`]).
  pub debug: u32,
}

impl Default for SimConfig {
  fn default() -> Self {
    Self {
      nphoton: 10_000,
      seed: 0,
      tstart: 0.0,
      tend: 5e-9,
      tstep: 5e-9,
      n_out: 1.0,
      min_weight: 1e-4,
      roulette_size: 10.0,
      do_reflect: true,
      do_normalize: false,
      save_det: false,
      save_exit: false,
      save_seed: false,
      save_momentum: false,
      void_time: true,
      atomic_field: false,
      specular: SpecularMode::Ignore,
      basis: BasisOrder::Element,
      method: RayMethod::BranchlessBadouel,
      output: OutputType::Energy,
      source: SourceDesc::pencil(DVec3::ZERO, DVec3::Z),
      detectors: Vec::new(),
      max_detected: 100_000,
      e0: 0,
      src_elems: Vec::new(),
      grid: None,
      replay: None,
      workers: 0,
      debug: 0,
    }
  }
}

impl SimConfig {
  pub fn with_nphoton(mut self, nphoton: u64) -> Self {
    self.nphoton = nphoton;
    self
  }

  pub fn with_seed(mut self, seed: u32) -> Self {
    self.seed = seed;
    self
  }

  pub fn with_time_window(mut self, tstart: f64, tend: f64, tstep: f64) -> Self {
    self.tstart = tstart;
    self.tend = tend;
    self.tstep = tstep;
    self
  }

  pub fn with_source(mut self, source: SourceDesc) -> Self {
    self.source = source;
    self
  }

  pub fn with_detectors(mut self, detectors: Vec<Detector>) -> Self {
    self.detectors = detectors;
    self
  }

  pub fn with_method(mut self, method: RayMethod) -> Self {
    self.method = method;
    self
  }

  pub fn with_output(mut self, output: OutputType) -> Self {
    self.output = output;
    self
  }

  pub fn with_basis(mut self, basis: BasisOrder) -> Self {
    self.basis = basis;
    self
  }

  pub fn with_workers(mut self, workers: usize) -> Self {
    self.workers = workers;
    self
  }

  pub fn with_grid(mut self, grid: GridSpec) -> Self {
    self.grid = Some(grid);
    self
  }

  pub fn with_replay(mut self, replay: ReplayInput) -> Self {
    self.replay = Some(replay);
    self
  }

  /// Number of time gates `G = ceil((t1-t0)/dt)`.
  pub fn gates(&self) -> usize {
    (((self.tend - self.tstart) / self.tstep).ceil() as usize).max(1)
  }

  /// A run with more than one gate is time-resolved; roulette is then
  /// left to the time window.
  pub fn is_time_resolved(&self) -> bool {
    self.gates() > 1
  }

  /// Gate index for a time of flight, clamped into the window.
  #[inline]
  pub fn gate_of(&self, tof: f64) -> usize {
    let g = (tof - self.tstart) / self.tstep;
    if g <= 0.0 {
      0
    } else {
      (g as usize).min(self.gates() - 1)
    }
  }

  /// Width in f32 of one detected-photon record for `media` non-background
  /// media: detector id, per-medium scatter counts and pathlengths,
  /// optional per-medium momentum, optional exit position/direction,
  /// initial weight.
  pub fn detected_record_len(&self, media: usize) -> usize {
    let mut len = 1 + 2 * media + 1;
    if self.save_momentum {
      len += media;
    }
    if self.save_exit {
      len += 6;
    }
    len
  }

  /// Debug bitmask test.
  #[inline]
  pub fn debug_enabled(&self, bit: u32) -> bool {
    self.debug & bit != 0
  }

  /// Mesh-independent validation, run before dispatch.
  pub fn validate(&self) -> Result<(), SimError> {
    if self.nphoton == 0 {
      return Err(SimError::Config("nphoton must be positive".into()));
    }
    if !(self.tend > self.tstart) || !(self.tstep > 0.0) {
      return Err(SimError::Config("time window must satisfy t1 > t0, dt > 0".into()));
    }
    if self.n_out < 1.0 {
      return Err(SimError::Config("background index must be >= 1".into()));
    }
    if (self.source.dir.length() - 1.0).abs() > EPS {
      return Err(SimError::Config("source direction must be unit length".into()));
    }
    if self.min_weight < 0.0 || self.roulette_size <= 1.0 {
      return Err(SimError::Config("roulette parameters out of range".into()));
    }
    if self.save_det && self.max_detected == 0 {
      return Err(SimError::Config("save_det requires a detected-photon buffer".into()));
    }
    if matches!(self.source.kind, SourceKind::Pattern) && self.source.pattern.is_none() {
      return Err(SimError::Config("pattern source requires a pattern image".into()));
    }
    if let Some(p) = &self.source.pattern {
      if p.width == 0 || p.height == 0 || p.data.len() != p.width * p.height {
        return Err(SimError::Config("pattern image dimensions mismatch".into()));
      }
    }
    if matches!(self.method, RayMethod::Grid)
      && matches!(self.output, OutputType::WeightedPath | OutputType::WeightedScatter)
    {
      return Err(SimError::Config(
        "grid accumulation supports flux/fluence/energy/jacobian outputs only".into(),
      ));
    }
    if matches!(self.method, RayMethod::Grid) {
      match &self.grid {
        None => return Err(SimError::Config("grid method requires a grid spec".into())),
        Some(g) => {
          if g.dstep <= 0.0 || g.site_count() == 0 {
            return Err(SimError::Config("grid spec must have positive dstep and dims".into()));
          }
        }
      }
    }
    if matches!(self.output, OutputType::Jacobian) && self.replay.is_none() {
      return Err(SimError::Config("jacobian output requires replay inputs".into()));
    }
    if let Some(r) = &self.replay {
      if (r.states.len() as u64) < self.nphoton {
        return Err(SimError::Config("replay input shorter than nphoton".into()));
      }
      if r.weights.len() != r.states.len() || r.times.len() != r.states.len() {
        return Err(SimError::Config("replay weight/time tables mismatch states".into()));
      }
    }
    for (i, d) in self.detectors.iter().enumerate() {
      if d.radius <= 0.0 {
        return Err(SimError::Config(format!("detector {}: radius must be positive", i + 1)));
      }
    }
    Ok(())
  }

  /// Mesh-dependent validation (index ranges).
  pub fn validate_with_mesh(&self, mesh: &TetMesh) -> Result<(), SimError> {
    let ne = mesh.elem_count() as u32;
    if self.e0 > ne {
      return Err(SimError::Config(format!("starting element {} out of range", self.e0)));
    }
    if let Some(&bad) = self.src_elems.iter().find(|&&e| e == 0 || e > ne) {
      return Err(SimError::Config(format!("source element {} out of range", bad)));
    }
    Ok(())
  }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
