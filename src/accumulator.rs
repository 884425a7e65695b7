//! Time-gated fluence/energy accumulation.
//!
//! The field is a dense `gates × sites` array of doubles, where a site is
//! an element (constant basis), a mesh node (linear basis), or a
//! Cartesian voxel (grid method). Two storage modes exist:
//!
//! - [`SharedField`]: one array shared by all workers, updated with an
//!   atomic compare-exchange add on the f64 bit pattern.
//! - [`LocalField`]: per-worker private array, summed by the dispatcher
//!   in deterministic chunk order after the batch.
//!
//! The engine writes through [`FieldWriter`], which hides the mode.

use std::sync::atomic::{AtomicU64, Ordering};

use glam::DVec3;

use crate::config::{BasisOrder, GridSpec, OutputType, RayMethod, SimConfig};
use crate::constants::FACE_NODES;
use crate::mesh::TetMesh;

/// Number of field sites for a configuration.
pub fn site_count(cfg: &SimConfig, mesh: &TetMesh) -> usize {
  match cfg.method {
    RayMethod::Grid => cfg.grid.as_ref().map(GridSpec::site_count).unwrap_or(0),
    _ => match cfg.basis {
      BasisOrder::Element => mesh.elem_count(),
      BasisOrder::Node => mesh.node_count(),
    },
  }
}

/// Shared accumulator with lock-free f64 adds.
pub struct SharedField {
  sites: usize,
  data: Vec<AtomicU64>,
}

impl SharedField {
  pub fn new(gates: usize, sites: usize) -> Self {
    let mut data = Vec::with_capacity(gates * sites);
    data.resize_with(gates * sites, || AtomicU64::new(0f64.to_bits()));
    Self { sites, data }
  }

  /// Atomic float add emulated with a CAS loop on the bit pattern.
  #[inline]
  pub fn add(&self, gate: usize, site: usize, value: f64) {
    let slot = &self.data[gate * self.sites + site];
    let mut current = slot.load(Ordering::Relaxed);
    loop {
      let next = (f64::from_bits(current) + value).to_bits();
      match slot.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
        Ok(_) => return,
        Err(actual) => current = actual,
      }
    }
  }

  /// Snapshot into a plain vector (after the batch barrier).
  pub fn into_vec(self) -> Vec<f64> {
    self.data.into_iter().map(|a| f64::from_bits(a.into_inner())).collect()
  }
}

/// Worker-private accumulator.
pub struct LocalField {
  sites: usize,
  pub data: Vec<f64>,
}

impl LocalField {
  pub fn new(gates: usize, sites: usize) -> Self {
    Self {
      sites,
      data: vec![0.0; gates * sites],
    }
  }

  #[inline]
  pub fn add(&mut self, gate: usize, site: usize, value: f64) {
    self.data[gate * self.sites + site] += value;
  }

  /// Element-wise merge into a reduction target.
  pub fn merge_into(&self, out: &mut [f64]) {
    for (o, v) in out.iter_mut().zip(&self.data) {
      *o += v;
    }
  }
}

/// Accumulation handle given to one worker.
pub enum FieldWriter<'a> {
  Shared(&'a SharedField),
  Local(&'a mut LocalField),
}

impl FieldWriter<'_> {
  #[inline]
  pub fn add(&mut self, gate: usize, site: usize, value: f64) {
    match self {
      FieldWriter::Shared(f) => f.add(gate, site, value),
      FieldWriter::Local(f) => f.add(gate, site, value),
    }
  }
}

/// Deposit one mesh-basis step contribution: the full value onto the
/// element site, or split into thirds over the three nodes bounding the
/// step's exit face (the candidate face even when the scatter ends
/// before reaching it).
#[inline]
pub fn deposit_mesh(
  writer: &mut FieldWriter<'_>,
  mesh: &TetMesh,
  basis: BasisOrder,
  gate: usize,
  e: u32,
  split_face: usize,
  value: f64,
) {
  match basis {
    BasisOrder::Element => writer.add(gate, e as usize - 1, value),
    BasisOrder::Node => {
      let nodes = mesh.elem_nodes(e);
      let third = value / 3.0;
      for &local in &FACE_NODES[split_face] {
        writer.add(gate, nodes[local] as usize - 1, third);
      }
    }
  }
}

/// Deposit one grid-method step: the move is cut into `2·⌈L·dstep⌉`
/// equal sub-segments whose deposits decay by `exp(−μa·Δs)` each; every
/// sub-segment lands in the voxel under its midpoint. Midpoints outside
/// the grid are skipped (their energy stays in the energy balance as
/// absorbed-but-unbinned only if inside the mesh, so callers pass the
/// already-attenuated weight). Returns the weight remaining after the
/// move.
#[allow(clippy::too_many_arguments)]
#[inline]
pub fn deposit_grid(
  writer: &mut FieldWriter<'_>,
  grid: &GridSpec,
  output: OutputType,
  gate: usize,
  p0: DVec3,
  v: DVec3,
  length: f64,
  weight: f64,
  mua: f64,
) -> f64 {
  if length <= 0.0 {
    return weight;
  }
  let nseg = (2.0 * (length * grid.dstep).ceil()).max(1.0) as usize;
  let ds = length / nseg as f64;
  let att = (-mua * ds).exp();

  let mut w = weight;
  for i in 0..nseg {
    let deposit = w * (1.0 - att);
    let mid = p0 + v * (ds * (i as f64 + 0.5));
    if let Some(site) = grid.voxel_index(mid) {
      let value = match output {
        OutputType::Flux | OutputType::Jacobian => {
          if mua > 1e-12 {
            deposit / mua
          } else {
            w * ds
          }
        }
        _ => deposit,
      };
      writer.add(gate, site, value);
    }
    w *= att;
  }
  w
}

/// Apply the end-of-batch normalization in place. Energy output is
/// returned raw; the other output types scale per site by
/// `1/(launched · V_site)`, flux additionally by `1/Δt`.
pub fn normalize(field: &mut [f64], cfg: &SimConfig, mesh: &TetMesh, launched: f64) {
  if matches!(cfg.output, OutputType::Energy) || launched <= 0.0 {
    return;
  }
  let gates = cfg.gates();
  let sites = field.len() / gates.max(1);
  let time_scale = match cfg.output {
    OutputType::Flux => 1.0 / cfg.tstep,
    _ => 1.0,
  };
  let base = time_scale / launched;

  let site_volume: Box<dyn Fn(usize) -> f64 + '_> = match cfg.method {
    RayMethod::Grid => {
      let vol = cfg.grid.as_ref().map(GridSpec::voxel_volume).unwrap_or(1.0);
      Box::new(move |_| vol)
    }
    _ => match cfg.basis {
      BasisOrder::Element => Box::new(|s| mesh.volume(s as u32 + 1)),
      BasisOrder::Node => Box::new(|s| mesh.node_volume(s as u32 + 1)),
    },
  };

  for site in 0..sites {
    let v = site_volume(site);
    if v <= 0.0 {
      continue;
    }
    let scale = base / v;
    for gate in 0..gates {
      field[gate * sites + site] *= scale;
    }
  }
}

#[cfg(test)]
#[path = "accumulator_test.rs"]
mod accumulator_test;
