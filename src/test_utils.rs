//! Shared fixtures for unit tests: canned media, a single-tet mesh, and a
//! Kuhn-subdivided cube mesh with conforming neighbor tables.

use glam::DVec3;

use crate::config::SimConfig;
use crate::mesh::{Medium, TetMesh};

/// Soft-tissue-like medium used across tests.
pub fn tissue() -> Medium {
  Medium {
    mua: 0.005,
    mus: 1.0,
    g: 0.9,
    n: 1.37,
  }
}

/// Strongly absorbing, weakly scattering medium.
pub fn absorber() -> Medium {
  Medium {
    mua: 2.0,
    mus: 0.5,
    g: 0.0,
    n: 1.37,
  }
}

/// Background plus one interior medium.
pub fn media_one(inner: Medium) -> Vec<Medium> {
  vec![Medium::background(1.0), inner]
}

/// The reference unit tet (0,0,0)-(1,0,0)-(0,1,0)-(0,0,1).
pub fn single_tet_mesh(inner: Medium) -> TetMesh {
  let nodes = vec![DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::Z];
  let elems = vec![[1, 2, 3, 4]];
  TetMesh::new(nodes, elems, vec![1], media_one(inner)).unwrap()
}

/// Kuhn (path) subdivision of each lattice cell into 6 tets. Every cell
/// uses the same main diagonal, so shared faces between cells match and
/// the derived neighbor table is conforming.
const KUHN_PERMS: [[usize; 3]; 6] = [
  [0, 1, 2],
  [0, 2, 1],
  [1, 0, 2],
  [1, 2, 0],
  [2, 0, 1],
  [2, 1, 0],
];

/// `n³`-cell cube spanning `[0, size]³`, every element carrying medium 1.
pub fn cube_mesh(n: usize, size: f64, media: Vec<Medium>) -> TetMesh {
  cube_mesh_with(n, size, media, |_| 1)
}

/// Cube mesh with a per-cell medium chooser (receives the cell's integer
/// coordinates).
pub fn cube_mesh_with<F>(n: usize, size: f64, media: Vec<Medium>, prop_of: F) -> TetMesh
where
  F: Fn([usize; 3]) -> u32,
{
  let spacing = size / n as f64;
  let stride = n + 1;
  let node_id = |x: usize, y: usize, z: usize| ((x * stride + y) * stride + z + 1) as u32;

  let mut nodes = Vec::with_capacity(stride * stride * stride);
  for x in 0..stride {
    for y in 0..stride {
      for z in 0..stride {
        nodes.push(DVec3::new(x as f64, y as f64, z as f64) * spacing);
      }
    }
  }

  let mut elems = Vec::with_capacity(n * n * n * 6);
  let mut prop = Vec::with_capacity(elems.capacity());
  for cx in 0..n {
    for cy in 0..n {
      for cz in 0..n {
        for perm in KUHN_PERMS {
          // Walk from the cell origin to the far corner along the
          // permuted axes; the four visited lattice points form one tet.
          let mut at = [cx, cy, cz];
          let mut tet = [node_id(at[0], at[1], at[2]), 0, 0, 0];
          for (k, &axis) in perm.iter().enumerate() {
            at[axis] += 1;
            tet[k + 1] = node_id(at[0], at[1], at[2]);
          }
          elems.push(tet);
          prop.push(prop_of([cx, cy, cz]));
        }
      }
    }
  }
  TetMesh::new(nodes, elems, prop, media).unwrap()
}

/// Baseline config for engine/dispatch tests: single gate, energy output,
/// no roulette, reflection off.
pub fn base_config(nphoton: u64) -> SimConfig {
  let mut cfg = SimConfig::default()
    .with_nphoton(nphoton)
    .with_time_window(0.0, 5e-9, 5e-9)
    .with_seed(1357);
  cfg.do_reflect = false;
  cfg.min_weight = 0.0;
  cfg
}
