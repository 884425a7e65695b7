//! Immutable mesh, medium, and ray-tracer tables.
//!
//! The mesh is a conforming tetrahedral finite-element mesh stored as flat
//! index arrays: node coordinates, element→node indices, element→neighbor
//! indices, per-element medium ids and volumes, and per-face plane
//! equations. Node and element ids are 1-based in all tables; id 0 means
//! "outside the mesh" (no node / no neighbor / void). Photons carry only
//! the integer element id, so the cyclic neighbor graph needs no shared
//! ownership.
//!
//! All derived tables (orientation, neighbors, planes, volumes) are built
//! once from the loader-provided arrays and never mutated afterwards;
//! workers hold the mesh by shared reference.

use std::collections::HashMap;

use glam::{DVec3, DVec4};

use crate::constants::FACE_NODES;
use crate::error::SimError;

/// Optical properties of one medium.
///
/// Index 0 of the medium table is the background (the void outside the
/// mesh and any element with medium id 0).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Medium {
  /// Absorption coefficient, 1/mm.
  pub mua: f64,
  /// Scattering coefficient, 1/mm.
  pub mus: f64,
  /// Henyey-Greenstein anisotropy, -1 < g < 1.
  pub g: f64,
  /// Refractive index, n >= 1.
  pub n: f64,
}

impl Medium {
  /// Non-interacting background with the given refractive index.
  pub fn background(n: f64) -> Self {
    Self {
      mua: 0.0,
      mus: 0.0,
      g: 0.0,
      n,
    }
  }

  fn validate(&self, idx: usize) -> Result<(), SimError> {
    if self.mua < 0.0 || self.mus < 0.0 {
      return Err(SimError::Mesh(format!("medium {}: negative mua/mus", idx)));
    }
    if self.g <= -1.0 || self.g >= 1.0 {
      return Err(SimError::Mesh(format!("medium {}: g out of (-1,1)", idx)));
    }
    if self.n < 1.0 {
      return Err(SimError::Mesh(format!("medium {}: n < 1", idx)));
    }
    Ok(())
  }
}

/// Detector sphere.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detector {
  /// Center, mm.
  pub pos: DVec3,
  /// Capture radius, mm.
  pub radius: f64,
}

/// Per-element face planes in SoA layout: lane f of each vector holds
/// face f's outward unit normal components and plane offset `d = n . a`.
///
/// A point p strictly inside the element satisfies `d - n . p > 0` on all
/// four lanes; those four evaluations are also the unnormalized
/// barycentric coordinates of p.
#[derive(Clone, Copy, Debug)]
pub struct FacePlanes {
  pub nx: DVec4,
  pub ny: DVec4,
  pub nz: DVec4,
  pub d: DVec4,
}

impl FacePlanes {
  /// Plane evaluations `d - n . p` for all four faces.
  #[inline]
  pub fn eval(&self, p: DVec3) -> DVec4 {
    self.d - (self.nx * p.x + self.ny * p.y + self.nz * p.z)
  }

  /// Directional components `n . v` for all four faces.
  #[inline]
  pub fn dir_dot(&self, v: DVec3) -> DVec4 {
    self.nx * v.x + self.ny * v.y + self.nz * v.z
  }

  /// Outward unit normal of one face.
  #[inline]
  pub fn normal(&self, face: usize) -> DVec3 {
    let nx = self.nx.to_array();
    let ny = self.ny.to_array();
    let nz = self.nz.to_array();
    DVec3::new(nx[face], ny[face], nz[face])
  }
}

/// Immutable tetrahedral mesh plus medium and detector tables.
pub struct TetMesh {
  nodes: Vec<DVec3>,
  elems: Vec<[u32; 4]>,
  facenb: Vec<[u32; 4]>,
  prop: Vec<u32>,
  volumes: Vec<f64>,
  planes: Vec<FacePlanes>,
  node_volumes: Vec<f64>,
  media: Vec<Medium>,
}

impl TetMesh {
  /// Build a mesh from loader arrays, deriving neighbor tables, face
  /// planes, volumes, and nodal volumes.
  ///
  /// `elems` holds 1-based node ids; `prop` one medium id per element
  /// (0 = void); `media[0]` is the background medium. Element node order
  /// is canonicalized to positive orientation.
  pub fn new(
    nodes: Vec<DVec3>,
    elems: Vec<[u32; 4]>,
    prop: Vec<u32>,
    media: Vec<Medium>,
  ) -> Result<Self, SimError> {
    Self::build(nodes, elems, None, prop, media)
  }

  /// Build a mesh with a loader-provided neighbor table (`facenb[e][f]`
  /// is the 1-based id of the element across face f, or 0).
  ///
  /// The table is re-checked against the derived connectivity by
  /// [`check_conformity`](Self::check_conformity); orientation fix-ups
  /// swap faces 2/3 of the provided rows to stay consistent.
  pub fn with_neighbors(
    nodes: Vec<DVec3>,
    elems: Vec<[u32; 4]>,
    facenb: Vec<[u32; 4]>,
    prop: Vec<u32>,
    media: Vec<Medium>,
  ) -> Result<Self, SimError> {
    Self::build(nodes, elems, Some(facenb), prop, media)
  }

  fn build(
    nodes: Vec<DVec3>,
    mut elems: Vec<[u32; 4]>,
    facenb: Option<Vec<[u32; 4]>>,
    prop: Vec<u32>,
    media: Vec<Medium>,
  ) -> Result<Self, SimError> {
    if elems.is_empty() || nodes.is_empty() {
      return Err(SimError::Mesh("empty node or element table".into()));
    }
    if prop.len() != elems.len() {
      return Err(SimError::Mesh("elemprop length != element count".into()));
    }
    if media.is_empty() {
      return Err(SimError::Mesh("medium table must hold the background".into()));
    }
    for (i, m) in media.iter().enumerate() {
      m.validate(i)?;
    }
    if let Some(nb) = &facenb {
      if nb.len() != elems.len() {
        return Err(SimError::Mesh("facenb length != element count".into()));
      }
    }
    for (i, &p) in prop.iter().enumerate() {
      if p as usize >= media.len() {
        return Err(SimError::Mesh(format!(
          "element {}: medium id {} out of range",
          i + 1,
          p
        )));
      }
    }

    let nnode = nodes.len() as u32;
    let mut facenb = facenb;
    for (i, el) in elems.iter_mut().enumerate() {
      for &nid in el.iter() {
        if nid == 0 || nid > nnode {
          return Err(SimError::Mesh(format!("element {}: bad node id {}", i + 1, nid)));
        }
      }
      // Canonicalize to positive orientation. Swapping local nodes 2 and 3
      // flips the sign and exchanges faces 2 and 3.
      if signed_volume(&nodes, el) < 0.0 {
        el.swap(2, 3);
        if let Some(nb) = facenb.as_mut() {
          nb[i].swap(2, 3);
        }
      }
    }

    let mut volumes = Vec::with_capacity(elems.len());
    let mut planes = Vec::with_capacity(elems.len());
    for (i, el) in elems.iter().enumerate() {
      let v6 = signed_volume(&nodes, el);
      if v6 <= 0.0 {
        return Err(SimError::Mesh(format!("element {}: degenerate (zero volume)", i + 1)));
      }
      volumes.push(v6 / 6.0);
      planes.push(face_planes(&nodes, el));
    }

    let facenb = match facenb {
      Some(nb) => nb,
      None => derive_neighbors(&elems)?,
    };

    let mut node_volumes = vec![0.0; nodes.len()];
    for (el, &v) in elems.iter().zip(&volumes) {
      for &nid in el {
        node_volumes[nid as usize - 1] += v * 0.25;
      }
    }

    Ok(Self {
      nodes,
      elems,
      facenb,
      prop,
      volumes,
      planes,
      node_volumes,
      media,
    })
  }

  /// Number of nodes.
  pub fn node_count(&self) -> usize {
    self.nodes.len()
  }

  /// Number of elements.
  pub fn elem_count(&self) -> usize {
    self.elems.len()
  }

  /// Number of non-background media (the `M` of the detected-photon
  /// record layout).
  pub fn medium_count(&self) -> usize {
    self.media.len() - 1
  }

  /// Node position (1-based id).
  #[inline]
  pub fn node(&self, id: u32) -> DVec3 {
    self.nodes[id as usize - 1]
  }

  /// The four node ids of an element (1-based element id).
  #[inline]
  pub fn elem_nodes(&self, e: u32) -> [u32; 4] {
    self.elems[e as usize - 1]
  }

  /// The four node positions of an element.
  #[inline]
  pub fn elem_points(&self, e: u32) -> [DVec3; 4] {
    let el = self.elems[e as usize - 1];
    [self.node(el[0]), self.node(el[1]), self.node(el[2]), self.node(el[3])]
  }

  /// Neighbor element id across a face (0 = exterior).
  #[inline]
  pub fn neighbor(&self, e: u32, face: usize) -> u32 {
    self.facenb[e as usize - 1][face]
  }

  /// Medium id of an element (0 = void).
  #[inline]
  pub fn prop(&self, e: u32) -> u32 {
    self.prop[e as usize - 1]
  }

  /// Optical properties of an element's medium. Void elements resolve to
  /// the background medium.
  #[inline]
  pub fn medium_of(&self, e: u32) -> &Medium {
    &self.media[self.prop[e as usize - 1] as usize]
  }

  /// Medium table entry (0 = background).
  #[inline]
  pub fn medium(&self, id: u32) -> &Medium {
    &self.media[id as usize]
  }

  /// All media, background first.
  pub fn media(&self) -> &[Medium] {
    &self.media
  }

  /// Element volume, mm³.
  #[inline]
  pub fn volume(&self, e: u32) -> f64 {
    self.volumes[e as usize - 1]
  }

  /// Face-plane table of an element.
  #[inline]
  pub fn planes(&self, e: u32) -> &FacePlanes {
    &self.planes[e as usize - 1]
  }

  /// Volume share attached to a node (sum of V/4 over adjacent elements).
  #[inline]
  pub fn node_volume(&self, node_id: u32) -> f64 {
    self.node_volumes[node_id as usize - 1]
  }

  /// Element centroid.
  #[inline]
  pub fn centroid(&self, e: u32) -> DVec3 {
    let p = self.elem_points(e);
    (p[0] + p[1] + p[2] + p[3]) * 0.25
  }

  /// Total mesh volume.
  pub fn total_volume(&self) -> f64 {
    self.volumes.iter().sum()
  }

  /// Barycentric coordinates of `p` in element `e`, derived from the four
  /// plane evaluations. The coordinates sum to 1; a negative entry means
  /// `p` lies outside the corresponding face.
  pub fn barycentric(&self, e: u32, p: DVec3) -> [f64; 4] {
    let planes = &self.planes[e as usize - 1];
    let evals = planes.eval(p).to_array();
    let pts = self.elem_points(e);
    let mut b = [0.0; 4];
    for f in 0..4 {
      // Height of the opposite node over face f.
      let h = planes.d.to_array()[f] - planes.normal(f).dot(pts[f]);
      b[f] = evals[f] / h;
    }
    b
  }

  /// True when `p` lies inside element `e` within the barycentric
  /// tolerance.
  pub fn contains(&self, e: u32, p: DVec3, tol: f64) -> bool {
    self.barycentric(e, p).iter().all(|&b| b >= -tol)
  }

  /// First candidate element enclosing `p`, if any.
  pub fn enclosing_element<I>(&self, p: DVec3, candidates: I, tol: f64) -> Option<u32>
  where
    I: IntoIterator<Item = u32>,
  {
    candidates.into_iter().find(|&e| e >= 1 && e as usize <= self.elems.len() && self.contains(e, p, tol))
  }

  /// Structural self-check run before dispatch: neighbor symmetry
  /// (every interior face is referenced back by its neighbor across the
  /// matching node triple) and neighbor id ranges.
  pub fn check_conformity(&self) -> Result<(), SimError> {
    let ne = self.elems.len() as u32;
    for e in 1..=ne {
      let el = self.elem_nodes(e);
      for f in 0..4 {
        let nb = self.neighbor(e, f);
        if nb > ne {
          return Err(SimError::Mesh(format!("element {} face {}: neighbor {} out of range", e, f, nb)));
        }
        if nb == 0 {
          continue;
        }
        let mut shared = [el[FACE_NODES[f][0]], el[FACE_NODES[f][1]], el[FACE_NODES[f][2]]];
        shared.sort_unstable();

        let back = self.elem_nodes(nb);
        let mirror = (0..4).find(|&g| {
          let mut other = [
            back[FACE_NODES[g][0]],
            back[FACE_NODES[g][1]],
            back[FACE_NODES[g][2]],
          ];
          other.sort_unstable();
          other == shared
        });
        match mirror {
          Some(g) if self.neighbor(nb, g) == e => {}
          _ => {
            return Err(SimError::Mesh(format!(
              "element {} face {} -> {} is not mirrored back",
              e, f, nb
            )))
          }
        }
      }
    }
    Ok(())
  }
}

/// Six times the signed volume of an element.
fn signed_volume(nodes: &[DVec3], el: &[u32; 4]) -> f64 {
  let a = nodes[el[0] as usize - 1];
  let b = nodes[el[1] as usize - 1];
  let c = nodes[el[2] as usize - 1];
  let d = nodes[el[3] as usize - 1];
  (b - a).cross(c - a).dot(d - a)
}

/// Outward face planes of a positively-oriented element.
fn face_planes(nodes: &[DVec3], el: &[u32; 4]) -> FacePlanes {
  let p = [
    nodes[el[0] as usize - 1],
    nodes[el[1] as usize - 1],
    nodes[el[2] as usize - 1],
    nodes[el[3] as usize - 1],
  ];
  let mut nx = [0.0; 4];
  let mut ny = [0.0; 4];
  let mut nz = [0.0; 4];
  let mut d = [0.0; 4];
  for f in 0..4 {
    let (a, b, c) = (p[FACE_NODES[f][0]], p[FACE_NODES[f][1]], p[FACE_NODES[f][2]]);
    let n = (b - a).cross(c - a).normalize();
    nx[f] = n.x;
    ny[f] = n.y;
    nz[f] = n.z;
    d[f] = n.dot(a);
  }
  FacePlanes {
    nx: DVec4::from_array(nx),
    ny: DVec4::from_array(ny),
    nz: DVec4::from_array(nz),
    d: DVec4::from_array(d),
  }
}

/// Derive the neighbor table by matching shared node triples.
fn derive_neighbors(elems: &[[u32; 4]]) -> Result<Vec<[u32; 4]>, SimError> {
  let mut facenb = vec![[0u32; 4]; elems.len()];
  let mut shared: HashMap<[u32; 3], Vec<(u32, usize)>> = HashMap::with_capacity(elems.len() * 2);

  for (i, el) in elems.iter().enumerate() {
    let e = i as u32 + 1;
    for f in 0..4 {
      let mut key = [el[FACE_NODES[f][0]], el[FACE_NODES[f][1]], el[FACE_NODES[f][2]]];
      key.sort_unstable();
      shared.entry(key).or_default().push((e, f));
    }
  }
  for (key, owners) in shared {
    match owners.as_slice() {
      // Exterior face: facenb stays 0.
      [_] => {}
      [(e0, f0), (e1, f1)] => {
        facenb[*e0 as usize - 1][*f0] = *e1;
        facenb[*e1 as usize - 1][*f1] = *e0;
      }
      _ => {
        return Err(SimError::Mesh(format!(
          "face {:?} shared by {} elements",
          key,
          owners.len()
        )))
      }
    }
  }
  Ok(facenb)
}

#[cfg(test)]
#[path = "mesh_test.rs"]
mod mesh_test;
