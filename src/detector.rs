//! Detected-photon capture.
//!
//! When a photon escapes into the void its exit position is tested
//! against the detector spheres; the first hit (detector ids are
//! 1-based) packs one fixed-width f32 record into a shared buffer at an
//! atomically incremented cursor. The cursor keeps counting past the
//! buffer capacity so the host can detect and size the overflow; records
//! past capacity are dropped.
//!
//! Record layout (`reclen` f32 values, `M` = non-background media):
//!
//! ```text
//! [ det_id | scatters[M] | pathlength[M] | momentum[M]? | p.xyz v.xyz ? | w0 ]
//! ```
//!
//! With seed saving enabled the photon's initial RNG state lands in a
//! parallel buffer at the same index, enabling later replay.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use glam::DVec3;

use crate::config::SimConfig;
use crate::mesh::Detector;

/// Per-photon per-medium statistics carried while detector capture is
/// active.
#[derive(Clone, Debug, Default)]
pub struct PartialStats {
  /// Scattering events per medium.
  pub scatters: smallvec::SmallVec<[f64; 8]>,
  /// Pathlength per medium, mm.
  pub paths: smallvec::SmallVec<[f64; 8]>,
  /// Momentum transfer (Σ 1−cos θ) per medium.
  pub momentum: smallvec::SmallVec<[f64; 8]>,
}

impl PartialStats {
  pub fn new(media: usize) -> Self {
    Self {
      scatters: smallvec::smallvec![0.0; media],
      paths: smallvec::smallvec![0.0; media],
      momentum: smallvec::smallvec![0.0; media],
    }
  }

  pub fn reset(&mut self) {
    self.scatters.iter_mut().for_each(|x| *x = 0.0);
    self.paths.iter_mut().for_each(|x| *x = 0.0);
    self.momentum.iter_mut().for_each(|x| *x = 0.0);
  }
}

/// Shared capture buffer.
pub struct DetectorBank {
  reclen: usize,
  capacity: usize,
  save_exit: bool,
  save_momentum: bool,
  detectors: Vec<Detector>,
  cursor: AtomicUsize,
  records: Vec<AtomicU32>,
  seeds: Option<Vec<AtomicU64>>,
}

/// Collected capture results after the batch.
#[derive(Clone, Debug, Default)]
pub struct DetectedPhotons {
  /// Width of one record in f32.
  pub reclen: usize,
  /// Records actually stored, packed back to back.
  pub records: Vec<f32>,
  /// Total capture attempts, including dropped ones.
  pub total: u64,
  /// Captures dropped due to a full buffer.
  pub dropped: u64,
  /// Initial RNG states of stored records (when seed saving was on).
  pub seeds: Vec<[u64; 2]>,
}

impl DetectedPhotons {
  /// Number of stored records.
  pub fn count(&self) -> usize {
    if self.reclen == 0 {
      0
    } else {
      self.records.len() / self.reclen
    }
  }

  /// One stored record as a slice.
  pub fn record(&self, i: usize) -> &[f32] {
    &self.records[i * self.reclen..(i + 1) * self.reclen]
  }
}

impl DetectorBank {
  /// Build the bank for a batch; `media` is the non-background medium
  /// count defining the record width.
  pub fn new(cfg: &SimConfig, media: usize) -> Self {
    let reclen = cfg.detected_record_len(media);
    let capacity = cfg.max_detected;
    let mut records = Vec::with_capacity(capacity * reclen);
    records.resize_with(capacity * reclen, || AtomicU32::new(0));
    let seeds = cfg.save_seed.then(|| {
      let mut s = Vec::with_capacity(capacity * 2);
      s.resize_with(capacity * 2, || AtomicU64::new(0));
      s
    });
    Self {
      reclen,
      capacity,
      save_exit: cfg.save_exit,
      save_momentum: cfg.save_momentum,
      detectors: cfg.detectors.clone(),
      cursor: AtomicUsize::new(0),
      records,
      seeds,
    }
  }

  /// First detector whose sphere contains `p`, as a 1-based id.
  fn hit_detector(&self, p: DVec3) -> Option<usize> {
    self
      .detectors
      .iter()
      .position(|d| p.distance_squared(d.pos) <= d.radius * d.radius)
      .map(|i| i + 1)
  }

  /// Test an escaping photon and store its record on a hit. Returns true
  /// when the photon hit a detector (even if the record was dropped).
  #[allow(clippy::too_many_arguments)]
  pub fn capture(
    &self,
    exit_pos: DVec3,
    exit_dir: DVec3,
    initial_weight: f64,
    initial_state: [u64; 2],
    stats: &PartialStats,
  ) -> bool {
    let Some(det_id) = self.hit_detector(exit_pos) else {
      return false;
    };

    let slot = self.cursor.fetch_add(1, Ordering::Relaxed);
    if slot >= self.capacity {
      // Dropped; the cursor past capacity reports the overflow size.
      return true;
    }

    let base = slot * self.reclen;
    let mut offset = base;
    let mut push = |value: f32| {
      self.records[offset].store(value.to_bits(), Ordering::Relaxed);
      offset += 1;
    };

    push(det_id as f32);
    for &s in &stats.scatters {
      push(s as f32);
    }
    for &l in &stats.paths {
      push(l as f32);
    }
    if self.save_momentum {
      for &m in &stats.momentum {
        push(m as f32);
      }
    }
    if self.save_exit {
      push(exit_pos.x as f32);
      push(exit_pos.y as f32);
      push(exit_pos.z as f32);
      push(exit_dir.x as f32);
      push(exit_dir.y as f32);
      push(exit_dir.z as f32);
    }
    push(initial_weight as f32);
    debug_assert_eq!(offset, base + self.reclen);

    if let Some(seeds) = &self.seeds {
      seeds[slot * 2].store(initial_state[0], Ordering::Relaxed);
      seeds[slot * 2 + 1].store(initial_state[1], Ordering::Relaxed);
    }
    true
  }

  /// Drain into the output container (after the batch barrier).
  pub fn finish(self) -> DetectedPhotons {
    let total = self.cursor.into_inner();
    let stored = total.min(self.capacity);
    let records = self.records[..stored * self.reclen]
      .iter()
      .map(|a| f32::from_bits(a.load(Ordering::Relaxed)))
      .collect();
    let seeds = match self.seeds {
      Some(s) => (0..stored)
        .map(|i| [s[i * 2].load(Ordering::Relaxed), s[i * 2 + 1].load(Ordering::Relaxed)])
        .collect(),
      None => Vec::new(),
    };
    DetectedPhotons {
      reclen: self.reclen,
      records,
      total: total as u64,
      dropped: total.saturating_sub(stored) as u64,
      seeds,
    }
  }
}

#[cfg(test)]
#[path = "detector_test.rs"]
mod detector_test;
