//! Batch dispatch: photon chunking, worker fan-out, and reduction.
//!
//! The total photon count is split into one contiguous chunk per worker.
//! Each chunk runs an independent [`PhotonEngine`] on the rayon pool;
//! photons never interact, so the only shared mutable state is the
//! accumulator (atomic mode), the detector bank cursor, and the error
//! flag. Per-photon RNG streams are derived from the global photon index,
//! so trajectories are identical for any worker count.
//!
//! Worker-local accumulation (the default) merges chunk fields in chunk
//! order after the barrier, making the output bit-reproducible for a
//! fixed `(seed, worker count, assignment)`. Shared-atomic accumulation
//! trades that for memory: adds interleave in arrival order, which is
//! run-to-run identical only for a single worker.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::accumulator::{self, site_count, FieldWriter, LocalField, SharedField};
use crate::config::SimConfig;
use crate::constants::debug as debug_bits;
use crate::detector::{DetectedPhotons, DetectorBank};
use crate::engine::{Fate, PhotonEngine};
use crate::error::SimError;
use crate::mesh::TetMesh;

/// Merged results of one batch.
#[derive(Clone, Debug)]
pub struct SimOutput {
  /// Field buffer, row-major gate-then-site, `gates · sites` doubles.
  pub field: Vec<f64>,
  pub gates: usize,
  pub sites: usize,
  /// Detected-photon records and seed buffer.
  pub detected: DetectedPhotons,
  /// Total weight emitted by the source.
  pub launched_weight: f64,
  /// Total weight absorbed into media.
  pub absorbed_weight: f64,
  /// Total weight that left the system.
  pub escaped_weight: f64,
  /// Photons terminated by the degenerate-geometry guard.
  pub errored_photons: u64,
  /// Photons whose source sample found no enclosing element.
  pub not_launched: u64,
}

/// Per-chunk reduction state.
#[derive(Clone, Copy, Default)]
struct ChunkTotals {
  launched: f64,
  absorbed: f64,
  escaped: f64,
  errored: u64,
  not_launched: u64,
}

impl ChunkTotals {
  fn absorb(&mut self, report: &crate::engine::PhotonReport) {
    self.launched += report.launched;
    self.absorbed += report.absorbed;
    self.escaped += report.escaped;
    match report.fate {
      Fate::Errored => self.errored += 1,
      Fate::NotLaunched => self.not_launched += 1,
      _ => {}
    }
  }

  fn merge(&mut self, other: &ChunkTotals) {
    self.launched += other.launched;
    self.absorbed += other.absorbed;
    self.escaped += other.escaped;
    self.errored += other.errored;
    self.not_launched += other.not_launched;
  }
}

/// Split `nphoton` into `workers` contiguous chunks; the remainder goes
/// one extra photon at a time to the leading chunks.
fn chunk_ranges(nphoton: u64, workers: usize) -> Vec<std::ops::Range<u64>> {
  let workers = workers.max(1) as u64;
  let base = nphoton / workers;
  let extra = nphoton % workers;
  let mut ranges = Vec::with_capacity(workers as usize);
  let mut start = 0;
  for w in 0..workers {
    let len = base + u64::from(w < extra);
    ranges.push(start..start + len);
    start += len;
  }
  ranges
}

/// Run one simulation batch to completion.
pub fn run(mesh: &TetMesh, cfg: &SimConfig) -> Result<SimOutput, SimError> {
  cfg.validate()?;
  cfg.validate_with_mesh(mesh)?;
  mesh.check_conformity()?;

  let gates = cfg.gates();
  let sites = site_count(cfg, mesh);
  let workers = if cfg.workers > 0 {
    cfg.workers
  } else {
    rayon::current_num_threads()
  };
  let ranges = chunk_ranges(cfg.nphoton, workers);
  info!(
    nphoton = cfg.nphoton,
    workers = ranges.len(),
    gates,
    sites,
    "dispatching photon batch"
  );

  let bank = cfg.save_det.then(|| DetectorBank::new(cfg, mesh.medium_count()));
  let failed = AtomicBool::new(false);
  let failure: Mutex<Option<String>> = Mutex::new(None);

  let record_panic = |payload: Box<dyn std::any::Any + Send>| {
    failed.store(true, Ordering::Relaxed);
    let msg = payload
      .downcast_ref::<&str>()
      .map(|s| s.to_string())
      .or_else(|| payload.downcast_ref::<String>().cloned())
      .unwrap_or_else(|| "worker panicked".into());
    *failure.lock().unwrap() = Some(msg);
  };

  let (mut field, totals) = if cfg.atomic_field {
    let shared = SharedField::new(gates, sites);
    let chunk_totals: Vec<ChunkTotals> = ranges
      .par_iter()
      .map(|range| {
        let result = catch_unwind(AssertUnwindSafe(|| {
          let mut totals = ChunkTotals::default();
          let mut engine = PhotonEngine::new(mesh, cfg, bank.as_ref());
          let mut writer = FieldWriter::Shared(&shared);
          for id in range.clone() {
            if failed.load(Ordering::Relaxed) {
              break;
            }
            totals.absorb(&engine.run_photon(id, &mut writer));
          }
          totals
        }));
        match result {
          Ok(t) => t,
          Err(payload) => {
            record_panic(payload);
            ChunkTotals::default()
          }
        }
      })
      .collect();

    let mut totals = ChunkTotals::default();
    for t in &chunk_totals {
      totals.merge(t);
    }
    (shared.into_vec(), totals)
  } else {
    // Worker-local fields, merged in chunk order for reproducibility.
    let chunk_results: Vec<(LocalField, ChunkTotals)> = ranges
      .par_iter()
      .map(|range| {
        let result = catch_unwind(AssertUnwindSafe(|| {
          let mut totals = ChunkTotals::default();
          let mut local = LocalField::new(gates, sites);
          let mut engine = PhotonEngine::new(mesh, cfg, bank.as_ref());
          {
            let mut writer = FieldWriter::Local(&mut local);
            for id in range.clone() {
              if failed.load(Ordering::Relaxed) {
                break;
              }
              totals.absorb(&engine.run_photon(id, &mut writer));
            }
          }
          (local, totals)
        }));
        match result {
          Ok(r) => r,
          Err(payload) => {
            record_panic(payload);
            (LocalField::new(0, 0), ChunkTotals::default())
          }
        }
      })
      .collect();

    let mut field = vec![0.0; gates * sites];
    let mut totals = ChunkTotals::default();
    for (local, t) in &chunk_results {
      if !local.data.is_empty() {
        local.merge_into(&mut field);
      }
      totals.merge(t);
    }
    (field, totals)
  };

  if failed.load(Ordering::Relaxed) {
    let msg = failure.lock().unwrap().take().unwrap_or_else(|| "worker panicked".into());
    return Err(SimError::Worker(msg));
  }

  if cfg.do_normalize {
    accumulator::normalize(&mut field, cfg, mesh, totals.launched);
  }

  let detected = bank.map(DetectorBank::finish).unwrap_or_default();
  if detected.dropped > 0 {
    warn!(
      dropped = detected.dropped,
      capacity = cfg.max_detected,
      "detected-photon buffer overflowed"
    );
  }
  if totals.errored > 0 {
    warn!(errored = totals.errored, "photons terminated on degenerate geometry");
  }
  if cfg.debug_enabled(debug_bits::PROGRESS) {
    debug!(
      launched = totals.launched,
      absorbed = totals.absorbed,
      escaped = totals.escaped,
      "batch energy totals"
    );
  }
  info!(
    launched = totals.launched,
    absorbed = totals.absorbed,
    detected = detected.total,
    "batch complete"
  );

  Ok(SimOutput {
    field,
    gates,
    sites,
    detected,
    launched_weight: totals.launched,
    absorbed_weight: totals.absorbed,
    escaped_weight: totals.escaped,
    errored_photons: totals.errored,
    not_launched: totals.not_launched,
  })
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod dispatch_test;
