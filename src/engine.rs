//! Per-photon transport state machine.
//!
//! ```text
//!                 ┌──────────┐
//!                 │ Launched │  source sample + enclosing element
//!                 └────┬─────┘
//!                      ▼
//!              ┌───────────────┐   ray-tet exit search, time clip,
//!       ┌─────▶│   Stepping    │   Beer-Lambert deposit, τ/weight/
//!       │      └──┬────┬────┬──┘   path advance
//!       │         │    │    │
//!       │  scatter│    │    │face crossing
//!       │  (isend)│    │    ▼
//!       │         │    │  ┌───────────────────┐ index mismatch:
//!       │         │    │  │ Crossing/Reflected │ Fresnel split or TIR
//!       │         │    │  └─────┬─────────────┘
//!       │         ▼    │        │ transmitted into neighbor (or void)
//!       │  ┌───────────┴─┐      │
//!       └──┤  Scattered   │      │
//!       ▲  └──────────────┘      │
//!       │   HG deflection,       │
//!       │   new path, roulette   │
//!       │                        ▼
//!   ┌───┴─────┐   ┌─────────┬─────────┬─────────┐
//!   │ (loop)  │   │ Exited  │TimedOut │ Errored │  + Absorbed (roulette)
//!   └─────────┘   └─────────┴─────────┴─────────┘
//! ```
//!
//! One engine instance runs on one worker and owns the per-photon
//! scratch (partial-path statistics); everything else it touches is
//! either read-only shared (mesh, config) or funneled through the
//! accumulation writer and the detector bank.

use glam::DVec3;
use tracing::trace;

use crate::accumulator::{deposit_grid, deposit_mesh, FieldWriter};
use crate::config::{OutputType, RayMethod, SimConfig, SpecularMode};
use crate::constants::{
  debug, EPS, FACE_NONE, FACE_TIME_EXIT, FIX_PHOTON, MAX_TRACE_RETRIES, R_C0, TIME_CLIP_MARGIN,
};
use crate::detector::{DetectorBank, PartialStats};
use crate::fresnel::{self, Interaction};
use crate::mesh::TetMesh;
use crate::rng::RandomStream;
use crate::scatter;
use crate::source;
use crate::tracer;

/// Terminal state of one photon history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fate {
  /// Escaped the mesh into the background.
  Exited,
  /// Reached the end of the time window.
  TimedOut,
  /// Terminated by Russian roulette.
  Absorbed,
  /// Degenerate geometry survived all fix-up retries.
  Errored,
  /// The source produced no weight or no enclosing element.
  NotLaunched,
}

/// Mutable per-photon state. Created at launch, owned by one worker,
/// dropped at termination.
#[derive(Clone, Debug)]
pub struct Photon {
  /// Position, mm.
  pub pos: DVec3,
  /// Unit direction of travel.
  pub dir: DVec3,
  /// Statistical weight in (0, 1].
  pub weight: f64,
  /// Time of flight, s.
  pub tof: f64,
  /// Current element: positive while tracking, 0 in the void, negated
  /// on error exit.
  pub elem: i64,
  /// Last face crossed ([`FACE_NONE`] after launch/scatter,
  /// [`FACE_TIME_EXIT`] after a time clip).
  pub last_face: i32,
  /// Remaining unitless scattering path (length · μs).
  pub slen: f64,
  /// Length of the last move, mm.
  pub lmove: f64,
}

/// Energy bookkeeping of one photon history.
#[derive(Clone, Copy, Debug)]
pub struct PhotonReport {
  /// Weight the source emitted (including any specular loss).
  pub launched: f64,
  /// Weight absorbed into the medium along the history.
  pub absorbed: f64,
  /// Weight that left the system (escape, time-out residual, roulette
  /// kill, specular loss, launch failure, error residual).
  pub escaped: f64,
  pub fate: Fate,
  /// Whether a detector captured the exit.
  pub detected: bool,
}

/// One worker's transport engine.
pub struct PhotonEngine<'a> {
  mesh: &'a TetMesh,
  cfg: &'a SimConfig,
  bank: Option<&'a DetectorBank>,
  stats: PartialStats,
}

impl<'a> PhotonEngine<'a> {
  pub fn new(mesh: &'a TetMesh, cfg: &'a SimConfig, bank: Option<&'a DetectorBank>) -> Self {
    Self {
      mesh,
      cfg,
      bank,
      stats: PartialStats::new(mesh.medium_count()),
    }
  }

  /// Contribution written to the field for one step, by output type.
  fn deposit_value(
    &self,
    de: f64,
    length: f64,
    w_before: f64,
    nscat: u64,
    replay_weight: f64,
    mua: f64,
  ) -> f64 {
    let per_mua = |de: f64| {
      if mua > 1e-12 {
        de / mua
      } else {
        // Limit of (1 - exp(-μa L))/μa as μa → 0.
        w_before * length
      }
    };
    match self.cfg.output {
      OutputType::Energy | OutputType::Fluence => de,
      OutputType::Flux => per_mua(de),
      OutputType::Jacobian => replay_weight * per_mua(de),
      OutputType::WeightedPath => w_before * length,
      OutputType::WeightedScatter => w_before * nscat as f64,
    }
  }

  /// Run one photon history to termination, depositing through `writer`.
  pub fn run_photon(&mut self, photon_id: u64, writer: &mut FieldWriter<'_>) -> PhotonReport {
    let replay = self.cfg.replay.as_ref();
    let mut rng = match replay {
      Some(r) => RandomStream::from_state(r.states[photon_id as usize]),
      None => RandomStream::for_photon(self.cfg.seed, photon_id),
    };
    let initial_state = rng.state();

    let launch = source::launch(self.mesh, self.cfg, &mut rng);
    let launched = launch.weight + launch.specular_loss;
    let mut report = PhotonReport {
      launched,
      absorbed: 0.0,
      escaped: launch.specular_loss,
      fate: Fate::NotLaunched,
      detected: false,
    };

    if launch.elem == 0 || launch.weight <= 0.0 {
      report.escaped = launched;
      return report;
    }
    if self.cfg.debug_enabled(debug::BARY) {
      trace!(photon_id, elem = launch.elem, bary = ?launch.bary, "launch");
    }

    let replay_weight = replay.map(|r| r.weights[photon_id as usize]).unwrap_or(1.0);
    let tof0 = replay.map(|r| r.times[photon_id as usize]).unwrap_or(0.0);
    let w0 = launch.weight;

    let mut ph = Photon {
      pos: launch.pos,
      dir: launch.dir,
      weight: launch.weight,
      tof: tof0,
      elem: launch.elem as i64,
      last_face: FACE_NONE,
      slen: rng.next_scatter_length(),
      lmove: 0.0,
    };
    self.stats.reset();
    let mut nscat = 0u64;
    let mut retries = 0u32;

    loop {
      let e = ph.elem as u32;
      let prop = self.mesh.prop(e);
      let med = *self.mesh.medium_of(e);
      let in_void = prop == 0;

      let exit = tracer::pick_exit(self.cfg.method, self.mesh, e, ph.pos, ph.dir);
      if !exit.found() {
        retries += 1;
        if self.cfg.debug_enabled(debug::EDGE) {
          trace!(photon_id, elem = e, retries, "degenerate intersection, nudging");
        }
        if retries > MAX_TRACE_RETRIES {
          ph.elem = -(e as i64);
          report.escaped += ph.weight;
          report.fate = Fate::Errored;
          return report;
        }
        // Pull the photon toward the element interior and retrace.
        ph.pos += (self.mesh.centroid(e) - ph.pos) * FIX_PHOTON;
        continue;
      }
      retries = 0;

      // Scatter-limited or geometry-limited move.
      let (mut length, isend) = if !in_void && med.mus > EPS {
        let free = ph.slen / med.mus;
        if exit.t >= free {
          (free, true)
        } else {
          (exit.t, false)
        }
      } else {
        (exit.t, false)
      };

      // Void elements advance the clock only when configured to.
      let advances_clock = !in_void || self.cfg.void_time;
      let mut timed_out = false;
      if advances_clock {
        let dt = length * med.n * R_C0;
        if ph.tof + dt > self.cfg.tend {
          let max_len = (self.cfg.tend - TIME_CLIP_MARGIN - ph.tof).max(0.0) / (med.n * R_C0);
          length = length.min(max_len);
          timed_out = true;
        }
      }

      // Deposit with the time gate at the segment start, then attenuate.
      if !in_void && length > 0.0 {
        let gate = self.cfg.gate_of(ph.tof);
        let att = (-med.mua * length).exp();
        let de = ph.weight * (1.0 - att);

        match self.cfg.method {
          RayMethod::Grid => {
            if let Some(grid) = &self.cfg.grid {
              let w_in = match self.cfg.output {
                OutputType::Jacobian => ph.weight * replay_weight,
                _ => ph.weight,
              };
              deposit_grid(
                writer,
                grid,
                self.cfg.output,
                gate,
                ph.pos,
                ph.dir,
                length,
                w_in,
                med.mua,
              );
            }
          }
          _ => {
            let value = self.deposit_value(de, length, ph.weight, nscat, replay_weight, med.mua);
            if value != 0.0 {
              deposit_mesh(
                writer,
                self.mesh,
                self.cfg.basis,
                gate,
                e,
                exit.face as usize,
                value,
              );
            }
          }
        }
        if self.cfg.debug_enabled(debug::ACCUM) {
          trace!(photon_id, elem = e, gate, de, "deposit");
        }
        report.absorbed += de;
        ph.weight *= att;
        if self.bank.is_some() {
          self.stats.paths[prop as usize - 1] += length;
        }
      }

      // Advance the state.
      ph.pos += ph.dir * length;
      if advances_clock {
        ph.tof += length * med.n * R_C0;
      }
      if !in_void {
        ph.slen -= length * med.mus;
      }
      ph.lmove = length;
      if self.cfg.debug_enabled(debug::MOVE) {
        trace!(photon_id, elem = e, pos = ?ph.pos, tof = ph.tof, w = ph.weight, "move");
      }

      if timed_out {
        ph.last_face = FACE_TIME_EXIT;
        report.escaped += ph.weight;
        report.fate = Fate::TimedOut;
        return report;
      }

      if isend {
        // Scatter: new direction and a fresh unitless path.
        nscat += 1;
        if self.bank.is_some() {
          self.stats.scatters[prop as usize - 1] += 1.0;
        }
        let defl = scatter::sample(&mut rng, ph.dir, med.g);
        if self.cfg.save_momentum && self.bank.is_some() {
          self.stats.momentum[prop as usize - 1] += 1.0 - defl.cos_theta;
        }
        ph.dir = defl.dir;
        ph.slen = rng.next_scatter_length();
        ph.last_face = FACE_NONE;

        // Roulette only outside time-resolved runs; survival keeps the
        // expectation by scaling the weight up.
        if ph.weight < self.cfg.min_weight && !self.cfg.is_time_resolved() {
          if rng.next_roulette_test() < 1.0 / self.cfg.roulette_size {
            ph.weight *= self.cfg.roulette_size;
          } else {
            report.escaped += ph.weight;
            report.fate = Fate::Absorbed;
            return report;
          }
        }
        continue;
      }

      // Face crossing.
      let face = exit.face as usize;
      let nb = self.mesh.neighbor(e, face);
      let n2 = if nb == 0 {
        self.cfg.n_out
      } else {
        self.mesh.medium_of(nb).n
      };

      if self.cfg.do_reflect && (med.n - n2).abs() > EPS {
        let normal = self.mesh.planes(e).normal(face);
        match fresnel::interact(&mut rng, ph.dir, normal, med.n, n2) {
          Interaction::Reflected(r) => {
            if self.cfg.debug_enabled(debug::REFLECT) {
              trace!(photon_id, elem = e, face, "reflected");
            }
            ph.dir = r;
            ph.last_face = exit.face;
            continue;
          }
          Interaction::Transmitted(t) => {
            ph.dir = t;
          }
        }
      }

      if nb == 0 {
        // Escape into the background void.
        report.escaped += ph.weight;
        report.fate = Fate::Exited;
        if let Some(bank) = self.bank {
          report.detected = bank.capture(ph.pos, ph.dir, w0, initial_state, &self.stats);
        }
        if self.cfg.debug_enabled(debug::EXIT) {
          trace!(photon_id, pos = ?ph.pos, w = ph.weight, detected = report.detected, "exit");
        }
        ph.elem = 0;
        return report;
      }

      if self.mesh.prop(nb) == 0 && matches!(self.cfg.specular, SpecularMode::TerminateIntoVoid) {
        // Transmission into an interior void region terminates.
        report.escaped += ph.weight;
        report.fate = Fate::Exited;
        return report;
      }

      ph.last_face = exit.face;
      ph.elem = nb as i64;
    }
  }
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;
