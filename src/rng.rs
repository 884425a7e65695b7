//! Per-photon random number stream.
//!
//! The stream is a 64-bit xorshift128+ generator. Each photon derives its
//! state from `(user seed, global photon index)` through a splitmix64
//! expansion, so a photon's entire history is reproducible regardless of
//! how photons are split across workers.
//!
//! The raw state is exposed for the seed-save/replay path: saving the two
//! state words before launch and restoring them later replays the exact
//! same trajectory.

use rand_core::{RngCore, SeedableRng};

use crate::constants::EPS_LOG;

/// Scale factor mapping the top 53 bits of a u64 onto [0, 1).
const UNIT_53: f64 = 1.0 / (1u64 << 53) as f64;

/// xorshift128+ photon stream.
///
/// Implements [`RngCore`]/[`SeedableRng`] so it composes with the rand
/// ecosystem; the transport-specific draws are inherent methods.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RandomStream {
  s: [u64; 2],
}

/// splitmix64 step, used to expand seeds into full generator state.
fn splitmix64(state: &mut u64) -> u64 {
  *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
  let mut z = *state;
  z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
  z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
  z ^ (z >> 31)
}

impl RandomStream {
  /// Build the stream for one photon from the 32-bit user seed and the
  /// global photon index.
  pub fn for_photon(seed: u32, photon_id: u64) -> Self {
    let mut sm = (seed as u64) ^ photon_id.wrapping_mul(0xa076_1d64_78bd_642f);
    let s0 = splitmix64(&mut sm);
    let s1 = splitmix64(&mut sm);
    Self::from_state([s0, s1]).fixed_up()
  }

  /// Restore a stream from a saved state (replay path).
  pub fn from_state(s: [u64; 2]) -> Self {
    Self { s }
  }

  /// Raw generator state, for seed-save.
  pub fn state(&self) -> [u64; 2] {
    self.s
  }

  /// xorshift128+ must never hold the all-zero state.
  fn fixed_up(mut self) -> Self {
    if self.s == [0, 0] {
      self.s = [0x853c_49e6_748f_ea9b, 0xda3e_39cb_94b9_5bdb];
    }
    self
  }

  fn next_raw(&mut self) -> u64 {
    let mut s1 = self.s[0];
    let s0 = self.s[1];
    let out = s0.wrapping_add(s1);
    self.s[0] = s0;
    s1 ^= s1 << 23;
    self.s[1] = s1 ^ s0 ^ (s1 >> 18) ^ (s0 >> 5);
    out
  }

  /// Uniform draw in [0, 1).
  #[inline]
  pub fn next_uniform(&mut self) -> f64 {
    (self.next_raw() >> 11) as f64 * UNIT_53
  }

  /// Unitless scattering path length, `-ln(U + eps)`.
  #[inline]
  pub fn next_scatter_length(&mut self) -> f64 {
    -(self.next_uniform() + EPS_LOG).ln()
  }

  /// Azimuthal angle in [0, 2π).
  #[inline]
  pub fn next_azimuth(&mut self) -> f64 {
    2.0 * std::f64::consts::PI * self.next_uniform()
  }

  /// Henyey-Greenstein polar cosine for anisotropy `g`.
  ///
  /// Falls back to the isotropic inverse CDF when |g| is negligible; the
  /// result is clamped into [-1, 1] against rounding.
  #[inline]
  pub fn next_cos_theta_hg(&mut self, g: f64) -> f64 {
    let u = self.next_uniform();
    let cost = if g.abs() > crate::constants::EPS {
      let q = (1.0 - g * g) / (1.0 - g + 2.0 * g * u);
      (1.0 + g * g - q * q) / (2.0 * g)
    } else {
      2.0 * u - 1.0
    };
    cost.clamp(-1.0, 1.0)
  }

  /// Uniform draw deciding a Fresnel reflect-or-transmit split.
  #[inline]
  pub fn next_reflect_test(&mut self) -> f64 {
    self.next_uniform()
  }

  /// Uniform draw deciding Russian-roulette survival.
  #[inline]
  pub fn next_roulette_test(&mut self) -> f64 {
    self.next_uniform()
  }
}

impl RngCore for RandomStream {
  fn next_u32(&mut self) -> u32 {
    (self.next_raw() >> 32) as u32
  }

  fn next_u64(&mut self) -> u64 {
    self.next_raw()
  }

  fn fill_bytes(&mut self, dest: &mut [u8]) {
    rand_core::impls::fill_bytes_via_next(self, dest)
  }
}

impl SeedableRng for RandomStream {
  type Seed = [u8; 16];

  fn from_seed(seed: Self::Seed) -> Self {
    let s0 = u64::from_le_bytes(seed[0..8].try_into().unwrap());
    let s1 = u64::from_le_bytes(seed[8..16].try_into().unwrap());
    Self::from_state([s0, s1]).fixed_up()
  }
}

#[cfg(test)]
#[path = "rng_test.rs"]
mod rng_test;
