//! photon_transport - Mesh-based Monte Carlo photon transport core
//!
//! This crate propagates large ensembles of independent photon packets
//! through a tetrahedral finite-element mesh of heterogeneous turbid
//! media, accumulating a time-gated fluence/energy field and optional
//! per-detected-photon path statistics.
//!
//! # Features
//!
//! - **Ray-tet stepping**: branch-less Badouel over precomputed face
//!   planes (plus Plücker, Havel, classic Badouel, and a Cartesian-grid
//!   variant), all producing identical element transitions
//! - **Full launch model set**: pencil, isotropic, cone, Gaussian,
//!   planar, pattern, Fourier family, arcsine, disk, z-Gaussian, line,
//!   and slit sources with focal-point steering
//! - **Physics**: Henyey-Greenstein scattering, Fresnel
//!   reflection/refraction with total internal reflection, Russian
//!   roulette, time-of-flight gating
//! - **Data-parallel dispatch**: rayon worker chunks over a shared
//!   read-only mesh, with worker-local or lock-free atomic accumulation
//!   and reproducible per-photon random streams
//! - **Replay**: per-photon RNG seed capture and deterministic re-runs
//!   for detected-photon (Jacobian) analysis
//!
//! # Example
//!
//! ```ignore
//! use glam::DVec3;
//! use photon_transport::{dispatch, Medium, SimConfig, SourceDesc, TetMesh};
//!
//! // Mesh tables come from an external loader.
//! let mesh = TetMesh::new(nodes, elems, prop, media)?;
//!
//! let cfg = SimConfig::default()
//!   .with_nphoton(1_000_000)
//!   .with_time_window(0.0, 5e-9, 1e-10)
//!   .with_source(SourceDesc::pencil(
//!     DVec3::new(0.0, 0.0, 0.1),
//!     DVec3::new(0.0, 0.0, 1.0),
//!   ));
//!
//! let output = dispatch::run(&mesh, &cfg)?;
//! println!("absorbed {:.4} of {:.0} launched",
//!   output.absorbed_weight, output.launched_weight);
//! ```

pub mod constants;

// Photon random stream
pub mod rng;
pub use rng::RandomStream;

// Mesh, medium, and detector tables
pub mod mesh;
pub use mesh::{Detector, FacePlanes, Medium, TetMesh};

// Batch configuration
pub mod config;
pub use config::{
  BasisOrder, GridSpec, OutputType, Pattern, RayMethod, ReplayInput, SimConfig, SourceDesc,
  SourceKind, SpecularMode,
};

// Error surface
pub mod error;
pub use error::SimError;

// Physics kernels
pub mod fresnel;
pub mod scatter;

// Launch models
pub mod source;
pub use source::Launch;

// Ray-tet exit search
pub mod tracer;
pub use tracer::RayExit;

// Field accumulation
pub mod accumulator;
pub use accumulator::{FieldWriter, LocalField, SharedField};

// Detected-photon capture
pub mod detector;
pub use detector::{DetectedPhotons, DetectorBank, PartialStats};

// Per-photon state machine
pub mod engine;
pub use engine::{Fate, Photon, PhotonEngine, PhotonReport};

// Batch dispatch
pub mod dispatch;
pub use dispatch::SimOutput;

#[cfg(test)]
mod test_utils;
