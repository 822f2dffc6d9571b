//! Gyrification growth simulation core.
//!
//! A discretized height field grows towards a spherical limit, folds under
//! periodic perturbations, and is clipped by a shrinking boundary. Fold
//! complexity is tracked with a curvature field and a fractal-dimension
//! proxy.
//!
//! Main components:
//! - [`grid`]: fixed parameter domain and coordinate arrays.
//! - [`reference`]: reference intensity maps and resampling.
//! - [`boundary`]: growth radius and constraint radius.
//! - [`phases`]: growth, folding and constraint phases of a step.
//! - [`engine`]: the per-step state transition.
//! - [`simulation`]: driver, diagnostics and observer hooks.
//! - [`curvature`] / [`fractal`]: diagnostics derived from the heights.
//! - [`config`] / [`error`] / [`types`]: configuration, errors, aliases.

pub mod boundary;
pub mod config;
pub mod curvature;
pub mod engine;
pub mod error;
pub mod fractal;
pub mod grid;
pub mod phases;
pub mod reference;
pub mod simulation;
pub mod types;

pub use config::Config;
pub use error::{SimError, SimResult};
pub use simulation::{Frame, RunSummary, Simulation, StepObserver, StepReport};
