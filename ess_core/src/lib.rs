#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Battery guard decision engine (hardware-agnostic).
//!
//! All field-bus access goes through `ess_traits::RegisterLink` and all time
//! through `ess_traits::Clock`, so every decision can be driven
//! deterministically from tests.
//!
//! ## Architecture
//!
//! - **Sampling**: one read pass per cycle (`sampler`)
//! - **Detection**: leaky night integrator (`night`), confirmed PV surplus (`surplus`)
//! - **Decision**: inverter mode ladder with latched `On` and delayed shutdown (`mode`),
//!   day/night output-mode value (`output`)
//! - **Actuation**: deduplicating, rate-limited writes (`governor`)
//! - **Orchestration**: `ControlLoop::step` and the fixed-cadence `runner`

pub mod builder;
pub mod config;
pub mod control;
pub mod conversions;
pub mod error;
pub mod governor;
pub mod hw_error;
pub mod mocks;
pub mod mode;
pub mod night;
pub mod output;
pub mod runner;
pub mod sampler;
pub mod status;
pub mod surplus;
pub mod util;

pub use builder::ControlLoopBuilder;
pub use config::{
    EngineCfg, GovernorCfg, MAX_OFF_DELAY, ModeCfg, NightCfg, OutputCfg, RegisterMap, SurplusCfg,
};
pub use control::{ControlLoop, Probe, StartupSync};
pub use error::{BuildError, LinkError, Result};
pub use governor::{Channel, WriteGate, WriteGovernor, WriteOutcome};
pub use mode::{Mode, ModeInput, ModeState, ModeStateMachine};
pub use night::{IntegratorState, NightDetector};
pub use output::DayNightOutputController;
pub use runner::{run, RunSummary};
pub use sampler::{Reading, Sampler};
pub use status::{CycleReport, CycleStatus};
pub use surplus::{SurplusDetector, SurplusTimer};
