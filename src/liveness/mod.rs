//! Service Liveness
//!
//! Periodic reachability checks of the monitored targets, with the latest
//! result per target published to a concurrent cache.
//!
//! ```text
//! ┌──────────────┐    ┌──────────────────┐    ┌──────────────────┐
//! │ TargetStore  │───▶│  LivenessProber  │───▶│  LivenessCache   │
//! │ (per round)  │    │ (timer, fan-out) │    │ (id → result)    │
//! └──────────────┘    └──────────────────┘    └──────────────────┘
//!                              │
//!                              ▼
//!                     ┌──────────────────┐
//!                     │  LivenessProbe   │
//!                     │ (HEAD, then GET) │
//!                     └──────────────────┘
//! ```

pub mod cache;
pub mod probe;
pub mod prober;

pub use cache::{LivenessCache, LivenessResult, LivenessState};
pub use probe::{HttpProbe, LivenessProbe, ProbeErrorKind, ProbeOutcome};
pub use prober::{LivenessProber, ProberConfig, ProberState, RoundOutcome};
