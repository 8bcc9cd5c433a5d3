//! Action Engine (spec §4.9) and Healing Supervisor (spec §4.10): turns a
//! resolved or symbolic target plus an operation name into backend calls,
//! with verification and failure-driven retry on top.

pub mod engine;
pub mod heal;

pub use engine::{
	ActionContext, ActionEngine, ActionFailure, ActionResult, ActionSpec, BackendErrorShape, BackendSource,
};
pub use heal::{Diagnosis, HealOutcome, HealingSupervisor};
