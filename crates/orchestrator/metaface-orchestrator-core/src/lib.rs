//! metaface-orchestrator
//!
//! Runs curve synthesis off the tick thread and hands results back to it.
//!
//! One [`InferenceAdapter`] and one [`AdmissionGate`] are created at startup and
//! shared by every actor. Each actor owns a [`FaceController`], which submits
//! builds to its [`BuildOrchestrator`], drains finished builds on `tick`, and
//! drives the layers, blend and eyes from the same thread.

pub mod admission;
pub mod builder;
pub mod controller;
pub mod inference;

pub use crate::admission::{AdmissionGate, BuildTicket, QueuedBuild, DEFAULT_CAPACITY};
pub use crate::builder::{
    execute, BuildHandle, BuildOrchestrator, BuildOutcome, BuildRequest, BuiltAnimation,
};
pub use crate::controller::{ControllerConfig, ControllerEvent, FaceController};
pub use crate::inference::{
    symbol_code, warm_up_timeline, InferenceAdapter, InferenceModel,
};

pub use metaface_animation_core::{ActorId, GenerationSettings, MetaFaceError, PhonemeTimeline};
