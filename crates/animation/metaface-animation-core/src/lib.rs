#![allow(dead_code)]
//! MetaFace animation core (engine-agnostic)
//!
//! Phoneme timeline + raw per-phoneme model output in, named time curves out;
//! curves play through layers with fades and are blended into one frame per tick.
//! Eye look and head look-at solvers live here too since they only need the
//! shared math from `metaface-api-core`.

pub mod blend;
pub mod config;
pub mod curve;
pub mod errors;
pub mod eyes;
pub mod head_ik;
pub mod ids;
pub mod layer;
pub mod phoneme;
pub mod synth;
pub mod viseme;

// Re-exports for consumers (orchestrator, hosts)
pub use blend::{BlendController, BlendSettings, BlendSources};
pub use config::GenerationSettings;
pub use curve::{CurveSample, NamedCurveSet, TimeCurve, CURVE_FLAG_RICH};
pub use errors::{MetaFaceError, Result};
pub use eyes::{look_angles, EyeController, EyeLimits, EyeMode, EyeSetup, FocusAngles};
pub use head_ik::{solve_aim, HeadIkOutput, HeadIkSettings, HeadIkSolver, HeadPose, NeckBone};
pub use ids::{ActorId, IdAllocator, RequestId};
pub use layer::{AnimationLayer, LayerOptions, LayerState};
pub use phoneme::{PhonemeEvent, PhonemeTimeline};
pub use synth::{balance_smile_frown, synthesize_facial, synthesize_lipsync};
pub use viseme::{Viseme, VisemePresetTable};
pub use metaface_api_core::{Frame, RawAnimData};
