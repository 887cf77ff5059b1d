//! Per-actor face controller, owned by the tick thread.
//!
//! Ties the async builder, a phrase cache, the lip-sync and facial layers, the
//! blend controller and the eye controller together. Worker threads only ever
//! hand back fresh curve sets; layers and the cache are touched here alone.

use std::sync::Arc;

use anyhow::{bail, Context};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use metaface_animation_core::{
    synthesize_facial, synthesize_lipsync, ActorId, AnimationLayer, BlendController,
    BlendSettings, BlendSources, EyeController, EyeLimits, EyeSetup, FocusAngles,
    GenerationSettings, LayerOptions, MetaFaceError, PhonemeTimeline, RequestId, Result,
};
use metaface_api_core::{command_targets, parse_remote_payload, Frame};

use crate::admission::AdmissionGate;
use crate::builder::{BuildOrchestrator, BuildOutcome, BuiltAnimation};
use crate::inference::InferenceAdapter;

/// Per-actor knobs. Missing JSON fields fall back to their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub apply_lipsync_to_speak: bool,
    pub apply_facial_to_speak: bool,
    /// Blend into the baked frame on every tick.
    pub auto_bake: bool,
    pub baked_baseline_ratio: f32,
    pub baked_lipsync_intensity: f32,
    pub baked_facial_intensity: f32,
    /// Gap length treated as a pause by the facial layer.
    pub facial_pause_duration: f32,
    pub right_eye: EyeSetup,
    pub left_eye: EyeSetup,
    pub max_eye_rotation_horizontal: f32,
    pub max_eye_rotation_vertical: f32,
    pub allowed_eye_rotation_horizontal: f32,
    pub allowed_eye_rotation_vertical: f32,
    pub eye_movement_speed: f32,
    pub log_debug: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            apply_lipsync_to_speak: true,
            apply_facial_to_speak: true,
            auto_bake: true,
            baked_baseline_ratio: 0.25,
            baked_lipsync_intensity: 1.0,
            baked_facial_intensity: 1.0,
            facial_pause_duration: 1.0,
            right_eye: EyeSetup::default_right(),
            left_eye: EyeSetup::default_left(),
            max_eye_rotation_horizontal: 60.0,
            max_eye_rotation_vertical: 40.0,
            allowed_eye_rotation_horizontal: 60.0,
            allowed_eye_rotation_vertical: 40.0,
            eye_movement_speed: 280.0,
            log_debug: false,
        }
    }
}

impl ControllerConfig {
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("failed to parse controller config")
    }

    pub fn blend_settings(&self) -> BlendSettings {
        BlendSettings {
            baseline_ratio: self.baked_baseline_ratio,
            lipsync_intensity: self.baked_lipsync_intensity,
            facial_intensity: self.baked_facial_intensity,
        }
    }

    pub fn eye_limits(&self) -> EyeLimits {
        EyeLimits {
            max_horizontal: self.max_eye_rotation_horizontal,
            max_vertical: self.max_eye_rotation_vertical,
            allowed_horizontal: self.allowed_eye_rotation_horizontal,
            allowed_vertical: self.allowed_eye_rotation_vertical,
        }
    }

    fn configure_eyes(&self, eyes: &mut EyeController) {
        eyes.speed = self.eye_movement_speed;
        eyes.limits = self.eye_limits();
        eyes.right_setup = self.right_eye.clone();
        eyes.left_setup = self.left_eye.clone();
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ControllerEvent {
    /// Curves for `phrase` are cached; flags tell which tracks exist now.
    BuildComplete {
        phrase: String,
        lipsync: bool,
        facial: bool,
    },
    BuildFailed {
        phrase: String,
        error: MetaFaceError,
    },
    SpeakStarted {
        phrase: String,
    },
}

#[derive(Debug)]
struct PendingBuild {
    request: RequestId,
    phrase: String,
    /// Set when the phrase should start as soon as it is built; grows with time
    /// spent waiting so playback lines up with the already running sound.
    speak_offset: Option<f32>,
}

pub struct FaceController {
    actor: ActorId,
    pub config: ControllerConfig,
    pub settings: GenerationSettings,
    builds: BuildOrchestrator,
    cache: HashMap<String, BuiltAnimation>,
    pending: Option<PendingBuild>,
    lipsync: AnimationLayer,
    facial: AnimationLayer,
    current_phrase: Option<String>,
    play_time: f32,
    blend: BlendController,
    keys_dirty: bool,
    eyes: EyeController,
    eye_focus: Option<FocusAngles>,
    speaking_interval: Option<(f32, f32)>,
    events: Vec<ControllerEvent>,
}

impl FaceController {
    pub fn new(
        actor: ActorId,
        adapter: Arc<InferenceAdapter>,
        gate: Arc<AdmissionGate>,
        config: ControllerConfig,
        settings: GenerationSettings,
    ) -> Self {
        let mut eyes = EyeController::default();
        config.configure_eyes(&mut eyes);
        Self {
            actor,
            blend: BlendController::new(config.blend_settings()),
            config,
            settings,
            builds: BuildOrchestrator::new(adapter, gate),
            cache: HashMap::new(),
            pending: None,
            lipsync: AnimationLayer::default(),
            facial: AnimationLayer::default(),
            current_phrase: None,
            play_time: 0.0,
            keys_dirty: false,
            eyes,
            eye_focus: None,
            speaking_interval: None,
            events: Vec::new(),
        }
    }

    /// Replace the eye controller, e.g. with a seeded one. Config still applies.
    pub fn with_eyes(mut self, mut eyes: EyeController) -> Self {
        self.config.configure_eyes(&mut eyes);
        self.eyes = eyes;
        self
    }

    pub fn actor(&self) -> ActorId {
        self.actor
    }

    /// Start an async build, superseding any build in flight for this actor.
    pub fn build_animation(
        &mut self,
        phrase: &PhonemeTimeline,
        want_lipsync: bool,
        want_facial: bool,
    ) -> Result<RequestId> {
        if phrase.is_empty() {
            log::warn!("actor {}: phrase '{}' has no phonemes", self.actor.0, phrase.name);
            return Err(MetaFaceError::EmptyInput);
        }
        let handle = self.builds.request_build(
            self.actor,
            phrase.clone(),
            want_lipsync,
            want_facial,
            self.settings.clone(),
        )?;
        if self.config.log_debug {
            log::debug!(
                "actor {}: building '{}' (request {}, lipsync {want_lipsync}, facial {want_facial})",
                self.actor.0,
                phrase.name,
                handle.id.0
            );
        }
        self.pending = Some(PendingBuild {
            request: handle.id,
            phrase: phrase.name.clone(),
            speak_offset: None,
        });
        Ok(handle.id)
    }

    /// Interrupt the build in flight. Cached and playing curves stay as they are.
    pub fn cancel_build(&mut self) -> bool {
        self.pending = None;
        self.builds.interrupt(self.actor)
    }

    pub fn is_building(&self) -> bool {
        self.builds.is_building(self.actor)
    }

    /// Synthesize curves from a remote builder response on this thread.
    ///
    /// `command` selects the sections to use ("lipsync", "facial" or both).
    pub fn build_from_remote(
        &mut self,
        phrase: &PhonemeTimeline,
        command: &str,
        json: &str,
    ) -> anyhow::Result<()> {
        let targets = command_targets(command);
        if !targets.any() {
            bail!("remote command '{command}' names neither lipsync nor facial");
        }
        let payload = parse_remote_payload(json)
            .with_context(|| format!("remote payload for '{}'", phrase.name))?;

        let mut animation = self.cache.get(&phrase.name).cloned().unwrap_or_else(|| BuiltAnimation {
            phrase: phrase.name.clone(),
            ..BuiltAnimation::default()
        });
        if targets.lipsync {
            match &payload.lipsync {
                Some(raw) => animation.lipsync = Some(synthesize_lipsync(phrase, raw, &self.settings)?),
                None => log::warn!("remote payload for '{}' has no lipsync section", phrase.name),
            }
        }
        if targets.facial {
            match &payload.facial {
                Some(raw) => animation.facial = Some(synthesize_facial(phrase, raw, &self.settings)?),
                None => log::warn!("remote payload for '{}' has no facial section", phrase.name),
            }
        }

        self.events.push(ControllerEvent::BuildComplete {
            phrase: phrase.name.clone(),
            lipsync: animation.lipsync.is_some(),
            facial: animation.facial.is_some(),
        });
        self.cache.insert(phrase.name.clone(), animation);
        Ok(())
    }

    /// Play cached curves for `phrase`, or build the missing tracks and play
    /// them as soon as they arrive. `sound_offset` is how far the sound already is.
    pub fn speak(&mut self, phrase: &PhonemeTimeline, sound_offset: f32) -> Result<()> {
        let (has_lipsync, has_facial) = self.has_valid_animation(&phrase.name);
        let need_lipsync = self.config.apply_lipsync_to_speak && !has_lipsync;
        let need_facial = self.config.apply_facial_to_speak && !has_facial;
        if !need_lipsync && !need_facial {
            self.start_speaking_at(&phrase.name, sound_offset);
            return Ok(());
        }
        self.build_animation(phrase, need_lipsync, need_facial)?;
        if let Some(pending) = self.pending.as_mut() {
            pending.speak_offset = Some(sound_offset);
        }
        Ok(())
    }

    /// Install cached curves for `phrase` and play them from the start.
    pub fn start_speaking(&mut self, phrase: &str) -> bool {
        self.start_speaking_at(phrase, 0.0)
    }

    fn start_speaking_at(&mut self, phrase: &str, offset: f32) -> bool {
        let Some(animation) = self.cache.get(phrase) else {
            log::warn!("actor {}: no cached animation for '{phrase}'", self.actor.0);
            return false;
        };

        let mut started = false;
        match (&animation.lipsync, self.config.apply_lipsync_to_speak) {
            (Some(curves), true) => {
                self.lipsync.initialize(curves.clone(), LayerOptions::lipsync());
                self.lipsync.play();
                started = true;
            }
            _ => self.lipsync.stop(),
        }
        match (&animation.facial, self.config.apply_facial_to_speak) {
            (Some(curves), true) => {
                let options = LayerOptions::facial(
                    self.settings.emotions_intensity,
                    self.config.facial_pause_duration,
                );
                self.facial.initialize(curves.clone(), options);
                self.facial.play();
                started = true;
            }
            _ => self.facial.stop(),
        }

        if started {
            self.play_time = offset;
            self.current_phrase = Some(phrase.to_string());
            self.keys_dirty = true;
            self.events.push(ControllerEvent::SpeakStarted {
                phrase: phrase.to_string(),
            });
            if self.config.log_debug {
                log::debug!("actor {}: speaking '{phrase}' from {offset:.3}s", self.actor.0);
            }
        }
        started
    }

    /// Fade both layers out and forget any pending delayed speak.
    pub fn interrupt_speaking(&mut self) {
        self.lipsync.stop();
        self.facial.stop();
        if let Some(pending) = self.pending.as_mut() {
            pending.speak_offset = None;
        }
        self.current_phrase = None;
    }

    /// Whether non-empty (lipsync, facial) curves are cached for `phrase`.
    pub fn has_valid_animation(&self, phrase: &str) -> (bool, bool) {
        match self.cache.get(phrase) {
            Some(a) => (
                a.lipsync.as_ref().is_some_and(|c| !c.is_empty()),
                a.facial.as_ref().is_some_and(|c| !c.is_empty()),
            ),
            None => (false, false),
        }
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn set_eye_focus(&mut self, focus: Option<FocusAngles>) {
        self.eye_focus = focus;
    }

    /// External (distance to previous key, distance to next key) for facial pause fades.
    pub fn set_speaking_interval(&mut self, interval: Option<(f32, f32)>) {
        self.speaking_interval = interval;
    }

    /// Advance one frame.
    ///
    /// `speaking_time` is the external playback position when a sound is driving
    /// the face; otherwise time accumulates from `dt`.
    pub fn tick(&mut self, dt: f32, speaking_time: Option<f32>, baseline: Option<&Frame>) {
        self.play_time = speaking_time.unwrap_or(self.play_time + dt);
        if let Some(offset) = self.pending.as_mut().and_then(|p| p.speak_offset.as_mut()) {
            *offset += dt;
        }

        self.drain_builds();

        self.lipsync.process_frame(self.play_time, dt, None);
        self.facial
            .process_frame(self.play_time, dt, self.speaking_interval);
        if self.current_phrase.is_some() && !self.lipsync.is_active() && !self.facial.is_active() {
            self.current_phrase = None;
        }

        if self.config.auto_bake {
            self.bake(baseline);
        }

        self.eyes.update(dt, self.eye_focus);
        self.eyes.fill_curves();
    }

    fn drain_builds(&mut self) {
        for outcome in self.builds.poll() {
            match outcome {
                BuildOutcome::Built {
                    request, animation, ..
                } => self.install(request, animation),
                BuildOutcome::Failed {
                    request,
                    phrase,
                    error,
                    ..
                } => {
                    log::warn!("actor {}: build of '{phrase}' failed: {error}", self.actor.0);
                    self.finish_pending(request);
                    self.events.push(ControllerEvent::BuildFailed { phrase, error });
                }
                BuildOutcome::Interrupted { request, .. } => {
                    if self.config.log_debug {
                        log::debug!("actor {}: request {} interrupted", self.actor.0, request.0);
                    }
                    self.finish_pending(request);
                }
            }
        }
    }

    fn finish_pending(&mut self, request: RequestId) -> Option<PendingBuild> {
        match self.pending.take() {
            Some(p) if p.request == request => Some(p),
            other => {
                self.pending = other;
                None
            }
        }
    }

    fn install(&mut self, request: RequestId, animation: BuiltAnimation) {
        let name = animation.phrase.clone();
        let entry = self
            .cache
            .entry(name.clone())
            .or_insert_with(|| BuiltAnimation {
                phrase: name.clone(),
                ..BuiltAnimation::default()
            });
        if animation.lipsync.is_some() {
            entry.lipsync = animation.lipsync;
        }
        if animation.facial.is_some() {
            entry.facial = animation.facial;
        }
        let (lipsync, facial) = (entry.lipsync.is_some(), entry.facial.is_some());
        if self.config.log_debug {
            log::debug!("actor {}: '{name}' installed (request {})", self.actor.0, request.0);
        }
        self.events.push(ControllerEvent::BuildComplete {
            phrase: name.clone(),
            lipsync,
            facial,
        });

        let speak_offset = self.finish_pending(request).and_then(|p| {
            debug_assert_eq!(p.phrase, name);
            p.speak_offset
        });
        if let Some(offset) = speak_offset {
            self.start_speaking_at(&name, offset);
        }
    }

    /// Blend the baseline and both layers into the baked frame.
    pub fn bake(&mut self, baseline: Option<&Frame>) -> &Frame {
        let sources = BlendSources {
            baseline,
            lipsync: Some(&self.lipsync),
            facial: Some(&self.facial),
        };
        let baseline_grew =
            baseline.is_some_and(|b| b.keys().any(|k| !self.blend.frame().contains_key(k)));
        if self.keys_dirty || baseline_grew {
            self.blend.capture_keys(sources);
            self.keys_dirty = false;
        }
        self.blend.blend(sources)
    }

    pub fn baked_frame(&self) -> &Frame {
        self.blend.frame()
    }

    pub fn eye_curves(&self) -> &Frame {
        self.eyes.curves()
    }

    pub fn eyes_mut(&mut self) -> &mut EyeController {
        &mut self.eyes
    }

    pub fn lipsync_layer(&self) -> &AnimationLayer {
        &self.lipsync
    }

    pub fn facial_layer(&self) -> &AnimationLayer {
        &self.facial
    }

    pub fn play_time(&self) -> f32 {
        self.play_time
    }

    pub fn current_phrase(&self) -> Option<&str> {
        self.current_phrase.as_deref()
    }

    pub fn is_speaking(&self) -> bool {
        self.lipsync.is_playing() || self.facial.is_playing()
    }

    pub fn drain_events(&mut self) -> Vec<ControllerEvent> {
        std::mem::take(&mut self.events)
    }
}
