use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use metaface_animation_core::{EyeController, Frame, Result};
use metaface_api_core::{FACIAL_CHANNELS, LIPSYNC_CHANNELS};
use metaface_orchestrator::{
    ActorId, AdmissionGate, ControllerConfig, ControllerEvent, FaceController,
    GenerationSettings, InferenceAdapter, InferenceModel, MetaFaceError, PhonemeTimeline,
};
use metaface_test_fixtures as fixtures;

const DT: f32 = 1.0 / 60.0;

fn fake_model(outputs: usize, delay: Duration) -> impl InferenceModel + 'static {
    move |code: f32| -> Result<Vec<f32>> {
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        Ok((0..outputs)
            .map(|i| ((code.abs() + i as f32) * 0.37).sin().abs() * 0.6)
            .collect())
    }
}

fn adapter(delay: Duration) -> Arc<InferenceAdapter> {
    let adapter = InferenceAdapter::new();
    adapter.load_lipsync(fake_model(LIPSYNC_CHANNELS.len(), delay));
    adapter.load_emotions(fake_model(FACIAL_CHANNELS.len(), delay));
    Arc::new(adapter)
}

fn controller(adapter: Arc<InferenceAdapter>, gate: Arc<AdmissionGate>) -> FaceController {
    FaceController::new(
        ActorId(1),
        adapter,
        gate,
        ControllerConfig::default(),
        GenerationSettings::default(),
    )
}

fn timeline(name: &str) -> PhonemeTimeline {
    fixtures::phrases::timeline(name).expect("phrase fixture")
}

/// Tick until `done` holds, collecting events. Panics after a few seconds.
fn tick_until(
    controller: &mut FaceController,
    mut done: impl FnMut(&FaceController, &[ControllerEvent]) -> bool,
) -> Vec<ControllerEvent> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut events = Vec::new();
    loop {
        controller.tick(DT, None, None);
        events.extend(controller.drain_events());
        if done(controller, &events) {
            return events;
        }
        assert!(Instant::now() < deadline, "timed out; events so far: {events:?}");
        thread::sleep(Duration::from_millis(2));
    }
}

fn completed(events: &[ControllerEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            ControllerEvent::BuildComplete { phrase, .. } => Some(phrase.as_str()),
            _ => None,
        })
        .collect()
}

#[test]
fn build_installs_both_tracks_and_notifies() {
    let gate = Arc::new(AdmissionGate::new());
    let mut c = controller(adapter(Duration::ZERO), Arc::clone(&gate));
    let phrase = timeline("hello-world");

    c.build_animation(&phrase, true, true).unwrap();
    assert!(c.is_building());

    let events = tick_until(&mut c, |_, ev| !completed(ev).is_empty());
    assert_eq!(
        events,
        vec![ControllerEvent::BuildComplete {
            phrase: phrase.name.clone(),
            lipsync: true,
            facial: true,
        }]
    );
    assert_eq!(c.has_valid_animation(&phrase.name), (true, true));
    assert!(!c.is_building());
    assert_eq!(gate.admitted(), 1);
}

#[test]
fn empty_phrase_fails_before_any_work() {
    let gate = Arc::new(AdmissionGate::new());
    let mut c = controller(adapter(Duration::ZERO), Arc::clone(&gate));
    let empty = PhonemeTimeline::default();

    assert_eq!(c.build_animation(&empty, true, true), Err(MetaFaceError::EmptyInput));
    assert_eq!(c.speak(&empty, 0.0), Err(MetaFaceError::EmptyInput));
    assert!(!c.is_building());
    assert_eq!(gate.admitted(), 0);
}

#[test]
fn newer_request_supersedes_older() {
    let gate = Arc::new(AdmissionGate::new());
    let mut c = controller(adapter(Duration::from_millis(3)), Arc::clone(&gate));
    let first = timeline("dat");
    let second = timeline("hello-world");

    c.build_animation(&first, true, true).unwrap();
    c.build_animation(&second, true, true).unwrap();

    let events = tick_until(&mut c, |c, ev| !c.is_building() && !completed(ev).is_empty());
    // let the superseded worker finish so its result is seen and dropped
    while gate.outstanding() > 0 {
        thread::sleep(Duration::from_millis(2));
    }
    c.tick(DT, None, None);

    let mut all = events;
    all.extend(c.drain_events());
    assert_eq!(completed(&all), vec![second.name.as_str()]);
    assert_eq!(c.has_valid_animation(&first.name), (false, false));
    assert_eq!(c.has_valid_animation(&second.name), (true, true));
    assert_eq!(gate.admitted(), 2);
}

#[test]
fn cancelled_build_keeps_current_animation() {
    let gate = Arc::new(AdmissionGate::new());
    let mut c = controller(adapter(Duration::from_millis(3)), Arc::clone(&gate));
    let playing = timeline("hello-world");
    let dropped = timeline("dat");

    c.build_animation(&playing, true, true).unwrap();
    tick_until(&mut c, |_, ev| !completed(ev).is_empty());
    assert!(c.start_speaking(&playing.name));

    c.build_animation(&dropped, true, true).unwrap();
    assert!(c.cancel_build());
    assert!(!c.is_building());

    while gate.outstanding() > 0 {
        thread::sleep(Duration::from_millis(2));
    }
    c.tick(0.0, None, None);

    let events = c.drain_events();
    assert!(completed(&events).is_empty(), "{events:?}");
    assert_eq!(c.has_valid_animation(&dropped.name), (false, false));
    assert_eq!(c.current_phrase(), Some(playing.name.as_str()));
    assert!(c.lipsync_layer().curves().contains_key("JawOpen"));
}

#[test]
fn speak_waits_for_build_then_plays() {
    let gate = Arc::new(AdmissionGate::new());
    let mut c = controller(adapter(Duration::from_millis(1)), Arc::clone(&gate));
    let phrase = timeline("hello-world");

    c.speak(&phrase, 0.1).unwrap();
    assert!(!c.is_speaking());

    let events = tick_until(&mut c, |c, _| c.is_speaking());
    let started = events
        .iter()
        .position(|e| matches!(e, ControllerEvent::SpeakStarted { .. }))
        .expect("speak started");
    let built = events
        .iter()
        .position(|e| matches!(e, ControllerEvent::BuildComplete { .. }))
        .expect("build completed");
    assert!(built < started);
    // the sound kept running while the build was in flight
    assert!(c.play_time() > 0.1);

    // second time round the cache is used directly
    c.interrupt_speaking();
    c.speak(&phrase, 0.0).unwrap();
    assert!(c.is_speaking());
    assert_eq!(gate.admitted(), 1);
}

#[test]
fn interrupt_cancels_delayed_speak() {
    let mut c = controller(adapter(Duration::from_millis(1)), Arc::new(AdmissionGate::new()));
    let phrase = timeline("dat");

    c.speak(&phrase, 0.0).unwrap();
    c.interrupt_speaking();
    let events = tick_until(&mut c, |_, ev| !completed(ev).is_empty());
    assert!(!events
        .iter()
        .any(|e| matches!(e, ControllerEvent::SpeakStarted { .. })));
    assert!(!c.is_speaking());
    assert_eq!(c.has_valid_animation(&phrase.name), (true, true));
}

#[test]
fn missing_model_reports_failure() {
    let mut c = controller(Arc::new(InferenceAdapter::new()), Arc::new(AdmissionGate::new()));
    let phrase = timeline("dat");

    c.build_animation(&phrase, true, false).unwrap();
    let events = tick_until(&mut c, |_, ev| !ev.is_empty());
    assert_eq!(
        events,
        vec![ControllerEvent::BuildFailed {
            phrase: phrase.name.clone(),
            error: MetaFaceError::ModelNotReady,
        }]
    );
    assert_eq!(c.has_valid_animation(&phrase.name), (false, false));
}

#[test]
fn remote_payloads_fill_the_cache() {
    let mut c = controller(Arc::new(InferenceAdapter::new()), Arc::new(AdmissionGate::new()));
    let phrase = timeline("hello-world");

    let lipsync_only = fixtures::remote_payloads::json("lipsync-only").unwrap();
    c.build_from_remote(&phrase, "build_lipsync", &lipsync_only).unwrap();
    assert_eq!(c.has_valid_animation(&phrase.name), (true, false));

    let full = fixtures::remote_payloads::json("hello-world").unwrap();
    c.build_from_remote(&phrase, "build_facial", &full).unwrap();
    assert_eq!(c.has_valid_animation(&phrase.name), (true, true));
    // lip-sync from the first response survives the facial-only update
    assert_eq!(c.drain_events().len(), 2);

    let malformed = fixtures::remote_payloads::json("malformed").unwrap();
    let err = c.build_from_remote(&phrase, "build_lipsync", &malformed).unwrap_err();
    assert!(format!("{err:#}").contains("non-numeric"), "{err:#}");
    assert!(c.build_from_remote(&phrase, "ping", &full).is_err());
}

#[test]
fn baked_frame_covers_every_source() {
    let mut c = controller(Arc::new(InferenceAdapter::new()), Arc::new(AdmissionGate::new()));
    let phrase = timeline("hello-world");
    let full = fixtures::remote_payloads::json("hello-world").unwrap();
    c.build_from_remote(&phrase, "build_lipsync_facial", &full).unwrap();
    assert!(c.start_speaking(&phrase.name));

    let mut baseline = Frame::new();
    baseline.insert("Custom".to_string(), 0.5);
    baseline.insert("JawOpen".to_string(), 0.9);

    for _ in 0..30 {
        c.tick(DT, None, Some(&baseline));
        for (name, v) in c.baked_frame() {
            assert!((-1.0..=1.0).contains(v), "{name}={v}");
        }
    }
    let baked = c.baked_frame();
    for key in ["Custom", "JawOpen", "BrowInnerUp"] {
        assert!(baked.contains_key(key), "missing {key}");
    }
}

#[test]
fn external_speaking_time_drives_playback() {
    let mut c = controller(Arc::new(InferenceAdapter::new()), Arc::new(AdmissionGate::new()));
    let phrase = timeline("hello-world");
    let full = fixtures::remote_payloads::json("hello-world").unwrap();
    c.build_from_remote(&phrase, "build_lipsync_facial", &full).unwrap();
    c.start_speaking(&phrase.name);

    c.tick(DT, Some(0.5), None);
    assert_eq!(c.play_time(), 0.5);
    c.tick(DT, None, None);
    assert!((c.play_time() - (0.5 + DT)).abs() < 1e-6);
}

#[test]
fn live_eyes_write_look_curves() {
    let mut c = controller(Arc::new(InferenceAdapter::new()), Arc::new(AdmissionGate::new()))
        .with_eyes(EyeController::seeded(7));
    c.eyes_mut().set_movement_enabled(true);
    for _ in 0..240 {
        c.tick(DT, None, None);
    }
    let curves = c.eye_curves();
    assert!(!curves.is_empty());
    for (name, v) in curves {
        assert!((0.0..=1.0).contains(v), "{name}={v}");
    }
}
