//! Background curve builds with per-actor single flight.
//!
//! `request_build` validates on the calling thread, interrupts any build still in
//! flight for the same actor, and starts a worker queued on the admission gate.
//! Once it holds a slot the worker runs inference and synthesis (lip-sync and
//! facial on two threads when both are wanted) and sends a `BuildOutcome` back
//! over a channel. `poll` on the owning thread drops outcomes of superseded
//! requests, so results are never applied out of order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use hashbrown::HashMap;

use metaface_animation_core::{
    synthesize_facial, synthesize_lipsync, ActorId, GenerationSettings, IdAllocator,
    MetaFaceError, NamedCurveSet, PhonemeTimeline, RequestId, Result,
};
use metaface_api_core::CurveSetKind;

use crate::admission::AdmissionGate;
use crate::inference::InferenceAdapter;

/// Everything a worker needs; moved onto the worker thread.
#[derive(Clone, Debug)]
pub struct BuildRequest {
    pub id: RequestId,
    pub actor: ActorId,
    pub timeline: PhonemeTimeline,
    pub want_lipsync: bool,
    pub want_facial: bool,
    pub settings: GenerationSettings,
}

/// Freshly built curves for one phrase.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuiltAnimation {
    pub phrase: String,
    pub lipsync: Option<NamedCurveSet>,
    pub facial: Option<NamedCurveSet>,
}

#[derive(Debug)]
pub enum BuildOutcome {
    Built {
        request: RequestId,
        actor: ActorId,
        animation: BuiltAnimation,
    },
    Interrupted {
        request: RequestId,
        actor: ActorId,
    },
    Failed {
        request: RequestId,
        actor: ActorId,
        phrase: String,
        error: MetaFaceError,
    },
}

impl BuildOutcome {
    pub fn request(&self) -> RequestId {
        match self {
            BuildOutcome::Built { request, .. }
            | BuildOutcome::Interrupted { request, .. }
            | BuildOutcome::Failed { request, .. } => *request,
        }
    }

    pub fn actor(&self) -> ActorId {
        match self {
            BuildOutcome::Built { actor, .. }
            | BuildOutcome::Interrupted { actor, .. }
            | BuildOutcome::Failed { actor, .. } => *actor,
        }
    }
}

/// Caller-side view of a started build.
#[derive(Clone, Debug)]
pub struct BuildHandle {
    pub id: RequestId,
    pub actor: ActorId,
    cancel: Arc<AtomicBool>,
}

impl BuildHandle {
    pub fn interrupt(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_interrupted(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }
}

fn build_track(
    adapter: &InferenceAdapter,
    kind: CurveSetKind,
    timeline: &PhonemeTimeline,
    settings: &GenerationSettings,
    cancel: &AtomicBool,
) -> Result<NamedCurveSet> {
    let raw = adapter.run(kind, timeline, cancel)?;
    match kind {
        CurveSetKind::Lipsync => synthesize_lipsync(timeline, &raw, settings),
        CurveSetKind::Facial => synthesize_facial(timeline, &raw, settings),
    }
}

/// Run one request to completion on the current thread.
pub fn execute(adapter: &InferenceAdapter, request: BuildRequest, cancel: &AtomicBool) -> BuildOutcome {
    let BuildRequest {
        id,
        actor,
        timeline,
        want_lipsync,
        want_facial,
        settings,
    } = request;

    let (lipsync, facial) = thread::scope(|s| {
        let lipsync = want_lipsync.then(|| {
            s.spawn(|| build_track(adapter, CurveSetKind::Lipsync, &timeline, &settings, cancel))
        });
        let facial = want_facial
            .then(|| build_track(adapter, CurveSetKind::Facial, &timeline, &settings, cancel));
        let lipsync = lipsync.map(|worker| {
            worker
                .join()
                .unwrap_or_else(|_| Err(MetaFaceError::Inference("lipsync worker panicked".into())))
        });
        (lipsync, facial)
    });

    let built = lipsync.transpose().and_then(|lipsync| {
        facial.transpose().map(|facial| BuiltAnimation {
            phrase: timeline.name.clone(),
            lipsync,
            facial,
        })
    });

    match built {
        Ok(_) if cancel.load(Ordering::Acquire) => BuildOutcome::Interrupted { request: id, actor },
        Ok(animation) => BuildOutcome::Built {
            request: id,
            actor,
            animation,
        },
        Err(e) if e.is_interrupted() => BuildOutcome::Interrupted { request: id, actor },
        Err(error) => BuildOutcome::Failed {
            request: id,
            actor,
            phrase: timeline.name,
            error,
        },
    }
}

/// Owner-thread side of the async builder.
pub struct BuildOrchestrator {
    adapter: Arc<InferenceAdapter>,
    gate: Arc<AdmissionGate>,
    ids: IdAllocator,
    in_flight: HashMap<ActorId, BuildHandle>,
    tx: Sender<BuildOutcome>,
    rx: Receiver<BuildOutcome>,
}

impl BuildOrchestrator {
    pub fn new(adapter: Arc<InferenceAdapter>, gate: Arc<AdmissionGate>) -> Self {
        let (tx, rx) = unbounded();
        Self {
            adapter,
            gate,
            ids: IdAllocator::new(),
            in_flight: HashMap::new(),
            tx,
            rx,
        }
    }

    pub fn adapter(&self) -> &Arc<InferenceAdapter> {
        &self.adapter
    }

    /// Start a build, superseding any build in flight for `actor`.
    ///
    /// An empty timeline fails here without spawning anything.
    pub fn request_build(
        &mut self,
        actor: ActorId,
        timeline: PhonemeTimeline,
        want_lipsync: bool,
        want_facial: bool,
        settings: GenerationSettings,
    ) -> Result<BuildHandle> {
        if timeline.is_empty() {
            return Err(MetaFaceError::EmptyInput);
        }
        if !want_lipsync && !want_facial {
            return Err(MetaFaceError::InvalidSettings(
                "build requests neither lipsync nor facial curves".into(),
            ));
        }
        if let Some(previous) = self.in_flight.remove(&actor) {
            previous.interrupt();
            log::debug!("actor {}: request {} superseded", actor.0, previous.id.0);
        }

        let id = self.ids.alloc_request();
        let handle = BuildHandle {
            id,
            actor,
            cancel: Arc::new(AtomicBool::new(false)),
        };
        let request = BuildRequest {
            id,
            actor,
            timeline,
            want_lipsync,
            want_facial,
            settings,
        };

        let adapter = Arc::clone(&self.adapter);
        let tx = self.tx.clone();
        let cancel = Arc::clone(&handle.cancel);
        let queued = self.gate.submit();
        thread::Builder::new()
            .name(format!("metaface-build-{}", actor.0))
            .spawn(move || {
                // the slot stays held until the outcome is sent
                let ticket = queued.wait_for_slot(&cancel);
                let outcome = match ticket {
                    Some(_) => execute(&adapter, request, &cancel),
                    None => BuildOutcome::Interrupted { request: id, actor },
                };
                if tx.send(outcome).is_err() {
                    log::debug!("build result dropped, owner is gone");
                }
                drop(ticket);
            })
            .map_err(|e| MetaFaceError::Inference(format!("failed to start build worker: {e}")))?;

        log::debug!("actor {}: request {} submitted", actor.0, id.0);
        self.in_flight.insert(actor, handle.clone());
        Ok(handle)
    }

    /// Interrupt the build in flight for `actor`. Its result will be dropped.
    pub fn interrupt(&mut self, actor: ActorId) -> bool {
        match self.in_flight.remove(&actor) {
            Some(handle) => {
                handle.interrupt();
                log::debug!("actor {}: request {} interrupted", actor.0, handle.id.0);
                true
            }
            None => false,
        }
    }

    pub fn interrupt_all(&mut self) {
        for (_, handle) in self.in_flight.drain() {
            handle.interrupt();
        }
    }

    pub fn is_building(&self, actor: ActorId) -> bool {
        self.in_flight.contains_key(&actor)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Keep outcomes of the current request per actor; drop the rest.
    fn accept(&mut self, outcome: BuildOutcome) -> Option<BuildOutcome> {
        let actor = outcome.actor();
        let request = outcome.request();
        let current = self
            .in_flight
            .get(&actor)
            .is_some_and(|handle| handle.id == request);
        if !current {
            log::debug!("actor {}: stale result of request {} dropped", actor.0, request.0);
            return None;
        }
        let handle = self.in_flight.remove(&actor)?;
        if handle.is_interrupted() {
            return Some(BuildOutcome::Interrupted { request, actor });
        }
        Some(outcome)
    }

    /// Non-blocking drain of finished builds.
    pub fn poll(&mut self) -> Vec<BuildOutcome> {
        let mut out = Vec::new();
        while let Ok(outcome) = self.rx.try_recv() {
            out.extend(self.accept(outcome));
        }
        out
    }

    /// Block until at least one current outcome arrives or `timeout` passes.
    pub fn wait(&mut self, timeout: Duration) -> Vec<BuildOutcome> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(outcome) => {
                    if let Some(outcome) = self.accept(outcome) {
                        let mut out = vec![outcome];
                        out.extend(self.poll());
                        return out;
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return Vec::new();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaface_animation_core::PhonemeEvent;
    use metaface_api_core::{FACIAL_CHANNELS, LIPSYNC_CHANNELS};

    fn adapter() -> Arc<InferenceAdapter> {
        Arc::new(InferenceAdapter::with_models(
            |code: f32| -> Result<Vec<f32>> { Ok(vec![(code * 0.05).sin(); LIPSYNC_CHANNELS.len()]) },
            |code: f32| -> Result<Vec<f32>> { Ok(vec![(code * 0.03).cos(); FACIAL_CHANNELS.len()]) },
        ))
    }

    fn phrase(name: &str) -> PhonemeTimeline {
        PhonemeTimeline::new(
            name,
            "hello"
                .chars()
                .enumerate()
                .map(|(i, c)| PhonemeEvent::new(i as f32 * 0.1, c, i == 0))
                .collect(),
        )
    }

    #[test]
    fn execute_builds_requested_tracks() {
        let adapter = adapter();
        let request = BuildRequest {
            id: RequestId(7),
            actor: ActorId(1),
            timeline: phrase("hello"),
            want_lipsync: true,
            want_facial: false,
            settings: GenerationSettings::default(),
        };
        let never = AtomicBool::new(false);
        match execute(&adapter, request, &never) {
            BuildOutcome::Built { request, animation, .. } => {
                assert_eq!(request, RequestId(7));
                assert_eq!(animation.phrase, "hello");
                assert_eq!(animation.lipsync.unwrap().len(), LIPSYNC_CHANNELS.len());
                assert!(animation.facial.is_none());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn execute_reports_missing_model() {
        let adapter = InferenceAdapter::new();
        let request = BuildRequest {
            id: RequestId(0),
            actor: ActorId(0),
            timeline: phrase("hello"),
            want_lipsync: false,
            want_facial: true,
            settings: GenerationSettings::default(),
        };
        let never = AtomicBool::new(false);
        assert!(matches!(
            execute(&adapter, request, &never),
            BuildOutcome::Failed {
                error: MetaFaceError::ModelNotReady,
                ..
            }
        ));
    }

    #[test]
    fn empty_timeline_fails_without_a_worker() {
        let gate = Arc::new(AdmissionGate::new());
        let mut builds = BuildOrchestrator::new(adapter(), Arc::clone(&gate));
        let err = builds
            .request_build(
                ActorId(0),
                PhonemeTimeline::default(),
                true,
                true,
                GenerationSettings::default(),
            )
            .unwrap_err();
        assert_eq!(err, MetaFaceError::EmptyInput);
        assert_eq!(gate.admitted(), 0);
        assert!(!builds.is_building(ActorId(0)));
    }

    #[test]
    fn built_result_reaches_the_owner() {
        let mut builds = BuildOrchestrator::new(adapter(), Arc::new(AdmissionGate::new()));
        let handle = builds
            .request_build(ActorId(3), phrase("hello"), true, true, GenerationSettings::default())
            .unwrap();
        assert!(builds.is_building(ActorId(3)));

        let outcomes = builds.wait(Duration::from_secs(10));
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            BuildOutcome::Built { request, animation, .. } => {
                assert_eq!(*request, handle.id);
                assert!(animation.lipsync.is_some() && animation.facial.is_some());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(!builds.is_building(ActorId(3)));
    }

    #[test]
    fn shared_gate_bounds_concurrent_builds() {
        let slow = Arc::new(InferenceAdapter::with_models(
            |_: f32| -> Result<Vec<f32>> {
                thread::sleep(Duration::from_millis(1));
                Ok(vec![0.1; LIPSYNC_CHANNELS.len()])
            },
            |_: f32| -> Result<Vec<f32>> { Ok(vec![0.1; FACIAL_CHANNELS.len()]) },
        ));
        let gate = Arc::new(AdmissionGate::with_capacity(2));
        let mut orchestrators: Vec<_> = (0..16)
            .map(|_| BuildOrchestrator::new(Arc::clone(&slow), Arc::clone(&gate)))
            .collect();
        for (i, builds) in orchestrators.iter_mut().enumerate() {
            builds
                .request_build(ActorId(i as u32), phrase("hello"), true, false, GenerationSettings::default())
                .unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(10);
        while gate.outstanding() > 0 {
            assert!(gate.active() <= 2, "active {}", gate.active());
            assert!(Instant::now() < deadline, "builds did not finish");
            thread::sleep(Duration::from_millis(1));
        }
        let built = orchestrators
            .iter_mut()
            .flat_map(|builds| builds.poll())
            .filter(|o| matches!(o, BuildOutcome::Built { .. }))
            .count();
        assert_eq!(built, 16);
        assert_eq!(gate.admitted(), 16);
    }

    #[test]
    fn interrupted_build_delivers_nothing() {
        let mut builds = BuildOrchestrator::new(adapter(), Arc::new(AdmissionGate::new()));
        builds
            .request_build(ActorId(0), phrase("hello"), true, false, GenerationSettings::default())
            .unwrap();
        assert!(builds.interrupt(ActorId(0)));
        assert!(builds.wait(Duration::from_millis(200)).is_empty());
        assert!(builds.poll().is_empty());
    }
}
