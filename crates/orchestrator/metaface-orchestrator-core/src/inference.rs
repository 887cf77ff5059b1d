//! InferenceAdapter: per-phoneme calls into the lip-sync and emotion models.
//!
//! Each model sits behind its own mutex so a lip-sync run and an emotion run can
//! proceed on separate threads without contending. A run checks two flags after
//! every phoneme: the caller's cancel flag and the model's running flag, which
//! `interrupt_all` clears. A single in-flight model call is never cut short.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use metaface_animation_core::phoneme::is_supported_symbol;
use metaface_animation_core::{MetaFaceError, PhonemeEvent, PhonemeTimeline, RawAnimData, Result};
use metaface_api_core::{curve_set, CurveSetKind};

/// Opaque model: one encoded phoneme in, one value per output channel out.
pub trait InferenceModel: Send {
    fn infer(&mut self, code: f32) -> Result<Vec<f32>>;
}

impl<F> InferenceModel for F
where
    F: FnMut(f32) -> Result<Vec<f32>> + Send,
{
    fn infer(&mut self, code: f32) -> Result<Vec<f32>> {
        self(code)
    }
}

/// Model input for a phoneme: `(symbol - 'a') * 2 + 1`, plus one at a word start.
///
/// Digits map to negative codes. Symbols outside [a-z0-9] have no code.
pub fn symbol_code(symbol: char, is_word_start: bool) -> Option<f32> {
    if !is_supported_symbol(symbol) {
        return None;
    }
    let code = (symbol as i32 - 'a' as i32) * 2 + 1 + i32::from(is_word_start);
    Some(code as f32)
}

const WARM_UP_TEXT: &str =
    "hello there this phrase warms up both face models before the first request arrives now";
const WARM_UP_STEP: f32 = 0.08;
const WARM_UP_WORD_GAP: f32 = 0.25;

/// Built-in phrase used to touch both models once before real requests.
pub fn warm_up_timeline() -> PhonemeTimeline {
    let mut phonemes = Vec::new();
    let mut time = 0.0f32;
    for word in WARM_UP_TEXT.split_whitespace() {
        for (i, c) in word.chars().enumerate() {
            phonemes.push(PhonemeEvent::new(time, c, i == 0));
            time += WARM_UP_STEP;
        }
        time += WARM_UP_WORD_GAP;
    }
    PhonemeTimeline::new("warm_up", phonemes)
}

struct ModelSlot {
    kind: CurveSetKind,
    model: Mutex<Option<Box<dyn InferenceModel>>>,
    ready: AtomicBool,
    running: AtomicBool,
}

impl ModelSlot {
    fn new(kind: CurveSetKind) -> Self {
        Self {
            kind,
            model: Mutex::new(None),
            ready: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    fn load(&self, model: Box<dyn InferenceModel>) {
        *self.model.lock() = Some(model);
        self.ready.store(true, Ordering::Release);
        log::info!("{:?} model loaded", self.kind);
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn evaluate(&self, model: &mut dyn InferenceModel, code: Option<f32>) -> Result<Vec<f32>> {
        let expected = curve_set(self.kind).len();
        let Some(code) = code else {
            return Ok(vec![0.0; expected]);
        };
        let mut values = model.infer(code)?;
        if values.len() != expected {
            return Err(MetaFaceError::OutputSizeMismatch {
                expected,
                got: values.len(),
            });
        }
        for v in values.iter_mut() {
            *v = v.clamp(-1.0, 1.0);
        }
        Ok(values)
    }

    fn infer(&self, symbol: char, is_word_start: bool) -> Result<Vec<f32>> {
        let mut guard = self.model.lock();
        let model = guard.as_deref_mut().ok_or(MetaFaceError::ModelNotReady)?;
        self.evaluate(model, symbol_code(symbol, is_word_start))
    }

    fn run(&self, timeline: &PhonemeTimeline, cancel: &AtomicBool) -> Result<RawAnimData> {
        timeline.validate()?;
        if !self.is_ready() {
            return Err(MetaFaceError::ModelNotReady);
        }
        let mut guard = self.model.lock();
        let model = guard.as_deref_mut().ok_or(MetaFaceError::ModelNotReady)?;

        self.running.store(true, Ordering::Release);
        let result = self.run_locked(model, timeline, cancel);
        self.running.store(false, Ordering::Release);
        result
    }

    fn run_locked(
        &self,
        model: &mut dyn InferenceModel,
        timeline: &PhonemeTimeline,
        cancel: &AtomicBool,
    ) -> Result<RawAnimData> {
        let channels = curve_set(self.kind);
        let mut out: RawAnimData = channels
            .iter()
            .map(|name| (name.to_string(), Vec::with_capacity(timeline.len())))
            .collect();

        let interrupted =
            || cancel.load(Ordering::Acquire) || !self.running.load(Ordering::Acquire);
        for phoneme in &timeline.phonemes {
            // also covers a request cancelled while waiting for the model lock
            if interrupted() {
                return Err(MetaFaceError::Interrupted);
            }
            let code = phoneme
                .symbol_char()
                .and_then(|c| symbol_code(c, phoneme.is_word_start));
            let values = self.evaluate(model, code)?;
            for (name, value) in channels.iter().zip(values) {
                if let Some(column) = out.get_mut(*name) {
                    column.push(value);
                }
            }
        }
        if interrupted() {
            return Err(MetaFaceError::Interrupted);
        }
        Ok(out)
    }
}

/// Shared inference service, constructed once and handed to every controller.
pub struct InferenceAdapter {
    lipsync: ModelSlot,
    emotions: ModelSlot,
}

impl Default for InferenceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceAdapter {
    /// No models loaded; every run fails with `ModelNotReady` until they are.
    pub fn new() -> Self {
        Self {
            lipsync: ModelSlot::new(CurveSetKind::Lipsync),
            emotions: ModelSlot::new(CurveSetKind::Facial),
        }
    }

    pub fn with_models(
        lipsync: impl InferenceModel + 'static,
        emotions: impl InferenceModel + 'static,
    ) -> Self {
        let adapter = Self::new();
        adapter.load_lipsync(lipsync);
        adapter.load_emotions(emotions);
        adapter
    }

    fn slot(&self, kind: CurveSetKind) -> &ModelSlot {
        match kind {
            CurveSetKind::Lipsync => &self.lipsync,
            CurveSetKind::Facial => &self.emotions,
        }
    }

    pub fn load_lipsync(&self, model: impl InferenceModel + 'static) {
        self.lipsync.load(Box::new(model));
    }

    pub fn load_emotions(&self, model: impl InferenceModel + 'static) {
        self.emotions.load(Box::new(model));
    }

    pub fn is_lipsync_ready(&self) -> bool {
        self.lipsync.is_ready()
    }

    pub fn is_emotions_ready(&self) -> bool {
        self.emotions.is_ready()
    }

    pub fn is_ready(&self) -> bool {
        self.is_lipsync_ready() && self.is_emotions_ready()
    }

    /// One phoneme through one model, clamped to [-1, 1].
    pub fn infer(&self, kind: CurveSetKind, symbol: char, is_word_start: bool) -> Result<Vec<f32>> {
        self.slot(kind).infer(symbol, is_word_start)
    }

    /// Run every phoneme of `timeline` through the model for `kind`.
    ///
    /// Unsupported symbols produce zeros without a model call so indices stay aligned.
    pub fn run(
        &self,
        kind: CurveSetKind,
        timeline: &PhonemeTimeline,
        cancel: &AtomicBool,
    ) -> Result<RawAnimData> {
        self.slot(kind).run(timeline, cancel)
    }

    /// Abort whatever runs are in progress after their current phoneme.
    pub fn interrupt_all(&self) {
        self.lipsync.running.store(false, Ordering::Release);
        self.emotions.running.store(false, Ordering::Release);
    }

    /// Run both models once over the built-in phrase on a background thread.
    pub fn warm_up(self: &Arc<Self>) -> std::io::Result<JoinHandle<()>> {
        let adapter = Arc::clone(self);
        thread::Builder::new()
            .name("metaface-warm-up".into())
            .spawn(move || {
                let timeline = warm_up_timeline();
                let never = AtomicBool::new(false);
                for kind in [CurveSetKind::Lipsync, CurveSetKind::Facial] {
                    match adapter.run(kind, &timeline, &never) {
                        Ok(_) => log::debug!("warm-up: {kind:?} model ran {} phonemes", timeline.len()),
                        Err(e) => log::warn!("warm-up: {kind:?} model skipped: {e}"),
                    }
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaface_api_core::{FACIAL_CHANNELS, LIPSYNC_CHANNELS};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counting_model(width: usize, calls: Arc<AtomicUsize>) -> impl InferenceModel {
        move |code: f32| -> Result<Vec<f32>> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![code / 100.0; width])
        }
    }

    fn timeline(symbols: &str) -> PhonemeTimeline {
        PhonemeTimeline::new(
            "t",
            symbols
                .chars()
                .enumerate()
                .map(|(i, c)| PhonemeEvent::new(i as f32 * 0.1, c, i == 0))
                .collect(),
        )
    }

    #[test]
    fn symbol_codes() {
        assert_eq!(symbol_code('a', false), Some(1.0));
        assert_eq!(symbol_code('a', true), Some(2.0));
        assert_eq!(symbol_code('c', false), Some(5.0));
        assert_eq!(symbol_code('z', true), Some(52.0));
        assert_eq!(symbol_code('1', false), Some(-95.0));
        assert_eq!(symbol_code('#', false), None);
        assert_eq!(symbol_code('A', false), None);
    }

    #[test]
    fn warm_up_phrase_has_72_phonemes() {
        let tl = warm_up_timeline();
        assert_eq!(tl.len(), 72);
        assert!(tl.phonemes[0].is_word_start);
        assert!(tl.validate().is_ok());
    }

    #[test]
    fn not_ready_and_empty_input() {
        let adapter = InferenceAdapter::new();
        let never = AtomicBool::new(false);
        assert!(!adapter.is_ready());
        assert_eq!(
            adapter.run(CurveSetKind::Lipsync, &timeline("ab"), &never),
            Err(MetaFaceError::ModelNotReady)
        );
        assert_eq!(
            adapter.infer(CurveSetKind::Facial, 'a', false),
            Err(MetaFaceError::ModelNotReady)
        );
        assert_eq!(
            adapter.run(CurveSetKind::Lipsync, &PhonemeTimeline::default(), &never),
            Err(MetaFaceError::EmptyInput)
        );
    }

    #[test]
    fn run_collects_one_column_per_channel() {
        let calls = Arc::new(AtomicUsize::new(0));
        let adapter = InferenceAdapter::with_models(
            counting_model(LIPSYNC_CHANNELS.len(), calls.clone()),
            counting_model(FACIAL_CHANNELS.len(), calls.clone()),
        );
        assert!(adapter.is_ready());
        let never = AtomicBool::new(false);

        let raw = adapter
            .run(CurveSetKind::Lipsync, &timeline("ab#"), &never)
            .unwrap();
        assert_eq!(raw.len(), LIPSYNC_CHANNELS.len());
        // 'a' at a word start, then 'b', then a placeholder without a model call
        assert_eq!(raw["JawOpen"], vec![0.02, 0.03, 0.0]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let raw = adapter
            .run(CurveSetKind::Facial, &timeline("z"), &never)
            .unwrap();
        assert_eq!(raw.len(), FACIAL_CHANNELS.len());
    }

    #[test]
    fn outputs_are_clamped_and_sized() {
        let adapter = InferenceAdapter::new();
        adapter.load_lipsync(|_: f32| -> Result<Vec<f32>> { Ok(vec![3.0; LIPSYNC_CHANNELS.len()]) });
        adapter.load_emotions(|_: f32| -> Result<Vec<f32>> { Ok(vec![0.0; 2]) });

        let v = adapter.infer(CurveSetKind::Lipsync, 'a', false).unwrap();
        assert!(v.iter().all(|x| *x == 1.0));
        assert_eq!(
            adapter.infer(CurveSetKind::Facial, 'a', false),
            Err(MetaFaceError::OutputSizeMismatch {
                expected: FACIAL_CHANNELS.len(),
                got: 2
            })
        );
    }

    #[test]
    fn invalid_symbol_length_aborts_before_inference() {
        let calls = Arc::new(AtomicUsize::new(0));
        let adapter = InferenceAdapter::new();
        adapter.load_lipsync(counting_model(LIPSYNC_CHANNELS.len(), calls.clone()));
        let mut tl = timeline("abc");
        tl.phonemes[2].symbol = "ch".into();
        let never = AtomicBool::new(false);
        assert!(matches!(
            adapter.run(CurveSetKind::Lipsync, &tl, &never),
            Err(MetaFaceError::InvalidPhonemeSymbol { index: 2, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancelled_request_never_calls_the_model() {
        let calls = Arc::new(AtomicUsize::new(0));
        let adapter = InferenceAdapter::new();
        adapter.load_lipsync(counting_model(LIPSYNC_CHANNELS.len(), calls.clone()));
        let cancel = AtomicBool::new(true);
        assert_eq!(
            adapter.run(CurveSetKind::Lipsync, &timeline("abcdef"), &cancel),
            Err(MetaFaceError::Interrupted)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancel_during_a_call_stops_before_the_next() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cancel = Arc::new(AtomicBool::new(false));
        let adapter = InferenceAdapter::new();
        {
            let calls = Arc::clone(&calls);
            let cancel = Arc::clone(&cancel);
            adapter.load_lipsync(move |_: f32| -> Result<Vec<f32>> {
                calls.fetch_add(1, Ordering::SeqCst);
                cancel.store(true, Ordering::Release);
                Ok(vec![0.0; LIPSYNC_CHANNELS.len()])
            });
        }
        assert_eq!(
            adapter.run(CurveSetKind::Lipsync, &timeline("abcdef"), &cancel),
            Err(MetaFaceError::Interrupted)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn interrupt_all_aborts_a_running_build() {
        let (started_tx, started_rx) = crossbeam_channel::bounded::<()>(1);
        let adapter = Arc::new(InferenceAdapter::new());
        adapter.load_lipsync(move |_: f32| -> Result<Vec<f32>> {
            let _ = started_tx.try_send(());
            thread::sleep(Duration::from_millis(1));
            Ok(vec![0.5; LIPSYNC_CHANNELS.len()])
        });

        let worker = {
            let adapter = Arc::clone(&adapter);
            thread::spawn(move || {
                let never = AtomicBool::new(false);
                adapter.run(CurveSetKind::Lipsync, &warm_up_timeline(), &never)
            })
        };
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        adapter.interrupt_all();
        assert_eq!(worker.join().unwrap(), Err(MetaFaceError::Interrupted));
    }

    #[test]
    fn warm_up_touches_both_models() {
        let lipsync_calls = Arc::new(AtomicUsize::new(0));
        let emotion_calls = Arc::new(AtomicUsize::new(0));
        let adapter = Arc::new(InferenceAdapter::with_models(
            counting_model(LIPSYNC_CHANNELS.len(), lipsync_calls.clone()),
            counting_model(FACIAL_CHANNELS.len(), emotion_calls.clone()),
        ));
        adapter.warm_up().unwrap().join().unwrap();
        assert_eq!(lipsync_calls.load(Ordering::SeqCst), 72);
        assert_eq!(emotion_calls.load(Ordering::SeqCst), 72);
    }
}
