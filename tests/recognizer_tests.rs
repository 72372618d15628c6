// Integration tests for the recognizer state machine
//
// The microphone and the recognition engine are in-memory fakes; the test
// drives recognition by pushing engine events and watches what the
// recognizer reports.

use anyhow::{anyhow, bail, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use speech_duplex::audio::{AudioCapture, AudioCaptureConfig, AudioFrame, CaptureDevice};
use speech_duplex::credential::CredentialSource;
use speech_duplex::recognizer::{
    RecognitionEngine, RecognitionEngineFactory, RecognitionEvent, RecognitionResult,
    RecognitionSettings, TOKEN_REFRESH_INTERVAL,
};
use speech_duplex::{
    Credential, CredentialCache, Recognizer, RecognizerConfig, RecognizerState, SpeechError,
    SpeechEvent,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// Fakes
// ============================================================================

struct StaticSource {
    fail: bool,
}

#[async_trait::async_trait]
impl CredentialSource for StaticSource {
    async fn fetch(&self) -> Result<Credential> {
        if self.fail {
            bail!("issuer unreachable");
        }
        let payload = URL_SAFE_NO_PAD.encode(r#"{"exp":4102444800}"#);
        Ok(Credential::new(format!("h.{}.s", payload), "westus"))
    }
}

fn credentials(fail: bool) -> Arc<CredentialCache> {
    Arc::new(CredentialCache::new(Arc::new(StaticSource { fail })))
}

#[derive(Default)]
struct FakeMic {
    deny: bool,
    opened: AtomicUsize,
    stopped: Arc<AtomicUsize>,
}

impl CaptureDevice for FakeMic {
    fn open(&self, config: &AudioCaptureConfig) -> Result<Box<dyn AudioCapture>> {
        if self.deny {
            bail!("Permission denied");
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeCapture {
            config: config.clone(),
            tx: None,
            stopped: Arc::clone(&self.stopped),
        }))
    }
}

struct FakeCapture {
    config: AudioCaptureConfig,
    tx: Option<mpsc::Sender<AudioFrame>>,
    stopped: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl AudioCapture for FakeCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let (tx, rx) = mpsc::channel(10);
        let samples = (0..1600)
            .map(|i| ((i as f32 * 0.3).sin() * 12_000.0) as i16)
            .collect();
        tx.send(AudioFrame {
            samples,
            sample_rate: self.config.target_sample_rate,
            channels: 1,
            timestamp_ms: 0,
        })
        .await?;
        self.tx = Some(tx);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.tx = None;
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.tx.is_some()
    }

    fn name(&self) -> &str {
        "fake microphone"
    }
}

#[derive(Default)]
struct EngineLog {
    started: AtomicUsize,
    stopped: AtomicUsize,
    closed: AtomicBool,
    tokens: Mutex<Vec<String>>,
}

struct FakeEngine {
    log: Arc<EngineLog>,
}

#[async_trait::async_trait]
impl RecognitionEngine for FakeEngine {
    async fn start_continuous(&self) -> Result<()> {
        self.log.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_continuous(&self) -> Result<()> {
        self.log.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_authorization_token(&self, token: &str) {
        self.log.tokens.lock().unwrap().push(token.to_string());
    }

    async fn close(&self) -> Result<()> {
        self.log.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct CreatedEngine {
    settings: RecognitionSettings,
    events: mpsc::UnboundedSender<RecognitionEvent>,
    audio: Option<mpsc::Receiver<AudioFrame>>,
    log: Arc<EngineLog>,
}

#[derive(Default)]
struct FakeEngines {
    fail: bool,
    created: Mutex<Vec<CreatedEngine>>,
}

impl FakeEngines {
    fn count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    fn events(&self, index: usize) -> mpsc::UnboundedSender<RecognitionEvent> {
        self.created.lock().unwrap()[index].events.clone()
    }

    fn log(&self, index: usize) -> Arc<EngineLog> {
        Arc::clone(&self.created.lock().unwrap()[index].log)
    }

    fn settings(&self, index: usize) -> RecognitionSettings {
        self.created.lock().unwrap()[index].settings.clone()
    }

    fn take_audio(&self, index: usize) -> mpsc::Receiver<AudioFrame> {
        self.created.lock().unwrap()[index].audio.take().unwrap()
    }
}

impl RecognitionEngineFactory for FakeEngines {
    fn create(
        &self,
        settings: RecognitionSettings,
        audio: mpsc::Receiver<AudioFrame>,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> Result<Arc<dyn RecognitionEngine>> {
        if self.fail {
            return Err(anyhow!("invalid subscription"));
        }
        let log = Arc::new(EngineLog::default());
        self.created.lock().unwrap().push(CreatedEngine {
            settings,
            events,
            audio: Some(audio),
            log: Arc::clone(&log),
        });
        Ok(Arc::new(FakeEngine { log }))
    }
}

struct Harness {
    recognizer: Recognizer,
    mic: Arc<FakeMic>,
    engines: Arc<FakeEngines>,
}

fn harness() -> Harness {
    harness_with(credentials(false), FakeMic::default(), FakeEngines::default())
}

fn harness_with(creds: Arc<CredentialCache>, mic: FakeMic, engines: FakeEngines) -> Harness {
    let mic = Arc::new(mic);
    let engines = Arc::new(engines);
    let recognizer = Recognizer::new(creds, mic.clone(), engines.clone());
    Harness {
        recognizer,
        mic,
        engines,
    }
}

/// Next event other than a volume update
async fn next_speech_event(rx: &mut mpsc::UnboundedReceiver<SpeechEvent>) -> SpeechEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Some(SpeechEvent::VolumeChanged(_)) => continue,
                Some(event) => return event,
                None => panic!("Speech event stream ended"),
            }
        }
    })
    .await
    .expect("Timed out waiting for a speech event")
}

async fn wait_for_state(recognizer: &Recognizer, wanted: RecognizerState) {
    let mut state = recognizer.watch_state();
    tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| *s == wanted))
        .await
        .expect("Timed out waiting for recognizer state")
        .expect("State channel closed");
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_start_listens_with_detailed_en_us_settings() -> Result<()> {
    let mut h = harness();
    assert_eq!(h.recognizer.state(), RecognizerState::Idle);

    let config = RecognizerConfig {
        phrase_list: vec!["itinerary".to_string()],
        silence_timeout_ms: Some(2000),
        ..Default::default()
    };
    let _events = h.recognizer.start(config).await?;

    assert_eq!(h.recognizer.state(), RecognizerState::Listening);
    assert!(h.recognizer.is_active());
    assert!(!h.recognizer.is_speaking());
    assert_eq!(h.engines.count(), 1);
    assert_eq!(h.engines.log(0).started.load(Ordering::SeqCst), 1);

    let settings = h.engines.settings(0);
    assert_eq!(settings.language, "en-US");
    assert_eq!(settings.region, "westus");
    assert_eq!(settings.segmentation_silence_timeout_ms, Some(2000));
    assert_eq!(settings.phrase_list, vec!["itinerary"]);
    assert!(settings.pronunciation.is_none());

    h.recognizer.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_microphone_audio_reaches_engine_and_meter() -> Result<()> {
    let mut h = harness();
    let mut events = h.recognizer.start(RecognizerConfig::default()).await?;

    let mut audio = h.engines.take_audio(0);
    let frame = tokio::time::timeout(Duration::from_secs(5), audio.recv())
        .await?
        .expect("engine audio channel closed");
    assert_eq!(frame.samples.len(), 1600);

    let level = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(SpeechEvent::VolumeChanged(level)) = events.recv().await {
                return level;
            }
        }
    })
    .await?;
    assert!((0.0..=1.0).contains(&level));

    h.recognizer.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_hello_world_utterance() -> Result<()> {
    let mut h = harness();
    let mut events = h.recognizer.start(RecognizerConfig::default()).await?;
    let engine = h.engines.events(0);

    engine.send(RecognitionEvent::Interim(RecognitionResult::recognizing("hello")))?;
    engine.send(RecognitionEvent::Interim(RecognitionResult::recognizing("hello wor")))?;
    engine.send(RecognitionEvent::Final(RecognitionResult::recognized("hello world", None)))?;

    assert_eq!(next_speech_event(&mut events).await, SpeechEvent::SpeechStarted);
    assert_eq!(
        next_speech_event(&mut events).await,
        SpeechEvent::SpeechUpdated("hello".to_string())
    );
    assert_eq!(
        next_speech_event(&mut events).await,
        SpeechEvent::SpeechUpdated("hello wor".to_string())
    );
    assert_eq!(
        next_speech_event(&mut events).await,
        SpeechEvent::SpeechEnded("hello world".to_string())
    );

    wait_for_state(&h.recognizer, RecognizerState::Listening).await;
    assert!(!h.recognizer.is_speaking());

    // The next utterance starts fresh; nothing else was emitted for the first
    engine.send(RecognitionEvent::Interim(RecognitionResult::recognizing("again")))?;
    assert_eq!(next_speech_event(&mut events).await, SpeechEvent::SpeechStarted);

    h.recognizer.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_empty_and_symbol_finals_are_suppressed() -> Result<()> {
    let mut h = harness();
    let config = RecognizerConfig {
        assess_pronunciation: true,
        ..Default::default()
    };
    let mut events = h.recognizer.start(config).await?;
    let engine = h.engines.events(0);

    for text in ["", "   ", "42 ..."] {
        engine.send(RecognitionEvent::Interim(RecognitionResult::recognizing("uh")))?;
        engine.send(RecognitionEvent::Final(RecognitionResult::recognized(text, None)))?;

        assert_eq!(next_speech_event(&mut events).await, SpeechEvent::SpeechStarted);
        assert_eq!(
            next_speech_event(&mut events).await,
            SpeechEvent::SpeechUpdated("uh".to_string())
        );
    }

    // If anything had leaked it would show up before this
    engine.send(RecognitionEvent::Interim(RecognitionResult::recognizing("next")))?;
    assert_eq!(next_speech_event(&mut events).await, SpeechEvent::SpeechStarted);
    assert!(h.recognizer.is_active());

    h.recognizer.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_no_match_is_ignored() -> Result<()> {
    let mut h = harness();
    let mut events = h.recognizer.start(RecognizerConfig::default()).await?;
    let engine = h.engines.events(0);

    engine.send(RecognitionEvent::Final(RecognitionResult::no_match()))?;
    engine.send(RecognitionEvent::Interim(RecognitionResult::recognizing("hi")))?;

    assert_eq!(next_speech_event(&mut events).await, SpeechEvent::SpeechStarted);
    wait_for_state(&h.recognizer, RecognizerState::Speaking).await;

    h.recognizer.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_pronunciation_assessment_follows_transcript() -> Result<()> {
    let mut h = harness();
    let config = RecognizerConfig {
        topic: Some("travel".to_string()),
        assess_pronunciation: true,
        ..Default::default()
    };
    let mut events = h.recognizer.start(config).await?;

    let settings = h.engines.settings(0);
    let assessment = settings.pronunciation.expect("assessment should be enabled");
    assert_eq!(assessment.content_topic.as_deref(), Some("travel"));

    let json = r#"{"NBest": [{
        "PronunciationAssessment": {"AccuracyScore": 90, "FluencyScore": 80, "CompletenessScore": 100, "PronScore": 88, "ProsodyScore": 75},
        "Words": [{"Word": "good", "PronunciationAssessment": {"AccuracyScore": 90, "ErrorType": "None"}}]
    }]}"#;

    let engine = h.engines.events(0);
    engine.send(RecognitionEvent::Interim(RecognitionResult::recognizing("good")))?;
    engine.send(RecognitionEvent::Final(RecognitionResult::recognized(
        "Good morning.",
        Some(json.to_string()),
    )))?;

    assert_eq!(next_speech_event(&mut events).await, SpeechEvent::SpeechStarted);
    assert_eq!(
        next_speech_event(&mut events).await,
        SpeechEvent::SpeechUpdated("good".to_string())
    );
    assert_eq!(
        next_speech_event(&mut events).await,
        SpeechEvent::SpeechEnded("Good morning.".to_string())
    );
    match next_speech_event(&mut events).await {
        SpeechEvent::PronunciationAssessed(scores) => {
            assert_eq!(scores.accuracy, 90.0);
            assert_eq!(scores.prosody, Some(75.0));
            assert_eq!(scores.words.len(), 1);
        }
        other => panic!("Expected PronunciationAssessed, got {:?}", other),
    }

    h.recognizer.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_provider_cancel_stops_recognition() -> Result<()> {
    let mut h = harness();
    let mut events = h.recognizer.start(RecognizerConfig::default()).await?;

    h.engines.events(0).send(RecognitionEvent::Canceled {
        details: "WebSocket closed".to_string(),
    })?;

    // Back to Idle without the caller calling stop()
    wait_for_state(&h.recognizer, RecognizerState::Idle).await;
    assert!(!h.recognizer.is_active());

    let log = h.engines.log(0);
    assert!(log.stopped.load(Ordering::SeqCst) >= 1);
    assert!(log.closed.load(Ordering::SeqCst));
    assert_eq!(h.mic.stopped.load(Ordering::SeqCst), 1);

    // Volume sampling is over: the stream drains and ends
    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while events.recv().await.is_some() {}
    })
    .await;
    assert!(drained.is_ok(), "Event stream should end after a provider cancel");

    // A later stop() has nothing left to release
    h.recognizer.stop().await;
    assert_eq!(h.recognizer.state(), RecognizerState::Idle);
    assert_eq!(h.mic.stopped.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_session_end_stops_recognition() -> Result<()> {
    let mut h = harness();
    let mut events = h.recognizer.start(RecognizerConfig::default()).await?;

    h.engines.events(0).send(RecognitionEvent::Interim(RecognitionResult::recognizing("bye")))?;
    assert_eq!(next_speech_event(&mut events).await, SpeechEvent::SpeechStarted);

    h.engines.events(0).send(RecognitionEvent::SessionEnded)?;
    wait_for_state(&h.recognizer, RecognizerState::Idle).await;
    assert!(!h.recognizer.is_speaking());
    assert!(h.engines.log(0).closed.load(Ordering::SeqCst));
    assert_eq!(h.mic.stopped.load(Ordering::SeqCst), 1);

    // The recognizer can listen again
    let _events = h.recognizer.start(RecognizerConfig::default()).await?;
    assert_eq!(h.recognizer.state(), RecognizerState::Listening);
    assert_eq!(h.engines.count(), 2);
    assert_eq!(h.mic.stopped.load(Ordering::SeqCst), 1);

    h.recognizer.stop().await;
    assert_eq!(h.mic.stopped.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_stop_releases_everything_and_is_idempotent() -> Result<()> {
    let mut h = harness();

    // Stopping an idle recognizer is a no-op
    h.recognizer.stop().await;
    assert_eq!(h.recognizer.state(), RecognizerState::Idle);

    let mut events = h.recognizer.start(RecognizerConfig::default()).await?;
    h.recognizer.stop().await;

    assert_eq!(h.recognizer.state(), RecognizerState::Idle);
    assert!(!h.recognizer.is_active());
    let log = h.engines.log(0);
    assert!(log.stopped.load(Ordering::SeqCst) >= 1);
    assert!(log.closed.load(Ordering::SeqCst));
    assert_eq!(h.mic.stopped.load(Ordering::SeqCst), 1);

    // Every task holding the event sender is gone
    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while events.recv().await.is_some() {}
    })
    .await;
    assert!(drained.is_ok(), "Event stream should end after stop");

    h.recognizer.stop().await;
    h.recognizer.stop().await;
    assert_eq!(h.recognizer.state(), RecognizerState::Idle);
    assert_eq!(h.mic.stopped.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_restart_replaces_previous_session() -> Result<()> {
    let mut h = harness();
    let _first = h.recognizer.start(RecognizerConfig::default()).await?;
    let _second = h.recognizer.start(RecognizerConfig::default()).await?;

    assert_eq!(h.engines.count(), 2);
    assert!(h.engines.log(0).closed.load(Ordering::SeqCst));
    assert!(!h.engines.log(1).closed.load(Ordering::SeqCst));
    assert_eq!(h.mic.opened.load(Ordering::SeqCst), 2);
    assert_eq!(h.mic.stopped.load(Ordering::SeqCst), 1);
    assert_eq!(h.recognizer.state(), RecognizerState::Listening);

    h.recognizer.stop().await;
    assert_eq!(h.mic.stopped.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_auth_failure_leaves_recognizer_idle() {
    let mut h = harness_with(credentials(true), FakeMic::default(), FakeEngines::default());

    let result = h.recognizer.start(RecognizerConfig::default()).await;
    assert!(matches!(result, Err(SpeechError::AuthFailure(_))));
    assert_eq!(h.recognizer.state(), RecognizerState::Idle);
    assert!(!h.recognizer.is_active());
    assert_eq!(h.mic.opened.load(Ordering::SeqCst), 0);
    assert_eq!(h.engines.count(), 0);
}

#[tokio::test]
async fn test_microphone_denied_leaves_recognizer_idle() {
    let mic = FakeMic {
        deny: true,
        ..Default::default()
    };
    let mut h = harness_with(credentials(false), mic, FakeEngines::default());

    let result = h.recognizer.start(RecognizerConfig::default()).await;
    match result {
        Err(SpeechError::DeviceAccessFailure(details)) => {
            assert!(details.contains("Permission denied"))
        }
        other => panic!("Expected DeviceAccessFailure, got {:?}", other.err()),
    }
    assert_eq!(h.recognizer.state(), RecognizerState::Idle);
    assert_eq!(h.engines.count(), 0);
}

#[tokio::test]
async fn test_engine_failure_releases_microphone() {
    let engines = FakeEngines {
        fail: true,
        ..Default::default()
    };
    let mut h = harness_with(credentials(false), FakeMic::default(), engines);

    let result = h.recognizer.start(RecognizerConfig::default()).await;
    assert!(matches!(result, Err(SpeechError::Engine(_))));
    assert_eq!(h.recognizer.state(), RecognizerState::Idle);
    assert_eq!(h.mic.opened.load(Ordering::SeqCst), 1);
    assert_eq!(h.mic.stopped.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_token_refreshed_on_live_engine() -> Result<()> {
    let mut h = harness();
    let mut events = h.recognizer.start(RecognizerConfig::default()).await?;
    let engine = h.engines.events(0);

    // An utterance in progress is not disturbed by the refresh
    engine.send(RecognitionEvent::Interim(RecognitionResult::recognizing("long")))?;
    assert_eq!(next_speech_event(&mut events).await, SpeechEvent::SpeechStarted);

    tokio::time::sleep(TOKEN_REFRESH_INTERVAL - Duration::from_secs(1)).await;
    assert!(h.engines.log(0).tokens.lock().unwrap().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    let tokens = h.engines.log(0).tokens.lock().unwrap().clone();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0], h.engines.settings(0).token);

    engine.send(RecognitionEvent::Final(RecognitionResult::recognized("long sentence", None)))?;
    let ended = loop {
        match next_speech_event(&mut events).await {
            SpeechEvent::SpeechUpdated(_) => continue,
            other => break other,
        }
    };
    assert_eq!(ended, SpeechEvent::SpeechEnded("long sentence".to_string()));
    assert_eq!(h.engines.log(0).started.load(Ordering::SeqCst), 1);

    h.recognizer.stop().await;
    Ok(())
}
