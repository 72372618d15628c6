use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::assessment::PronunciationScores;
use super::config::RecognizerConfig;
use super::engine::{RecognitionEngine, RecognitionEngineFactory, RecognitionEvent, ResultReason};
use super::events::{validate_transcript, RecognizerState, SpeechEvent};
use crate::audio::{AudioCapture, AudioCaptureConfig, AudioFrame, CaptureDevice, VolumeAnalyser};
use crate::credential::CredentialCache;
use crate::error::{describe, SpeechError, SpeechResult};

/// Period of the authorization token swap on a live engine
pub const TOKEN_REFRESH_INTERVAL: Duration = Duration::from_secs(180);

/// Volume sampling period (one display frame)
pub const VOLUME_SAMPLE_INTERVAL: Duration = Duration::from_millis(16);

/// Continuous speech recognizer with volume metering
///
/// Each `start()`/`stop()` cycle owns a microphone capture, a recognition
/// engine, and three background tasks: audio pump, volume sampler and token
/// refresher. Recognition events are processed by a fourth task, strictly in
/// arrival order.
///
/// When the provider cancels or ends the session, the event task releases
/// the same resources `stop()` would, the state returns to `Idle` and the
/// event stream ends.
pub struct Recognizer {
    credentials: Arc<CredentialCache>,
    device: Arc<dyn CaptureDevice>,
    engines: Arc<dyn RecognitionEngineFactory>,
    capture_config: AudioCaptureConfig,
    state: Arc<watch::Sender<RecognizerState>>,
    session: Option<RecognitionSession>,
}

impl Recognizer {
    pub fn new(
        credentials: Arc<CredentialCache>,
        device: Arc<dyn CaptureDevice>,
        engines: Arc<dyn RecognitionEngineFactory>,
    ) -> Self {
        let (state, _) = watch::channel(RecognizerState::Idle);
        Self {
            credentials,
            device,
            engines,
            capture_config: AudioCaptureConfig::default(),
            state: Arc::new(state),
            session: None,
        }
    }

    pub fn with_capture_config(mut self, config: AudioCaptureConfig) -> Self {
        self.capture_config = config;
        self
    }

    pub fn state(&self) -> RecognizerState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<RecognizerState> {
        self.state.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.alive.load(Ordering::SeqCst))
    }

    /// Whether an utterance is currently in progress
    pub fn is_speaking(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.resources.speaking.load(Ordering::SeqCst))
    }

    /// Start listening
    ///
    /// A session that is already running is stopped first. Credential and
    /// microphone failures are returned and leave the recognizer `Idle`.
    pub async fn start(
        &mut self,
        config: RecognizerConfig,
    ) -> SpeechResult<mpsc::UnboundedReceiver<SpeechEvent>> {
        if self.session.is_some() {
            warn!("Recognizer already running, stopping previous session");
            self.stop().await;
        }

        info!("Starting speech recognition and audio analysis ...");
        self.state.send_replace(RecognizerState::Starting);

        match self.open_session(config).await {
            Ok(events) => Ok(events),
            Err(e) => {
                error!("Failed to start speech recognition: {}", e);
                self.stop().await;
                Err(e)
            }
        }
    }

    async fn open_session(
        &mut self,
        config: RecognizerConfig,
    ) -> SpeechResult<mpsc::UnboundedReceiver<SpeechEvent>> {
        let credential = self.credentials.get_credential().await?;
        debug!("Speech credentials obtained.");

        let mut capture = self
            .device
            .open(&self.capture_config)
            .map_err(|e| SpeechError::DeviceAccessFailure(describe(&e)))?;
        let audio_rx = match capture.start().await {
            Ok(rx) => rx,
            Err(e) => return Err(SpeechError::DeviceAccessFailure(describe(&e))),
        };
        info!("Microphone access granted ({}).", capture.name());

        let assess_pronunciation = config.assess_pronunciation;
        let settings = config.recognition_settings(&credential);
        if settings.pronunciation.is_some() {
            info!("Pronunciation assessment enabled.");
        }
        if !settings.phrase_list.is_empty() {
            info!("Phrase list enabled ({} phrases).", settings.phrase_list.len());
        }
        match settings.segmentation_silence_timeout_ms {
            Some(ms) => info!("Using custom silence timeout ({}ms).", ms),
            None => debug!("Using default silence timeout."),
        }

        let (engine_audio_tx, engine_audio_rx) = mpsc::channel(100);
        let (engine_events_tx, engine_events_rx) = mpsc::unbounded_channel();

        let engine = match self.engines.create(settings, engine_audio_rx, engine_events_tx) {
            Ok(engine) => engine,
            Err(e) => {
                if let Err(e) = capture.stop().await {
                    warn!("Failed to release microphone: {:#}", e);
                }
                return Err(SpeechError::Engine(describe(&e)));
            }
        };
        debug!("Speech recognizer setup completed.");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));
        let speaking = Arc::new(AtomicBool::new(false));
        let analyser = Arc::new(Mutex::new(VolumeAnalyser::new()));

        let pump_task = tokio::spawn(pump_audio(
            audio_rx,
            engine_audio_tx,
            Arc::clone(&analyser),
            Arc::clone(&alive),
        ));

        let volume_task = tokio::spawn(sample_volume(
            analyser,
            events_tx.clone(),
            Arc::clone(&alive),
        ));

        let refresh_task = tokio::spawn(refresh_token(
            Arc::clone(&self.credentials),
            Arc::clone(&engine),
            Arc::clone(&alive),
        ));

        let resources = Arc::new(SessionResources {
            engine: Arc::clone(&engine),
            alive: Arc::clone(&alive),
            speaking: Arc::clone(&speaking),
            running: tokio::sync::Mutex::new(Some(Running {
                capture,
                pump_task: Some(pump_task),
                volume_task: Some(volume_task),
                refresh_task: Some(refresh_task),
            })),
        });

        // Listening before the first event can move it on
        self.state.send_replace(RecognizerState::Listening);
        let event_task = tokio::spawn(process_events(
            engine_events_rx,
            events_tx,
            Arc::clone(&resources),
            Arc::clone(&self.state),
            Arc::clone(&speaking),
            assess_pronunciation,
        ));

        let session = RecognitionSession {
            id: Uuid::new_v4(),
            alive,
            resources,
            event_task: Some(event_task),
        };
        let session_id = session.id;
        self.session = Some(session);

        engine
            .start_continuous()
            .await
            .map_err(|e| SpeechError::Engine(describe(&e)))?;

        info!("Continuous recognition started (session {}).", session_id);
        Ok(events_rx)
    }

    /// Stop listening and release every session resource
    ///
    /// Safe to call at any time, any number of times.
    pub async fn stop(&mut self) {
        let Some(mut session) = self.session.take() else {
            debug!("Recognizer not running");
            self.state.send_replace(RecognizerState::Idle);
            return;
        };

        info!("Stopping speech recognition and audio analysis ...");
        self.state.send_replace(RecognizerState::Stopping);
        session.shutdown().await;
        self.state.send_replace(RecognizerState::Idle);
        info!("Speech recognition and audio analysis stopped (session {}).", session.id);
    }
}

struct RecognitionSession {
    id: Uuid,
    alive: Arc<AtomicBool>,
    resources: Arc<SessionResources>,
    event_task: Option<JoinHandle<()>>,
}

impl RecognitionSession {
    async fn shutdown(&mut self) {
        self.resources.release().await;

        if let Some(task) = self.event_task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for RecognitionSession {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
    }
}

/// Session resources released by whichever side stops first: the caller's
/// `stop()` or a provider-side cancel seen by the event task
struct SessionResources {
    engine: Arc<dyn RecognitionEngine>,
    alive: Arc<AtomicBool>,
    speaking: Arc<AtomicBool>,
    /// `None` once released
    running: tokio::sync::Mutex<Option<Running>>,
}

struct Running {
    capture: Box<dyn AudioCapture>,
    pump_task: Option<JoinHandle<()>>,
    volume_task: Option<JoinHandle<()>>,
    refresh_task: Option<JoinHandle<()>>,
}

impl SessionResources {
    /// Stop the engine, release the microphone and end the background tasks
    ///
    /// Runs once; later calls wait for the first to finish and return.
    async fn release(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.speaking.store(false, Ordering::SeqCst);

        // Held until the release is complete
        let mut running = self.running.lock().await;
        let Some(mut parts) = running.take() else {
            return;
        };

        if let Some(task) = parts.refresh_task.take() {
            task.abort();
            let _ = task.await;
        }

        if let Err(e) = self.engine.stop_continuous().await {
            warn!("Failed to stop continuous recognition: {:#}", e);
        }
        if let Err(e) = self.engine.close().await {
            warn!("Failed to close recognizer: {:#}", e);
        }

        if let Err(e) = parts.capture.stop().await {
            warn!("Failed to stop {}: {:#}", parts.capture.name(), e);
        }

        for task in [parts.volume_task.take(), parts.pump_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        for task in [&self.pump_task, &self.volume_task, &self.refresh_task]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }
}

fn emit(events: &mpsc::UnboundedSender<SpeechEvent>, event: SpeechEvent) {
    if events.send(event).is_err() {
        debug!("Speech event receiver dropped");
    }
}

/// Feed microphone frames to the meter and the engine
async fn pump_audio(
    mut audio_rx: mpsc::Receiver<AudioFrame>,
    engine_audio: mpsc::Sender<AudioFrame>,
    analyser: Arc<Mutex<VolumeAnalyser>>,
    alive: Arc<AtomicBool>,
) {
    let mut forward = true;

    while let Some(frame) = audio_rx.recv().await {
        if !alive.load(Ordering::SeqCst) {
            break;
        }

        if let Ok(mut analyser) = analyser.lock() {
            analyser.push_frame(&frame);
        }

        if forward && engine_audio.send(frame).await.is_err() {
            debug!("Recognition engine stopped consuming audio");
            forward = false;
        }
    }

    debug!("Audio pump stopped");
}

async fn sample_volume(
    analyser: Arc<Mutex<VolumeAnalyser>>,
    events: mpsc::UnboundedSender<SpeechEvent>,
    alive: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(VOLUME_SAMPLE_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if !alive.load(Ordering::SeqCst) {
            break;
        }

        let level = analyser.lock().map(|mut a| a.level()).unwrap_or(0.0);
        emit(&events, SpeechEvent::VolumeChanged(level));
    }
}

async fn refresh_token(
    credentials: Arc<CredentialCache>,
    engine: Arc<dyn RecognitionEngine>,
    alive: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval_at(
        Instant::now() + TOKEN_REFRESH_INTERVAL,
        TOKEN_REFRESH_INTERVAL,
    );

    loop {
        ticker.tick().await;
        if !alive.load(Ordering::SeqCst) {
            break;
        }

        match credentials.get_credential().await {
            Ok(credential) => {
                engine.set_authorization_token(&credential.token);
                info!("Token refreshed.");
            }
            Err(e) => warn!("Token refresh failed: {}", e),
        }
    }
}

/// Recognition state machine
async fn process_events(
    mut engine_events: mpsc::UnboundedReceiver<RecognitionEvent>,
    events: mpsc::UnboundedSender<SpeechEvent>,
    resources: Arc<SessionResources>,
    state: Arc<watch::Sender<RecognizerState>>,
    speaking: Arc<AtomicBool>,
    assess_pronunciation: bool,
) {
    while let Some(event) = engine_events.recv().await {
        match event {
            RecognitionEvent::Interim(result) => {
                if result.reason != ResultReason::RecognizingSpeech {
                    continue;
                }

                if !speaking.swap(true, Ordering::SeqCst) {
                    info!("Speech started.");
                    transition(&state, RecognizerState::Listening, RecognizerState::Speaking);
                    emit(&events, SpeechEvent::SpeechStarted);
                }
                emit(&events, SpeechEvent::SpeechUpdated(result.text));
            }

            RecognitionEvent::Final(result) => match result.reason {
                ResultReason::RecognizedSpeech => {
                    info!("Speech recognized: {}", result.text);
                    if let Some(json) = &result.json {
                        debug!("Detailed result: {}", json);
                    }

                    match validate_transcript(&result.text) {
                        Ok(text) => {
                            emit(&events, SpeechEvent::SpeechEnded(text.to_string()));

                            if assess_pronunciation {
                                match result
                                    .json
                                    .as_deref()
                                    .and_then(PronunciationScores::from_detailed_json)
                                {
                                    Some(scores) => {
                                        debug!("Got pronunciation assessment.");
                                        emit(&events, SpeechEvent::PronunciationAssessed(scores));
                                    }
                                    None => debug!("No pronunciation assessment in result."),
                                }
                            }
                        }
                        Err(e) => info!("{}, skipping processing.", e),
                    }

                    speaking.store(false, Ordering::SeqCst);
                    transition(&state, RecognizerState::Speaking, RecognizerState::Listening);
                }
                ResultReason::NoMatch => info!("No speech could be recognized."),
                ResultReason::RecognizingSpeech => {}
            },

            RecognitionEvent::Canceled { details } => {
                warn!("{}", SpeechError::RecognitionCanceled(details));
                halt(&resources, &state).await;
                break;
            }

            RecognitionEvent::SessionEnded => {
                info!("Session stopped.");
                halt(&resources, &state).await;
                break;
            }
        }
    }

    debug!("Recognition event stream closed");
}

fn transition(
    state: &watch::Sender<RecognizerState>,
    from: RecognizerState,
    to: RecognizerState,
) {
    state.send_if_modified(|current| {
        if *current == from {
            *current = to;
            true
        } else {
            false
        }
    });
}

/// Tear the session down after a provider-side stop; never fails
async fn halt(resources: &SessionResources, state: &watch::Sender<RecognizerState>) {
    state.send_if_modified(|current| match current {
        RecognizerState::Listening | RecognizerState::Speaking => {
            *current = RecognizerState::Stopping;
            true
        }
        _ => false,
    });

    resources.release().await;

    transition(state, RecognizerState::Stopping, RecognizerState::Idle);
    info!("Speech recognition ended by the provider.");
}
