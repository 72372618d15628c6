use rand::seq::IndexedRandom;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::buffer::SentenceBuffer;
use super::engine::{
    SynthesisEngine, SynthesisEngineFactory, SynthesisSettings, SynthesisSignal, Voice,
    SYNTHESIS_LOCALE,
};
use crate::audio::{AudioSink, AudioSinkFactory};
use crate::credential::CredentialCache;
use crate::error::{describe, SpeechError, SpeechResult};

/// Quiet period after the last append before an unterminated buffer is spoken
pub const FLUSH_TIMEOUT: Duration = Duration::from_millis(1000);

/// What the synthesizer reports to its caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    /// Raw audio of the utterance being spoken
    Audio(Vec<u8>),
    /// The current utterance finished
    Completed,
    /// The provider canceled the current utterance
    Error(String),
}

/// Completion of one spoken utterance
///
/// Resolves once the utterance has been fully synthesized. Resolves with
/// `SynthesisCanceled` if the provider canceled it or the session was
/// interrupted or stopped before it finished.
#[derive(Debug)]
pub struct Playback {
    done: oneshot::Receiver<SpeechResult<()>>,
}

impl Future for Playback {
    type Output = SpeechResult<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.done)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or_else(|_| Err(interrupted())))
    }
}

/// Incremental speech synthesis with barge-in
///
/// Text is buffered until it forms complete sentences (or goes quiet for
/// [`FLUSH_TIMEOUT`]); each resulting utterance is queued and spoken by one
/// session task, so utterances never overlap and play in the order they were
/// produced.
///
/// `interrupt()` replaces the whole audio session rather than canceling a
/// single utterance: the engine cannot drop in-flight audio without tearing
/// down its output. The chosen voice survives the replacement.
#[derive(Clone)]
pub struct Synthesizer {
    inner: Arc<Inner>,
}

struct Inner {
    credentials: Arc<CredentialCache>,
    engines: Arc<dyn SynthesisEngineFactory>,
    sinks: Arc<dyn AudioSinkFactory>,
    voice: Voice,
    events: mpsc::UnboundedSender<SynthesisEvent>,
    state: Mutex<State>,
}

struct State {
    buffer: SentenceBuffer,
    /// Bumped by every `interrupt()`
    generation: u64,
    flush_timer: Option<JoinHandle<()>>,
    /// `None` once stopped
    session: Option<SynthesisSession>,
}

impl Synthesizer {
    /// Choose a voice and open the first audio session
    pub async fn create(
        credentials: Arc<CredentialCache>,
        engines: Arc<dyn SynthesisEngineFactory>,
        sinks: Arc<dyn AudioSinkFactory>,
    ) -> SpeechResult<(Self, mpsc::UnboundedReceiver<SynthesisEvent>)> {
        info!("Creating speech synthesizer ...");
        let credential = credentials.get_credential().await?;

        let settings = SynthesisSettings {
            token: credential.token.clone(),
            region: credential.region.clone(),
            language: SYNTHESIS_LOCALE.to_string(),
            voice_name: None,
        };
        let voices: Vec<Voice> = engines
            .voices(&settings)
            .await
            .map_err(|e| SpeechError::Engine(describe(&e)))?
            .into_iter()
            .filter(|v| v.locale.eq_ignore_ascii_case(SYNTHESIS_LOCALE))
            .collect();
        debug!("{} voices available for {}", voices.len(), SYNTHESIS_LOCALE);

        let voice = voices
            .choose(&mut rand::rng())
            .cloned()
            .ok_or_else(|| SpeechError::NoVoices(SYNTHESIS_LOCALE.to_string()))?;
        info!("Selected voice {} ({})", voice.name, voice.short_name());

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            credentials,
            engines,
            sinks,
            voice,
            events: events_tx,
            state: Mutex::new(State {
                buffer: SentenceBuffer::new(),
                generation: 0,
                flush_timer: None,
                session: None,
            }),
        });

        let session = inner.open_session().await?;
        inner.state.lock().await.session = Some(session);

        Ok((Self { inner }, events_rx))
    }

    pub fn voice(&self) -> &Voice {
        &self.inner.voice
    }

    /// Name the assistant introduces itself with
    pub fn speaker_name(&self) -> &str {
        self.inner.voice.short_name()
    }

    /// Text waiting for a sentence boundary
    pub async fn buffered(&self) -> String {
        self.inner.state.lock().await.buffer.as_str().to_string()
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.state.lock().await.session.is_none()
    }

    /// Identifies the current reply; changes on every `interrupt()`
    pub async fn generation(&self) -> u64 {
        self.inner.state.lock().await.generation
    }

    /// Append reply text and speak whatever is ready
    ///
    /// Returns the playback of the utterance this call produced, if any.
    /// Without a terminal mark and without `flush`, the text is held and a
    /// flush is scheduled for [`FLUSH_TIMEOUT`] after this call.
    pub async fn synthesize(&self, text: &str, flush: bool) -> SpeechResult<Option<Playback>> {
        self.append(None, text, flush).await
    }

    /// `synthesize` on behalf of the reply started at `generation`
    ///
    /// Fails with `SynthesisCanceled` once that reply has been interrupted,
    /// so its remaining text never reaches the new session.
    pub async fn synthesize_in(
        &self,
        generation: u64,
        text: &str,
        flush: bool,
    ) -> SpeechResult<Option<Playback>> {
        self.append(Some(generation), text, flush).await
    }

    async fn append(
        &self,
        generation: Option<u64>,
        text: &str,
        flush: bool,
    ) -> SpeechResult<Option<Playback>> {
        let mut state = self.inner.state.lock().await;
        if state.session.is_none() {
            return Err(SpeechError::SessionClosed);
        }
        if generation.is_some_and(|g| g != state.generation) {
            debug!("Dropping text of an interrupted reply");
            return Err(interrupted());
        }

        state.buffer.push(text);

        if !flush && !state.buffer.has_terminal() {
            if state.buffer.is_blank() {
                state.cancel_flush();
            } else {
                self.inner.schedule_flush(&mut state);
            }
            return Ok(None);
        }

        state.cancel_flush();
        let playback = state.enqueue(flush)?;

        if !state.buffer.is_blank() {
            self.inner.schedule_flush(&mut state);
        }

        Ok(playback)
    }

    /// Speak everything still buffered
    pub async fn flush(&self) -> SpeechResult<Option<Playback>> {
        self.synthesize("", true).await
    }

    /// Silence the current reply and get ready for a new one
    ///
    /// Stops audio at once, drops queued and buffered text, then rebuilds the
    /// sink and engine with a fresh credential and the same voice. If the
    /// rebuild fails the synthesizer is left closed.
    pub async fn interrupt(&self) -> SpeechResult<()> {
        let mut state = self.inner.state.lock().await;
        let Some(session) = state.session.take() else {
            return Err(SpeechError::SessionClosed);
        };

        info!("Interrupting speech synthesis ...");
        state.generation += 1;
        state.cancel_flush();
        state.buffer.clear();

        let (session_id, engine) = session.release().await;
        tokio::spawn(async move {
            match engine.close().await {
                Ok(()) => debug!("Interrupted synthesizer closed (session {})", session_id),
                Err(e) => warn!("Failed to close interrupted synthesizer: {:#}", e),
            }
        });

        let session = self.inner.open_session().await?;
        info!("Speech synthesis interrupted, ready with voice {}", self.inner.voice.name);
        state.session = Some(session);
        Ok(())
    }

    /// End the synthesizer; safe to call more than once
    pub async fn stop(&self) {
        let mut state = self.inner.state.lock().await;
        state.cancel_flush();
        state.buffer.clear();

        let Some(session) = state.session.take() else {
            debug!("Synthesizer already stopped");
            return;
        };

        info!("Stopping speech synthesis ...");
        let (session_id, engine) = session.release().await;
        if let Err(e) = engine.close().await {
            warn!("Failed to close synthesizer: {:#}", e);
        }
        info!("Speech synthesis stopped (session {})", session_id);
    }
}

impl Inner {
    async fn open_session(&self) -> SpeechResult<SynthesisSession> {
        let credential = self.credentials.get_credential().await?;
        let settings = SynthesisSettings {
            token: credential.token.clone(),
            region: credential.region.clone(),
            language: SYNTHESIS_LOCALE.to_string(),
            voice_name: Some(self.voice.name.clone()),
        };

        let sink = self.sinks.create().map_err(|e| {
            SpeechError::Engine(format!("failed to open audio output: {}", describe(&e)))
        })?;

        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let engine = match self.engines.create(settings, signals_tx) {
            Ok(engine) => engine,
            Err(e) => {
                if let Err(e) = sink.close() {
                    warn!("Failed to close {}: {:#}", sink.name(), e);
                }
                return Err(SpeechError::Engine(describe(&e)));
            }
        };

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));
        let id = Uuid::new_v4();

        let speaker = Speaker {
            engine: Arc::clone(&engine),
            sink: Arc::clone(&sink),
            events: self.events.clone(),
            alive: Arc::clone(&alive),
        };
        let task = tokio::spawn(speaker.run(queue_rx, signals_rx));

        debug!("Synthesis session {} opened on {}", id, sink.name());
        Ok(SynthesisSession {
            id,
            sink,
            engine,
            queue: queue_tx,
            alive,
            speaker: Some(task),
        })
    }

    /// (Re)arm the single pending flush timer
    fn schedule_flush(self: &Arc<Self>, state: &mut State) {
        state.cancel_flush();

        let inner: Weak<Inner> = Arc::downgrade(self);
        state.flush_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(FLUSH_TIMEOUT).await;

            let Some(inner) = inner.upgrade() else {
                return;
            };
            let mut state = inner.state.lock().await;
            // Still the pending timer: anyone replacing it holds the lock and aborts us first
            state.flush_timer = None;

            debug!("Flush timeout elapsed");
            if let Err(e) = state.enqueue(true) {
                debug!("Timed flush skipped: {}", e);
            }
        }));
    }
}

impl State {
    fn cancel_flush(&mut self) {
        if let Some(timer) = self.flush_timer.take() {
            timer.abort();
        }
    }

    /// Move the next ready utterance from the buffer to the speaker
    fn enqueue(&mut self, flush: bool) -> SpeechResult<Option<Playback>> {
        let session = self.session.as_ref().ok_or(SpeechError::SessionClosed)?;
        let Some(text) = self.buffer.take_utterance(flush) else {
            return Ok(None);
        };

        debug!("Queueing utterance: {}", text);
        let (done_tx, done_rx) = oneshot::channel();
        session
            .queue
            .send(Utterance {
                text,
                done: done_tx,
            })
            .map_err(|_| SpeechError::SessionClosed)?;

        Ok(Some(Playback { done: done_rx }))
    }
}

struct Utterance {
    text: String,
    done: oneshot::Sender<SpeechResult<()>>,
}

/// One sink + engine pair and the task that feeds it
struct SynthesisSession {
    id: Uuid,
    sink: Arc<dyn AudioSink>,
    engine: Arc<dyn SynthesisEngine>,
    queue: mpsc::UnboundedSender<Utterance>,
    alive: Arc<AtomicBool>,
    speaker: Option<JoinHandle<()>>,
}

impl SynthesisSession {
    /// Silence and dismantle the session, handing back the engine to close
    async fn release(mut self) -> (Uuid, Arc<dyn SynthesisEngine>) {
        self.alive.store(false, Ordering::SeqCst);
        self.sink.pause();

        if let Some(task) = self.speaker.take() {
            task.abort();
            let _ = task.await;
        }

        if let Err(e) = self.sink.close() {
            warn!("Failed to close {}: {:#}", self.sink.name(), e);
        }

        (self.id, Arc::clone(&self.engine))
    }
}

impl Drop for SynthesisSession {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(task) = self.speaker.take() {
            task.abort();
        }
    }
}

struct Speaker {
    engine: Arc<dyn SynthesisEngine>,
    sink: Arc<dyn AudioSink>,
    events: mpsc::UnboundedSender<SynthesisEvent>,
    alive: Arc<AtomicBool>,
}

impl Speaker {
    async fn run(
        self,
        mut queue: mpsc::UnboundedReceiver<Utterance>,
        mut signals: mpsc::UnboundedReceiver<SynthesisSignal>,
    ) {
        while let Some(utterance) = queue.recv().await {
            if !self.alive.load(Ordering::SeqCst) {
                break;
            }

            // Anything still queued belongs to an utterance that already ended
            let mut stale = 0;
            while signals.try_recv().is_ok() {
                stale += 1;
            }
            if stale > 0 {
                debug!("Discarded {} stale synthesis signals", stale);
            }

            self.sink.resume();
            info!("Speaking: {}", utterance.text);

            let outcome = self.speak(&utterance.text, &mut signals).await;

            // Interrupted mid-utterance: the caller sees the dropped sender
            if !self.alive.load(Ordering::SeqCst) {
                break;
            }
            let _ = utterance.done.send(outcome);
        }

        debug!("Speaker finished");
    }

    /// Speak one utterance, forwarding its audio as it arrives
    ///
    /// Signals are drained while the engine call is still pending; the
    /// utterance ends on `Completed` or `Canceled`, not when `speak` returns.
    async fn speak(
        &self,
        text: &str,
        signals: &mut mpsc::UnboundedReceiver<SynthesisSignal>,
    ) -> SpeechResult<()> {
        let speak = self.engine.speak(text);
        tokio::pin!(speak);
        let mut pending = true;

        loop {
            tokio::select! {
                result = &mut speak, if pending => {
                    pending = false;
                    if let Err(e) = result {
                        let details = describe(&e);
                        warn!("Synthesis failed: {}", details);
                        self.emit(SynthesisEvent::Error(details.clone()));
                        return Err(SpeechError::SynthesisCanceled(details));
                    }
                }
                signal = signals.recv() => {
                    let Some(signal) = signal else {
                        return Err(SpeechError::SynthesisCanceled(
                            "synthesis engine went away".to_string(),
                        ));
                    };
                    if !self.alive.load(Ordering::SeqCst) {
                        return Err(interrupted());
                    }

                    match signal {
                        SynthesisSignal::Synthesizing(chunk) => {
                            if let Err(e) = self.sink.write(&chunk) {
                                warn!("Failed to write audio to {}: {:#}", self.sink.name(), e);
                            }
                            self.emit(SynthesisEvent::Audio(chunk));
                        }
                        SynthesisSignal::Completed => {
                            debug!("Synthesis completed");
                            self.emit(SynthesisEvent::Completed);
                            return Ok(());
                        }
                        SynthesisSignal::Canceled { details } => {
                            warn!("{}", SpeechError::SynthesisCanceled(details.clone()));
                            self.emit(SynthesisEvent::Error(details.clone()));
                            return Err(SpeechError::SynthesisCanceled(details));
                        }
                    }
                }
            }
        }
    }

    fn emit(&self, event: SynthesisEvent) {
        if self.events.send(event).is_err() {
            debug!("Synthesis event receiver dropped");
        }
    }
}

fn interrupted() -> SpeechError {
    SpeechError::SynthesisCanceled("interrupted".to_string())
}
