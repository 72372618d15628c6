//! Glue between the recognizer, a reply stream and the synthesizer

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{SpeechError, SpeechResult};
use crate::recognizer::SpeechEvent;
use crate::synthesizer::{Playback, Synthesizer};

/// Speak a streamed reply as it arrives
///
/// Every fragment goes through `synthesize`, the remainder is flushed at end
/// of stream, and the call returns once every utterance has played (or the
/// first one fails, e.g. because of an interruption).
///
/// The reply is tied to the synthesizer generation current when the call
/// starts. Once `interrupt()` moves past it, the rest of the stream is
/// dropped and the call fails with `SynthesisCanceled`.
pub async fn speak_stream<S>(synthesizer: &Synthesizer, mut fragments: S) -> SpeechResult<()>
where
    S: Stream<Item = String> + Unpin,
{
    let generation = synthesizer.generation().await;
    let mut playbacks: Vec<Playback> = Vec::new();

    while let Some(fragment) = fragments.next().await {
        let queued = synthesizer.synthesize_in(generation, &fragment, false).await;
        if let Some(playback) = abandon_if_interrupted(queued)? {
            playbacks.push(playback);
        }
    }

    while let Some(playback) =
        abandon_if_interrupted(synthesizer.synthesize_in(generation, "", true).await)?
    {
        playbacks.push(playback);
    }
    debug!("Reply fully queued ({} utterances)", playbacks.len());

    for playback in playbacks {
        playback.await?;
    }

    Ok(())
}

fn abandon_if_interrupted(
    queued: SpeechResult<Option<Playback>>,
) -> SpeechResult<Option<Playback>> {
    if let Err(SpeechError::SynthesisCanceled(_)) = &queued {
        info!("Reply interrupted, dropping the rest of it");
    }
    queued
}

/// Barge-in: cut the synthesizer off whenever the user starts talking
///
/// Forwards every recognizer event to `forward` and returns when the
/// recognizer's event stream ends.
pub async fn interrupt_on_speech(
    mut events: mpsc::UnboundedReceiver<SpeechEvent>,
    synthesizer: Synthesizer,
    forward: mpsc::UnboundedSender<SpeechEvent>,
) {
    let mut armed = true;

    while let Some(event) = events.recv().await {
        if armed && event == SpeechEvent::SpeechStarted {
            info!("User started speaking, interrupting reply");
            match synthesizer.interrupt().await {
                Ok(()) => {}
                Err(SpeechError::SessionClosed) => {
                    debug!("Synthesizer closed, barge-in disabled");
                    armed = false;
                }
                Err(e) => warn!("Barge-in failed: {}", e),
            }
        }

        if forward.send(event).is_err() {
            debug!("Speech event consumer dropped");
            break;
        }
    }
}
