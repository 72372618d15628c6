use anyhow::Result;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::Credential;
use crate::error::{describe, SpeechError, SpeechResult};

/// Wall clock in milliseconds since the epoch
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// `Clock` backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Issues fresh credentials
#[async_trait::async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch(&self) -> Result<Credential>;
}

type SharedFetch = Shared<BoxFuture<'static, SpeechResult<Arc<Credential>>>>;

#[derive(Default)]
struct CacheState {
    /// Bumped every time a fetch is installed
    generation: u64,
    current: Option<SharedFetch>,
}

/// Process-scoped, expiry-aware credential cache
///
/// At most one fetch is outstanding at a time: the in-flight future is cached
/// before it resolves, so concurrent callers during the fetch window all
/// await the same request. A resolved credential is reused for as long as it
/// is valid; expired, malformed, or failed results are never reused.
pub struct CredentialCache {
    source: Arc<dyn CredentialSource>,
    clock: Arc<dyn Clock>,
    state: Mutex<CacheState>,
}

impl CredentialCache {
    pub fn new(source: Arc<dyn CredentialSource>) -> Self {
        Self::with_clock(source, Arc::new(SystemClock))
    }

    pub fn with_clock(source: Arc<dyn CredentialSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Return a valid credential, fetching one if needed
    ///
    /// Fetch failures surface as `SpeechError::AuthFailure`; there is no retry
    /// here, but the failure is not cached either.
    pub async fn get_credential(&self) -> SpeechResult<Arc<Credential>> {
        loop {
            let (generation, current) = {
                let state = self.state.lock().await;
                (state.generation, state.current.clone())
            };

            if let Some(fetch) = current {
                if fetch.peek().is_none() {
                    debug!("Joining in-flight credential fetch");
                    return fetch.await;
                }

                match fetch.peek() {
                    Some(Ok(credential)) if credential.is_valid_at(self.clock.now_ms()) => {
                        debug!("Returning cached speech credential");
                        return Ok(Arc::clone(credential));
                    }
                    Some(Ok(_)) => info!("Cached speech credential expired or malformed"),
                    _ => debug!("Previous credential fetch failed"),
                }
            }

            match self.begin_fetch(generation).await {
                Some(fetch) => return fetch.await,
                // Someone else installed a fetch since we looked
                None => continue,
            }
        }
    }

    async fn begin_fetch(&self, seen_generation: u64) -> Option<SharedFetch> {
        let mut state = self.state.lock().await;
        if state.generation != seen_generation {
            return None;
        }

        info!("Fetching speech credential");
        let source = Arc::clone(&self.source);
        let fetch = async move {
            match source.fetch().await {
                Ok(credential) => {
                    match credential.expires_at_utc() {
                        Some(at) => info!(
                            "Speech credential obtained for {}, expires at {}",
                            credential.region,
                            at.to_rfc3339()
                        ),
                        None => warn!("Speech credential obtained but its token is malformed"),
                    }
                    Ok(Arc::new(credential))
                }
                Err(e) => {
                    warn!("Failed to fetch speech credential: {:#}", e);
                    Err(SpeechError::AuthFailure(describe(&e)))
                }
            }
        }
        .boxed()
        .shared();

        state.generation += 1;
        state.current = Some(fetch.clone());
        Some(fetch)
    }
}
