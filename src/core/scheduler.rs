//! Prefetch scheduling.
//!
//! The scheduler sits between the playback engine and a [`SynthesisClient`].
//! It guarantees that:
//!
//! - at most one request per cache key is in flight at any time,
//! - no more than `max_concurrency` requests hit the provider at once
//!   (a FIFO semaphore, so the segment being played is served before
//!   segments queued behind it),
//! - successful results land in the shared [`AudioCache`], failures never do,
//! - [`AudioScheduler::reset`] cancels everything that is still running.
//!
//! All bookkeeping lives in one [`SchedulerState`] behind a synchronous mutex.
//! Every check-then-insert happens under a single lock acquisition with no
//! await inside, so two callers can never start the same request twice.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::cache::{AudioCache, CacheKey, DEFAULT_CACHE_CAPACITY};
use crate::core::tts::{
    AudioClip, ProviderProfile, SynthesisClient, SynthesisParams, TTSError, TTSResult,
};

/// Default number of concurrent provider requests.
pub const DEFAULT_MAX_CONCURRENCY: usize = 2;

/// A synthesis result that any number of waiters can await.
pub type PendingAudio = Shared<BoxFuture<'static, TTSResult<AudioClip>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub cache_capacity: usize,
    pub max_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

/// One segment's synthesis request.
#[derive(Debug, Clone)]
pub struct SegmentRequest {
    pub key: CacheKey,
    pub profile: Arc<ProviderProfile>,
    pub params: SynthesisParams,
}

impl SegmentRequest {
    /// Builds the request and its cache key from the effective voice, rate
    /// and format of `profile`.
    pub fn new(profile: &Arc<ProviderProfile>, voice: &str, rate: f32, text: &str) -> Self {
        let format = profile.response_format;
        let key = CacheKey::new(&profile.id, &profile.model, voice, format, rate, text);
        let params = SynthesisParams::new(text)
            .with_voice(voice)
            .with_speed(rate)
            .with_model(profile.model.clone())
            .with_response_format(format);

        Self {
            key,
            profile: Arc::clone(profile),
            params,
        }
    }
}

/// Where the audio of a key currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    Cached,
    InFlight,
    Missing,
}

/// Mutable scheduler bookkeeping.
pub struct SchedulerState {
    cache: AudioCache,
    in_flight: HashMap<CacheKey, PendingAudio>,
    /// Bumped by every reset; tasks from older generations leave no trace.
    generation: u64,
    cancel: CancellationToken,
}

impl SchedulerState {
    fn new(cache_capacity: usize) -> Self {
        Self {
            cache: AudioCache::new(cache_capacity),
            in_flight: HashMap::new(),
            generation: 0,
            cancel: CancellationToken::new(),
        }
    }

    fn status(&self, key: &CacheKey) -> KeyStatus {
        if self.cache.contains(key) {
            KeyStatus::Cached
        } else if self.in_flight.contains_key(key) {
            KeyStatus::InFlight
        } else {
            KeyStatus::Missing
        }
    }
}

/// Deduplicating, concurrency-bounded front of a [`SynthesisClient`].
pub struct AudioScheduler {
    client: Arc<dyn SynthesisClient>,
    state: Arc<Mutex<SchedulerState>>,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
}

impl AudioScheduler {
    pub fn new(client: Arc<dyn SynthesisClient>, config: SchedulerConfig) -> Self {
        let max_concurrency = config.max_concurrency.max(1);
        Self {
            client,
            state: Arc::new(Mutex::new(SchedulerState::new(config.cache_capacity))),
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        }
    }

    pub fn client(&self) -> Arc<dyn SynthesisClient> {
        Arc::clone(&self.client)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Returns the audio for `request`: from the cache, from the task
    /// already in flight for its key, or from a newly spawned task.
    pub fn request(&self, request: SegmentRequest) -> PendingAudio {
        let mut state = self.state.lock();

        if let Some(clip) = state.cache.get(&request.key) {
            return futures::future::ready(Ok(clip)).boxed().shared();
        }
        if let Some(pending) = state.in_flight.get(&request.key) {
            return pending.clone();
        }
        self.spawn_task(&mut state, request)
    }

    /// Starts requests for every key that is neither cached nor in flight.
    ///
    /// Results are not reported back; failures only surface if the same key
    /// is requested later. Returns how many tasks were started.
    pub fn prefetch<I>(&self, requests: I) -> usize
    where
        I: IntoIterator<Item = SegmentRequest>,
    {
        let mut state = self.state.lock();
        let mut started = 0;
        for request in requests {
            if state.status(&request.key) == KeyStatus::Missing {
                self.spawn_task(&mut state, request);
                started += 1;
            }
        }
        started
    }

    /// Caches audio obtained outside the scheduler (the streamed path).
    pub fn store(&self, key: CacheKey, clip: AudioClip) {
        let mut state = self.state.lock();
        if let Some(evicted) = state.cache.put(key, clip) {
            debug!(key = %evicted, "Evicted cached audio");
        }
    }

    pub fn status(&self, key: &CacheKey) -> KeyStatus {
        self.state.lock().status(key)
    }

    pub fn is_cached(&self, key: &CacheKey) -> bool {
        self.status(key) == KeyStatus::Cached
    }

    pub fn cached_len(&self) -> usize {
        self.state.lock().cache.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Waits for a request slot, giving up when `cancel` fires.
    ///
    /// Used by the streamed path, which issues its request directly but must
    /// still respect the concurrency bound.
    pub async fn acquire_permit(
        &self,
        cancel: &CancellationToken,
    ) -> TTSResult<OwnedSemaphorePermit> {
        let scheduler_cancel = self.state.lock().cancel.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TTSError::aborted()),
            _ = scheduler_cancel.cancelled() => Err(TTSError::aborted()),
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.map_err(|_| TTSError::aborted())
            }
        }
    }

    /// Cancels every in-flight task and forgets about them. The cache is kept.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.cancel.cancel();
        state.cancel = CancellationToken::new();
        state.generation += 1;
        let dropped = state.in_flight.len();
        state.in_flight.clear();

        if dropped > 0 {
            debug!(dropped, generation = state.generation, "Scheduler reset");
        }
    }

    fn spawn_task(&self, state: &mut SchedulerState, request: SegmentRequest) -> PendingAudio {
        let key = request.key;
        let task = run_synthesis(
            Arc::clone(&self.client),
            Arc::clone(&self.permits),
            Arc::clone(&self.state),
            request,
            state.generation,
            state.cancel.clone(),
        )
        .boxed()
        .shared();

        state.in_flight.insert(key, task.clone());

        // Drive the task even if nobody awaits it.
        let driver = task.clone();
        tokio::spawn(async move {
            let _ = driver.await;
        });

        task
    }
}

async fn run_synthesis(
    client: Arc<dyn SynthesisClient>,
    permits: Arc<Semaphore>,
    state: Arc<Mutex<SchedulerState>>,
    request: SegmentRequest,
    generation: u64,
    cancel: CancellationToken,
) -> TTSResult<AudioClip> {
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TTSError::aborted()),
        result = async {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| TTSError::aborted())?;
            client.synthesize(&request.profile, &request.params).await
        } => result,
    };

    let mut state = state.lock();
    if state.generation == generation {
        match &result {
            Ok(clip) => {
                if let Some(evicted) = state.cache.put(request.key, clip.clone()) {
                    debug!(key = %evicted, "Evicted cached audio");
                }
            }
            Err(e) if !e.is_aborted() => {
                debug!(key = %request.key, error = %e, "Synthesis failed");
            }
            Err(_) => {}
        }
        state.in_flight.remove(&request.key);
    }

    result
}
