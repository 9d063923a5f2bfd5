/// Feature orchestration
///
/// Every remote-backed feature runs the same decision flow:
///
/// ```text
/// nothing to work from       -> Empty
/// fingerprint -> record lookup (memory, then durable store)
///   match and fresh          -> Cached
///   else gate blocked        -> Cached (match past TTL) | Stale | Empty
///   else call remote
///     config error           -> reopen gate, fail
///     other failure          -> fail, carrying stale data
///     unusable text          -> Stale | Empty
///     success -> enrich -> superseded? Discarded : persist -> Fresh
/// ```
///
/// Features plug into the flow through `FeatureSpec`.
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    db::{load_record, save_record, PersistentStore, StoreKey, TieredCache},
    error::{AppError, AppResult, ParseError},
    models::{ContentIdentity, Fingerprint, PersonalizationRecord},
    services::{
        enricher::ResultEnricher,
        generation::{GenerationClient, GenerationRequest},
        hasher::ContentHasher,
        session_gate::{Feature, SessionGate},
    },
};

pub mod analysis;
pub mod chat;
pub mod insights;
pub mod mood;
pub mod recommendations;

pub use analysis::ContentAnalysisFeature;
pub use chat::{ChatInput, ChatOrchestrator};
pub use insights::WatchlistInsightsFeature;
pub use mood::MoodRecommendationFeature;
pub use recommendations::RecommendationsFeature;

/// Memory-tier namespace holding personalization records
pub const RECORDS_NAMESPACE: &str = "records";

/// Where a returned result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Fresh,
    Cached,
    Stale,
    Empty,
    Discarded,
}

/// Outcome of one feature request
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    /// Computed by this request and persisted
    Fresh(T),
    /// Reused record whose fingerprint matches the current input
    Cached(T),
    /// Record computed for a different input, served because no call was allowed
    Stale(T),
    /// Nothing to show
    Empty,
    /// Superseded by a newer request, or the orchestrator was disposed
    Discarded,
}

impl<T> Resolution<T> {
    pub fn source(&self) -> Source {
        match self {
            Resolution::Fresh(_) => Source::Fresh,
            Resolution::Cached(_) => Source::Cached,
            Resolution::Stale(_) => Source::Stale,
            Resolution::Empty => Source::Empty,
            Resolution::Discarded => Source::Discarded,
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Resolution::Fresh(data) | Resolution::Cached(data) | Resolution::Stale(data) => {
                Some(data)
            }
            Resolution::Empty | Resolution::Discarded => None,
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            Resolution::Fresh(data) | Resolution::Cached(data) | Resolution::Stale(data) => {
                Some(data)
            }
            Resolution::Empty | Resolution::Discarded => None,
        }
    }

    fn stale_or_empty(stale: Option<T>) -> Self {
        stale.map_or(Resolution::Empty, Resolution::Stale)
    }
}

/// Terminal failure of a feature request. Stale data survives the failure.
#[derive(Debug)]
pub struct FeatureFailure<T> {
    pub error: AppError,
    pub stale: Option<T>,
}

impl<T> FeatureFailure<T> {
    pub fn new(error: AppError, stale: Option<T>) -> Self {
        Self { error, stale }
    }
}

pub type FeatureResult<T> = Result<Resolution<T>, FeatureFailure<T>>;

/// Tracks which request is current for each key so superseded results can
/// be dropped. Requests for different keys never supersede each other.
///
/// Generations come from one counter, so a number is never reused for a key
/// even after its entry was removed.
#[derive(Debug, Default)]
pub struct RequestGuard {
    next: AtomicU64,
    current: Mutex<HashMap<String, u64>>,
    disposed: AtomicBool,
}

impl RequestGuard {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts a request for `key`, superseding every earlier one for that key.
    pub fn begin(&self, key: &str) -> u64 {
        let generation = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        self.lock().insert(key.to_string(), generation);
        generation
    }

    pub fn is_current(&self, key: &str, generation: u64) -> bool {
        !self.is_disposed() && self.lock().get(key) == Some(&generation)
    }

    /// Ends a request. Returns whether it was still current, and forgets the
    /// key when it was.
    pub fn complete(&self, key: &str, generation: u64) -> bool {
        let mut current = self.lock();
        if current.get(key) != Some(&generation) {
            return false;
        }
        current.remove(key);
        !self.is_disposed()
    }

    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

/// Shared collaborators of every orchestrator
#[derive(Clone)]
pub struct FeatureContext {
    pub store: Arc<dyn PersistentStore>,
    pub cache: Arc<TieredCache>,
    pub gate: Arc<SessionGate>,
    pub generator: Arc<dyn GenerationClient>,
    pub enricher: Arc<ResultEnricher>,
}

/// One remote-backed feature
#[async_trait::async_trait]
pub trait FeatureSpec: Send + Sync + 'static {
    type Input: Send + Sync;
    type Parsed: Send;
    type Output: Serialize + DeserializeOwned + Clone + Send + Sync;

    const FEATURE: Feature;

    /// Rejects inputs the feature cannot work with.
    fn validate(&self, _input: &Self::Input) -> AppResult<()> {
        Ok(())
    }

    /// Inputs with nothing to work from resolve to `Empty` without a lookup.
    fn is_empty_input(&self, _input: &Self::Input) -> bool {
        false
    }

    fn store_key(&self, input: &Self::Input) -> StoreKey;

    fn gate_scope(&self, _input: &Self::Input) -> String {
        Self::FEATURE.scope()
    }

    /// Identities the input fingerprint is computed over.
    fn identities(&self, input: &Self::Input) -> Vec<ContentIdentity>;

    fn fingerprint(&self, input: &Self::Input) -> Fingerprint {
        ContentHasher::compute(&self.identities(input))
    }

    /// How long a record stays fresh across sessions.
    fn ttl(&self) -> chrono::Duration;

    fn request(&self, input: &Self::Input) -> GenerationRequest;

    fn parse(&self, input: &Self::Input, text: &str) -> Result<Self::Parsed, ParseError>;

    /// Turns parsed output into the final result, resolving title references.
    async fn finish(&self, parsed: Self::Parsed, enricher: &ResultEnricher) -> Self::Output;
}

/// Runs the cache / gate / remote decision flow for one feature
pub struct FeatureOrchestrator<F: FeatureSpec> {
    spec: F,
    ctx: FeatureContext,
    guard: RequestGuard,
}

impl<F: FeatureSpec> FeatureOrchestrator<F> {
    pub fn new(spec: F, ctx: FeatureContext) -> Self {
        Self {
            spec,
            ctx,
            guard: RequestGuard::default(),
        }
    }

    /// Stops this orchestrator from writing any in-flight result.
    pub fn dispose(&self) {
        self.guard.dispose();
    }

    pub async fn resolve(&self, input: &F::Input) -> FeatureResult<F::Output> {
        let feature = F::FEATURE.as_str();
        if let Err(e) = self.spec.validate(input) {
            return Err(FeatureFailure::new(e, None));
        }
        if self.spec.is_empty_input(input) {
            tracing::debug!(feature, "Nothing to work from");
            return Ok(Resolution::Empty);
        }

        let key = self.spec.store_key(input);
        let fingerprint = self.spec.fingerprint(input);
        let ttl = self.spec.ttl();
        let record = self.load(&key).await;

        let (matches, expired) = record
            .as_ref()
            .map(|r| (r.fingerprint == fingerprint, r.is_past(ttl)))
            .unwrap_or((false, false));

        if matches && !expired {
            tracing::debug!(feature, key = %key, "Fingerprint unchanged, reusing record");
            return Ok(record.map_or(Resolution::Empty, |r| Resolution::Cached(r.result)));
        }

        let scope = self.spec.gate_scope(input);
        if !self.ctx.gate.allow_remote_call(&scope, !matches || expired) {
            tracing::debug!(feature, scope = %scope, "Remote call blocked for this session");
            return Ok(match record {
                Some(r) if matches => Resolution::Cached(r.result),
                Some(r) => Resolution::Stale(r.result),
                None => Resolution::Empty,
            });
        }
        self.ctx.gate.mark_called(&scope);
        let guard_key = key.to_string();
        let generation = self.guard.begin(&guard_key);

        let stale = record.map(|r| r.result);
        tracing::info!(feature, key = %key, fingerprint = %fingerprint, "Requesting fresh result");

        let text = match self.ctx.generator.generate(self.spec.request(input)).await {
            Ok(text) => text,
            Err(AppError::Parse(e)) => {
                tracing::warn!(feature, error = %e, "No usable generated text");
                return Ok(Resolution::stale_or_empty(stale));
            }
            Err(e) => {
                if matches!(e, AppError::Config(_)) {
                    self.ctx.gate.reset(Some(&scope));
                }
                tracing::error!(feature, error = %e, "Remote call failed");
                return Err(FeatureFailure::new(e, stale));
            }
        };

        let parsed = match self.spec.parse(input, &text) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(feature, error = %e, "Discarding unparseable generated text");
                return Ok(Resolution::stale_or_empty(stale));
            }
        };

        let output = self.spec.finish(parsed, &self.ctx.enricher).await;

        if !self.guard.complete(&guard_key, generation) {
            tracing::info!(feature, key = %key, generation, "Result superseded, discarding");
            return Ok(Resolution::Discarded);
        }

        self.persist(&key, PersonalizationRecord::new(fingerprint, output.clone()), ttl)
            .await;
        Ok(Resolution::Fresh(output))
    }

    async fn load(&self, key: &StoreKey) -> Option<PersonalizationRecord<F::Output>> {
        let cache_key = key.to_string();
        if let Some(record) = self.ctx.cache.get(RECORDS_NAMESPACE, &cache_key) {
            return Some(record);
        }

        let record: PersonalizationRecord<F::Output> =
            load_record(self.ctx.store.as_ref(), key).await?;
        self.ctx
            .cache
            .set(RECORDS_NAMESPACE, &cache_key, &record, memory_ttl(self.spec.ttl()));
        Some(record)
    }

    async fn persist(
        &self,
        key: &StoreKey,
        record: PersonalizationRecord<F::Output>,
        ttl: chrono::Duration,
    ) {
        self.ctx
            .cache
            .set(RECORDS_NAMESPACE, &key.to_string(), &record, memory_ttl(ttl));
        save_record(self.ctx.store.as_ref(), key, &record).await;
        tracing::info!(feature = F::FEATURE.as_str(), key = %key, "Result persisted");
    }

    /// Drops a stored record from both tiers and reopens the feature scope,
    /// so the next request recomputes it.
    pub async fn forget(&self, key: &StoreKey) -> AppResult<()> {
        self.ctx.cache.invalidate(RECORDS_NAMESPACE, &key.to_string());
        self.ctx.store.delete(key).await?;
        self.ctx.gate.reset(Some(&F::FEATURE.scope()));
        tracing::info!(feature = F::FEATURE.as_str(), key = %key, "Record forgotten");
        Ok(())
    }
}

fn memory_ttl(ttl: chrono::Duration) -> std::time::Duration {
    ttl.to_std().unwrap_or_default()
}

/// Array of loosely-typed JSON strings, non-string entries skipped
pub(crate) fn string_list(value: Option<&serde_json::Value>) -> Vec<String> {
    value
        .and_then(serde_json::Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(serde_json::Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Number, or string holding a number
pub(crate) fn coerce_number(value: Option<&serde_json::Value>) -> Option<f64> {
    let number: Option<f64> = match value? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}
