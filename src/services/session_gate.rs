use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::ContentIdentity;

/// App lifecycle state reported by the host shell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppLifecycle {
    Active,
    Inactive,
    Background,
}

/// Logical features that spend remote generation calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Recommendations,
    ContentAnalysis,
    WatchlistInsights,
    MoodRecommendation,
    Chat,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Recommendations => "recommendations",
            Feature::ContentAnalysis => "content_analysis",
            Feature::WatchlistInsights => "watchlist_insights",
            Feature::MoodRecommendation => "mood_recommendation",
            Feature::Chat => "chat",
        }
    }

    /// Gate scope covering the whole feature.
    pub fn scope(&self) -> String {
        self.as_str().to_string()
    }

    /// Gate scope for a feature that runs once per title.
    pub fn scope_for(&self, identity: &ContentIdentity) -> String {
        format!("{}:{}:{}", self.as_str(), identity.content_type, identity.id)
    }
}

#[derive(Debug)]
struct GateState {
    called: HashMap<String, bool>,
    lifecycle: AppLifecycle,
}

/// Per-scope, per-session throttle on remote calls.
///
/// A scope may spend one remote call per session, and only when its input
/// fingerprint changed. A new session starts when the app comes back to the
/// foreground.
#[derive(Debug)]
pub struct SessionGate {
    state: Mutex<GateState>,
}

impl Default for SessionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                called: HashMap::new(),
                lifecycle: AppLifecycle::Active,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True only when `fingerprint_changed` and the scope has not called yet
    /// this session. The caller is expected to follow with `mark_called`.
    pub fn allow_remote_call(&self, scope: &str, fingerprint_changed: bool) -> bool {
        if !fingerprint_changed {
            return false;
        }
        !self.lock().called.get(scope).copied().unwrap_or(false)
    }

    pub fn mark_called(&self, scope: &str) {
        self.lock().called.insert(scope.to_string(), true);
    }

    /// Clears one scope, or every scope when `None`.
    pub fn reset(&self, scope: Option<&str>) {
        let mut state = self.lock();
        match scope {
            Some(scope) => {
                state.called.remove(scope);
            }
            None => state.called.clear(),
        }
    }

    pub fn has_called(&self, scope: &str) -> bool {
        self.lock().called.get(scope).copied().unwrap_or(false)
    }

    /// Feeds one lifecycle event. Returns true when it started a new session.
    pub fn observe(&self, next: AppLifecycle) -> bool {
        let mut state = self.lock();
        let previous = state.lifecycle;
        state.lifecycle = next;

        let resumed = matches!(previous, AppLifecycle::Inactive | AppLifecycle::Background)
            && next == AppLifecycle::Active;
        if resumed {
            let scopes = state.called.len();
            state.called.clear();
            tracing::info!(scopes, "App resumed, session gate reset");
        }
        resumed
    }

    pub fn lifecycle(&self) -> AppLifecycle {
        self.lock().lifecycle
    }
}

/// Drains lifecycle events into the gate until every sender is dropped.
pub fn spawn_lifecycle_listener(
    gate: Arc<SessionGate>,
    mut events: mpsc::Receiver<AppLifecycle>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::debug!(?event, "Lifecycle event");
            gate.observe(event);
        }
        tracing::debug!("Lifecycle listener stopped");
    })
}
