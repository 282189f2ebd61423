//! Conversation Memory - Session-scoped chat history with idle eviction
//!
//! - One bounded history per session id, oldest messages dropped first
//! - Per-session mutex around every read-modify-write
//! - Background sweep evicts sessions idle longer than the timeout

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::llm::ChatMessage;

/// Floor for the sweep period; `tokio::time::interval` rejects zero
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Store Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Messages kept per session (0 disables memory)
    pub max_history: usize,
    /// Idle time after which a session is evicted
    pub idle_timeout: Duration,
    /// Period of the background sweep
    pub sweep_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_history: 20,
            idle_timeout: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(10 * 60),
        }
    }
}

impl StoreConfig {
    pub fn from_config(config: &crate::config::MemoryConfig) -> anyhow::Result<Self> {
        Ok(Self {
            max_history: config.max_history,
            idle_timeout: config.idle_timeout()?,
            sweep_interval: config.sweep_interval()?,
        })
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub history: Vec<ChatMessage>,
    pub last_access: Instant,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Session {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            history: Vec::new(),
            last_access: Instant::now(),
            created_at: chrono::Utc::now(),
        }
    }

    fn truncate(&mut self, max_history: usize) {
        if self.history.len() > max_history {
            let overflow = self.history.len() - max_history;
            self.history.drain(..overflow);
        }
    }
}

// ============================================================================
// Conversation Store
// ============================================================================

/// Shared across all requests. Lock order is always map, then session.
pub struct ConversationStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
    config: StoreConfig,
}

impl ConversationStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn session(&self, session_id: &str) -> Arc<Mutex<Session>> {
        if let Some(session) = self.sessions.read().get(session_id) {
            return Arc::clone(session);
        }

        let mut sessions = self.sessions.write();
        Arc::clone(
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| {
                    debug!("New session: {}", session_id);
                    Arc::new(Mutex::new(Session::new(session_id)))
                }),
        )
    }

    /// Snapshot of the session's history. Creates the session on first use
    /// and refreshes `last_access`.
    pub fn get_or_create(&self, session_id: &str) -> Vec<ChatMessage> {
        let session = self.session(session_id);
        let mut session = session.lock();
        session.last_access = Instant::now();
        session.history.clone()
    }

    /// Refresh `last_access` without reading the history
    pub fn touch(&self, session_id: &str) {
        self.touch_at(session_id, Instant::now());
    }

    pub fn touch_at(&self, session_id: &str, at: Instant) {
        let session = self.session(session_id);
        session.lock().last_access = at;
    }

    /// Record one question/answer exchange
    pub fn append_turn(&self, session_id: &str, question: &str, answer: &str) {
        let session = self.session(session_id);
        let mut session = session.lock();
        session.last_access = Instant::now();

        if self.config.max_history == 0 {
            return;
        }

        session.history.push(ChatMessage::user(question));
        session.history.push(ChatMessage::assistant(answer));
        session.truncate(self.config.max_history);
    }

    /// Evict sessions idle longer than the timeout. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let idle_timeout = self.config.idle_timeout;
        let mut sessions = self.sessions.write();
        let before = sessions.len();

        sessions.retain(|_, session| {
            let last_access = session.lock().last_access;
            now.saturating_duration_since(last_access) <= idle_timeout
        });

        let removed = before - sessions.len();
        if removed > 0 {
            info!("🧹 Evicted {} idle session(s), {} remaining", removed, sessions.len());
        }
        removed
    }

    /// Start the periodic eviction sweep on the tokio runtime
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.config.sweep_interval.max(MIN_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // first tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let store = Arc::clone(&self);
                if let Err(e) = tokio::task::spawn_blocking(move || store.sweep_expired()).await {
                    warn!("Session sweep failed, retrying next tick: {}", e);
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().contains_key(session_id)
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================
