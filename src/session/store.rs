//! Debate session state and storage.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::agent::ChatMessage;
use crate::game::{TraderCode, Verdict, VerdictReport};

/// Starting health balance; both sides are even.
pub const INITIAL_HEALTH: u8 = 50;
/// Upper bound of the health balance.
pub const MAX_HEALTH: u8 = 100;

/// A single debate session.
///
/// Cloning is cheap; clones share state.
#[derive(Debug, Clone)]
pub struct DebateSession {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    id: String,
    created_at: DateTime<Utc>,
    last_activity: RwLock<DateTime<Utc>>,
    state: RwLock<DebateState>,
}

#[derive(Debug, Default)]
struct DebateState {
    user_code: Option<TraderCode>,
    mirror_code: Option<TraderCode>,
    asset: Option<String>,
    dimensions: Vec<String>,
    profile_prompt: Option<String>,
    history: Vec<ChatMessage>,
    health: u8,
    rounds: u32,
}

/// Point-in-time copy of a session, as returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub created_at: String,
    pub last_activity: String,
    pub user_code: Option<TraderCode>,
    pub mirror_code: Option<TraderCode>,
    pub asset: Option<String>,
    pub dimensions: Vec<String>,
    pub history: Vec<ChatMessage>,
    pub health: u8,
    pub rounds: u32,
}

fn clamp_health(value: i64) -> u8 {
    u8::try_from(value.clamp(0, i64::from(MAX_HEALTH))).unwrap_or(MAX_HEALTH)
}

impl DebateSession {
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            inner: Arc::new(SessionInner {
                id,
                created_at: now,
                last_activity: RwLock::new(now),
                state: RwLock::new(DebateState {
                    health: INITIAL_HEALTH,
                    ..DebateState::default()
                }),
            }),
        }
    }

    /// Get the session ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    fn read<T>(&self, f: impl FnOnce(&DebateState) -> T) -> T {
        let guard = self.inner.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write<T>(&self, f: impl FnOnce(&mut DebateState) -> T) -> T {
        let out = {
            let mut guard = self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
            f(&mut guard)
        };
        self.touch();
        out
    }

    /// Record the user's code; the mirror code is derived from it.
    pub fn set_codes(&self, user: TraderCode) {
        self.write(|s| {
            s.user_code = Some(user);
            s.mirror_code = Some(user.mirror());
        });
    }

    /// Set the debated asset and selected dimensions.
    pub fn set_topic(&self, asset: Option<String>, dimensions: Vec<String>) {
        self.write(|s| {
            s.asset = asset;
            s.dimensions = dimensions;
        });
    }

    pub fn set_profile_prompt(&self, prompt: impl Into<String>) {
        let prompt = prompt.into();
        self.write(|s| s.profile_prompt = Some(prompt));
    }

    #[must_use]
    pub fn profile_prompt(&self) -> Option<String> {
        self.read(|s| s.profile_prompt.clone())
    }

    #[must_use]
    pub fn user_code(&self) -> Option<TraderCode> {
        self.read(|s| s.user_code)
    }

    #[must_use]
    pub fn mirror_code(&self) -> Option<TraderCode> {
        self.read(|s| s.mirror_code)
    }

    /// Current health balance.
    #[must_use]
    pub fn health(&self) -> u8 {
        self.read(|s| s.health)
    }

    /// Shift health by `delta`, clamped to `[0, 100]`. Returns the new value.
    pub fn apply_delta(&self, delta: i32) -> u8 {
        self.write(|s| {
            s.health = clamp_health(i64::from(s.health) + i64::from(delta));
            s.health
        })
    }

    /// Set health outright, clamped to `[0, 100]`. Returns the new value.
    pub fn set_health(&self, value: i64) -> u8 {
        self.write(|s| {
            s.health = clamp_health(value);
            s.health
        })
    }

    /// Append a completed exchange and count it as a round.
    pub fn record_round(&self, user: ChatMessage, reply: Option<ChatMessage>) -> u32 {
        self.write(|s| {
            s.history.push(user);
            s.history.extend(reply);
            s.rounds += 1;
            s.rounds
        })
    }

    /// Conversation history.
    #[must_use]
    pub fn history(&self) -> Vec<ChatMessage> {
        self.read(|s| s.history.clone())
    }

    #[must_use]
    pub fn rounds(&self) -> u32 {
        self.read(|s| s.rounds)
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let last_activity = self.last_activity();
        self.read(|s| SessionSnapshot {
            id: self.inner.id.clone(),
            created_at: self.inner.created_at.to_rfc3339(),
            last_activity: last_activity.to_rfc3339(),
            user_code: s.user_code,
            mirror_code: s.mirror_code,
            asset: s.asset.clone(),
            dimensions: s.dimensions.clone(),
            history: s.history.clone(),
            health: s.health,
            rounds: s.rounds,
        })
    }

    /// Verdict for the current health balance.
    #[must_use]
    pub fn report(&self) -> VerdictReport {
        self.read(|s| VerdictReport {
            session_id: self.inner.id.clone(),
            user_code: s.user_code,
            mirror_code: s.mirror_code,
            asset: s.asset.clone(),
            rounds: s.rounds,
            health: s.health,
            verdict: Verdict::from_health(s.health),
        })
    }

    fn last_activity(&self) -> DateTime<Utc> {
        *self
            .inner
            .last_activity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self) {
        let mut guard = self
            .inner
            .last_activity
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Utc::now();
    }

    /// Whether the session has been idle longer than `max_idle`.
    #[must_use]
    pub fn is_idle_for(&self, max_idle: Duration) -> bool {
        // A last activity in the future (clock skew) never counts as idle.
        (Utc::now() - self.last_activity())
            .to_std()
            .is_ok_and(|idle| idle > max_idle)
    }
}

/// Thread-safe store for debate sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, DebateSession>>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with a fresh UUID v4 id.
    #[must_use]
    pub fn create(&self) -> DebateSession {
        self.create_with_id(Uuid::new_v4().to_string())
    }

    /// Create (or replace) a session with a specific id.
    #[must_use]
    pub fn create_with_id(&self, id: impl Into<String>) -> DebateSession {
        let id = id.into();
        let session = DebateSession::new(id.clone());
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, session.clone());
        session
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<DebateSession> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Get a session by id, creating it if it doesn't exist.
    #[must_use]
    pub fn get_or_create(&self, id: &str) -> DebateSession {
        let mut guard = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        guard
            .entry(id.to_string())
            .or_insert_with(|| DebateSession::new(id.to_string()))
            .clone()
    }

    pub fn remove(&self, id: &str) -> Option<DebateSession> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn list_ids(&self) -> Vec<String> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Drop sessions idle longer than `max_idle`. Returns how many were removed.
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let mut guard = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        guard.retain(|_, session| !session.is_idle_for(max_idle));
        before - guard.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_even() {
        let store = SessionStore::new();
        let session = store.create();
        assert_eq!(session.health(), INITIAL_HEALTH);
        assert_eq!(session.rounds(), 0);
        assert_eq!(session.report().verdict, Verdict::Draw);
        assert!(Uuid::parse_str(session.id()).is_ok());
    }

    #[test]
    fn test_health_is_clamped() {
        let session = DebateSession::new("s".into());
        assert_eq!(session.apply_delta(30), 80);
        assert_eq!(session.apply_delta(45), 100);
        assert_eq!(session.apply_delta(-250), 0);
        assert_eq!(session.set_health(-7), 0);
        assert_eq!(session.set_health(1_000), 100);
        assert_eq!(session.set_health(62), 62);
        assert_eq!(session.report().verdict, Verdict::Victory);
    }

    #[test]
    fn test_codes_and_rounds() {
        let session = DebateSession::new("s".into());
        session.set_codes("INTJ".parse().unwrap());
        assert_eq!(session.mirror_code().unwrap().to_string(), "ESFP");

        session.record_round(ChatMessage::user("BTC to 100k"), Some(ChatMessage::assistant("No.")));
        session.record_round(ChatMessage::user("Why?"), None);
        assert_eq!(session.rounds(), 2);
        assert_eq!(session.history().len(), 3);

        let snapshot = session.snapshot();
        assert_eq!(snapshot.user_code.unwrap().to_string(), "INTJ");
        assert_eq!(snapshot.rounds, 2);
    }

    #[test]
    fn test_store_lifecycle() {
        let store = SessionStore::new();
        assert!(store.is_empty());

        let session = store.create_with_id("abc");
        session.apply_delta(5);
        assert_eq!(store.get("abc").unwrap().health(), 55);
        assert_eq!(store.get_or_create("abc").health(), 55);
        assert_eq!(store.get_or_create("def").health(), INITIAL_HEALTH);
        assert_eq!(store.len(), 2);

        let mut ids = store.list_ids();
        ids.sort();
        assert_eq!(ids, vec!["abc", "def"]);

        assert!(store.remove("abc").is_some());
        assert!(store.remove("abc").is_none());
        assert!(store.get("abc").is_none());
    }

    #[test]
    fn test_prune_idle() {
        let store = SessionStore::new();
        let _ = store.create();
        assert_eq!(store.prune_idle(Duration::from_secs(3600)), 0);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(store.prune_idle(Duration::from_millis(1)), 1);
        assert!(store.is_empty());
    }
}
