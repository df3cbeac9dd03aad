//! In-memory conversation sessions.
//!
//! `SessionManager` is the only owner of session state. All mutation goes
//! through `resolve`, `append`, `append_exchange` and `sweep_expired*`, each
//! a short critical section on one mutex that is never held across an await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub history: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    fn new(id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            history: Vec::new(),
            created_at: now,
            last_activity: now,
        }
    }
}

/// Snapshot handed to the pipeline; later appends do not show up here.
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    pub id: String,
    pub history: Vec<Turn>,
    pub created: bool,
}

#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
    expiry: Duration,
}

impl SessionManager {
    pub fn new(expiry: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            expiry,
        }
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Returns the live session for `session_id`, or a new one under a fresh id
    /// when the id is absent, blank or unknown.
    pub fn resolve(&self, session_id: Option<&str>) -> ResolvedSession {
        self.resolve_at(session_id, Utc::now())
    }

    pub fn resolve_at(&self, session_id: Option<&str>, now: DateTime<Utc>) -> ResolvedSession {
        let mut sessions = self.lock();

        let requested = session_id.map(str::trim).filter(|id| !id.is_empty());
        if let Some(session) = requested.and_then(|id| sessions.get_mut(id)) {
            session.last_activity = now;
            return ResolvedSession {
                id: session.id.clone(),
                history: session.history.clone(),
                created: false,
            };
        }

        let id = loop {
            let candidate = Uuid::new_v4().to_string();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        sessions.insert(id.clone(), Session::new(id.clone(), now));
        tracing::debug!(session_id = %id, "Created session");

        ResolvedSession {
            id,
            history: Vec::new(),
            created: true,
        }
    }

    pub fn append(&self, session_id: &str, turn: Turn) {
        self.append_all(session_id, [turn], Utc::now());
    }

    /// Appends a user turn and its answer as one unit.
    pub fn append_exchange(&self, session_id: &str, user: Turn, assistant: Turn) {
        self.append_all(session_id, [user, assistant], Utc::now());
    }

    fn append_all<const N: usize>(&self, session_id: &str, turns: [Turn; N], now: DateTime<Utc>) {
        let mut sessions = self.lock();
        let session = sessions.entry(session_id.to_string()).or_insert_with(|| {
            // Evicted while the request was in flight; keep the completed exchange.
            tracing::debug!(session_id = %session_id, "Recreating swept session on append");
            Session::new(session_id.to_string(), now)
        });
        session.history.extend(turns);
        session.last_activity = now;
    }

    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }

    /// Drops every session idle for longer than the expiry window.
    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let expiry = chrono::Duration::from_std(self.expiry).unwrap_or(chrono::Duration::MAX);
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, session| now.signed_duration_since(session.last_activity) <= expiry);
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!(removed, remaining = sessions.len(), "Swept expired sessions");
        }
        removed
    }

    /// Sweeps on a fixed period from a background task.
    pub fn spawn_sweeper(&self, period: Duration) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                manager.sweep_expired();
            }
        })
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.lock().get(session_id).cloned()
    }

    /// Live sessions, most recently active first.
    pub fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.lock().values().cloned().collect();
        sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        sessions
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        // Critical sections never panic midway, so a poisoned map is still consistent.
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new(Duration::from_secs(3600))
    }

    #[test]
    fn absent_or_unknown_id_creates_fresh_session() {
        let manager = manager();

        let first = manager.resolve(None);
        assert!(first.created);
        assert!(first.history.is_empty());

        let second = manager.resolve(Some("does-not-exist"));
        assert!(second.created);
        assert_ne!(second.id, "does-not-exist");
        assert_ne!(second.id, first.id);

        let blank = manager.resolve(Some("   "));
        assert!(blank.created);
        assert_eq!(manager.len(), 3);
    }

    #[test]
    fn known_id_returns_existing_history() {
        let manager = manager();
        let session = manager.resolve(None);
        manager.append_exchange(&session.id, Turn::user("hi"), Turn::assistant("hey!"));

        let again = manager.resolve(Some(&session.id));
        assert!(!again.created);
        assert_eq!(again.id, session.id);
        assert_eq!(again.history, vec![Turn::user("hi"), Turn::assistant("hey!")]);
    }

    #[test]
    fn append_adds_single_turn_and_refreshes_activity() {
        let manager = manager();
        let session = manager.resolve_at(None, Utc::now() - chrono::Duration::minutes(30));
        let before = manager.get(&session.id).unwrap().last_activity;

        manager.append(&session.id, Turn::user("question"));

        let stored = manager.get(&session.id).unwrap();
        assert_eq!(stored.history, vec![Turn::user("question")]);
        assert!(stored.last_activity > before);
    }

    #[test]
    fn sweep_removes_only_idle_sessions() {
        let manager = manager();
        let now = Utc::now();
        let stale = manager.resolve_at(None, now - chrono::Duration::hours(2));
        let fresh = manager.resolve_at(None, now - chrono::Duration::minutes(10));

        let removed = manager.sweep_expired_at(now);

        assert_eq!(removed, 1);
        assert!(manager.get(&stale.id).is_none());
        assert!(manager.get(&fresh.id).is_some());
    }

    #[test]
    fn resolve_refreshes_activity_so_session_survives_sweep() {
        let manager = manager();
        let now = Utc::now();
        let session = manager.resolve_at(None, now - chrono::Duration::hours(2));
        manager.resolve_at(Some(&session.id), now - chrono::Duration::minutes(1));

        assert_eq!(manager.sweep_expired_at(now), 0);
    }

    #[test]
    fn append_to_swept_session_recreates_it() {
        let manager = manager();
        let now = Utc::now();
        let session = manager.resolve_at(None, now - chrono::Duration::hours(3));
        manager.sweep_expired_at(now);
        assert!(manager.get(&session.id).is_none());

        manager.append_exchange(&session.id, Turn::user("q"), Turn::assistant("a"));

        let stored = manager.get(&session.id).unwrap();
        assert_eq!(stored.history.len(), 2);
    }

    #[test]
    fn concurrent_appends_to_one_session_are_not_lost() {
        let manager = manager();
        let session = manager.resolve(None);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let manager = manager.clone();
                let id = session.id.clone();
                std::thread::spawn(move || {
                    manager.append_exchange(
                        &id,
                        Turn::user(format!("q{}", i)),
                        Turn::assistant(format!("a{}", i)),
                    );
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let history = manager.get(&session.id).unwrap().history;
        assert_eq!(history.len(), 16);
        // Each exchange stays adjacent: a user turn is always followed by its answer.
        for pair in history.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(&pair[0].content[1..], &pair[1].content[1..]);
        }
    }

    #[tokio::test]
    async fn background_sweeper_evicts_idle_sessions() {
        let manager = SessionManager::new(Duration::from_millis(20));
        let session = manager.resolve(None);

        let handle = manager.spawn_sweeper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.abort();

        assert!(manager.get(&session.id).is_none());
    }

    #[test]
    fn list_orders_by_recent_activity() {
        let manager = manager();
        let now = Utc::now();
        let older = manager.resolve_at(None, now - chrono::Duration::minutes(5));
        let newer = manager.resolve_at(None, now);

        let ids: Vec<String> = manager.list().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }
}
