//! Live conversation sessions keyed by (chat, user, family).
//!
//! At most one session per key: starting a new one replaces the old one and aborts its timer.
//! Each session instance has its own id so a late timer or a slow handler never touches a newer
//! session that replaced it.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::AbortHandle;

use crate::conversation::{Family, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub chat_id: i64,
    pub user_id: i64,
    pub family: Family,
}

impl SessionKey {
    pub fn new(chat_id: i64, user_id: i64, family: Family) -> Self {
        Self {
            chat_id,
            user_id,
            family,
        }
    }
}

/// Unique id of one session instance.
pub type SessionId = String;

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub key: SessionKey,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    /// When the current state times out, if it does.
    pub expires_at: Option<DateTime<Utc>>,
}

struct Entry {
    session: Session,
    timer: Option<AbortHandle>,
}

impl Entry {
    fn cancel_timer(&mut self) {
        if let Some(t) = self.timer.take() {
            t.abort();
        }
    }
}

type Table = Arc<RwLock<HashMap<SessionKey, Entry>>>;

/// Session table shared by the dispatcher tasks.
#[derive(Clone)]
pub struct SessionStore {
    inner: Table,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start a new session for `key`, replacing any existing one. Returns the new session id.
    pub async fn start(&self, key: SessionKey, state: SessionState) -> SessionId {
        let id = uuid::Uuid::new_v4().to_string();
        let mut g = self.inner.write().await;
        if let Some(mut old) = g.remove(&key) {
            old.cancel_timer();
            log::debug!("session {} replaced by {} for {:?}", old.session.id, id, key);
        }
        let (expires_at, timer) = self.arm_timer(&key, &id, &state);
        g.insert(
            key,
            Entry {
                session: Session {
                    id: id.clone(),
                    key,
                    state,
                    created_at: Utc::now(),
                    expires_at,
                },
                timer,
            },
        );
        id
    }

    /// Move session `id` to `state`, restarting its timer. False if `id` is no longer live.
    pub async fn advance(&self, key: &SessionKey, id: &str, state: SessionState) -> bool {
        let mut g = self.inner.write().await;
        let Some(entry) = g.get_mut(key).filter(|e| e.session.id == id) else {
            return false;
        };
        entry.cancel_timer();
        let (expires_at, timer) = self.arm_timer(key, id, &state);
        entry.session.state = state;
        entry.session.expires_at = expires_at;
        entry.timer = timer;
        true
    }

    /// Remove session `id` if it is still the live one for `key`.
    pub async fn finish(&self, key: &SessionKey, id: &str) -> bool {
        let mut g = self.inner.write().await;
        if g.get(key).is_some_and(|e| e.session.id == id) {
            if let Some(mut entry) = g.remove(key) {
                entry.cancel_timer();
            }
            true
        } else {
            false
        }
    }

    pub async fn get(&self, key: &SessionKey) -> Option<Session> {
        let g = self.inner.read().await;
        g.get(key).map(|e| e.session.clone())
    }

    /// Remove whatever session `key` has.
    pub async fn discard(&self, key: &SessionKey) -> Option<Session> {
        let mut g = self.inner.write().await;
        g.remove(key).map(|mut e| {
            e.cancel_timer();
            e.session
        })
    }

    /// Remove every session of one user in one chat. Returns them in family order.
    pub async fn discard_user(&self, chat_id: i64, user_id: i64) -> Vec<Session> {
        let mut g = self.inner.write().await;
        let mut removed = Vec::new();
        for family in Family::ALL {
            if let Some(mut e) = g.remove(&SessionKey::new(chat_id, user_id, family)) {
                e.cancel_timer();
                removed.push(e.session);
            }
        }
        removed
    }

    /// Live sessions of one user in one chat, in family order.
    pub async fn live_for(&self, chat_id: i64, user_id: i64) -> Vec<Session> {
        let g = self.inner.read().await;
        Family::ALL
            .iter()
            .filter_map(|f| g.get(&SessionKey::new(chat_id, user_id, *f)))
            .map(|e| e.session.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Spawn the timeout task for `state`, if it has one. The task only removes instance `id`.
    fn arm_timer(
        &self,
        key: &SessionKey,
        id: &str,
        state: &SessionState,
    ) -> (Option<DateTime<Utc>>, Option<AbortHandle>) {
        let Some(timeout) = state.timeout() else {
            return (None, None);
        };
        let expires_at = chrono::Duration::from_std(timeout)
            .ok()
            .map(|d| Utc::now() + d);
        let inner = Arc::clone(&self.inner);
        let key = *key;
        let id = id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut g = inner.write().await;
            if g.get(&key).is_some_and(|e| e.session.id == id) {
                g.remove(&key);
                log::info!("session {} ({}) timed out", id, key.family.name());
            }
        });
        (expires_at, Some(handle.abort_handle()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{morning, subway, summarize};
    use std::time::Duration;

    fn morning_state() -> SessionState {
        SessionState::Morning(morning::State::AwaitLocationShare {
            choice: morning::MorningChoice::Current,
        })
    }

    #[tokio::test]
    async fn start_replaces_existing_session() {
        let store = SessionStore::new();
        let key = SessionKey::new(1, 2, Family::Subway);
        let first = store
            .start(key, SessionState::Subway(subway::State::AwaitStationName))
            .await;
        let second = store
            .start(key, SessionState::Subway(subway::State::AwaitStationName))
            .await;
        assert_ne!(first, second);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(&key).await.unwrap().id, second);
        // the replaced instance can no longer be advanced or finished
        assert!(
            !store
                .advance(&key, &first, SessionState::Subway(subway::State::AwaitStationName))
                .await
        );
        assert!(!store.finish(&key, &first).await);
        assert!(store.finish(&key, &second).await);
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_discards_session() {
        let store = SessionStore::new();
        let key = SessionKey::new(1, 1, Family::MorningWeather);
        store.start(key, morning_state()).await;
        assert!(store.get(&key).await.unwrap().expires_at.is_some());
        tokio::time::sleep(Duration::from_secs(599)).await;
        assert!(store.get(&key).await.is_some());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(store.get(&key).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn old_timer_never_removes_newer_session() {
        let store = SessionStore::new();
        let key = SessionKey::new(1, 1, Family::MorningWeather);
        store.start(key, morning_state()).await;
        tokio::time::sleep(Duration::from_secs(300)).await;
        let newer = store.start(key, morning_state()).await;
        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(store.get(&key).await.unwrap().id, newer);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(store.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn discard_user_removes_all_families() {
        let store = SessionStore::new();
        store
            .start(
                SessionKey::new(1, 1, Family::Summarize),
                SessionState::Summarize(summarize::State::AwaitUrl),
            )
            .await;
        store
            .start(
                SessionKey::new(1, 1, Family::Subway),
                SessionState::Subway(subway::State::AwaitStationName),
            )
            .await;
        store
            .start(
                SessionKey::new(1, 9, Family::Subway),
                SessionState::Subway(subway::State::AwaitStationName),
            )
            .await;
        let removed = store.discard_user(1, 1).await;
        assert_eq!(
            removed.iter().map(|s| s.key.family).collect::<Vec<_>>(),
            vec![Family::Subway, Family::Summarize]
        );
        assert_eq!(store.len().await, 1);
        assert!(store.live_for(1, 1).await.is_empty());
    }
}
