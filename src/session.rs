//! In-memory session store with sliding expiry.
//!
//! Sessions are ordered JSON objects identified by a 32-character
//! alphanumeric id and expire twenty minutes after their last access,
//! where access means lookup or creation. A single mutex guards five
//! indices that must always agree: id to slot, slot to id, slot to
//! session data, slot to deadline, and an ordered (deadline, slot) queue
//! that drives lazy eviction. Expired entries are reaped at the start of
//! every store operation, so no background task is needed.

use crate::params::ID_CHARS;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::DerefMut;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::trace;

/// Cookie name carrying the session id.
pub const SESSION_NAME: &str = "bsessionid";

/// Sessions expire this long after their last access.
pub const SESSION_TTL: Duration = Duration::from_secs(20 * 60);

const SESSION_ID_LEN: usize = 32;

/// Session payload: an ordered mapping from string keys to JSON values.
pub type SessionData = serde_json::Map<String, Value>;

/// Cheap-to-clone handle to one session's data.
///
/// The lock is coroutine-aware; guards may be held across suspension
/// points, though handlers normally keep critical sections short.
#[derive(Clone)]
pub struct Session {
    data: Arc<may::sync::Mutex<SessionData>>,
}

impl Session {
    fn new() -> Self {
        Session {
            data: Arc::new(may::sync::Mutex::new(SessionData::new())),
        }
    }

    /// Lock the session data for reading or writing.
    pub fn lock(&self) -> impl DerefMut<Target = SessionData> + '_ {
        self.data.lock().unwrap()
    }
}

struct StoreState {
    rng: StdRng,
    id_to_slot: BTreeMap<String, u64>,
    slot_to_id: BTreeMap<u64, String>,
    sessions: BTreeMap<u64, Session>,
    expiry: BTreeMap<u64, Instant>,
    queue: BTreeSet<(Instant, u64)>,
}

/// Thread-safe session store; see the module docs for the index layout.
pub struct SessionStore {
    state: Mutex<StoreState>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_ttl(SESSION_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        SessionStore {
            state: Mutex::new(StoreState {
                rng: StdRng::from_entropy(),
                id_to_slot: BTreeMap::new(),
                slot_to_id: BTreeMap::new(),
                sessions: BTreeMap::new(),
                expiry: BTreeMap::new(),
                queue: BTreeSet::new(),
            }),
            ttl,
        }
    }

    /// Look up `key`, creating a fresh session if it is empty or unknown.
    ///
    /// Returns the session and whether it was created. On creation the new
    /// id is written back through `key`. Either way the session's deadline
    /// is pushed out by the TTL.
    pub fn get_or_create(&self, key: &mut String) -> (Session, bool) {
        self.get_or_create_at(key, Instant::now())
    }

    /// Look up an existing session, refreshing its deadline on a hit.
    pub fn try_get(&self, key: &str) -> Option<Session> {
        self.try_get_at(key, Instant::now())
    }

    /// Number of live sessions (after a lazy-eviction pass).
    pub fn len(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        Self::evict_expired(&mut state, Instant::now());
        state.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_or_create_at(&self, key: &mut String, now: Instant) -> (Session, bool) {
        let mut state = self.state.lock().unwrap();
        Self::evict_expired(&mut state, now);

        let mut created = false;
        let slot;
        if key.is_empty() || !state.id_to_slot.contains_key(key.as_str()) {
            loop {
                *key = Self::random_id(&mut state.rng);
                if !state.id_to_slot.contains_key(key.as_str()) {
                    break;
                }
            }
            loop {
                let candidate = state.rng.gen::<u64>();
                if !state.slot_to_id.contains_key(&candidate) {
                    slot = candidate;
                    break;
                }
            }
            state.id_to_slot.insert(key.clone(), slot);
            state.slot_to_id.insert(slot, key.clone());
            state.sessions.insert(slot, Session::new());
            created = true;
            trace!(session_id = %key, "session created");
        } else {
            slot = state.id_to_slot[key.as_str()];
            let deadline = state.expiry[&slot];
            state.queue.remove(&(deadline, slot));
        }
        let deadline = now + self.ttl;
        state.expiry.insert(slot, deadline);
        state.queue.insert((deadline, slot));
        (state.sessions[&slot].clone(), created)
    }

    fn try_get_at(&self, key: &str, now: Instant) -> Option<Session> {
        let mut state = self.state.lock().unwrap();
        Self::evict_expired(&mut state, now);

        if key.is_empty() {
            return None;
        }
        let slot = *state.id_to_slot.get(key)?;
        let deadline = state.expiry[&slot];
        state.queue.remove(&(deadline, slot));
        let deadline = now + self.ttl;
        state.expiry.insert(slot, deadline);
        state.queue.insert((deadline, slot));
        Some(state.sessions[&slot].clone())
    }

    fn evict_expired(state: &mut StoreState, now: Instant) {
        while let Some(&(deadline, slot)) = state.queue.iter().next() {
            if deadline >= now {
                break;
            }
            state.queue.remove(&(deadline, slot));
            state.sessions.remove(&slot);
            state.expiry.remove(&slot);
            if let Some(id) = state.slot_to_id.remove(&slot) {
                state.id_to_slot.remove(&id);
            }
            trace!(slot, "session expired");
        }
    }

    fn random_id(rng: &mut StdRng) -> String {
        (0..SESSION_ID_LEN)
            .map(|_| ID_CHARS[rng.gen_range(0..ID_CHARS.len())] as char)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_consistent(store: &SessionStore) {
        let state = store.state.lock().unwrap();
        let n = state.sessions.len();
        assert_eq!(state.id_to_slot.len(), n);
        assert_eq!(state.slot_to_id.len(), n);
        assert_eq!(state.expiry.len(), n);
        assert_eq!(state.queue.len(), n);
        for (id, slot) in &state.id_to_slot {
            assert_eq!(state.slot_to_id.get(slot), Some(id));
            assert!(state.sessions.contains_key(slot));
            let deadline = state.expiry.get(slot).copied().expect("expiry entry");
            assert!(state.queue.contains(&(deadline, *slot)));
        }
    }

    #[test]
    fn creates_with_fresh_id() {
        let store = SessionStore::new();
        let mut key = String::new();
        let (session, created) = store.get_or_create(&mut key);
        assert!(created);
        assert_eq!(key.len(), 32);
        assert!(key.bytes().all(|b| b.is_ascii_alphanumeric()));
        session.lock().insert("n".into(), Value::from(1));
        assert_consistent(&store);
    }

    #[test]
    fn unknown_key_is_replaced() {
        let store = SessionStore::new();
        let mut key = "nosuchsessionnosuchsessionnosuch".to_string();
        let (_, created) = store.get_or_create(&mut key);
        assert!(created);
        assert_ne!(key, "nosuchsessionnosuchsessionnosuch");
        assert_consistent(&store);
    }

    #[test]
    fn existing_key_returns_same_session() {
        let store = SessionStore::new();
        let mut key = String::new();
        let (first, _) = store.get_or_create(&mut key);
        first.lock().insert("who".into(), Value::from("alice"));

        let mut same = key.clone();
        let (second, created) = store.get_or_create(&mut same);
        assert!(!created);
        assert_eq!(same, key);
        assert_eq!(second.lock().get("who"), Some(&Value::from("alice")));

        let third = store.try_get(&key).expect("live session");
        assert_eq!(third.lock().get("who"), Some(&Value::from("alice")));
        assert_consistent(&store);
    }

    #[test]
    fn try_get_misses_unknown_and_empty() {
        let store = SessionStore::new();
        assert!(store.try_get("").is_none());
        assert!(store.try_get("doesnotexistdoesnotexistdoesnot1").is_none());
    }

    #[test]
    fn expires_after_ttl() {
        let store = SessionStore::new();
        let t0 = Instant::now();
        let mut key = String::new();
        let (_, created) = store.get_or_create_at(&mut key, t0);
        assert!(created);

        // One second short of the deadline: still live, deadline refreshed.
        let t1 = t0 + SESSION_TTL - Duration::from_secs(1);
        assert!(store.try_get_at(&key, t1).is_some());

        // Just past the refreshed deadline: evicted, a new id is issued.
        let t2 = t1 + SESSION_TTL + Duration::from_secs(1);
        assert!(store.try_get_at(&key, t2).is_none());
        let mut stale = key.clone();
        let (_, created) = store.get_or_create_at(&mut stale, t2);
        assert!(created);
        assert_ne!(stale, key);
        assert_consistent(&store);
    }

    #[test]
    fn refresh_extends_the_window() {
        let store = SessionStore::new();
        let t0 = Instant::now();
        let mut key = String::new();
        store.get_or_create_at(&mut key, t0);

        // Touch the session every 15 minutes; it must survive well past
        // the absolute TTL measured from creation.
        let mut now = t0;
        for _ in 0..4 {
            now += Duration::from_secs(15 * 60);
            assert!(store.try_get_at(&key, now).is_some());
        }
        assert_consistent(&store);
    }

    #[test]
    fn eviction_only_reaps_expired() {
        let store = SessionStore::new();
        let t0 = Instant::now();
        let mut old = String::new();
        store.get_or_create_at(&mut old, t0);

        let t1 = t0 + Duration::from_secs(19 * 60);
        let mut young = String::new();
        store.get_or_create_at(&mut young, t1);

        // `old` lapses, `young` survives.
        let t2 = t0 + SESSION_TTL + Duration::from_secs(1);
        assert!(store.try_get_at(&old, t2).is_none());
        assert!(store.try_get_at(&young, t2).is_some());
        assert_consistent(&store);
    }

    #[test]
    fn indices_agree_after_mixed_operations() {
        let store = SessionStore::new();
        let t0 = Instant::now();
        let mut keys = Vec::new();
        for _ in 0..16 {
            let mut key = String::new();
            store.get_or_create_at(&mut key, t0);
            keys.push(key);
        }
        // Refresh half of them later, then advance past the stale half's
        // deadline.
        let t1 = t0 + Duration::from_secs(10 * 60);
        for key in keys.iter().step_by(2) {
            assert!(store.try_get_at(key, t1).is_some());
        }
        let t2 = t0 + SESSION_TTL + Duration::from_secs(1);
        let mut probe = String::new();
        store.get_or_create_at(&mut probe, t2);
        assert_consistent(&store);
        for (i, key) in keys.iter().enumerate() {
            let live = store.try_get_at(key, t2).is_some();
            assert_eq!(live, i % 2 == 0, "session {i}");
        }
        assert_consistent(&store);
    }
}
