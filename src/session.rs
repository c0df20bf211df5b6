//! Session continuity: token/cookie state shared across calls.
//!
//! One [`SessionStore`] is owned by one client instance — never global, never
//! implicitly shared between instances. The store hands out immutable
//! [`SessionSnapshot`]s for outgoing envelopes and merges rotated identifiers
//! back in from responses.
//!
//! The lock is held only for the snapshot/merge itself, never across network
//! I/O, so unrelated concurrent calls do not contend beyond a few loads and
//! stores.

use rand::Rng;
use std::sync::Mutex;
use tracing::debug;

/// One cookie as harvested from a `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Render cookies as a `Cookie:` request header value.
pub(crate) fn cookie_header(cookies: &[Cookie]) -> String {
    cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Mutable session bookkeeping for one client instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// 63-bit session identifier, minted on first use.
    pub uuid: Option<u64>,
    /// Increments once per request within the session.
    pub sequence_id: u64,
    /// Increments once per new image payload.
    pub image_sequence_id: u64,
    /// Server-issued session id from the last response, if any.
    pub server_session_id: Option<String>,
    /// Opaque routing token replayed on subsequent requests.
    pub routing_token: Option<Vec<u8>>,
    /// Cookie jar, updated from each response.
    pub cookies: Vec<Cookie>,
}

/// Immutable view of the session applied to one outgoing envelope.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub uuid: u64,
    pub sequence_id: u64,
    pub image_sequence_id: u64,
    pub routing_token: Option<Vec<u8>>,
    pub cookies: Vec<Cookie>,
}

/// Identifiers and cookies harvested from one response, to be merged into
/// the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseMetadata {
    pub server_session_id: Option<String>,
    pub routing_token: Option<Vec<u8>>,
    pub cookies: Vec<Cookie>,
}

/// Lock-protected session state owned by a client instance.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: Mutex<SessionState>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all session state. The next snapshot starts a fresh session
    /// with a newly minted uuid and sequence counters at one.
    pub fn reset(&self) {
        let mut state = self.inner.lock().expect("session lock poisoned");
        *state = SessionState::default();
        debug!("Session reset to empty state");
    }

    /// Take a snapshot for an outgoing envelope, advancing the sequence
    /// counters under the lock.
    ///
    /// `new_image` marks that this request carries a payload the session has
    /// not seen before, advancing the image sequence counter as well.
    pub fn snapshot(&self, new_image: bool) -> SessionSnapshot {
        let mut state = self.inner.lock().expect("session lock poisoned");
        let uuid = *state
            .uuid
            .get_or_insert_with(|| rand::thread_rng().gen_range(0..(1u64 << 63)));
        state.sequence_id += 1;
        if new_image {
            state.image_sequence_id += 1;
        }
        debug!(
            uuid,
            sequence_id = state.sequence_id,
            image_sequence_id = state.image_sequence_id,
            "Session snapshot taken"
        );
        SessionSnapshot {
            uuid,
            sequence_id: state.sequence_id,
            image_sequence_id: state.image_sequence_id,
            routing_token: state.routing_token.clone(),
            cookies: state.cookies.clone(),
        }
    }

    /// Atomically merge rotated identifiers and cookies from a response.
    ///
    /// `None` fields leave existing state untouched; a cookie replaces any
    /// stored cookie of the same name.
    pub fn update(&self, meta: &ResponseMetadata) {
        let mut state = self.inner.lock().expect("session lock poisoned");
        if let Some(ref id) = meta.server_session_id {
            if state.server_session_id.as_deref() != Some(id) {
                debug!(server_session_id = %id, "Server session id rotated");
            }
            state.server_session_id = Some(id.clone());
        }
        if let Some(ref token) = meta.routing_token {
            state.routing_token = Some(token.clone());
        }
        for cookie in &meta.cookies {
            match state.cookies.iter_mut().find(|c| c.name == cookie.name) {
                Some(existing) => existing.value = cookie.value.clone(),
                None => state.cookies.push(cookie.clone()),
            }
        }
    }

    /// Current state, cloned. Intended for inspection and tests.
    pub fn state(&self) -> SessionState {
        self.inner.lock().expect("session lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_mints_uuid_once_and_advances_counters() {
        let store = SessionStore::new();
        let a = store.snapshot(true);
        let b = store.snapshot(false);
        let c = store.snapshot(true);

        assert_eq!(a.uuid, b.uuid);
        assert_eq!(b.uuid, c.uuid);
        assert!(a.uuid < (1u64 << 63));
        assert_eq!((a.sequence_id, a.image_sequence_id), (1, 1));
        assert_eq!((b.sequence_id, b.image_sequence_id), (2, 1));
        assert_eq!((c.sequence_id, c.image_sequence_id), (3, 2));
    }

    #[test]
    fn reset_starts_a_fresh_session() {
        let store = SessionStore::new();
        let before = store.snapshot(true);
        store.update(&ResponseMetadata {
            server_session_id: Some("s1".into()),
            routing_token: Some(vec![1, 2, 3]),
            cookies: vec![Cookie::new("NID", "abc")],
        });
        store.reset();

        let state = store.state();
        assert_eq!(state, SessionState::default());

        let after = store.snapshot(true);
        assert_eq!(after.sequence_id, 1);
        // Overwhelmingly likely; a collision would mean the rng minted the
        // same 63-bit value twice.
        assert_ne!(before.uuid, after.uuid);
    }

    #[test]
    fn update_replaces_cookies_by_name_and_keeps_others() {
        let store = SessionStore::new();
        store.update(&ResponseMetadata {
            cookies: vec![Cookie::new("NID", "v1"), Cookie::new("AEC", "x")],
            ..Default::default()
        });
        store.update(&ResponseMetadata {
            cookies: vec![Cookie::new("NID", "v2")],
            ..Default::default()
        });

        let state = store.state();
        assert_eq!(
            state.cookies,
            vec![Cookie::new("NID", "v2"), Cookie::new("AEC", "x")]
        );
    }

    #[test]
    fn update_with_empty_metadata_is_a_no_op() {
        let store = SessionStore::new();
        store.update(&ResponseMetadata {
            server_session_id: Some("s1".into()),
            ..Default::default()
        });
        store.update(&ResponseMetadata::default());
        assert_eq!(store.state().server_session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn snapshot_carries_routing_token_and_cookies() {
        let store = SessionStore::new();
        store.update(&ResponseMetadata {
            routing_token: Some(vec![9, 9]),
            cookies: vec![Cookie::new("NID", "abc")],
            ..Default::default()
        });
        let snap = store.snapshot(true);
        assert_eq!(snap.routing_token.as_deref(), Some(&[9u8, 9][..]));
        assert_eq!(cookie_header(&snap.cookies), "NID=abc");
    }
}
