// ⏱️ Resolution Session - Last request wins
//
// One interactive user, one session. Every new request supersedes the
// previous one: a result that finishes late must never overwrite a fresher one.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::resolver::Resolution;

/// Handle for one in-flight request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket {
    generation: u64,
}

#[derive(Clone, Default)]
pub struct ResolutionSession {
    generation: Arc<AtomicU64>,
    latest: Arc<Mutex<Option<Resolution>>>,
}

impl ResolutionSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a request; every earlier ticket becomes stale
    pub fn begin(&self) -> RequestTicket {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        RequestTicket { generation }
    }

    /// False once a newer request has begun
    pub fn is_current(&self, ticket: &RequestTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.generation
    }

    /// Store the result if the ticket is still current
    ///
    /// Returns false (and drops the result) for stale tickets.
    pub fn complete(&self, ticket: RequestTicket, resolution: Resolution) -> bool {
        let Ok(mut latest) = self.latest.lock() else {
            return false;
        };

        if !self.is_current(&ticket) {
            return false;
        }

        *latest = Some(resolution);
        true
    }

    /// Most recent committed result
    pub fn latest(&self) -> Option<Resolution> {
        self.latest
            .lock()
            .ok()
            .and_then(|latest| latest.clone())
    }
}

// ============================================================================
// SESSION REGISTRY
// ============================================================================

struct TrackedSession {
    session: ResolutionSession,
    last_seen: Instant,
}

/// Sessions keyed by caller-supplied id
///
/// Bounded two ways: sessions idle longer than `idle_ttl` are evicted, and
/// when `max_sessions` is reached the least recently seen one makes room.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, TrackedSession>>,
    idle_ttl: Duration,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(idle_ttl: Duration, max_sessions: usize) -> Self {
        SessionRegistry {
            sessions: Mutex::new(HashMap::new()),
            idle_ttl,
            max_sessions: max_sessions.max(1),
        }
    }

    /// Session for `id`, created on first use
    pub fn session(&self, id: &str) -> Result<ResolutionSession> {
        self.session_at(id, Instant::now())
    }

    fn session_at(&self, id: &str, now: Instant) -> Result<ResolutionSession> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| anyhow!("session registry lock poisoned"))?;

        if let Some(tracked) = sessions.get_mut(id) {
            tracked.last_seen = now;
            return Ok(tracked.session.clone());
        }

        evict_idle_sessions(&mut sessions, now, self.idle_ttl);

        if sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, tracked)| tracked.last_seen)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                sessions.remove(&oldest);
            }
        }

        let session = ResolutionSession::new();
        sessions.insert(
            id.to_string(),
            TrackedSession {
                session: session.clone(),
                last_seen: now,
            },
        );
        Ok(session)
    }

    /// Drop every session idle past the TTL, returning how many went
    pub fn evict_idle(&self) -> Result<usize> {
        self.evict_idle_at(Instant::now())
    }

    fn evict_idle_at(&self, now: Instant) -> Result<usize> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| anyhow!("session registry lock poisoned"))?;
        Ok(evict_idle_sessions(&mut sessions, now, self.idle_ttl))
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn evict_idle_sessions(
    sessions: &mut HashMap<String, TrackedSession>,
    now: Instant,
    idle_ttl: Duration,
) -> usize {
    let before = sessions.len();
    sessions.retain(|_, tracked| now.saturating_duration_since(tracked.last_seen) <= idle_ttl);
    before - sessions.len()
}
