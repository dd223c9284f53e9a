//! Bounded pool of browser-driven automation sessions
//!
//! One bucket per purpose, each capped independently. A session serves one
//! lease at a time; error outcomes and the rotation ceiling dispose it, and the
//! next lease lazily opens a replacement with a fresh identity profile.

use shared::{component_debug, component_info, component_warn, Component, SessionId, SessionPoolSnapshot, SessionPurpose, SessionState};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::config::SessionPoolConfig;
use crate::error::{AdapterError, OrchestratorError, OrchestratorResult};
use crate::traits::{ProfileGenerator, SessionBackend, SessionHandle};

const PURPOSES: [SessionPurpose; 3] = [SessionPurpose::Fetch, SessionPurpose::Detect, SessionPurpose::Publish];

/// How a leased session's operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Ok,
    Error,
}

#[derive(Debug)]
struct PooledSession {
    handle: SessionHandle,
    state: SessionState,
    created_at: Instant,
    last_used_at: Instant,
    ops_since_rotation: u32,
}

#[derive(Debug)]
struct PurposeBucket {
    capacity: usize,
    idle: VecDeque<PooledSession>,
    leased: usize,
    /// Slots reserved for sessions whose backend `open` is still running
    opening: usize,
    created_total: u64,
    disposed_total: u64,
}

impl PurposeBucket {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            idle: VecDeque::new(),
            leased: 0,
            opening: 0,
            created_total: 0,
            disposed_total: 0,
        }
    }

    fn open(&self) -> usize {
        self.idle.len() + self.leased + self.opening
    }
}

enum Claim {
    Reused(PooledSession),
    Create,
    Wait,
}

/// Capacity held for a session whose backend `open` has not returned
///
/// Dropping it, including when the leasing future is abandoned mid-open,
/// hands the slot back and wakes waiters.
struct OpeningReservation<'a> {
    pool: &'a SessionPool,
    purpose: SessionPurpose,
    armed: bool,
}

impl OpeningReservation<'_> {
    /// Turn the reserved slot into a leased session
    fn into_leased(mut self) -> OrchestratorResult<()> {
        let mut buckets = self.pool.lock();
        let Some(bucket) = buckets.get_mut(&self.purpose) else {
            return Err(OrchestratorError::Session {
                message: format!("no bucket for {}", self.purpose),
            });
        };
        bucket.opening = bucket.opening.saturating_sub(1);
        bucket.leased += 1;
        bucket.created_total += 1;
        self.armed = false;
        Ok(())
    }
}

impl Drop for OpeningReservation<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(bucket) = self.pool.lock().get_mut(&self.purpose) {
            bucket.opening = bucket.opening.saturating_sub(1);
        }
        self.pool.freed.notify_waiters();
    }
}

pub struct SessionPool {
    buckets: Mutex<HashMap<SessionPurpose, PurposeBucket>>,
    backend: Arc<dyn SessionBackend>,
    profiles: Arc<dyn ProfileGenerator>,
    max_ops_per_session: u32,
    idle_ttl: Duration,
    freed: Notify,
}

impl SessionPool {
    pub fn new(config: &SessionPoolConfig, backend: Arc<dyn SessionBackend>, profiles: Arc<dyn ProfileGenerator>) -> Self {
        let buckets = PURPOSES
            .into_iter()
            .map(|purpose| (purpose, PurposeBucket::new(config.capacity(purpose))))
            .collect();
        Self {
            buckets: Mutex::new(buckets),
            backend,
            profiles,
            max_ops_per_session: config.max_ops_per_session,
            idle_ttl: config.idle_ttl(),
            freed: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionPurpose, PurposeBucket>> {
        self.buckets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn claim(&self, purpose: SessionPurpose) -> Claim {
        let mut buckets = self.lock();
        let Some(bucket) = buckets.get_mut(&purpose) else {
            return Claim::Wait;
        };
        // Most recently used first keeps warm sessions busy and lets cold ones age out
        if let Some(mut session) = bucket.idle.pop_back() {
            session.state = SessionState::Active;
            bucket.leased += 1;
            return Claim::Reused(session);
        }
        if bucket.open() < bucket.capacity {
            bucket.opening += 1;
            return Claim::Create;
        }
        Claim::Wait
    }

    /// Lease a session for `purpose`, waiting up to `timeout` for capacity
    pub async fn lease(self: &Arc<Self>, purpose: SessionPurpose, timeout: Duration) -> OrchestratorResult<SessionLease> {
        let started = Instant::now();
        let deadline = started + timeout;
        loop {
            let notified = self.freed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.claim(purpose) {
                Claim::Reused(session) => {
                    component_debug!(Component::SessionPool, session = %session.handle.id, purpose = %purpose, "Reusing idle session");
                    return Ok(SessionLease::new(Arc::clone(self), session));
                }
                Claim::Create => return self.create(purpose, deadline).await,
                Claim::Wait => {
                    if Instant::now() >= deadline {
                        return Err(OrchestratorError::PoolExhausted {
                            purpose,
                            waited: started.elapsed(),
                        });
                    }
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
            }
        }
    }

    async fn create(self: &Arc<Self>, purpose: SessionPurpose, deadline: Instant) -> OrchestratorResult<SessionLease> {
        let handle = SessionHandle {
            id: SessionId::new(),
            purpose,
            profile: self.profiles.generate(purpose),
        };
        let reservation = OpeningReservation {
            pool: self,
            purpose,
            armed: true,
        };
        let opening_started = Instant::now();
        let opened = match tokio::time::timeout_at(deadline, self.backend.open(&handle)).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout(opening_started.elapsed())),
        };

        if let Err(err) = opened {
            drop(reservation);
            return Err(OrchestratorError::Session {
                message: format!("failed to open {purpose} session: {err}"),
            });
        }
        reservation.into_leased()?;
        component_info!(
            Component::SessionPool,
            session = %handle.id,
            purpose = %purpose,
            profile = %handle.profile.id,
            "🆕 Opened session"
        );
        let now = Instant::now();
        Ok(SessionLease::new(
            Arc::clone(self),
            PooledSession {
                handle,
                state: SessionState::Active,
                created_at: now,
                last_used_at: now,
                ops_since_rotation: 0,
            },
        ))
    }

    fn give_back(&self, mut session: PooledSession, outcome: SessionOutcome) {
        session.ops_since_rotation += 1;
        session.last_used_at = Instant::now();
        let rotate = session.ops_since_rotation >= self.max_ops_per_session;

        let mut disposed = None;
        {
            let mut buckets = self.lock();
            if let Some(bucket) = buckets.get_mut(&session.handle.purpose) {
                bucket.leased = bucket.leased.saturating_sub(1);
                if outcome == SessionOutcome::Error || rotate {
                    bucket.disposed_total += 1;
                    session.state = if outcome == SessionOutcome::Error {
                        SessionState::Error
                    } else {
                        SessionState::Closed
                    };
                    disposed = Some(session);
                } else {
                    session.state = SessionState::Idle;
                    bucket.idle.push_back(session);
                }
            }
        }

        if let Some(session) = disposed {
            component_info!(
                Component::SessionPool,
                session = %session.handle.id,
                state = ?session.state,
                ops = session.ops_since_rotation,
                age_secs = session.created_at.elapsed().as_secs(),
                "♻️ Disposing session"
            );
            self.close_in_background(vec![session.handle]);
        }
        self.freed.notify_waiters();
    }

    fn close_in_background(&self, handles: Vec<SessionHandle>) {
        if handles.is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let backend = Arc::clone(&self.backend);
        runtime.spawn(async move {
            for handle in handles {
                if let Err(err) = backend.close(&handle).await {
                    component_warn!(Component::SessionPool, session = %handle.id, "Failed to close session: {}", err);
                }
            }
        });
    }

    /// Close idle sessions unused for longer than the TTL
    pub fn reap_idle(&self) -> usize {
        let now = Instant::now();
        let mut expired = Vec::new();
        {
            let mut buckets = self.lock();
            for bucket in buckets.values_mut() {
                let before = bucket.idle.len();
                let ttl = self.idle_ttl;
                let (stale, fresh): (VecDeque<_>, VecDeque<_>) = bucket
                    .idle
                    .drain(..)
                    .partition(|session| now.duration_since(session.last_used_at) >= ttl);
                bucket.idle = fresh;
                bucket.disposed_total += (before - bucket.idle.len()) as u64;
                expired.extend(stale.into_iter().map(|session| session.handle));
            }
        }

        let count = expired.len();
        if count > 0 {
            component_info!(Component::SessionPool, count = count, "🧹 Reaped idle sessions");
            self.close_in_background(expired);
            self.freed.notify_waiters();
        }
        count
    }

    /// Close every idle session and wait for the backend to confirm
    pub async fn close_idle(&self) -> usize {
        let handles: Vec<SessionHandle> = {
            let mut buckets = self.lock();
            buckets
                .values_mut()
                .flat_map(|bucket| {
                    bucket.disposed_total += bucket.idle.len() as u64;
                    bucket.idle.drain(..).map(|session| session.handle).collect::<Vec<_>>()
                })
                .collect()
        };
        for handle in &handles {
            if let Err(err) = self.backend.close(handle).await {
                component_warn!(Component::SessionPool, session = %handle.id, "Failed to close session: {}", err);
            }
        }
        handles.len()
    }

    pub fn snapshot(&self) -> Vec<SessionPoolSnapshot> {
        let buckets = self.lock();
        PURPOSES
            .iter()
            .filter_map(|purpose| {
                buckets.get(purpose).map(|bucket| SessionPoolSnapshot {
                    purpose: *purpose,
                    capacity: bucket.capacity,
                    open: bucket.open(),
                    leased: bucket.leased,
                    idle: bucket.idle.len(),
                    created_total: bucket.created_total,
                    disposed_total: bucket.disposed_total,
                })
            })
            .collect()
    }
}

/// Exclusive use of one session; dropping without `release` reports an error
pub struct SessionLease {
    pool: Arc<SessionPool>,
    handle: SessionHandle,
    session: Option<PooledSession>,
}

impl SessionLease {
    fn new(pool: Arc<SessionPool>, session: PooledSession) -> Self {
        Self {
            pool,
            handle: session.handle.clone(),
            session: Some(session),
        }
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn ops_since_rotation(&self) -> u32 {
        self.session.as_ref().map_or(0, |session| session.ops_since_rotation)
    }

    pub fn release(mut self, outcome: SessionOutcome) {
        if let Some(session) = self.session.take() {
            self.pool.give_back(session, outcome);
        }
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.give_back(session, SessionOutcome::Error);
        }
    }
}
