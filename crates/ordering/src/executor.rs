//! Sequential executor
//!
//! Per (session, stage) ordering gate. `execute(session, index, stage, fn)`
//! guarantees bodies run one at a time in non-decreasing index order, however
//! the callers interleave. State for a pair is created on first use and
//! deleted once nothing is queued or outstanding, so ended sessions cost
//! nothing.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use babel_edge_config::ExecutorConfig;

use crate::OrderingError;

type StageKey = (String, String);

/// Utterance streams index from 0 or 1. A fresh stage therefore expects at
/// most index 1 first; a higher first arrival waits for its predecessors (or
/// for the gap timeout, if they were filtered upstream).
const FIRST_EXPECTED_INDEX: u64 = 1;

/// Per-(session, stage) ordering gate keyed by utterance index.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct SequentialExecutor {
    inner: Arc<Inner>,
}

struct Inner {
    gap_timeout: Duration,
    states: Mutex<HashMap<StageKey, StageState>>,
}

struct StageState {
    /// The index whose body may run next.
    next_expected: u64,
    /// Whether a body is currently running.
    running: bool,
    /// Calls submitted and not yet finished (running or suspended).
    outstanding: usize,
    /// Suspended submissions that arrived ahead of their turn.
    pending: HashMap<u64, oneshot::Sender<()>>,
}

impl StageState {
    fn starting_at(first_index: u64) -> Self {
        Self {
            next_expected: first_index.min(FIRST_EXPECTED_INDEX),
            running: false,
            outstanding: 0,
            pending: HashMap::new(),
        }
    }
}

enum Turn {
    Run,
    Wait(oneshot::Receiver<()>),
}

impl SequentialExecutor {
    pub fn new(config: &ExecutorConfig) -> Self {
        Self::with_gap_timeout(config.gap_timeout())
    }

    pub fn with_gap_timeout(gap_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                gap_timeout,
                states: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Run `f` when it is `index`'s turn within `(session_id, stage)`.
    ///
    /// If `index` is the next expected one, `f` runs immediately; otherwise
    /// the call suspends until every lower submitted index has finished. A
    /// predecessor that never arrives only stalls the queue for the gap
    /// timeout, after which the executor logs a warning and advances past
    /// the hole.
    ///
    /// `correlation` is carried for logging only and has no effect on
    /// ordering.
    pub async fn execute<T, Fut>(
        &self,
        session_id: &str,
        index: u64,
        stage: &str,
        correlation: Option<&str>,
        f: impl FnOnce() -> Fut,
    ) -> Result<T, OrderingError>
    where
        Fut: Future<Output = T>,
    {
        let key: StageKey = (session_id.to_string(), stage.to_string());

        let turn = {
            let mut states = self.inner.states.lock();
            let state = states
                .entry(key.clone())
                .or_insert_with(|| StageState::starting_at(index));

            if index < state.next_expected {
                warn!(
                    session = session_id,
                    stage,
                    index,
                    expected = state.next_expected,
                    "stale utterance index, rejecting"
                );
                return Err(OrderingError::StaleIndex {
                    expected: state.next_expected,
                    index,
                });
            }

            if index == state.next_expected && !state.running {
                state.running = true;
                state.outstanding += 1;
                Turn::Run
            } else {
                // Either ahead of its turn, or a duplicate of the running
                // index (which equals next_expected while it runs).
                if index == state.next_expected || state.pending.contains_key(&index) {
                    return Err(OrderingError::DuplicateIndex { index });
                }
                let (tx, rx) = oneshot::channel();
                state.pending.insert(index, tx);
                state.outstanding += 1;
                Turn::Wait(rx)
            }
        };

        let mut guard = SlotGuard {
            inner: &self.inner,
            key: &key,
            index,
            phase: Phase::Waiting,
        };

        match turn {
            Turn::Run => {
                guard.phase = Phase::Running;
            }
            Turn::Wait(mut rx) => loop {
                match tokio::time::timeout(self.inner.gap_timeout, &mut rx).await {
                    Ok(Ok(())) => {
                        // A predecessor finished and handed us the slot.
                        guard.phase = Phase::Running;
                        break;
                    }
                    Ok(Err(_)) => {
                        warn!(
                            session = session_id,
                            stage, index, "ordering slot signal lost, running anyway"
                        );
                        self.inner.force_claim(&key, index);
                        guard.phase = Phase::Running;
                        break;
                    }
                    Err(_elapsed) => {
                        if self.inner.try_advance_gap(&key, index) {
                            guard.phase = Phase::Running;
                            break;
                        }
                        // A predecessor is running or queued below us; keep
                        // waiting for our signal.
                    }
                }
            },
        }

        debug!(
            session = session_id,
            stage,
            index,
            correlation = correlation.unwrap_or("-"),
            "running ordered body"
        );
        let out = f().await;
        drop(guard);
        Ok(out)
    }

    /// Live (session, stage) state entries; zero once all sessions are idle.
    pub fn stage_count(&self) -> usize {
        self.inner.states.lock().len()
    }

    /// Suspended submissions for a (session, stage) pair.
    pub fn pending_count(&self, session_id: &str, stage: &str) -> usize {
        self.inner
            .states
            .lock()
            .get(&(session_id.to_string(), stage.to_string()))
            .map_or(0, |s| s.pending.len())
    }
}

enum Phase {
    Waiting,
    Running,
}

/// Keeps the stage state consistent on every exit path: a finished body
/// advances the queue, a cancelled waiter leaves it cleanly.
struct SlotGuard<'a> {
    inner: &'a Inner,
    key: &'a StageKey,
    index: u64,
    phase: Phase,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        match self.phase {
            Phase::Running => self.inner.finish_slot(self.key, self.index),
            Phase::Waiting => self.inner.cancel_waiting(self.key, self.index),
        }
    }
}

impl Inner {
    /// A body at `index` finished (or its future was dropped mid-run):
    /// advance `next_expected` and wake the next contiguous waiter.
    fn finish_slot(&self, key: &StageKey, index: u64) {
        let mut states = self.states.lock();
        let Some(state) = states.get_mut(key) else {
            return;
        };
        state.running = false;
        state.outstanding = state.outstanding.saturating_sub(1);
        state.next_expected = index + 1;

        // Wake the successor, skipping slots whose waiters were cancelled
        // while queued.
        loop {
            let Some(tx) = state.pending.remove(&state.next_expected) else {
                break;
            };
            match tx.send(()) {
                Ok(()) => {
                    state.running = true;
                    break;
                }
                Err(()) => {
                    state.outstanding = state.outstanding.saturating_sub(1);
                    state.next_expected += 1;
                }
            }
        }

        if !state.running && state.pending.is_empty() && state.outstanding == 0 {
            states.remove(key);
        }
    }

    /// A suspended submission was cancelled before its turn.
    fn cancel_waiting(&self, key: &StageKey, index: u64) {
        let mut states = self.states.lock();
        let Some(state) = states.get_mut(key) else {
            return;
        };
        if state.pending.remove(&index).is_some() {
            state.outstanding = state.outstanding.saturating_sub(1);
            if !state.running && state.pending.is_empty() && state.outstanding == 0 {
                states.remove(key);
            }
            return;
        }
        // The wake signal raced the cancellation and the slot was already
        // claimed for us; finish it so the stage doesn't wedge.
        if state.running && state.next_expected == index {
            drop(states);
            self.finish_slot(key, index);
        }
    }

    /// Claim the slot unconditionally. Used only when a waiter's wake channel
    /// was lost, which should not happen in normal operation.
    fn force_claim(&self, key: &StageKey, index: u64) {
        let mut states = self.states.lock();
        let Some(state) = states.get_mut(key) else {
            return;
        };
        state.pending.remove(&index);
        if state.next_expected < index {
            state.next_expected = index;
        }
        state.running = true;
    }

    /// Called when a waiter's gap timer fires. Returns true if the waiter
    /// should run now: nothing is running, nothing lower is queued, and the
    /// predecessor it was waiting for never arrived.
    fn try_advance_gap(&self, key: &StageKey, index: u64) -> bool {
        let mut states = self.states.lock();
        let Some(state) = states.get_mut(key) else {
            return false;
        };

        if state.running && state.next_expected == index {
            // The slot was claimed for us just as the timer fired; the wake
            // signal is already in our channel.
            return false;
        }
        if state.running {
            return false;
        }

        // Cancelled waiters must not hold up the gap check.
        let before = state.pending.len();
        state.pending.retain(|_, tx| !tx.is_closed());
        state.outstanding = state
            .outstanding
            .saturating_sub(before - state.pending.len());

        if !state.pending.contains_key(&index) {
            // Our entry vanished without a claim; run rather than spin.
            warn!(session = %key.0, stage = %key.1, index, "ordering entry missing, claiming slot");
            state.next_expected = state.next_expected.max(index);
            state.running = true;
            return true;
        }

        if state.next_expected >= index {
            state.pending.remove(&index);
            state.running = true;
            return true;
        }

        if state.pending.keys().min().copied() != Some(index) {
            return false;
        }

        let expected = state.next_expected;
        state.pending.remove(&index);
        state.next_expected = index;
        state.running = true;
        warn!(
            session = %key.0,
            stage = %key.1,
            expected,
            index,
            "missing predecessor, advancing past gap"
        );
        true
    }
}
