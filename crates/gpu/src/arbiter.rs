//! Accelerator lease arbiter
//!
//! Owns, per accelerator key, the current lease holder and a priority-ordered
//! wait queue. Capacity per key is exactly one concurrent holder: many
//! pipeline stages wanting GPU time at once is what causes out-of-memory
//! failures and thrashing, so everything funnels through `acquire`.
//!
//! The arbiter is an explicit object built by the composition root and shared
//! by cloning; there is no global singleton, which keeps unit tests isolated.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

use babel_edge_config::{ArbiterConfig, BusyPolicy, TaskPolicy};
use babel_edge_core::{TaskType, TraceContext};

use crate::lease::{AcquireOutcome, AcquireRequest, GpuLease, LeaseId, SkipReason};
use crate::metrics::{GpuMetricsSnapshot, MetricsManager, DEFAULT_SAMPLE_WINDOW};

/// Priority-aware lease arbiter over a set of accelerator keys.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct GpuArbiter {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    config: RwLock<ArbiterConfig>,
    keys: Mutex<HashMap<String, KeyState>>,
    metrics: MetricsManager,
    arrival_seq: AtomicU64,
}

#[derive(Default)]
struct KeyState {
    holder: Option<Holder>,
    queue: Vec<Waiter>,
}

struct Holder {
    lease_id: LeaseId,
    task_type: TaskType,
    acquired_at: Instant,
    hold_max: Duration,
    trace: TraceContext,
}

struct Waiter {
    /// Arrival order; also the identity used to remove a timed-out entry.
    arrival: u64,
    priority: i32,
    task_type: TaskType,
    enqueued_at: Instant,
    hold_max: Duration,
    trace: TraceContext,
    tx: oneshot::Sender<GpuLease>,
}

impl GpuArbiter {
    /// Create an arbiter with the default metrics sample window.
    pub fn new(config: ArbiterConfig) -> Self {
        Self::with_sample_window(config, DEFAULT_SAMPLE_WINDOW)
    }

    /// Create an arbiter keeping `sample_window` wait/hold samples per key.
    pub fn with_sample_window(config: ArbiterConfig, sample_window: usize) -> Self {
        let mut keys = HashMap::new();
        for key in &config.gpu_keys {
            keys.insert(key.clone(), KeyState::default());
        }
        Self {
            shared: Arc::new(Shared {
                config: RwLock::new(config),
                keys: Mutex::new(keys),
                metrics: MetricsManager::new(sample_window),
                arrival_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Whether admission control is active.
    pub fn is_enabled(&self) -> bool {
        self.shared.config.read().enabled
    }

    /// Resolve the admission policy for a task type under the current config.
    pub fn policy_for(&self, task_type: TaskType) -> TaskPolicy {
        self.shared.config.read().policy_for(task_type)
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> ArbiterConfig {
        self.shared.config.read().clone()
    }

    /// Swap in a re-read configuration.
    ///
    /// Takes effect for subsequent acquires; current holders and queued
    /// waiters keep the budgets they were admitted with.
    pub fn update_config(&self, config: ArbiterConfig) {
        {
            let mut keys = self.shared.keys.lock();
            for key in &config.gpu_keys {
                keys.entry(key.clone()).or_default();
            }
        }
        *self.shared.config.write() = config;
        tracing::info!("Arbiter configuration updated");
    }

    /// Request exclusive use of an accelerator key.
    ///
    /// Grants immediately when the key is free. When busy, the request's
    /// `busy_policy` decides between returning at once (skip / CPU fallback)
    /// and queueing with a bounded wait. Queued requests are granted by
    /// priority, ties broken by arrival order.
    pub async fn acquire(&self, request: AcquireRequest) -> AcquireOutcome {
        if !self.is_enabled() {
            return AcquireOutcome::Acquired(GpuLease::detached(
                &request.gpu_key,
                request.task_type,
            ));
        }

        let (rx, arrival) = {
            let mut keys = self.shared.keys.lock();
            let state = keys.entry(request.gpu_key.clone()).or_default();

            if state.holder.is_none() {
                let lease = self.shared.grant(
                    state,
                    &request.gpu_key,
                    request.task_type,
                    request.hold_max,
                    &request.trace,
                    Duration::ZERO,
                );
                return AcquireOutcome::Acquired(lease);
            }

            match request.busy_policy {
                BusyPolicy::Skip => {
                    self.shared
                        .metrics
                        .record_skipped(&request.gpu_key, SkipReason::Busy);
                    debug!(
                        gpu_key = %request.gpu_key,
                        task = %request.task_type,
                        trace = %request.trace,
                        "accelerator busy, skipping"
                    );
                    return AcquireOutcome::Skipped {
                        reason: SkipReason::Busy,
                    };
                }
                BusyPolicy::FallbackCpu => {
                    self.shared.metrics.record_fallback(&request.gpu_key);
                    debug!(
                        gpu_key = %request.gpu_key,
                        task = %request.task_type,
                        trace = %request.trace,
                        "accelerator busy, falling back to CPU"
                    );
                    return AcquireOutcome::FallbackCpu;
                }
                BusyPolicy::Wait => {
                    if state.queue.len() >= request.queue_limit {
                        self.shared
                            .metrics
                            .record_skipped(&request.gpu_key, SkipReason::QueueFull);
                        warn!(
                            gpu_key = %request.gpu_key,
                            task = %request.task_type,
                            depth = state.queue.len(),
                            trace = %request.trace,
                            "wait queue full, skipping"
                        );
                        return AcquireOutcome::Skipped {
                            reason: SkipReason::QueueFull,
                        };
                    }
                    let (tx, rx) = oneshot::channel();
                    let arrival = self.shared.arrival_seq.fetch_add(1, Ordering::Relaxed);
                    state.queue.push(Waiter {
                        arrival,
                        priority: request.priority,
                        task_type: request.task_type,
                        enqueued_at: Instant::now(),
                        hold_max: request.hold_max,
                        trace: request.trace.clone(),
                        tx,
                    });
                    (rx, arrival)
                }
            }
        };

        let mut rx = rx;
        match tokio::time::timeout(request.max_wait, &mut rx).await {
            Ok(Ok(lease)) => AcquireOutcome::Acquired(lease),
            Ok(Err(_)) => {
                // Sender dropped without a grant; nothing removes queue entries
                // except grant and timeout, so this only happens if arbiter
                // state was torn down under us.
                warn!(gpu_key = %request.gpu_key, "wait queue entry dropped without grant");
                AcquireOutcome::Skipped {
                    reason: SkipReason::Busy,
                }
            }
            Err(_) => self.resolve_wait_timeout(&request, arrival, rx),
        }
    }

    /// A queued wait ran out of budget; either remove it from the queue, or,
    /// if a grant raced the deadline, accept the lease that is already in the
    /// channel.
    fn resolve_wait_timeout(
        &self,
        request: &AcquireRequest,
        arrival: u64,
        mut rx: oneshot::Receiver<GpuLease>,
    ) -> AcquireOutcome {
        let removed = {
            let mut keys = self.shared.keys.lock();
            match keys.get_mut(&request.gpu_key) {
                Some(state) => {
                    let before = state.queue.len();
                    state.queue.retain(|w| w.arrival != arrival);
                    state.queue.len() != before
                }
                None => false,
            }
        };

        if removed {
            self.shared
                .metrics
                .record_skipped(&request.gpu_key, SkipReason::Timeout);
            warn!(
                gpu_key = %request.gpu_key,
                task = %request.task_type,
                waited_ms = request.max_wait.as_millis() as u64,
                trace = %request.trace,
                "timed out waiting for accelerator"
            );
            return AcquireOutcome::Skipped {
                reason: SkipReason::Timeout,
            };
        }

        // The grant happened under the keys lock before we took it, so the
        // lease must already be in the channel.
        match rx.try_recv() {
            Ok(lease) => AcquireOutcome::Acquired(lease),
            Err(_) => {
                warn!(gpu_key = %request.gpu_key, "queued waiter vanished without grant or timeout");
                AcquireOutcome::Skipped {
                    reason: SkipReason::Timeout,
                }
            }
        }
    }

    /// Release a lease by id.
    ///
    /// Equivalent to [`GpuLease::release`]; a no-op if the lease was already
    /// released or reclaimed.
    pub fn release(&self, gpu_key: &str, lease_id: LeaseId) {
        self.shared.release_lease(gpu_key, lease_id);
    }

    /// Force-reclaim leases held past their budget, as though the holder had
    /// released. Returns how many leases were reclaimed.
    ///
    /// Called periodically by the watchdog task; exposed for tests and
    /// diagnostics.
    pub fn sweep_expired_leases(&self) -> usize {
        self.shared.sweep_expired()
    }

    /// Start the recurring watchdog sweep.
    ///
    /// Returns a shutdown sender; send `true` (or drop the node) to stop the
    /// task. The sweep interval comes from the current configuration.
    pub fn start_watchdog(&self) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let shared = Arc::clone(&self.shared);
        let interval = shared.config.read().watchdog_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        shared.sweep_expired();
                    }
                    changed = shutdown_rx.changed() => {
                        // A dropped sender counts as shutdown too.
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("Arbiter watchdog shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Current wait-queue depth for a key.
    pub fn queue_depth(&self, gpu_key: &str) -> usize {
        self.shared
            .keys
            .lock()
            .get(gpu_key)
            .map_or(0, |s| s.queue.len())
    }

    /// Counters and recent wait/hold samples for one accelerator key.
    pub fn metrics_snapshot(&self, gpu_key: &str) -> GpuMetricsSnapshot {
        let (queue_depth, holder_busy) = {
            let keys = self.shared.keys.lock();
            keys.get(gpu_key)
                .map(|s| (s.queue.len(), s.holder.is_some()))
                .unwrap_or((0, false))
        };
        self.shared.metrics.snapshot(gpu_key, queue_depth, holder_busy)
    }

    /// Snapshots for every key the arbiter has seen.
    pub fn snapshot_all(&self) -> Vec<GpuMetricsSnapshot> {
        let mut names: Vec<String> = self.shared.keys.lock().keys().cloned().collect();
        names.sort();
        names.iter().map(|k| self.metrics_snapshot(k)).collect()
    }
}

impl Shared {
    /// Mint a lease and install the holder slot. Caller holds the keys lock.
    fn grant(
        self: &Arc<Self>,
        state: &mut KeyState,
        gpu_key: &str,
        task_type: TaskType,
        hold_max: Duration,
        trace: &TraceContext,
        waited: Duration,
    ) -> GpuLease {
        let lease = GpuLease::granted(Arc::clone(self), gpu_key, task_type, hold_max);
        state.holder = Some(Holder {
            lease_id: lease.id(),
            task_type,
            acquired_at: lease.acquired_at(),
            hold_max,
            trace: trace.clone(),
        });
        self.metrics.record_acquired(gpu_key, waited);
        debug!(
            gpu_key = %gpu_key,
            lease_id = %lease.id(),
            task = %task_type,
            waited_ms = waited.as_millis() as u64,
            trace = %trace,
            "lease acquired"
        );
        lease
    }

    /// Grant the best queued waiter, if any. Caller holds the keys lock and
    /// has already cleared the holder slot.
    fn grant_next(self: &Arc<Self>, state: &mut KeyState, gpu_key: &str) {
        while !state.queue.is_empty() {
            let idx = state
                .queue
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| {
                    a.priority
                        .cmp(&b.priority)
                        .then_with(|| b.arrival.cmp(&a.arrival))
                })
                .map(|(i, _)| i)
                .expect("queue is non-empty");
            let waiter = state.queue.remove(idx);
            let waited = waiter.enqueued_at.elapsed();

            let lease =
                GpuLease::granted(Arc::clone(self), gpu_key, waiter.task_type, waiter.hold_max);
            let lease_id = lease.id();
            let acquired_at = lease.acquired_at();

            match waiter.tx.send(lease) {
                Ok(()) => {
                    state.holder = Some(Holder {
                        lease_id,
                        task_type: waiter.task_type,
                        acquired_at,
                        hold_max: waiter.hold_max,
                        trace: waiter.trace.clone(),
                    });
                    self.metrics.record_acquired(gpu_key, waited);
                    debug!(
                        gpu_key = %gpu_key,
                        lease_id = %lease_id,
                        task = %waiter.task_type,
                        waited_ms = waited.as_millis() as u64,
                        trace = %waiter.trace,
                        "lease granted from queue"
                    );
                    return;
                }
                Err(lease) => {
                    // The waiter's future was dropped before its grant. The
                    // lease was never observed; defuse it so its drop doesn't
                    // re-enter the keys lock, and try the next waiter.
                    lease.defuse();
                    debug!(
                        gpu_key = %gpu_key,
                        task = %waiter.task_type,
                        "queued waiter gone, trying next"
                    );
                }
            }
        }
    }

    pub(crate) fn release_lease(self: &Arc<Self>, gpu_key: &str, lease_id: LeaseId) {
        let mut keys = self.keys.lock();
        let Some(state) = keys.get_mut(gpu_key) else {
            return;
        };
        // Only the current holder may clear the slot; a release after
        // watchdog reclamation (or a stale second release) is a no-op.
        if !state
            .holder
            .as_ref()
            .is_some_and(|h| h.lease_id == lease_id)
        {
            return;
        }
        let holder = state.holder.take().expect("holder checked above");
        let held = holder.acquired_at.elapsed();
        self.metrics.record_release(gpu_key, held);
        debug!(
            gpu_key = %gpu_key,
            lease_id = %lease_id,
            held_ms = held.as_millis() as u64,
            "lease released"
        );
        self.grant_next(state, gpu_key);
    }

    fn sweep_expired(self: &Arc<Self>) -> usize {
        let mut keys = self.keys.lock();
        let mut reclaimed = 0;
        for (gpu_key, state) in keys.iter_mut() {
            let expired = state
                .holder
                .as_ref()
                .is_some_and(|h| h.acquired_at.elapsed() > h.hold_max);
            if !expired {
                continue;
            }
            let holder = state.holder.take().expect("holder checked above");
            let held = holder.acquired_at.elapsed();
            warn!(
                gpu_key = %gpu_key,
                lease_id = %holder.lease_id,
                task = %holder.task_type,
                held_ms = held.as_millis() as u64,
                hold_max_ms = holder.hold_max.as_millis() as u64,
                trace = %holder.trace,
                "lease exceeded hold budget, force-reclaiming"
            );
            self.metrics.record_watchdog_reclaim(gpu_key, held);
            self.grant_next(state, gpu_key);
            reclaimed += 1;
        }
        reclaimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(
        gpu_key: &str,
        task_type: TaskType,
        priority: i32,
        max_wait: Duration,
        busy_policy: BusyPolicy,
    ) -> AcquireRequest {
        AcquireRequest {
            gpu_key: gpu_key.to_string(),
            task_type,
            priority,
            max_wait,
            hold_max: Duration::from_secs(30),
            queue_limit: 8,
            busy_policy,
            trace: TraceContext::none(),
        }
    }

    fn must_acquire(outcome: AcquireOutcome) -> GpuLease {
        match outcome {
            AcquireOutcome::Acquired(lease) => lease,
            other => panic!("expected a grant, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_free_key_grants_immediately() {
        let arbiter = GpuArbiter::new(ArbiterConfig::default());
        let req = request("gpu:0", TaskType::Asr, 90, Duration::from_secs(1), BusyPolicy::Wait);
        let lease = must_acquire(arbiter.acquire(req).await);
        assert_eq!(lease.gpu_key(), "gpu:0");

        let snap = arbiter.metrics_snapshot("gpu:0");
        assert_eq!(snap.acquired_total, 1);
        assert_eq!(snap.queue_wait_ms, vec![0]);
        assert!(snap.holder_busy);
    }

    #[tokio::test]
    async fn test_busy_key_with_skip_policy_returns_immediately() {
        let arbiter = GpuArbiter::new(ArbiterConfig::default());
        let holder = must_acquire(
            arbiter
                .acquire(request("gpu:0", TaskType::Asr, 90, Duration::from_secs(1), BusyPolicy::Wait))
                .await,
        );

        let outcome = arbiter
            .acquire(request(
                "gpu:0",
                TaskType::SemanticRepair,
                20,
                Duration::from_millis(400),
                BusyPolicy::Skip,
            ))
            .await;
        assert!(matches!(
            outcome,
            AcquireOutcome::Skipped {
                reason: SkipReason::Busy
            }
        ));
        assert_eq!(arbiter.queue_depth("gpu:0"), 0);
        holder.release();
    }

    #[tokio::test]
    async fn test_busy_key_with_fallback_policy_returns_fallback() {
        let arbiter = GpuArbiter::new(ArbiterConfig::default());
        let _holder = must_acquire(
            arbiter
                .acquire(request("gpu:0", TaskType::Asr, 90, Duration::from_secs(1), BusyPolicy::Wait))
                .await,
        );
        let outcome = arbiter
            .acquire(request(
                "gpu:0",
                TaskType::Nmt,
                80,
                Duration::from_secs(1),
                BusyPolicy::FallbackCpu,
            ))
            .await;
        assert!(matches!(outcome, AcquireOutcome::FallbackCpu));
        assert_eq!(arbiter.metrics_snapshot("gpu:0").fallback_cpu_total, 1);
    }

    #[tokio::test]
    async fn test_waiter_granted_on_release() {
        let arbiter = GpuArbiter::new(ArbiterConfig::default());
        let holder = must_acquire(
            arbiter
                .acquire(request("gpu:0", TaskType::Asr, 90, Duration::from_secs(1), BusyPolicy::Wait))
                .await,
        );

        let arbiter2 = arbiter.clone();
        let waiter = tokio::spawn(async move {
            arbiter2
                .acquire(request("gpu:0", TaskType::Nmt, 80, Duration::from_secs(5), BusyPolicy::Wait))
                .await
        });

        // Let the waiter enqueue before releasing.
        while arbiter.queue_depth("gpu:0") == 0 {
            tokio::task::yield_now().await;
        }
        holder.release();

        let lease = must_acquire(waiter.await.unwrap());
        assert_eq!(lease.task_type(), TaskType::Nmt);
    }

    #[tokio::test]
    async fn test_priority_beats_arrival_order() {
        let arbiter = GpuArbiter::new(ArbiterConfig::default());
        let holder = must_acquire(
            arbiter
                .acquire(request("gpu:0", TaskType::Nmt, 80, Duration::from_secs(1), BusyPolicy::Wait))
                .await,
        );

        // Low-priority waiter arrives first.
        let low = {
            let arbiter = arbiter.clone();
            tokio::spawn(async move {
                arbiter
                    .acquire(request("gpu:0", TaskType::Tts, 70, Duration::from_secs(5), BusyPolicy::Wait))
                    .await
            })
        };
        while arbiter.queue_depth("gpu:0") < 1 {
            tokio::task::yield_now().await;
        }
        let high = {
            let arbiter = arbiter.clone();
            tokio::spawn(async move {
                arbiter
                    .acquire(request("gpu:0", TaskType::Asr, 90, Duration::from_secs(5), BusyPolicy::Wait))
                    .await
            })
        };
        while arbiter.queue_depth("gpu:0") < 2 {
            tokio::task::yield_now().await;
        }

        holder.release();

        // The high-priority request wins the freed slot.
        let high_lease = must_acquire(high.await.unwrap());
        assert_eq!(high_lease.task_type(), TaskType::Asr);
        assert_eq!(arbiter.queue_depth("gpu:0"), 1);

        high_lease.release();
        let low_lease = must_acquire(low.await.unwrap());
        assert_eq!(low_lease.task_type(), TaskType::Tts);
    }

    #[tokio::test]
    async fn test_queue_limit_rejects_overflow() {
        let arbiter = GpuArbiter::new(ArbiterConfig::default());
        let _holder = must_acquire(
            arbiter
                .acquire(request("gpu:0", TaskType::Asr, 90, Duration::from_secs(1), BusyPolicy::Wait))
                .await,
        );

        let mut limited = request("gpu:0", TaskType::Nmt, 80, Duration::from_secs(5), BusyPolicy::Wait);
        limited.queue_limit = 1;

        let first = {
            let arbiter = arbiter.clone();
            let req = limited.clone();
            tokio::spawn(async move { arbiter.acquire(req).await })
        };
        while arbiter.queue_depth("gpu:0") < 1 {
            tokio::task::yield_now().await;
        }

        // Queue is at its limit; the next WAIT request bounces immediately.
        let outcome = arbiter.acquire(limited).await;
        assert!(matches!(
            outcome,
            AcquireOutcome::Skipped {
                reason: SkipReason::QueueFull
            }
        ));
        assert_eq!(arbiter.metrics_snapshot("gpu:0").queue_full_total, 1);

        first.abort();
    }

    #[tokio::test]
    async fn test_wait_timeout_resolves_as_skipped() {
        let arbiter = GpuArbiter::new(ArbiterConfig::default());
        let _holder = must_acquire(
            arbiter
                .acquire(request("gpu:0", TaskType::Asr, 90, Duration::from_secs(1), BusyPolicy::Wait))
                .await,
        );

        let outcome = arbiter
            .acquire(request(
                "gpu:0",
                TaskType::Nmt,
                80,
                Duration::from_millis(30),
                BusyPolicy::Wait,
            ))
            .await;
        assert!(matches!(
            outcome,
            AcquireOutcome::Skipped {
                reason: SkipReason::Timeout
            }
        ));
        // The timed-out entry left the queue.
        assert_eq!(arbiter.queue_depth("gpu:0"), 0);
        assert_eq!(arbiter.metrics_snapshot("gpu:0").timeouts_total, 1);
    }

    #[tokio::test]
    async fn test_watchdog_reclaims_expired_lease() {
        let arbiter = GpuArbiter::new(ArbiterConfig::default());
        let mut req = request("gpu:0", TaskType::Asr, 90, Duration::from_secs(1), BusyPolicy::Wait);
        req.hold_max = Duration::from_millis(10);
        let stuck = must_acquire(arbiter.acquire(req).await);

        let waiter = {
            let arbiter = arbiter.clone();
            tokio::spawn(async move {
                arbiter
                    .acquire(request("gpu:0", TaskType::Nmt, 80, Duration::from_secs(5), BusyPolicy::Wait))
                    .await
            })
        };
        while arbiter.queue_depth("gpu:0") < 1 {
            tokio::task::yield_now().await;
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(arbiter.sweep_expired_leases(), 1);

        // The queued waiter owns the key now.
        let lease = must_acquire(waiter.await.unwrap());
        assert_eq!(lease.task_type(), TaskType::Nmt);
        assert_eq!(arbiter.metrics_snapshot("gpu:0").watchdog_exceeded_total, 1);

        // The reclaimed holder's late release must not evict the new holder.
        stuck.release();
        let snap = arbiter.metrics_snapshot("gpu:0");
        assert!(snap.holder_busy);
    }

    #[tokio::test]
    async fn test_double_release_never_double_grants() {
        let arbiter = GpuArbiter::new(ArbiterConfig::default());
        let first = must_acquire(
            arbiter
                .acquire(request("gpu:0", TaskType::Asr, 90, Duration::from_secs(1), BusyPolicy::Wait))
                .await,
        );
        let first_id = first.id();
        first.release();

        // Key is free again; a new holder takes it.
        let second = must_acquire(
            arbiter
                .acquire(request("gpu:0", TaskType::Nmt, 80, Duration::from_secs(1), BusyPolicy::Wait))
                .await,
        );

        // Releasing the first lease again (by id) must not clear the new holder.
        arbiter.release("gpu:0", first_id);
        assert!(arbiter.metrics_snapshot("gpu:0").holder_busy);
        second.release();
        assert!(!arbiter.metrics_snapshot("gpu:0").holder_busy);
    }

    #[tokio::test]
    async fn test_disabled_arbiter_always_grants() {
        let config = ArbiterConfig {
            enabled: false,
            ..ArbiterConfig::default()
        };
        let arbiter = GpuArbiter::new(config);
        let a = must_acquire(
            arbiter
                .acquire(request("gpu:0", TaskType::Asr, 90, Duration::from_secs(1), BusyPolicy::Wait))
                .await,
        );
        // No contention control: a second concurrent grant succeeds too.
        let b = must_acquire(
            arbiter
                .acquire(request("gpu:0", TaskType::Nmt, 80, Duration::from_secs(1), BusyPolicy::Wait))
                .await,
        );
        a.release();
        b.release();
    }

    #[tokio::test]
    async fn test_update_config_applies_to_later_acquires() {
        let arbiter = GpuArbiter::new(ArbiterConfig::default());
        let mut config = arbiter.config();
        config.gpu_keys.push("gpu:1".to_string());
        config.default_queue_limit = 1;
        arbiter.update_config(config);

        assert_eq!(arbiter.config().default_queue_limit, 1);
        // The new key is pre-seeded and immediately usable.
        let lease = must_acquire(
            arbiter
                .acquire(request("gpu:1", TaskType::Asr, 90, Duration::from_secs(1), BusyPolicy::Wait))
                .await,
        );
        lease.release();
    }
}
