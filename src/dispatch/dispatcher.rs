//! Message dispatcher
//!
//! Receives decoded messages, consults the subscription registry, and
//! schedules every matching handler on the elastic blocking pool. Each
//! invocation is isolated: a dedup check runs before the handler, a
//! per-handler circuit breaker wraps the call, and panics or errors are
//! caught at the worker boundary so one handler's failure cannot affect
//! another's delivery.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info, warn};

use super::breaker::CircuitBreaker;
use super::config::DispatcherConfig;
use crate::ddq::{DdqKey, DdqStats, DdqStore, DedupPolicy};
use crate::error::{DispatchError, MessageError};
use crate::filter::Filter;
use crate::message::Message;
use crate::registry::{Handler, HandlerId, HandlerRegistry, SubscriptionRegistry};
use crate::schema::Schema;

/// Point-in-time dispatcher status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherStatus {
    /// Whether new messages are accepted.
    pub running: bool,
    /// Scheduled invocations waiting for a worker slot.
    pub queue_length: usize,
    /// Handler invocations scheduled since startup.
    pub scheduled: u64,
    /// Handler invocations finished (delivered, suppressed, or failed).
    pub completed: u64,
    /// Invocations currently executing.
    pub active_workers: usize,
    /// Invocations suppressed by deduplication.
    pub duplicates_skipped: u64,
    /// Invocations suppressed by an open circuit breaker.
    pub circuit_skipped: u64,
    /// Invocations that raised or panicked.
    pub failed: u64,
}

struct ClassEntry {
    schema: Arc<Schema>,
    dedup: Arc<DedupPolicy>,
}

struct Inner {
    config: DispatcherConfig,
    registry: SubscriptionRegistry,
    handlers: HandlerRegistry,
    classes: DashMap<String, ClassEntry>,
    ddqs: DashMap<String, Arc<dyn DdqStore>>,
    breakers: DashMap<HandlerId, Arc<CircuitBreaker>>,
    limiter: Arc<Semaphore>,
    accepting: AtomicBool,
    in_flight: AtomicUsize,
    idle: Notify,
    scheduled: AtomicU64,
    completed: AtomicU64,
    duplicates_skipped: AtomicU64,
    circuit_skipped: AtomicU64,
    failed: AtomicU64,
}

/// Concurrent publish/subscribe dispatcher.
///
/// Cheap to clone; all clones share the same registries, counters, and
/// worker pool.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.inner.config)
            .field("subscriptions", &self.inner.registry.len())
            .finish_non_exhaustive()
    }
}

enum Outcome {
    Delivered,
    Duplicate,
    CircuitOpen,
    Failed,
}

struct WorkItem {
    inner: Arc<Inner>,
    message: Arc<Message>,
    handler_id: HandlerId,
    handler: Handler,
    dedup: Option<Arc<DedupPolicy>>,
}

impl Dispatcher {
    /// Creates a dispatcher with the given configuration.
    #[must_use]
    pub fn new(config: DispatcherConfig) -> Self {
        let limiter = Arc::new(Semaphore::new(config.max_concurrency.as_usize()));
        Self {
            inner: Arc::new(Inner {
                config,
                registry: SubscriptionRegistry::new(),
                handlers: HandlerRegistry::new(),
                classes: DashMap::new(),
                ddqs: DashMap::new(),
                breakers: DashMap::new(),
                limiter,
                accepting: AtomicBool::new(true),
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
                scheduled: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                duplicates_skipped: AtomicU64::new(0),
                circuit_skipped: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
        }
    }

    /// Registers a message class so the receive path can decode its wire
    /// envelopes and consult its dedup policy. Upserts on re-registration.
    pub fn register_class(&self, schema: Arc<Schema>, dedup: Arc<DedupPolicy>) {
        self.inner
            .classes
            .insert(schema.name().to_string(), ClassEntry { schema, dedup });
    }

    /// The schema registered for a class name, if any.
    #[must_use]
    pub fn schema_for(&self, class_name: &str) -> Option<Arc<Schema>> {
        self.inner
            .classes
            .get(class_name)
            .map(|entry| Arc::clone(&entry.schema))
    }

    /// Registers a callable under an id without touching the subscription
    /// registry. Used by transports forwarding `subscribe` separately.
    pub fn register_handler(&self, handler_id: HandlerId, handler: Handler) {
        self.inner.handlers.insert(handler_id, handler);
    }

    /// Appends a subscription entry for an already-registered callable.
    pub fn add(&self, class_name: &str, handler_id: HandlerId, filter: Filter) {
        self.inner.registry.add(class_name, handler_id, filter);
    }

    /// Registers an inline handler and subscribes it, returning the
    /// synthetic id.
    pub fn subscribe(&self, class_name: &str, filter: Filter, handler: Handler) -> HandlerId {
        let handler_id = HandlerId::inline(class_name);
        self.subscribe_named(class_name, handler_id.clone(), filter, handler);
        handler_id
    }

    /// Registers a callable under a caller-chosen id and subscribes it.
    pub fn subscribe_named(
        &self,
        class_name: &str,
        handler_id: HandlerId,
        filter: Filter,
        handler: Handler,
    ) {
        self.inner.handlers.insert(handler_id.clone(), handler);
        self.inner.registry.add(class_name, handler_id, filter);
    }

    /// Removes a subscription and evicts its callable.
    pub fn remove(&self, class_name: &str, handler_id: &HandlerId) {
        self.inner.registry.remove(class_name, handler_id);
        self.inner.handlers.remove(handler_id);
    }

    /// Removes every subscription for the class along with the callables.
    pub fn remove_all(&self, class_name: &str) {
        for handler_id in self.inner.registry.remove_all(class_name) {
            self.inner.handlers.remove(&handler_id);
        }
    }

    /// Wipes all subscriptions. Test aid.
    pub fn drop_all(&self) {
        self.inner.registry.drop_all();
    }

    /// Routes a decoded message: evaluates every subscription filter for the
    /// class and schedules the matching handlers. Returns once all matches
    /// are scheduled, without awaiting any handler.
    ///
    /// # Errors
    ///
    /// `ShuttingDown` after shutdown has begun; `VersionMismatch` when the
    /// header disagrees with the registered schema version.
    pub async fn route(&self, message: Message) -> Result<usize, DispatchError> {
        if !self.inner.accepting.load(Ordering::SeqCst) {
            return Err(DispatchError::ShuttingDown);
        }

        let class_name = message.class_name().to_string();
        let dedup = match self.inner.classes.get(&class_name) {
            Some(entry) => {
                let expected = entry.schema.version();
                let actual = message.header().version;
                if expected != actual {
                    error!(
                        class = %class_name,
                        expected,
                        actual,
                        uuid = %message.uuid(),
                        "rejecting message with mismatched schema version"
                    );
                    return Err(MessageError::VersionMismatch {
                        class: class_name,
                        expected,
                        actual,
                    }
                    .into());
                }
                Some(Arc::clone(&entry.dedup))
            }
            None => None,
        };

        let entries = self.inner.registry.entries_for(&class_name);
        if entries.is_empty() {
            debug!(class = %class_name, "no subscriptions, message dropped");
            return Ok(0);
        }

        let message = Arc::new(message);
        let mut matched = 0;
        for entry in entries {
            if !entry.filter.matches(message.header()) {
                continue;
            }
            let Some(handler) = self.inner.handlers.get(&entry.handler_id) else {
                warn!(
                    class = %class_name,
                    handler = %entry.handler_id,
                    "subscription has no registered callable, skipping"
                );
                continue;
            };

            matched += 1;
            self.spawn_worker(WorkItem {
                inner: Arc::clone(&self.inner),
                message: Arc::clone(&message),
                handler_id: entry.handler_id,
                handler,
                dedup: dedup.clone(),
            });
        }

        Ok(matched)
    }

    fn spawn_worker(&self, item: WorkItem) {
        let inner = Arc::clone(&self.inner);
        inner.scheduled.fetch_add(1, Ordering::Relaxed);
        inner.in_flight.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let permit = match Arc::clone(&inner.limiter).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    // Semaphore closed only if the inner state is being torn
                    // down; count the task as finished and bail.
                    Inner::finish(&inner, &Outcome::Failed);
                    return;
                }
            };

            let joined = tokio::task::spawn_blocking(move || Self::run_item(&item)).await;
            drop(permit);

            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    error!(error = %join_err, "worker task failed to join");
                    Outcome::Failed
                }
            };
            Inner::finish(&inner, &outcome);
        });
    }

    fn run_item(item: &WorkItem) -> Outcome {
        let inner = &item.inner;
        let message = &item.message;
        let class_name = message.class_name();
        let uuid = message.uuid();

        let ddq = item
            .dedup
            .as_ref()
            .filter(|policy| policy.is_enabled())
            .map(|policy| {
                let key = DdqKey::new(class_name, item.handler_id.clone());
                inner.ddq_for(&key, policy)
            });

        if let Some(store) = &ddq {
            if store.contains(&uuid) {
                info!(
                    class = %class_name,
                    handler = %item.handler_id,
                    uuid = %uuid,
                    "duplicate message suppressed"
                );
                return Outcome::Duplicate;
            }
        }

        let breaker = inner.breaker_for(&item.handler_id);
        if !breaker.try_acquire() {
            warn!(
                class = %class_name,
                handler = %item.handler_id,
                uuid = %uuid,
                "circuit breaker open, handler skipped"
            );
            return Outcome::CircuitOpen;
        }

        match catch_unwind(AssertUnwindSafe(|| item.handler.call(message))) {
            Ok(Ok(())) => {
                breaker.record_success();
                if let Some(store) = &ddq {
                    store.add(&uuid);
                }
                Outcome::Delivered
            }
            Ok(Err(err)) => {
                error!(
                    class = %class_name,
                    handler = %item.handler_id,
                    uuid = %uuid,
                    error = %err,
                    "handler failed"
                );
                breaker.record_failure();
                Outcome::Failed
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                error!(
                    class = %class_name,
                    handler = %item.handler_id,
                    uuid = %uuid,
                    reason = %reason,
                    "handler panicked"
                );
                breaker.record_failure();
                Outcome::Failed
            }
        }
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> DispatcherStatus {
        let inner = &self.inner;
        let max = inner.config.max_concurrency.as_usize();
        let active = max.saturating_sub(inner.limiter.available_permits());
        let in_flight = inner.in_flight.load(Ordering::SeqCst);
        DispatcherStatus {
            running: inner.accepting.load(Ordering::SeqCst),
            queue_length: in_flight.saturating_sub(active),
            scheduled: inner.scheduled.load(Ordering::Relaxed),
            completed: inner.completed.load(Ordering::Relaxed),
            active_workers: active,
            duplicates_skipped: inner.duplicates_skipped.load(Ordering::Relaxed),
            circuit_skipped: inner.circuit_skipped.load(Ordering::Relaxed),
            failed: inner.failed.load(Ordering::Relaxed),
        }
    }

    /// Stats for every lazily created DDQ instance, keyed by
    /// `"{class}:{handler}"`.
    #[must_use]
    pub fn ddq_stats(&self) -> HashMap<String, DdqStats> {
        self.inner
            .ddqs
            .iter()
            .map(|entry| (entry.key().clone(), DdqStats::snapshot(entry.value().as_ref())))
            .collect()
    }

    /// Stops accepting new messages and waits for in-flight handlers.
    ///
    /// # Errors
    ///
    /// `ShutdownTimeout` when handlers are still running at the deadline;
    /// the dispatcher stays in the non-accepting state either way, so a
    /// failed shutdown never prevents process exit.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), DispatchError> {
        self.inner.accepting.store(false, Ordering::SeqCst);
        info!(
            in_flight = self.inner.in_flight.load(Ordering::SeqCst),
            "dispatcher shutting down, draining in-flight handlers"
        );

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.inner.idle.notified();
            let in_flight = self.inner.in_flight.load(Ordering::SeqCst);
            if in_flight == 0 {
                info!("dispatcher drained");
                return Ok(());
            }

            let Some(remaining) = deadline.checked_duration_since(tokio::time::Instant::now())
            else {
                warn!(in_flight, "dispatcher shutdown timed out");
                return Err(DispatchError::ShutdownTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                    in_flight,
                });
            };
            // Either the last worker notifies or we re-check at the deadline.
            let _ = tokio::time::timeout(remaining, notified).await;
        }
    }
}

impl Inner {
    fn ddq_for(&self, key: &DdqKey, policy: &DedupPolicy) -> Arc<dyn DdqStore> {
        self.ddqs
            .entry(key.to_string())
            .or_insert_with(|| policy.make_store(key))
            .clone()
    }

    fn breaker_for(&self, handler_id: &HandlerId) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(handler_id.clone())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    handler_id.clone(),
                    self.config.circuit_breaker_threshold,
                    self.config.circuit_breaker_cooldown_ms.as_duration(),
                ))
            })
            .clone()
    }

    fn finish(inner: &Arc<Self>, outcome: &Outcome) {
        match outcome {
            Outcome::Delivered => {}
            Outcome::Duplicate => {
                inner.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::CircuitOpen => {
                inner.circuit_skipped.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Failed => {
                inner.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        inner.completed.fetch_add(1, Ordering::Relaxed);
        if inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            inner.idle.notify_waiters();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Final safety net; the cooperative path is `shutdown`.
        self.accepting.store(false, Ordering::SeqCst);
    }
}
