//! Operation registry: at most one in-flight operation per key
//!
//! The registry owns the key-to-operation map and the concurrency ceiling.
//! Entries are removed exactly once, on terminal transition; removal is
//! matched on the operation instance id so a stale task can never evict a
//! key that has since been re-registered.

use crate::cancel::CancellationToken;
use crate::operation::StagedOperation;
use crate::step::Step;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use stagehand_backoff::BackoffPolicy;
use stagehand_config::OrchestratorConfig;
use stagehand_errors::{Error, FailureKind, OperationError, Result};
use stagehand_events::{EventEmitter, EventSender, OperationEvent};
use stagehand_progress::ProgressTracker;
use stagehand_types::{OperationId, OperationKey, OperationState, OperationStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, Semaphore};

/// Registry of in-flight staged operations.
///
/// Cloning shares the same underlying map; create one per process scope and
/// pass it to consumers explicitly. Lifetime is bounded by an explicit
/// [`shutdown`](Self::shutdown) rather than a lazily-initialized global.
#[derive(Clone)]
pub struct OperationRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    ops: DashMap<OperationKey, OperationEntry>,
    tx: EventSender,
    config: OrchestratorConfig,
    permits: Arc<Semaphore>,
    shutdown: AtomicBool,
}

struct OperationEntry {
    id: OperationId,
    token: CancellationToken,
    tracker: ProgressTracker,
    done: CompletionSlot,
}

/// Single-shot completion delivery shared between the run task and the
/// synchronous cancel path; whoever performs the terminal transition takes
/// the sender.
#[derive(Clone)]
struct CompletionSlot {
    slot: Arc<Mutex<Option<oneshot::Sender<OperationStatus>>>>,
}

impl CompletionSlot {
    fn new(sender: oneshot::Sender<OperationStatus>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(sender))),
        }
    }

    fn complete(&self, status: OperationStatus) {
        if let Some(sender) = self.slot.lock().unwrap().take() {
            // Receiver may have been dropped; completion is best-effort.
            let _ = sender.send(status);
        }
    }
}

impl OperationRegistry {
    /// Create a registry with the given configuration and event channel
    #[must_use]
    pub fn new(config: OrchestratorConfig, tx: EventSender) -> Self {
        let permits = Arc::new(Semaphore::new(config.limits.max_concurrent_operations));
        Self {
            inner: Arc::new(RegistryInner {
                ops: DashMap::new(),
                tx,
                config,
                permits,
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Start a staged operation with the configured retry policy.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRunning` if the key has a live operation,
    /// `EmptyOperation` for an empty step list, and `Shutdown` after
    /// [`shutdown`](Self::shutdown).
    pub fn start(
        &self,
        key: impl Into<OperationKey>,
        steps: Vec<Step>,
    ) -> Result<OperationHandle> {
        let policy = self.inner.config.retry.backoff_policy();
        self.start_with_policy(key, steps, policy)
    }

    /// Start a staged operation with an explicit backoff policy.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub fn start_with_policy(
        &self,
        key: impl Into<OperationKey>,
        steps: Vec<Step>,
        policy: BackoffPolicy,
    ) -> Result<OperationHandle> {
        let key = key.into();

        if self.inner.shutdown.load(Ordering::SeqCst) {
            return Err(OperationError::Shutdown.into());
        }
        if steps.is_empty() {
            return Err(OperationError::EmptyOperation.into());
        }

        let id = OperationId::new();
        let token = CancellationToken::new();
        let tracker = ProgressTracker::new(key.clone(), self.inner.tx.clone());
        let (done_tx, done_rx) = oneshot::channel();
        let done = CompletionSlot::new(done_tx);

        match self.inner.ops.entry(key.clone()) {
            Entry::Occupied(_) => {
                return Err(OperationError::AlreadyRunning {
                    key: key.to_string(),
                }
                .into());
            }
            Entry::Vacant(vacant) => {
                vacant.insert(OperationEntry {
                    id,
                    token: token.clone(),
                    tracker: tracker.clone(),
                    done: done.clone(),
                });
            }
        }

        let operation = StagedOperation::new(
            key.clone(),
            steps,
            policy,
            self.inner.config.step_timeout(),
            tracker.clone(),
            token.clone(),
            self.inner.tx.clone(),
        );

        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        let task_token = token.clone();
        tokio::spawn(async move {
            // The operation stays Queued until a run permit frees up; the
            // permit is held for the whole run.
            let permit = tokio::select! {
                () = task_token.cancelled() => None,
                permit = Arc::clone(&inner.permits).acquire_owned() => permit.ok(),
            };

            let terminal = match permit {
                Some(permit) => {
                    let terminal = operation.run().await;
                    drop(permit);
                    terminal
                }
                // Cancelled while queued: the cancel path already finalized
                // status, completion and removal.
                None => None,
            };

            if let Some(status) = terminal {
                done.complete(status);
                inner.ops.remove_if(&task_key, |_, entry| entry.id == id);
            }
        });

        Ok(OperationHandle {
            key,
            id,
            tracker,
            registry: Arc::clone(&self.inner),
            done: done_rx,
        })
    }

    /// Cancel the operation registered under `key`.
    ///
    /// Synchronously transitions it to `Cancelled`, fires its completion
    /// exactly once, and releases the key. Returns `false` if no live
    /// operation holds the key. The in-flight step is asked to stop
    /// best-effort; its late result is discarded.
    pub fn cancel(&self, key: &OperationKey) -> bool {
        self.inner.cancel_entry(key, None)
    }

    /// Status snapshot of the live operation under `key`, if any.
    ///
    /// Completed operations have released their key and return `None`.
    #[must_use]
    pub fn query(&self, key: &OperationKey) -> Option<OperationStatus> {
        self.inner.ops.get(key).map(|entry| entry.tracker.snapshot())
    }

    /// Number of live operations (queued or running)
    #[must_use]
    pub fn active(&self) -> usize {
        self.inner.ops.len()
    }

    /// Cancel everything and refuse new starts.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        let keys: Vec<OperationKey> = self
            .inner
            .ops
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for key in &keys {
            self.inner.cancel_entry(key, None);
        }
    }
}

impl RegistryInner {
    /// Shared cancel path. `require_id` pins cancellation to one operation
    /// instance so a handle for a finished operation cannot cancel a newer
    /// one registered under the same key.
    fn cancel_entry(&self, key: &OperationKey, require_id: Option<OperationId>) -> bool {
        let removed = match require_id {
            Some(id) => self.ops.remove_if(key, |_, entry| entry.id == id),
            None => self.ops.remove(key),
        };
        let Some((_, entry)) = removed else {
            return false;
        };

        entry.token.cancel();
        if let Some(status) = entry.tracker.finish(
            OperationState::Cancelled,
            Some((FailureKind::Cancelled, Error::Cancelled.to_string())),
        ) {
            self.tx.emit_operation(OperationEvent::Cancelled {
                key: key.clone(),
                status: status.clone(),
            });
            entry.done.complete(status);
        }
        true
    }
}

/// Handle to one started operation.
///
/// Exposes the spec-level surface: status snapshots, cancellation, and a
/// single-shot wait for the terminal status.
pub struct OperationHandle {
    key: OperationKey,
    id: OperationId,
    tracker: ProgressTracker,
    registry: Arc<RegistryInner>,
    done: oneshot::Receiver<OperationStatus>,
}

impl OperationHandle {
    /// Key this operation is registered under
    #[must_use]
    pub fn key(&self) -> &OperationKey {
        &self.key
    }

    /// Unique id of this operation instance
    #[must_use]
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Current status snapshot
    #[must_use]
    pub fn status(&self) -> OperationStatus {
        self.tracker.snapshot()
    }

    /// Cancel this operation instance. Same contract as
    /// [`OperationRegistry::cancel`], but never touches a successor
    /// operation under the same key.
    pub fn cancel(&self) -> bool {
        self.registry.cancel_entry(&self.key, Some(self.id))
    }

    /// Wait for the terminal status. Delivered exactly once.
    ///
    /// # Errors
    ///
    /// Returns `Abandoned` if the operation was dropped without reaching a
    /// terminal state (e.g. the runtime shut down).
    pub async fn wait(self) -> Result<OperationStatus> {
        self.done
            .await
            .map_err(|_| OperationError::Abandoned.into())
    }
}
