use crate::types::{Worker, WorkerStatus};
use maestro_core::{MaestroError, MaestroResult};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Pool of workers with bounded load counters.
///
/// Load counters are the only state shared between concurrently running
/// tasks. Every check-then-mutate happens under one lock, so
/// `0 <= current_load <= max_load` holds at all times.
pub struct WorkerRegistry {
    /// Kept in registration order; ranking ties resolve to the earlier worker.
    workers: Mutex<Vec<Worker>>,
    released: Notify,
}

impl WorkerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            workers: Mutex::new(Vec::new()),
            released: Notify::new(),
        }
    }

    /// Build a registry from a list of workers.
    pub fn with_workers(workers: impl IntoIterator<Item = Worker>) -> MaestroResult<Self> {
        let registry = Self::new();
        for worker in workers {
            registry.register(worker)?;
        }
        Ok(registry)
    }

    /// Add a worker to the pool.
    pub fn register(&self, mut worker: Worker) -> MaestroResult<()> {
        if worker.id.trim().is_empty() {
            return Err(MaestroError::Registry("worker id must not be empty".to_string()));
        }
        if worker.max_load == 0 {
            return Err(MaestroError::Registry(format!(
                "worker '{}' must accept at least one unit of load",
                worker.id
            )));
        }

        let mut workers = self.workers.lock();
        if workers.iter().any(|w| w.id == worker.id) {
            return Err(MaestroError::Registry(format!(
                "worker '{}' is already registered",
                worker.id
            )));
        }
        worker.current_load = worker.current_load.min(worker.max_load);
        sync_status(&mut worker);
        info!(worker = %worker.id, role = %worker.role, max_load = worker.max_load, "Worker registered");
        workers.push(worker);
        Ok(())
    }

    /// Available workers whose capabilities intersect `required`, best first.
    ///
    /// Ranked ascending by [`Worker::effective_score`]. Read-only.
    pub fn find_candidates(&self, required: &BTreeSet<String>) -> Vec<Worker> {
        let workers = self.workers.lock();
        rank(&workers, required).into_iter().cloned().collect()
    }

    /// Select up to `max` candidates and reserve one unit on each, atomically.
    pub fn reserve_candidates(&self, required: &BTreeSet<String>, max: usize) -> Vec<Worker> {
        let mut workers = self.workers.lock();
        let chosen: Vec<String> = rank(&workers, required)
            .into_iter()
            .take(max)
            .map(|w| w.id.clone())
            .collect();

        let mut reserved = Vec::with_capacity(chosen.len());
        for id in &chosen {
            if let Some(worker) = workers.iter_mut().find(|w| &w.id == id) {
                worker.current_load += 1;
                sync_status(worker);
                debug!(worker = %worker.id, load = worker.current_load, "Worker reserved");
                reserved.push(worker.clone());
            }
        }
        reserved
    }

    /// Add `n` units of load. Fails without side effects if that would exceed
    /// `max_load` or the worker is offline.
    pub fn reserve(&self, id: &str, n: u32) -> MaestroResult<()> {
        let mut workers = self.workers.lock();
        let worker = find_mut(&mut workers, id)?;
        if worker.status == WorkerStatus::Offline {
            return Err(MaestroError::Registry(format!("worker '{id}' is offline")));
        }
        let next = worker.current_load.saturating_add(n);
        if next > worker.max_load {
            return Err(MaestroError::Registry(format!(
                "worker '{id}' is at capacity ({}/{})",
                worker.current_load, worker.max_load
            )));
        }
        worker.current_load = next;
        sync_status(worker);
        debug!(worker = %id, load = next, "Worker reserved");
        Ok(())
    }

    /// Reserve one unit on the first worker in `ids` (in the given order) that
    /// can handle `required` and has spare capacity. Returns its ID.
    pub fn try_reserve_first<S: AsRef<str>>(&self, ids: &[String], required: &[S]) -> Option<String> {
        let mut workers = self.workers.lock();
        for id in ids {
            let Some(worker) = workers.iter_mut().find(|w| &w.id == id) else {
                continue;
            };
            if worker.is_available() && worker.can_handle(required) {
                worker.current_load += 1;
                sync_status(worker);
                debug!(worker = %id, load = worker.current_load, "Worker reserved");
                return Some(id.clone());
            }
        }
        None
    }

    /// Remove `n` units of load, never going below zero, and wake waiters.
    pub fn release(&self, id: &str, n: u32) -> MaestroResult<()> {
        {
            let mut workers = self.workers.lock();
            let worker = find_mut(&mut workers, id)?;
            if n > worker.current_load {
                warn!(
                    worker = %id,
                    load = worker.current_load,
                    requested = n,
                    "Release exceeds current load, clamping to zero"
                );
            }
            worker.current_load = worker.current_load.saturating_sub(n);
            sync_status(worker);
            debug!(worker = %id, load = worker.current_load, "Worker released");
        }
        self.released.notify_waiters();
        Ok(())
    }

    /// Take a worker out of rotation. Its current load is kept.
    ///
    /// Waiters are woken so they can stop waiting on this worker.
    pub fn set_offline(&self, id: &str) -> MaestroResult<()> {
        {
            let mut workers = self.workers.lock();
            let worker = find_mut(&mut workers, id)?;
            worker.status = WorkerStatus::Offline;
            info!(worker = %id, "Worker offline");
        }
        self.released.notify_waiters();
        Ok(())
    }

    /// Put an offline worker back into rotation.
    pub fn set_online(&self, id: &str) -> MaestroResult<()> {
        {
            let mut workers = self.workers.lock();
            let worker = find_mut(&mut workers, id)?;
            worker.status = WorkerStatus::Idle;
            sync_status(worker);
            info!(worker = %id, "Worker online");
        }
        self.released.notify_waiters();
        Ok(())
    }

    /// Snapshot of one worker.
    pub fn get(&self, id: &str) -> Option<Worker> {
        self.workers.lock().iter().find(|w| w.id == id).cloned()
    }

    /// Snapshot of every worker, in registration order.
    pub fn workers(&self) -> Vec<Worker> {
        self.workers.lock().clone()
    }

    /// Number of registered workers.
    pub fn len(&self) -> usize {
        self.workers.lock().len()
    }

    /// Whether no worker is registered.
    pub fn is_empty(&self) -> bool {
        self.workers.lock().is_empty()
    }

    /// Future that resolves on the next release or status change.
    ///
    /// Create it before checking capacity so a release in between is not missed.
    pub fn released(&self) -> Notified<'_> {
        self.released.notified()
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn find_mut<'a>(workers: &'a mut [Worker], id: &str) -> MaestroResult<&'a mut Worker> {
    workers
        .iter_mut()
        .find(|w| w.id == id)
        .ok_or_else(|| MaestroError::Registry(format!("unknown worker '{id}'")))
}

fn rank<'a>(workers: &'a [Worker], required: &BTreeSet<String>) -> Vec<&'a Worker> {
    let mut candidates: Vec<&Worker> = workers
        .iter()
        .filter(|w| w.is_available())
        .filter(|w| !w.capabilities.is_disjoint(required))
        .collect();
    // stable: equal scores keep registration order
    candidates.sort_by_key(|w| w.effective_score());
    candidates
}

/// busy iff load > 0, unless the worker is offline.
fn sync_status(worker: &mut Worker) {
    if worker.status == WorkerStatus::Offline {
        return;
    }
    worker.status = if worker.current_load > 0 {
        WorkerStatus::Busy
    } else {
        WorkerStatus::Idle
    };
}
