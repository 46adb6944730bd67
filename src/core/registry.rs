//! # Worker registry: in-flight bookkeeping and admission.
//!
//! The registry tracks one [`WorkerHandle`] per spawned worker unit. It is
//! owned exclusively by the dispatcher's control task, so it needs no locks.
//!
//! ## Rules
//! - A handle is registered when the worker is spawned and **pruned as soon
//!   as its ack request is processed** — the registry never grows beyond the
//!   number of in-flight deliveries, even under sustained load.
//! - Admission is capped by `max_in_flight` (`0` = unlimited); a rejected
//!   delivery is the caller's responsibility to Nack.
//! - An empty registry is the drain-completion condition during shutdown.

use std::collections::HashMap;

/// Execution status of a worker unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Handler invocation in progress.
    Running,
    /// Handler succeeded; Ack submitted.
    Completed,
    /// Handler failed or panicked; Nack submitted.
    Failed,
}

/// Bookkeeping entry for one spawned worker unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerHandle {
    /// Worker id, unique within this dispatcher.
    pub id: u64,
    /// Delivery tag the worker is processing.
    pub tag: u64,
    /// Current status.
    pub status: WorkerStatus,
}

/// Registry of in-flight worker units.
pub struct WorkerRegistry {
    workers: HashMap<u64, WorkerHandle>,
    next_id: u64,
    limit: Option<usize>,
}

impl WorkerRegistry {
    /// Creates a registry with the given admission limit (`None` = unlimited).
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            workers: HashMap::new(),
            next_id: 0,
            limit,
        }
    }

    /// Admits a new worker for the given delivery tag.
    ///
    /// Returns the assigned worker id, or `None` when the in-flight cap is
    /// reached (spawn rejection; the delivery must be Nacked with requeue).
    pub fn admit(&mut self, tag: u64) -> Option<u64> {
        if let Some(limit) = self.limit {
            if self.workers.len() >= limit {
                return None;
            }
        }
        self.next_id += 1;
        let id = self.next_id;
        self.workers.insert(
            id,
            WorkerHandle {
                id,
                tag,
                status: WorkerStatus::Running,
            },
        );
        Some(id)
    }

    /// Marks the worker terminal and prunes its handle.
    ///
    /// Called by the control task while processing the worker's ack request;
    /// returns the pruned handle, or `None` for an unknown id.
    pub fn settle(&mut self, id: u64, status: WorkerStatus) -> Option<WorkerHandle> {
        debug_assert_ne!(status, WorkerStatus::Running);
        let mut handle = self.workers.remove(&id)?;
        handle.status = status;
        Some(handle)
    }

    /// Number of in-flight workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// True when no workers are in flight (drain complete).
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// `worker=<id> tag=<tag>` labels of in-flight workers, sorted by id.
    ///
    /// Used to report stuck workers when the drain window is exceeded.
    pub fn stuck_labels(&self) -> Vec<String> {
        let mut handles: Vec<&WorkerHandle> = self.workers.values().collect();
        handles.sort_unstable_by_key(|h| h.id);
        handles
            .into_iter()
            .map(|h| format!("worker={} tag={}", h.id, h.tag))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_assigns_unique_ids() {
        let mut reg = WorkerRegistry::new(None);
        let a = reg.admit(10).unwrap();
        let b = reg.admit(11).unwrap();
        assert_ne!(a, b);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn admission_cap_rejects_and_frees_on_settle() {
        let mut reg = WorkerRegistry::new(Some(1));
        let id = reg.admit(1).unwrap();
        assert!(reg.admit(2).is_none());

        let handle = reg.settle(id, WorkerStatus::Completed).unwrap();
        assert_eq!(handle.tag, 1);
        assert_eq!(handle.status, WorkerStatus::Completed);
        assert!(reg.admit(2).is_some());
    }

    #[test]
    fn settle_prunes_promptly() {
        let mut reg = WorkerRegistry::new(None);
        for tag in 0..100 {
            let id = reg.admit(tag).unwrap();
            reg.settle(id, WorkerStatus::Completed);
        }
        assert!(reg.is_empty());
    }

    #[test]
    fn stuck_labels_sorted_by_id() {
        let mut reg = WorkerRegistry::new(None);
        reg.admit(7);
        reg.admit(9);
        assert_eq!(
            reg.stuck_labels(),
            vec!["worker=1 tag=7".to_string(), "worker=2 tag=9".to_string()]
        );
    }
}
