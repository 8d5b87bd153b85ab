//! Location-partitioned work queue.
//!
//! Tasks are grouped by location in first-appearance order. A partition only
//! hands out work after [`TaskQueue::expose`] (called once the location switch
//! has settled), and every claim marks the task under the partition's lock so
//! no task is handed out twice, even across worker threads.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use storescan_core::{LocationCode, ScanTask};
use tokio_util::sync::CancellationToken;

struct Entry {
    task: ScanTask,
    claimed: bool,
}

struct Partition {
    location: LocationCode,
    entries: Vec<Entry>,
    exposed: bool,
}

impl Partition {
    fn claim_next(&mut self) -> Option<ScanTask> {
        let entry = self.entries.iter_mut().find(|entry| !entry.claimed)?;
        entry.claimed = true;
        Some(entry.task.clone())
    }

    fn unclaimed(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.claimed).count()
    }
}

/// Per-run task queue.
pub struct TaskQueue {
    partitions: Vec<Mutex<Partition>>,
    index: HashMap<LocationCode, usize>,
    stop: CancellationToken,
    total: usize,
}

impl TaskQueue {
    /// Partition `tasks` by location, keeping first-appearance order.
    #[must_use]
    pub fn new(tasks: Vec<ScanTask>, stop: CancellationToken) -> Self {
        let total = tasks.len();
        let mut grouped: Vec<Partition> = Vec::new();
        let mut index = HashMap::new();

        for task in tasks {
            let slot = *index.entry(task.location_code.clone()).or_insert_with(|| {
                grouped.push(Partition {
                    location: task.location_code.clone(),
                    entries: Vec::new(),
                    exposed: false,
                });
                grouped.len() - 1
            });
            grouped[slot].entries.push(Entry {
                task,
                claimed: false,
            });
        }

        Self {
            partitions: grouped.into_iter().map(Mutex::new).collect(),
            index,
            stop,
            total,
        }
    }

    /// Number of tasks in the run.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Locations in processing order.
    #[must_use]
    pub fn locations(&self) -> Vec<LocationCode> {
        self.partitions
            .iter()
            .map(|partition| {
                partition
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .location
                    .clone()
            })
            .collect()
    }

    /// Number of tasks in a location's partition.
    #[must_use]
    pub fn partition_len(&self, location: &LocationCode) -> usize {
        self.with_partition(location, |p| p.entries.len())
            .unwrap_or(0)
    }

    /// Number of tasks not yet claimed in a partition.
    #[must_use]
    pub fn unclaimed(&self, location: &LocationCode) -> usize {
        self.with_partition(location, |p| p.unclaimed())
            .unwrap_or(0)
    }

    /// Open a partition to claims. Returns `false` for unknown locations.
    pub fn expose(&self, location: &LocationCode) -> bool {
        self.with_partition(location, |p| p.exposed = true).is_some()
    }

    /// Claim the next unclaimed task of `location`.
    ///
    /// `None` when the partition is exhausted or not exposed, or when the
    /// stop flag is set.
    pub fn claim_next(&self, location: &LocationCode) -> Option<ScanTask> {
        if self.stop.is_cancelled() {
            return None;
        }
        self.with_partition(location, |p| {
            if p.exposed {
                p.claim_next()
            } else {
                None
            }
        })
        .flatten()
    }

    /// Claim every remaining task of `location` at once, e.g. to record the
    /// partition as failed when its switch did not settle.
    pub fn drain_unclaimed(&self, location: &LocationCode) -> Vec<ScanTask> {
        self.with_partition(location, |p| {
            std::iter::from_fn(|| p.claim_next()).collect()
        })
        .unwrap_or_default()
    }

    fn with_partition<T>(
        &self,
        location: &LocationCode,
        f: impl FnOnce(&mut Partition) -> T,
    ) -> Option<T> {
        let slot = *self.index.get(location)?;
        let mut partition = self.partitions[slot]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Some(f(&mut partition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use storescan_core::ItemId;

    fn task(location: &str, item: &str) -> ScanTask {
        ScanTask::new(
            LocationCode::new(location).expect("valid location"),
            ItemId::new(item).expect("valid item"),
            format!("Item {item}"),
        )
    }

    fn code(location: &str) -> LocationCode {
        LocationCode::new(location).expect("valid location")
    }

    #[test]
    fn test_partitions_keep_first_appearance_order() {
        let queue = TaskQueue::new(
            vec![task("B", "1"), task("A", "2"), task("B", "3")],
            CancellationToken::new(),
        );
        assert_eq!(queue.locations(), vec![code("B"), code("A")]);
        assert_eq!(queue.partition_len(&code("B")), 2);
        assert_eq!(queue.total(), 3);
    }

    #[test]
    fn test_poisoned_partition_is_still_listed_and_claimable() {
        let queue = TaskQueue::new(
            vec![task("A", "1"), task("B", "2"), task("B", "3")],
            CancellationToken::new(),
        );
        std::thread::scope(|scope| {
            let worker = scope.spawn(|| {
                let _guard = queue.partitions[1].lock().expect("partition lock");
                panic!("worker died holding the partition");
            });
            assert!(worker.join().is_err());
        });
        assert!(queue.partitions[1].is_poisoned());

        assert_eq!(queue.locations(), vec![code("A"), code("B")]);
        assert!(queue.expose(&code("B")));
        assert_eq!(queue.claim_next(&code("B")), Some(task("B", "2")));
        assert_eq!(queue.drain_unclaimed(&code("B")), vec![task("B", "3")]);
    }

    #[test]
    fn test_claims_require_exposure() {
        let queue = TaskQueue::new(vec![task("A", "1")], CancellationToken::new());
        assert!(queue.claim_next(&code("A")).is_none());
        assert!(queue.expose(&code("A")));
        assert_eq!(queue.claim_next(&code("A")), Some(task("A", "1")));
        assert!(queue.claim_next(&code("A")).is_none());
        assert!(!queue.expose(&code("Z")));
    }

    #[test]
    fn test_stop_flag_blocks_claims() {
        let stop = CancellationToken::new();
        let queue = TaskQueue::new(vec![task("A", "1")], stop.clone());
        queue.expose(&code("A"));
        stop.cancel();
        assert!(queue.claim_next(&code("A")).is_none());
        assert_eq!(queue.unclaimed(&code("A")), 1);
    }

    #[test]
    fn test_drain_unclaimed() {
        let queue = TaskQueue::new(
            vec![task("A", "1"), task("A", "2"), task("A", "3")],
            CancellationToken::new(),
        );
        queue.expose(&code("A"));
        let first = queue.claim_next(&code("A"));
        assert!(first.is_some());

        let drained = queue.drain_unclaimed(&code("A"));
        assert_eq!(drained, vec![task("A", "2"), task("A", "3")]);
        assert_eq!(queue.unclaimed(&code("A")), 0);
        assert!(queue.drain_unclaimed(&code("A")).is_empty());
    }

    #[test]
    fn test_empty_location_is_unknown() {
        let queue = TaskQueue::new(Vec::new(), CancellationToken::new());
        assert!(queue.locations().is_empty());
        assert!(queue.claim_next(&code("A")).is_none());
        assert_eq!(queue.partition_len(&code("A")), 0);
    }

    #[test]
    fn test_concurrent_claims_are_exactly_once() {
        let tasks: Vec<ScanTask> = (0..500).map(|i| task("A", &format!("I{i}"))).collect();
        let queue = Arc::new(TaskQueue::new(tasks, CancellationToken::new()));
        queue.expose(&code("A"));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    let mut claimed = Vec::new();
                    while let Some(task) = queue.claim_next(&code("A")) {
                        claimed.push(task.item_id);
                    }
                    claimed
                })
            })
            .collect();

        let mut all = Vec::new();
        for worker in workers {
            all.extend(worker.join().expect("worker thread"));
        }
        let unique: HashSet<_> = all.iter().cloned().collect();
        assert_eq!(all.len(), 500);
        assert_eq!(unique.len(), 500);
    }
}
