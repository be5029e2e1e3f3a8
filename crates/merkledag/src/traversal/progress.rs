use std::sync::Arc;

use cid::Cid;
use parking_lot::Mutex;

/// Records what a fetch is planning to retrieve.
///  Clones are handles onto the same tracker, so one can be
///  handed to a fetch while another is polled for progress.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    inner: Arc<Mutex<ProgressTrackerInner>>,
}

#[derive(Debug, Default)]
struct ProgressTrackerInner {
    total: usize,
    planned: Vec<Cid>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `cid` as planned for retrieval
    pub fn plan_to_pin(&self, cid: Cid) {
        let mut inner = self.inner.lock();
        inner.planned.push(cid);
        inner.total += 1;
    }

    /// Everything ever planned, including already popped ids
    pub fn total_to_pin(&self) -> usize {
        self.inner.lock().total
    }

    /// Drain the ids planned since the last call, oldest first
    pub fn pop_planned_to_pin(&self) -> Vec<Cid> {
        std::mem::take(&mut self.inner.lock().planned)
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::node::MutableNode;

    fn cid(i: u32) -> Cid {
        MutableNode::with_data(i.to_be_bytes().to_vec())
            .finalize()
            .unwrap()
            .cid()
    }

    #[test]
    fn test_pop_drains_in_order() {
        let tracker = ProgressTracker::new();
        for i in 0..3 {
            tracker.plan_to_pin(cid(i));
        }
        assert_eq!(tracker.pop_planned_to_pin(), vec![cid(0), cid(1), cid(2)]);
        assert!(tracker.pop_planned_to_pin().is_empty());

        tracker.plan_to_pin(cid(3));
        assert_eq!(tracker.total_to_pin(), 4);
        assert_eq!(tracker.pop_planned_to_pin(), vec![cid(3)]);
    }

    #[tokio::test]
    async fn test_concurrent_plan_and_pop() {
        let tracker = ProgressTracker::new();
        let producer = tracker.clone();

        let produce = tokio::spawn(async move {
            let mut planned = Vec::new();
            for i in 0..50 {
                let c = cid(i);
                producer.plan_to_pin(c);
                planned.push(c);
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            planned
        });

        let mut popped = Vec::new();
        while !produce.is_finished() {
            popped.extend(tracker.pop_planned_to_pin());
            tokio::time::sleep(Duration::from_millis(3)).await;
        }
        let planned = produce.await.unwrap();
        popped.extend(tracker.pop_planned_to_pin());

        assert_eq!(popped, planned);
        assert_eq!(tracker.total_to_pin(), 50);
    }
}
