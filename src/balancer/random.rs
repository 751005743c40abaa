//! Random balancing strategy.

use std::sync::Arc;

use crate::balancer::Balancer;
use crate::registry::WorkerRecord;

/// Uniform choice among the live workers.
#[derive(Debug, Default)]
pub struct Random;

impl Random {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Balancer for Random {
    fn pick(&self, workers: &[Arc<WorkerRecord>]) -> Option<Arc<WorkerRecord>> {
        if workers.is_empty() {
            return None;
        }
        Some(workers[fastrand::usize(..workers.len())].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::WorkerRecord;
    use tokio::sync::mpsc;

    #[test]
    fn picks_a_live_worker() {
        let lb = Random::new();
        let workers: Vec<_> = (1..=3)
            .map(|i| Arc::new(WorkerRecord::for_test(i, mpsc::channel(1).0)))
            .collect();

        for _ in 0..50 {
            let picked = lb.pick(&workers).unwrap();
            assert!(workers.iter().any(|w| w.id() == picked.id()));
        }
    }

    #[test]
    fn empty_set_yields_none() {
        let lb = Random::new();
        assert!(lb.pick(&[]).is_none());
    }
}
