//! Round-robin view schedule for the stochastic policy.

use tracing::{Level, event};

/// Deterministic cyclic schedule choosing one view per call.
///
/// `schedule[i] = i % num_views` for `i < num_steps`; calls beyond
/// `num_steps` wrap around so repeated sampler passes keep cycling.
#[derive(Debug, Clone)]
pub struct StochasticSelector {
    schedule: Vec<usize>,
    counter: usize,
}

impl StochasticSelector {
    /// Both counts must be at least one.
    pub fn new(num_views: usize, num_steps: usize) -> Self {
        if num_views > num_steps {
            event!(
                target: "multiview::stochastic",
                Level::WARN,
                num_views = num_views as u64,
                num_steps = num_steps as u64,
                "number of views is greater than number of steps; some views will not be selected in one pass"
            );
        }
        let schedule = (0..num_steps).map(|step| step % num_views).collect();
        Self {
            schedule,
            counter: 0,
        }
    }

    pub fn schedule(&self) -> &[usize] {
        &self.schedule
    }

    pub fn calls(&self) -> usize {
        self.counter
    }

    pub fn next_view(&mut self) -> usize {
        let view = self.schedule[self.counter % self.schedule.len()];
        self.counter += 1;
        view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_with_schedule_length() {
        let mut selector = StochasticSelector::new(3, 5);
        let views: Vec<usize> = (0..12).map(|_| selector.next_view()).collect();
        assert_eq!(views, vec![0, 1, 2, 0, 1, 0, 1, 2, 0, 1, 0, 1]);
        assert_eq!(selector.calls(), 12);
    }

    #[test]
    fn same_counts_give_same_order() {
        let mut a = StochasticSelector::new(4, 9);
        let mut b = StochasticSelector::new(4, 9);
        for _ in 0..20 {
            assert_eq!(a.next_view(), b.next_view());
        }
    }

    #[test]
    fn more_views_than_steps_still_selects() {
        let mut selector = StochasticSelector::new(5, 2);
        assert_eq!(selector.schedule(), &[0, 1]);
        let views: Vec<usize> = (0..4).map(|_| selector.next_view()).collect();
        assert_eq!(views, vec![0, 1, 0, 1]);
    }

    #[test]
    fn single_view_always_selects_zero() {
        let mut selector = StochasticSelector::new(1, 3);
        assert!((0..7).all(|_| selector.next_view() == 0));
    }
}
