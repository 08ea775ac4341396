use std::cell::RefCell;
use std::rc::Rc;

/// Advisory sink notified of the active view before each underlying call.
pub trait ViewObserver {
    fn set_view(&mut self, view_index: usize);
}

impl<T: ViewObserver + ?Sized> ViewObserver for Rc<RefCell<T>> {
    fn set_view(&mut self, view_index: usize) {
        self.borrow_mut().set_view(view_index);
    }
}

impl<T: ViewObserver + ?Sized> ViewObserver for Box<T> {
    fn set_view(&mut self, view_index: usize) {
        (**self).set_view(view_index);
    }
}

/// Observer that records every notified view in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewTrace {
    views: Vec<usize>,
}

impl ViewTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn views(&self) -> &[usize] {
        &self.views
    }

    /// Drain the recorded views, leaving the trace empty.
    pub fn take(&mut self) -> Vec<usize> {
        std::mem::take(&mut self.views)
    }

    /// Number of notifications per view id, indexed by view.
    pub fn coverage(&self, num_views: usize) -> Vec<usize> {
        let mut counts = vec![0usize; num_views];
        for &view in &self.views {
            if let Some(slot) = counts.get_mut(view) {
                *slot += 1;
            }
        }
        counts
    }
}

impl ViewObserver for ViewTrace {
    fn set_view(&mut self, view_index: usize) {
        self.views.push(view_index);
    }
}
