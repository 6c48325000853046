//! Scheduling contract for deferred flushes.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

/// Handle returned by [`Scheduler::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

impl TaskHandle {
    #[inline(always)]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline(always)]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Runs callbacks at some later point.
pub trait Scheduler {
    fn run(&self, task: Box<dyn FnOnce()>) -> TaskHandle;

    /// Cancel a task that has not run yet. Unknown handles are ignored.
    fn cancel(&self, handle: TaskHandle);
}

/// FIFO queue drained manually, standing in for a microtask checkpoint.
#[derive(Default)]
pub struct MicrotaskQueue {
    next_id: Cell<u64>,
    tasks: RefCell<VecDeque<(TaskHandle, Box<dyn FnOnce()>)>>,
}

impl MicrotaskQueue {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Run tasks until the queue is empty, including tasks queued while
    /// draining. Returns how many ran.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.tasks.borrow_mut().pop_front();
            let Some((_, task)) = next else {
                break;
            };
            task();
            ran += 1;
        }
        ran
    }
}

impl Scheduler for MicrotaskQueue {
    fn run(&self, task: Box<dyn FnOnce()>) -> TaskHandle {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let handle = TaskHandle::new(id);
        self.tasks.borrow_mut().push_back((handle, task));
        handle
    }

    fn cancel(&self, handle: TaskHandle) {
        self.tasks.borrow_mut().retain(|(h, _)| *h != handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_runs_in_order() {
        let queue = MicrotaskQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            queue.run(Box::new(move || log.borrow_mut().push(i)));
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.drain(), 3);
        assert_eq!(*log.borrow(), [0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_cancel() {
        let queue = MicrotaskQueue::new();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let handle = queue.run(Box::new(move || h.set(h.get() + 1)));
        queue.cancel(handle);
        assert_eq!(queue.drain(), 0);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_tasks_queued_while_draining() {
        let queue = MicrotaskQueue::new();
        let hits = Rc::new(Cell::new(0));
        let (q, h) = (queue.clone(), hits.clone());
        queue.run(Box::new(move || {
            let h2 = h.clone();
            q.run(Box::new(move || h2.set(h2.get() + 1)));
            h.set(h.get() + 1);
        }));
        assert_eq!(queue.drain(), 2);
        assert_eq!(hits.get(), 2);
    }
}
