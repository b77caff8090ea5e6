//! Double-buffered work queue
//!
//! Producers push items from any thread; one consumer periodically calls
//! `update`, which swaps the buffers under a short lock and then processes
//! the batch, optionally sorted, without holding the producers up.

use std::cmp::Ordering;
use std::mem;
use std::sync::{Mutex, MutexGuard, PoisonError};

type OrderFn<T> = Box<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

pub struct UpdateQueue<T> {
    incoming: Mutex<Vec<T>>,
    /// Batch being processed; only touched inside `update`
    working: Mutex<Vec<T>>,
    order: Option<OrderFn<T>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> UpdateQueue<T> {
    pub fn new() -> Self {
        Self {
            incoming: Mutex::new(Vec::new()),
            working: Mutex::new(Vec::new()),
            order: None,
        }
    }

    /// Process each batch in the order given by `order` (stable sort)
    pub fn with_order<F>(mut self, order: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        self.order = Some(Box::new(order));
        self
    }

    pub fn push(&self, item: T) {
        lock(&self.incoming).push(item);
    }

    /// Items waiting for the next `update`
    pub fn pending(&self) -> usize {
        lock(&self.incoming).len()
    }

    /// Run `execute` on everything pushed since the previous update.
    ///
    /// Items pushed while the batch runs (also from inside `execute`) are
    /// kept for the next update. Returns the batch size.
    pub fn update(&self, mut execute: impl FnMut(T)) -> usize {
        let mut working = lock(&self.working);
        {
            let mut incoming = lock(&self.incoming);
            mem::swap(&mut *incoming, &mut *working);
        }

        if let Some(order) = &self.order {
            working.sort_by(|a, b| order(a, b));
        }

        let count = working.len();
        for item in working.drain(..) {
            execute(item);
        }
        count
    }
}

impl<T> Default for UpdateQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
