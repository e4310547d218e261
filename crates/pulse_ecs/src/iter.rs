//! Lazy, cached, pull-based sequences.
//!
//! Query results are exposed through [`LazyIterator`] so consumers only pay
//! for the items they actually visit. Produced items are memoised: driving
//! the same iterator again replays the cached prefix in the same order
//! before resuming generation. It is a forward-only cache over a single
//! underlying scan, not a restartable generator.

use std::cell::{Cell, RefCell};

type Source<T> = Box<dyn FnMut() -> Option<T>>;

/// A restartable-free cached sequence pulled from a generator closure.
pub struct LazyIterator<T> {
    cache: RefCell<Vec<T>>,
    done: Cell<bool>,
    source: RefCell<Source<T>>,
}

impl<T: Clone> LazyIterator<T> {
    /// Wrap a generator closure. The closure is polled until it returns
    /// `None`, after which the sequence is considered complete.
    pub fn new(source: impl FnMut() -> Option<T> + 'static) -> Self {
        Self {
            cache: RefCell::new(Vec::new()),
            done: Cell::new(false),
            source: RefCell::new(Box::new(source)),
        }
    }

    /// Visit items in order, pulling from the generator as needed.
    ///
    /// The callback returns `false` to stop early; items produced so far
    /// stay cached, so a later `each` resumes from the start of the
    /// sequence without re-generating them.
    pub fn each(&self, mut cb: impl FnMut(&T) -> bool) {
        let mut index = 0;
        loop {
            let cached = {
                let cache = self.cache.borrow();
                cache.get(index).cloned()
            };
            if let Some(item) = cached {
                index += 1;
                if !cb(&item) {
                    return;
                }
                continue;
            }
            if self.done.get() {
                return;
            }
            // The borrow is confined so the callback may consult this
            // iterator again.
            let next = {
                let mut source = self.source.borrow_mut();
                (&mut *source)()
            };
            match next {
                Some(item) => {
                    self.cache.borrow_mut().push(item.clone());
                    index += 1;
                    if !cb(&item) {
                        return;
                    }
                }
                None => {
                    self.done.set(true);
                    return;
                }
            }
        }
    }

    /// First item satisfying the predicate, generating no further than it.
    pub fn find(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        let mut found = None;
        self.each(|item| {
            if predicate(item) {
                found = Some(item.clone());
                return false;
            }
            true
        });
        found
    }

    /// All items satisfying the predicate, in sequence order.
    pub fn filter(&self, mut predicate: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut out = Vec::new();
        self.each(|item| {
            if predicate(item) {
                out.push(item.clone());
            }
            true
        });
        out
    }

    /// Transform every item, in sequence order.
    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> Vec<U> {
        let mut out = Vec::new();
        self.each(|item| {
            out.push(f(item));
            true
        });
        out
    }
}
