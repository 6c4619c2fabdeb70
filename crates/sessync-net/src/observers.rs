//! Ordered observer registries.
//!
//! Each notification the client raises has its own [`Observers`] list. Callbacks
//! run in registration order on the thread that drains the event queue.

use std::fmt;

/// Handle returned by [`Observers::add`], used to remove the callback again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// An ordered list of callbacks taking `&A`.
pub struct Observers<A: ?Sized> {
    next_id: u64,
    entries: Vec<(ObserverId, Box<dyn FnMut(&A)>)>,
}

impl<A: ?Sized> Observers<A> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    /// Register a callback. It runs after every callback added before it.
    pub fn add(&mut self, callback: impl FnMut(&A) + 'static) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, Box::new(callback)));
        id
    }

    /// Remove a callback. Returns `false` if `id` was not registered.
    pub fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: ObserverId) -> bool {
        self.entries.iter().any(|(entry, _)| *entry == id)
    }

    /// Remove every callback.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invoke every callback with `arg`, in registration order.
    pub fn notify(&mut self, arg: &A) {
        for (_, callback) in &mut self.entries {
            callback(arg);
        }
    }
}

impl<A: ?Sized> Default for Observers<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: ?Sized> fmt::Debug for Observers<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("len", &self.entries.len())
            .finish()
    }
}
