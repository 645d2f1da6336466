//! An [`arc_swap::ArcSwap`]-based cell
//!
//! [`ArcCell`] holds a value that readers borrow atomically and writers replace as a whole with a
//! single pointer swap. Readers never observe a half-written value: they see either the previous
//! value or the new one.

use std::{ops::Deref, sync::Arc};

use arc_swap::{
    ArcSwapAny, Guard as InnerGuard,
    strategy::{DefaultStrategy, Strategy},
};

/// An utility to use an [`Arc`] similarly to a cell
///
/// # Invariants
/// The inner [`Arc`] is inaccessible outside this cell: values are only ever borrowed through a
/// [`Guard`] and replaced through [`ArcCell::store`].
pub(crate) struct ArcCell<T, S: Strategy<Arc<T>> = DefaultStrategy>(ArcSwapAny<Arc<T>, S>);

impl<T: std::fmt::Debug, S: Strategy<Arc<T>>> std::fmt::Debug for ArcCell<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ArcCell").field(&self.0).finish()
    }
}

impl<T> ArcCell<T> {
    /// Construct a new [`ArcCell`]
    pub(crate) fn new(data: T) -> Self {
        Self(ArcSwapAny::new(Arc::new(data)))
    }
}

impl<T, S: Strategy<Arc<T>>> ArcCell<T, S> {
    /// Provides a temporary borrow of the object inside.
    ///
    /// Behaves the same as [`InnerGuard`], except it doesn't expose the inner [`Arc`] to avoid
    /// cheap clones
    pub(crate) fn load(&self) -> Guard<T, S> {
        Guard(self.0.load())
    }

    /// Publishes `new` to every subsequent [`ArcCell::load`] in one atomic operation.
    ///
    /// Outstanding guards keep borrowing the previous value until they are dropped.
    pub(crate) fn store(&self, new: T) {
        self.0.store(Arc::new(new));
    }
}

/// Guard for [`ArcCell`]
///
/// Enforces the [`ArcCell`] invariants by ensuring the inner [`Arc`] is not accessible
pub(crate) struct Guard<T, S: Strategy<Arc<T>> = DefaultStrategy>(InnerGuard<Arc<T>, S>);

impl<T, S: Strategy<Arc<T>>> Deref for Guard<T, S> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.0.deref().deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_replaces_for_new_readers_only() {
        let cell = ArcCell::new(vec![1, 2, 3]);

        let before = cell.load();
        cell.store(vec![4]);
        let after = cell.load();

        assert_eq!(*before, vec![1, 2, 3]);
        assert_eq!(*after, vec![4]);
    }
}
