//! Reference counters.

use core::{cell::Cell, fmt};

/// A reference counter.
///
/// A freshly created counter has a count of 0.
///
/// #   Safety
///
/// -   Accounting: `increment` and `decrement` faithfully add or remove exactly one from the count, and `count`
///     returns the current count. Owning pointers rely on this to decide when to drop or deallocate.
pub unsafe trait Counter {
    /// Creates a counter with a count of 0.
    fn new() -> Self;

    /// Increments the count, returning the new count.
    fn increment(&self) -> usize;

    /// Decrements the count, returning the new count.
    ///
    /// The count SHALL be greater than 0 prior to the call.
    fn decrement(&self) -> usize;

    /// Returns the current count.
    fn count(&self) -> usize;
}

/// A plain, non-atomic, counter.
pub struct SimpleCounter {
    count: Cell<usize>,
}

//  Safety:
//  -   Accounting: properly counted.
unsafe impl Counter for SimpleCounter {
    #[inline(always)]
    fn new() -> Self {
        let count = Cell::new(0);

        Self { count }
    }

    #[inline(always)]
    fn increment(&self) -> usize {
        let count = self.count.get() + 1;
        self.count.set(count);

        count
    }

    #[inline(always)]
    fn decrement(&self) -> usize {
        debug_assert!(self.count.get() > 0);

        let count = self.count.get() - 1;
        self.count.set(count);

        count
    }

    #[inline(always)]
    fn count(&self) -> usize {
        self.count.get()
    }
}

//  A copy of an object does not share the references to the original.
impl Clone for SimpleCounter {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl Default for SimpleCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SimpleCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_tuple("SimpleCounter").field(&self.count.get()).finish()
    }
}

// mod tests
