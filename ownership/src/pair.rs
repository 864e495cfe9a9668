//! A pair which does not pay for its stateless halves.
//!
//! Zero-sized types occupy no storage within a struct, whatever their position. `CompressedPair` relies on this to
//! bundle a handle with its (typically stateless) deleter, and makes the decision queryable at compile-time.

use core::mem;

/// A pair of `F` and `S`, where either of the two, or both, may be stateless.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CompressedPair<F, S> {
    first: F,
    second: S,
}

impl<F, S> CompressedPair<F, S> {
    /// Creates a new pair.
    #[inline(always)]
    pub const fn new(first: F, second: S) -> Self {
        Self { first, second }
    }

    /// Returns whether `F` occupies no storage.
    #[inline(always)]
    pub const fn is_first_elided() -> bool {
        mem::size_of::<F>() == 0
    }

    /// Returns whether `S` occupies no storage.
    #[inline(always)]
    pub const fn is_second_elided() -> bool {
        mem::size_of::<S>() == 0
    }

    /// Returns a reference to the first element.
    #[inline(always)]
    pub const fn first(&self) -> &F {
        &self.first
    }

    /// Returns a mutable reference to the first element.
    #[inline(always)]
    pub fn first_mut(&mut self) -> &mut F {
        &mut self.first
    }

    /// Returns a reference to the second element.
    #[inline(always)]
    pub const fn second(&self) -> &S {
        &self.second
    }

    /// Returns a mutable reference to the second element.
    #[inline(always)]
    pub fn second_mut(&mut self) -> &mut S {
        &mut self.second
    }

    /// Returns mutable references to both elements at once.
    #[inline(always)]
    pub fn as_mut_parts(&mut self) -> (&mut F, &mut S) {
        (&mut self.first, &mut self.second)
    }

    /// Deconstructs the pair.
    #[inline(always)]
    pub fn into_parts(self) -> (F, S) {
        (self.first, self.second)
    }
}

impl<F, S> From<(F, S)> for CompressedPair<F, S> {
    fn from((first, second): (F, S)) -> Self {
        Self::new(first, second)
    }
}

// mod tests
