//! Errors from the library.

use thiserror::Error;

/// Error returned when promoting a `WeakPtr` whose object has already been dropped.
///
/// Only strict promotions, such as `WeakPtr::upgrade` or `EnableSharedFromThis::shared_from_this`, report this error.
/// `WeakPtr::lock` returns an empty `SharedPtr` instead.
#[derive(Clone, Copy, Debug, Default, Eq, Error, Hash, PartialEq)]
#[error("bad weak pointer: the object has already been dropped")]
pub struct ExpiredError;
