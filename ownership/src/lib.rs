//! Single-threaded owning pointers, with explicit control over the lifecycle of their memory blocks.
//!
//! #   Available pointers
//!
//! -   `UniquePtr<T, D>`: the sole owner of a heap object, disposed of by the deleter `D`. With a stateless deleter,
//!     the pointer is no larger than a raw pointer.
//! -   `UniqueArray<T>`: the sole owner of a heap array, with indexed access.
//! -   `SharedPtr<T>`: one of many owners of a heap object, coordinating through a control block.
//! -   `WeakPtr<T>`: an observer of a heap object owned by `SharedPtr`s, which can be promoted back while the object
//!     is alive.
//! -   `IntrusivePtr<T>`: one of many owners of a heap object which embeds its own reference count.
//!
//! A type embedding a `SelfWeak<Self>` and implementing `EnableSharedFromThis` may hand out `SharedPtr` and `WeakPtr`
//! to itself, once it has been wrapped by one of the `SharedPtr::*_enabled*` factories.
//!
//! #   Control block
//!
//! All `SharedPtr` and `WeakPtr` sharing an object coordinate through a control block, which counts:
//!
//! -   The strong count: the number of `SharedPtr`. The object is dropped when it reaches 0.
//! -   The weak count: the number of `WeakPtr`. The control block is deallocated once both counts reach 0.
//!
//! The control block comes in two flavors:
//!
//! ```txt
//! Separate (from_raw, from_box):          Inline (new, new_with, try_new_with):
//!
//! +--------+---------+---------+          +--------+------------------+
//! | header | pointer | deleter |          | header |      value       |
//! +--------+---------+---------+          +--------+------------------+
//!              |
//!              v
//!          +-------+
//!          | value |
//!          +-------+
//! ```
//!
//! #   Threading
//!
//! None of the counters are atomic: `SharedPtr`, `WeakPtr`, and `IntrusivePtr` are neither `Send` nor `Sync`.

//  Use only core, with `alloc` for the heap.
#![cfg_attr(not(test), no_std)]
//  Lints
#![deny(unsafe_op_in_unsafe_fn)]
#![deny(missing_docs)]

//  Non-core must be explicitly depended on in no_std.
extern crate alloc;

mod block;
mod counter;
mod deleter;
mod error;
mod from_this;
mod intrusive;
mod pair;
mod shared;
mod unique;
mod weak;

#[cfg(test)]
mod testing;

pub use counter::{Counter, SimpleCounter};
pub use deleter::{ArrayDelete, DefaultDelete, Deleter};
pub use error::ExpiredError;
pub use from_this::{EnableSharedFromThis, SelfWeak};
pub use intrusive::{IntrusivePtr, RefCount, RefCounted};
pub use pair::CompressedPair;
pub use shared::SharedPtr;
pub use unique::{UniqueArray, UniquePtr};
pub use weak::WeakPtr;

pub(crate) use block::{BlockRef, InlineBlock, SeparateBlock};
