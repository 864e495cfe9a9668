//  Helpers shared by the unit tests.

use std::{cell::Cell, rc::Rc};

/// Counts the number of `Tracked` values dropped.
#[derive(Clone, Debug, Default)]
pub(crate) struct DropCounter(Rc<Cell<usize>>);

impl DropCounter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self) -> usize {
        self.0.get()
    }

    pub(crate) fn track(&self, value: &str) -> Tracked {
        Tracked {
            value: String::from(value),
            counter: self.clone(),
        }
    }
}

//  Why a String?
//
//  Using a String is the cheapest way to ensure that the destructor is properly called: Miri will error out with
//  a memory leak if it is not.
#[derive(Debug)]
pub(crate) struct Tracked {
    pub(crate) value: String,
    counter: DropCounter,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.counter.0.set(self.counter.0.get() + 1);
    }
}
