// vim: tw=80
//! Patch bindings and the per-test fixture.
//!
//! Code under test reaches its mockable collaborators through named
//! [`MockSlot`]s.  Patching is an explicit scoped resource: installing a
//! mock captures the slot's previous value, and the fixture restores every
//! active binding, in reverse creation order, at teardown.

use std::{
    fmt,
    mem,
    sync::{Arc, Mutex},
    thread,
};

use crate::{
    AnyMock, AsyncExpectMock, ExpectMock, SharedAsyncExpectMock,
    SharedExpectMagicMock, SharedExpectMock, UnusedCallsError,
};
use crate::magic::ExpectMagicMock;

/// A named, process-global slot holding the current stand-in for one
/// callable.  This is the crate's rendition of "set the attribute at this
/// dotted path, returning the previous value".
///
/// `new` is `const`, so slots are normally `static`s named after the thing
/// they stand in for.  Concurrent tests must not patch the same slot; the
/// slot cannot enforce that.
pub struct MockSlot<M> {
    name: &'static str,
    current: Mutex<Option<M>>,
}

impl<M> MockSlot<M> {
    pub const fn new(name: &'static str) -> Self {
        MockSlot { name, current: Mutex::new(None) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The currently installed value, if any.
    pub fn try_get(&self) -> Option<M>
        where M: Clone
    {
        self.current.lock().unwrap().clone()
    }

    /// The currently installed value; panics if the slot is not patched.
    pub fn get(&self) -> M
        where M: Clone
    {
        self.try_get()
            .unwrap_or_else(|| panic!("{}: slot is not patched", self.name))
    }

    fn replace(&self, value: Option<M>) -> Option<M> {
        mem::replace(&mut *self.current.lock().unwrap(), value)
    }
}

/// Somewhere a mock can be installed for the duration of a test.
///
/// `install` replaces the target's current value and returns the thunk that
/// restores the captured previous value.  The fixture treats targets
/// opaquely through this trait.
pub trait PatchTarget {
    type Mock;

    fn name(&self) -> &str;

    fn install(&self, mock: Self::Mock) -> Box<dyn FnOnce() + Send>;
}

impl<M: Send + 'static> PatchTarget for &'static MockSlot<M> {
    type Mock = M;

    fn name(&self) -> &str {
        self.name
    }

    fn install(&self, mock: M) -> Box<dyn FnOnce() + Send> {
        let slot: &'static MockSlot<M> = *self;
        let previous = slot.replace(Some(mock));
        Box::new(move || {
            slot.replace(previous);
        })
    }
}

struct PatchBinding {
    mock: Box<dyn AnyMock>,
    /// None for tracked freestanding mocks, which have nothing to restore.
    restore: Option<Box<dyn FnOnce() + Send>>,
    ignore_unused_calls: bool,
}

/// Tracks every mock created for one test: patch bindings with their
/// restore thunks, plus freestanding mocks registered for verification.
///
/// Dropping the fixture runs teardown: verification first, against the
/// still-patched state, then restoration of every active binding.  A
/// verification failure panics unless the test body is already panicking,
/// so both failures stay visible to the test runner.
#[derive(Default)]
pub struct ExpectMockFixture {
    bindings: Vec<PatchBinding>,
}

impl ExpectMockFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a fresh [`ExpectMock`] named after the slot and return it for
    /// expectation configuration.  The slot's previous value is restored by
    /// [`stop_all`](Self::stop_all) or at teardown.
    pub fn patch<A, R, E>(&mut self,
        slot: &'static MockSlot<SharedExpectMock<A, R, E>>)
        -> SharedExpectMock<A, R, E>
        where A: PartialEq + fmt::Debug + Send + Sync + 'static,
              R: Clone + Send + Sync + 'static,
              E: Clone + Send + Sync + 'static
    {
        self.bind(slot, false, |name| Arc::new(ExpectMock::named(name)))
    }

    /// Like [`patch`](Self::patch), but the binding is skipped by
    /// unused-outcome verification.
    pub fn patch_ignoring_unused<A, R, E>(&mut self,
        slot: &'static MockSlot<SharedExpectMock<A, R, E>>)
        -> SharedExpectMock<A, R, E>
        where A: PartialEq + fmt::Debug + Send + Sync + 'static,
              R: Clone + Send + Sync + 'static,
              E: Clone + Send + Sync + 'static
    {
        self.bind(slot, true, |name| Arc::new(ExpectMock::named(name)))
    }

    /// Install a fresh [`AsyncExpectMock`] named after the slot.
    pub fn patch_async<A, R, E>(&mut self,
        slot: &'static MockSlot<SharedAsyncExpectMock<A, R, E>>)
        -> SharedAsyncExpectMock<A, R, E>
        where A: PartialEq + fmt::Debug + Send + Sync + 'static,
              R: Clone + Send + Sync + 'static,
              E: Clone + Send + Sync + 'static
    {
        self.bind(slot, false, |name| Arc::new(AsyncExpectMock::named(name)))
    }

    /// Like [`patch_async`](Self::patch_async), but the binding is skipped
    /// by unused-outcome verification.
    pub fn patch_async_ignoring_unused<A, R, E>(&mut self,
        slot: &'static MockSlot<SharedAsyncExpectMock<A, R, E>>)
        -> SharedAsyncExpectMock<A, R, E>
        where A: PartialEq + fmt::Debug + Send + Sync + 'static,
              R: Clone + Send + Sync + 'static,
              E: Clone + Send + Sync + 'static
    {
        self.bind(slot, true, |name| Arc::new(AsyncExpectMock::named(name)))
    }

    /// A freestanding [`ExpectMock`], not bound to any slot but still
    /// covered by end-of-test verification.
    pub fn mock<A, R, E>(&mut self, name: &str) -> SharedExpectMock<A, R, E>
        where A: PartialEq + fmt::Debug + Send + Sync + 'static,
              R: Clone + Send + Sync + 'static,
              E: Clone + Send + Sync + 'static
    {
        let mock = Arc::new(ExpectMock::named(name));
        self.track(Box::new(Arc::clone(&mock)));
        mock
    }

    /// A freestanding [`ExpectMagicMock`] covered by end-of-test
    /// verification.
    pub fn magic_mock<A, R, E>(&mut self, name: &str)
        -> SharedExpectMagicMock<A, R, E>
        where A: PartialEq + fmt::Debug + Send + Sync + 'static,
              R: Clone + Send + Sync + 'static,
              E: Clone + Send + Sync + 'static
    {
        let mock = Arc::new(ExpectMagicMock::named(name));
        self.track(Box::new(Arc::clone(&mock)));
        mock
    }

    /// A freestanding [`AsyncExpectMock`] covered by end-of-test
    /// verification.
    pub fn async_mock<A, R, E>(&mut self, name: &str)
        -> SharedAsyncExpectMock<A, R, E>
        where A: PartialEq + fmt::Debug + Send + Sync + 'static,
              R: Clone + Send + Sync + 'static,
              E: Clone + Send + Sync + 'static
    {
        let mock = Arc::new(AsyncExpectMock::named(name));
        self.track(Box::new(Arc::clone(&mock)));
        mock
    }

    fn bind<T>(&mut self, target: T, ignore_unused_calls: bool,
               make: impl FnOnce(&str) -> T::Mock) -> T::Mock
        where T: PatchTarget, T::Mock: AnyMock + Clone
    {
        let mock = make(target.name());
        let restore = target.install(mock.clone());
        self.bindings.push(PatchBinding {
            mock: Box::new(mock.clone()),
            restore: Some(restore),
            ignore_unused_calls,
        });
        mock
    }

    fn track(&mut self, mock: Box<dyn AnyMock>) {
        self.bindings.push(PatchBinding {
            mock,
            restore: None,
            ignore_unused_calls: false,
        });
    }

    /// Fail if any active, non-ignored binding still holds non-always
    /// expectations with unconsumed outcomes.  All violations are collected
    /// into one [`UnusedCallsError`].
    pub fn check_for_unused_mock_calls(&self) -> Result<(), UnusedCallsError> {
        let unused: Vec<_> = self.bindings.iter()
            .filter(|b| !b.ignore_unused_calls)
            .flat_map(|b| b.mock.unused_expectations())
            .collect();
        if unused.is_empty() {
            Ok(())
        } else {
            Err(UnusedCallsError::new(unused))
        }
    }

    /// Restore every active patch to its previous value, in reverse creation
    /// order, and forget all bindings.  Idempotent.
    pub fn stop_all(&mut self) {
        while let Some(mut binding) = self.bindings.pop() {
            if let Some(restore) = binding.restore.take() {
                restore();
            }
        }
    }
}

impl Drop for ExpectMockFixture {
    fn drop(&mut self) {
        // Verify against the still-patched state, then restore.
        let verification = self.check_for_unused_mock_calls();
        self.stop_all();
        if let Err(e) = verification {
            if !thread::panicking() {
                panic!("{}", e);
            }
        }
    }
}
