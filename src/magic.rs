// vim: tw=80
//! The attribute-access variant: a mock whose named children are themselves
//! mocks, created lazily so tests can drill into nested call chains.

use std::{
    collections::HashMap,
    convert::Infallible,
    fmt,
    sync::{Arc, Mutex},
};

use crate::{
    AnyMock, ArgMatcher, Expectation, ExpectMock, NoExpectationForCall,
    UnusedCallsError, UnusedExpectation,
};

/// A callable mock that also supports drilling: [`child`](Self::child)
/// lazily creates and caches a nested mock under any name, with no
/// special-cased name list.
///
/// Each child owns its own expectation registry and call log; expectations
/// and verification are local to the specific path they were registered on.
/// Children may have a different call signature than their parent; the cache
/// is keyed by name, and re-accessing a name with a different signature
/// panics.
pub struct ExpectMagicMock<A, R, E = Infallible> {
    mock: ExpectMock<A, R, E>,
    children: Mutex<HashMap<String, Box<dyn AnyMock>>>,
}

impl<A, R, E> Default for ExpectMagicMock<A, R, E> {
    fn default() -> Self {
        ExpectMagicMock::named("ExpectMagicMock")
    }
}

impl<A, R, E> ExpectMagicMock<A, R, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named<S: Into<String>>(name: S) -> Self {
        ExpectMagicMock {
            mock: ExpectMock::named(name),
            children: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        self.mock.name()
    }

    /// Just like [`ExpectMock::expect`].
    pub fn expect<P>(&self, pattern: P) -> Arc<Expectation<A, R, E>>
        where P: IntoIterator<Item = ArgMatcher<A>>
    {
        self.mock.expect(pattern)
    }

    pub fn times_called(&self) -> usize {
        self.mock.times_called()
    }

    /// Get or create the child mock registered under `name`.
    ///
    /// The child is created on first access and cached; later accesses under
    /// the same name return the same mock.  Its name is the dot-joined path
    /// from the root, which is how it appears in error messages.
    pub fn child<A2, R2, E2>(&self, name: &str)
        -> Arc<ExpectMagicMock<A2, R2, E2>>
        where A2: PartialEq + fmt::Debug + Send + Sync + 'static,
              R2: Clone + Send + Sync + 'static,
              E2: Clone + Send + Sync + 'static
    {
        let mut children = self.children.lock().unwrap();
        let entry = children.entry(name.to_string()).or_insert_with(|| {
            let path = format!("{}.{}", self.mock.name(), name);
            Box::new(Arc::new(ExpectMagicMock::<A2, R2, E2>::named(path)))
        });
        match entry.downcast_ref::<Arc<ExpectMagicMock<A2, R2, E2>>>() {
            Ok(child) => Arc::clone(child),
            Err(_) => panic!(
                "{}.{}: child was created with a different signature",
                self.mock.name(), name),
        }
    }
}

impl<A, R, E> ExpectMagicMock<A, R, E>
    where A: PartialEq + fmt::Debug, R: Clone, E: Clone
{
    /// Just like [`ExpectMock::try_call`].
    pub fn try_call(&self, args: Vec<A>)
        -> Result<Result<R, E>, NoExpectationForCall>
    {
        self.mock.try_call(args)
    }

    /// Just like [`ExpectMock::call`].
    pub fn call(&self, args: Vec<A>) -> Result<R, E> {
        self.mock.call(args)
    }

    /// Just like [`ExpectMock::assert_has_calls`].
    pub fn assert_has_calls(&self, expected: &[Vec<A>]) {
        self.mock.assert_has_calls(expected)
    }

    /// Just like [`ExpectMock::calls`].
    pub fn calls(&self) -> Vec<Vec<A>>
        where A: Clone
    {
        self.mock.calls()
    }

    /// Fail if this mock or any of its children still holds non-always
    /// expectations with unconsumed outcomes.
    pub fn check_for_unused_mock_calls(&self) -> Result<(), UnusedCallsError> {
        let unused = self.unused_expectations();
        if unused.is_empty() {
            Ok(())
        } else {
            Err(UnusedCallsError::new(unused))
        }
    }

    pub(crate) fn unused_expectations(&self) -> Vec<UnusedExpectation> {
        let mut unused = self.mock.unused_expectations();
        for child in self.children.lock().unwrap().values() {
            unused.extend(child.unused_expectations());
        }
        unused
    }
}

impl<A, R, E> AnyMock for Arc<ExpectMagicMock<A, R, E>>
    where A: PartialEq + fmt::Debug + Send + Sync + 'static,
          R: Clone + Send + Sync + 'static,
          E: Clone + Send + Sync + 'static
{
    fn unused_expectations(&self) -> Vec<UnusedExpectation> {
        ExpectMagicMock::unused_expectations(self)
    }
}
