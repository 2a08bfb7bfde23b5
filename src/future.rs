// vim: tw=80
//! The async variant: same matching, registry, and consumption semantics,
//! but invocation returns a lazy future.  Nothing is recorded or consumed
//! until the future is polled, and resolution is synchronous once it is.

use std::{
    collections::HashMap,
    convert::Infallible,
    fmt,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

use crate::{
    AnyMock, ArgMatcher, Expectation, ExpectMock, NoExpectationForCall,
    UnusedCallsError, UnusedExpectation,
};

/// A mock for asynchronous callables.
///
/// [`call`](Self::call) returns a [`CallFuture`] without touching the call
/// log or the expectation registry; awaiting it performs the match-and-
/// consume step and yields the configured outcome.  Like
/// [`ExpectMagicMock`](crate::ExpectMagicMock), any name yields a lazily
/// created child, so nested chains return further async mocks until a
/// terminal call is awaited.
pub struct AsyncExpectMock<A, R, E = Infallible> {
    mock: ExpectMock<A, R, E>,
    children: Mutex<HashMap<String, Box<dyn AnyMock>>>,
}

impl<A, R, E> Default for AsyncExpectMock<A, R, E> {
    fn default() -> Self {
        AsyncExpectMock::named("AsyncExpectMock")
    }
}

impl<A, R, E> AsyncExpectMock<A, R, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named<S: Into<String>>(name: S) -> Self {
        AsyncExpectMock {
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

    /// Get or create the async child mock registered under `name`.
    pub fn child<A2, R2, E2>(&self, name: &str)
        -> Arc<AsyncExpectMock<A2, R2, E2>>
        where A2: PartialEq + fmt::Debug + Send + Sync + 'static,
              R2: Clone + Send + Sync + 'static,
              E2: Clone + Send + Sync + 'static
    {
        let mut children = self.children.lock().unwrap();
        let entry = children.entry(name.to_string()).or_insert_with(|| {
            let path = format!("{}.{}", self.mock.name(), name);
            Box::new(Arc::new(AsyncExpectMock::<A2, R2, E2>::named(path)))
        });
        match entry.downcast_ref::<Arc<AsyncExpectMock<A2, R2, E2>>>() {
            Ok(child) => Arc::clone(child),
            Err(_) => panic!(
                "{}.{}: child was created with a different signature",
                self.mock.name(), name),
        }
    }
}

impl<A, R, E> AsyncExpectMock<A, R, E>
    where A: PartialEq + fmt::Debug, R: Clone, E: Clone
{
    /// Record and resolve the call at await time, panicking if no live
    /// expectation matches.  The returned future does no work until polled.
    pub fn call(&self, args: Vec<A>) -> CallFuture<'_, A, R, E> {
        CallFuture { mock: &self.mock, args: Some(args) }
    }

    /// Non-panicking form of [`call`](Self::call): awaiting the returned
    /// future yields [`NoExpectationForCall`] instead of panicking.
    pub fn try_call(&self, args: Vec<A>) -> TryCallFuture<'_, A, R, E> {
        TryCallFuture { mock: &self.mock, args: Some(args) }
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

impl<A, R, E> AnyMock for Arc<AsyncExpectMock<A, R, E>>
    where A: PartialEq + fmt::Debug + Send + Sync + 'static,
          R: Clone + Send + Sync + 'static,
          E: Clone + Send + Sync + 'static
{
    fn unused_expectations(&self) -> Vec<UnusedExpectation> {
        AsyncExpectMock::unused_expectations(self)
    }
}

/// The pending result of [`AsyncExpectMock::call`].  Matching and
/// consumption happen at first poll, not at creation.
pub struct CallFuture<'a, A, R, E> {
    mock: &'a ExpectMock<A, R, E>,
    args: Option<Vec<A>>,
}

// Not self-referential, so movable after pinning regardless of `A`.
impl<A, R, E> Unpin for CallFuture<'_, A, R, E> {}

impl<A, R, E> Future for CallFuture<'_, A, R, E>
    where A: PartialEq + fmt::Debug, R: Clone, E: Clone
{
    type Output = Result<R, E>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>)
        -> Poll<Self::Output>
    {
        let this = self.get_mut();
        let args = this.args.take()
            .expect("CallFuture polled after completion");
        Poll::Ready(this.mock.call(args))
    }
}

/// The pending result of [`AsyncExpectMock::try_call`].
pub struct TryCallFuture<'a, A, R, E> {
    mock: &'a ExpectMock<A, R, E>,
    args: Option<Vec<A>>,
}

impl<A, R, E> Unpin for TryCallFuture<'_, A, R, E> {}

impl<A, R, E> Future for TryCallFuture<'_, A, R, E>
    where A: PartialEq + fmt::Debug, R: Clone, E: Clone
{
    type Output = Result<Result<R, E>, NoExpectationForCall>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>)
        -> Poll<Self::Output>
    {
        let this = self.get_mut();
        let args = this.args.take()
            .expect("TryCallFuture polled after completion");
        Poll::Ready(this.mock.try_call(args))
    }
}
