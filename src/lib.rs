// vim: tw=80
//! An ordered call-expectation engine for test doubles.
//!
//! Expectmock lets a test register a queue of expected invocations against a
//! callable stand-in, then enforces that the stand-in is invoked exactly as
//! expected, in order, and that nothing registered was left unconsumed at the
//! end of the test.
//!
//! The basic idea is always the same:
//! * Create an [`ExpectMock`] (or patch one into a [`MockSlot`] with an
//!   [`ExpectMockFixture`]).
//! * Register expectations on it with [`expect`](ExpectMock::expect).  Each
//!   expectation has an argument pattern of exact values and wildcards, and a
//!   queue of outcomes to replay, configured with
//!   [`returns`](Expectation::returns) and [`raises`](Expectation::raises).
//! * Supply the mock to the code under test.  Every call consumes the next
//!   outcome of the first matching expectation.  A call that matches no live
//!   expectation panics (or surfaces [`NoExpectationForCall`] through
//!   [`try_call`](ExpectMock::try_call)).
//! * Verification, run explicitly or by the fixture's teardown, fails with
//!   [`UnusedCallsError`] if any expectation still has unconsumed outcomes.
//!
//! # Getting started
//! ```
//! use expectmock::{eq, ExpectMock};
//!
//! let mock = ExpectMock::<&str, i32>::new();
//! mock.expect([eq("a")]).returns(1).returns(2);
//!
//! assert_eq!(mock.call(vec!["a"]).unwrap(), 1);
//! assert_eq!(mock.call(vec!["a"]).unwrap(), 2);
//! ```
//!
//! Once every configured outcome has been consumed, the next matching call
//! finds no live expectation and panics:
//!
//! ```should_panic
//! # use expectmock::{eq, ExpectMock};
//! let mock = ExpectMock::<&str, i32>::new();
//! mock.expect([eq("a")]).returns(1);
//!
//! assert_eq!(mock.call(vec!["a"]).unwrap(), 1);
//! let _ = mock.call(vec!["a"]);   // Panics!
//! ```
//!
//! # Failure outcomes
//!
//! An outcome is either a value to return or a failure to raise.  Failures
//! propagate to the caller exactly as configured, unwrapped:
//!
//! ```
//! use expectmock::{eq, ExpectMock};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Unreachable;
//!
//! let mock = ExpectMock::<&str, u32, Unreachable>::new();
//! mock.expect([eq("host")]).raises(Unreachable).returns(7);
//!
//! assert_eq!(mock.call(vec!["host"]), Err(Unreachable));
//! assert_eq!(mock.call(vec!["host"]), Ok(7));
//! ```
//!
//! # Matching arguments
//!
//! A pattern position is either an exact value compared with `==`, or a
//! wildcard that matches any single argument.  Pattern length must equal the
//! call's argument count.  On a call, all expectations are evaluated in
//! registration order and the first matching one with outcomes remaining is
//! used:
//!
//! ```
//! use expectmock::{any, eq, ExpectMock};
//!
//! let mock = ExpectMock::<i32, i32>::new();
//! mock.expect([eq(1), any()]).returns(10);
//! mock.expect([any(), any()]).returns(20);
//!
//! assert_eq!(mock.call(vec![1, 99]).unwrap(), 10);
//! assert_eq!(mock.call(vec![2, 99]).unwrap(), 20);
//! ```
//!
//! # Always expectations
//!
//! [`always`](Expectation::always) marks an expectation as replayable: its
//! outcomes are never used up, and it is exempt from unused-outcome
//! verification.
//!
//! ```
//! use expectmock::{any, ExpectMock};
//!
//! let mock = ExpectMock::<u64, u64>::new();
//! mock.expect([any()]).returns(15).always();
//!
//! assert_eq!(mock.call(vec![1]).unwrap(), 15);
//! assert_eq!(mock.call(vec![2]).unwrap(), 15);
//! ```
//!
//! # Patching and verification
//!
//! Code under test reaches its collaborators through named [`MockSlot`]s.  An
//! [`ExpectMockFixture`] installs fresh mocks into slots, restores them at
//! teardown, and verifies that no expectation was left unconsumed:
//!
//! ```
//! use expectmock::{eq, ExpectMockFixture, MockSlot, SharedExpectMock};
//!
//! static SLEEP: MockSlot<SharedExpectMock<u64, bool>> =
//!     MockSlot::new("time::sleep");
//!
//! fn nap(secs: u64) -> bool {
//!     SLEEP.get().call(vec![secs]).unwrap()
//! }
//!
//! let mut fixture = ExpectMockFixture::new();
//! let sleep = fixture.patch(&SLEEP);
//! sleep.expect([eq(1)]).returns(true);
//!
//! assert!(nap(1));
//! ```
//!
//! # Attribute-access and async variants
//!
//! [`ExpectMagicMock`] supports drilling into nested call chains: any name
//! lazily yields a child mock with its own registry and call log.
//! [`AsyncExpectMock`] has the same matching semantics but its call returns a
//! lazy future; nothing is recorded or consumed until the future is awaited.
//!
//! ```
//! use expectmock::{eq, AsyncExpectMock};
//! use futures::executor::block_on;
//!
//! let mock = AsyncExpectMock::<&str, i32>::new();
//! mock.expect([eq("a")]).returns(10);
//!
//! let pending = mock.call(vec!["a"]);     // nothing consumed yet
//! assert_eq!(block_on(pending).unwrap(), 10);
//! ```

use std::{
    collections::VecDeque,
    convert::Infallible,
    fmt,
    sync::{Arc, Mutex},
};

use downcast::{downcast, Any};
use predicates::reflection::{Case, PredicateReflection, Product};
use predicates_tree::CaseTreeExt;
use thiserror::Error;

mod fixture;
mod future;
mod magic;

pub use crate::fixture::{ExpectMockFixture, MockSlot, PatchTarget};
pub use crate::future::{AsyncExpectMock, CallFuture, TryCallFuture};
pub use crate::magic::ExpectMagicMock;
pub use predicates::prelude::Predicate;

/// A shared handle to an [`ExpectMock`], as returned by the fixture.
pub type SharedExpectMock<A, R, E = Infallible> = Arc<ExpectMock<A, R, E>>;
/// A shared handle to an [`ExpectMagicMock`].
pub type SharedExpectMagicMock<A, R, E = Infallible> =
    Arc<ExpectMagicMock<A, R, E>>;
/// A shared handle to an [`AsyncExpectMock`].
pub type SharedAsyncExpectMock<A, R, E = Infallible> =
    Arc<AsyncExpectMock<A, R, E>>;

/// Object-safe view of any mock type, used for type-erased storage in child
/// caches and fixture bindings.
#[doc(hidden)]
pub trait AnyMock: Any + Send + Sync {
    #[doc(hidden)]
    fn unused_expectations(&self) -> Vec<UnusedExpectation>;
}
downcast!(dyn AnyMock);

/// A call arrived that matched no live expectation: either nothing was ever
/// registered for its arguments, or every matching expectation is exhausted.
#[derive(Debug, Error)]
#[error("{name}({args}): No matching expectation found{detail}")]
pub struct NoExpectationForCall {
    name: String,
    args: String,
    detail: String,
}

impl NoExpectationForCall {
    /// Name of the mock that received the call.
    pub fn mock_name(&self) -> &str {
        &self.name
    }

    /// The call's arguments, rendered.
    pub fn args(&self) -> &str {
        &self.args
    }
}

/// One expectation that still holds unconsumed outcomes at verification time.
#[derive(Clone, Debug)]
pub struct UnusedExpectation {
    /// Name of the mock (dot-joined path for nested children).
    pub target: String,
    /// The expectation's argument pattern, rendered.
    pub pattern: String,
    /// How many configured outcomes were never consumed.
    pub remaining: usize,
}

impl fmt::Display for UnusedExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}): {} outcome(s) never consumed",
               self.target, self.pattern, self.remaining)
    }
}

fn render_unused(unused: &[UnusedExpectation]) -> String {
    unused.iter()
        .map(|u| format!("\n    {}", u))
        .collect::<Vec<_>>()
        .concat()
}

/// One or more non-always expectations still held unconsumed outcomes when
/// verification ran.  Every unmet expectation is listed, so a test author can
/// fix all of them in one run.
#[derive(Debug, Error)]
#[error("expectation(s) with unused outcomes:{}", render_unused(.0))]
pub struct UnusedCallsError(Vec<UnusedExpectation>);

impl UnusedCallsError {
    pub(crate) fn new(unused: Vec<UnusedExpectation>) -> Self {
        UnusedCallsError(unused)
    }

    /// Every unmet expectation, in binding then registration order.
    pub fn unused(&self) -> &[UnusedExpectation] {
        &self.0
    }
}

/// A single position of an argument pattern: an exact value or a wildcard.
#[derive(Clone, Debug)]
pub enum ArgMatcher<A> {
    /// Matches one argument by equality.
    Eq(A),
    /// Matches any single argument value.
    Any,
}

impl<A: PartialEq> ArgMatcher<A> {
    fn matches(&self, arg: &A) -> bool {
        match self {
            ArgMatcher::Eq(value) => value == arg,
            ArgMatcher::Any => true,
        }
    }
}

impl<A: fmt::Debug> fmt::Display for ArgMatcher<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgMatcher::Eq(value) => write!(f, "{:?}", value),
            ArgMatcher::Any => write!(f, "_"),
        }
    }
}

/// Match one argument exactly, by equality.
pub fn eq<A>(value: A) -> ArgMatcher<A> {
    ArgMatcher::Eq(value)
}

/// Match any single argument value.
pub fn any<A>() -> ArgMatcher<A> {
    ArgMatcher::Any
}

/// An ordered argument pattern, one matcher per expected positional argument.
///
/// A pattern matches a call iff it has exactly as many positions as the call
/// has arguments and every position matches.  `Pattern` implements
/// [`Predicate`] over argument slices, which is also how mismatches are
/// rendered into error messages.
#[derive(Clone, Debug)]
pub struct Pattern<A>(Vec<ArgMatcher<A>>);

impl<A> Pattern<A> {
    pub fn new(matchers: Vec<ArgMatcher<A>>) -> Self {
        Pattern(matchers)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<A: fmt::Debug> fmt::Display for Pattern<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> =
            self.0.iter().map(|m| m.to_string()).collect();
        write!(f, "({})", rendered.join(", "))
    }
}

impl<A: PartialEq + fmt::Debug> PredicateReflection for Pattern<A> {}

impl<A: PartialEq + fmt::Debug> Predicate<[A]> for Pattern<A> {
    fn eval(&self, args: &[A]) -> bool {
        args.len() == self.0.len() &&
            self.0.iter().zip(args).all(|(m, a)| m.matches(a))
    }

    fn find_case<'a>(&'a self, expected: bool, args: &[A])
        -> Option<Case<'a>>
    {
        if self.eval(args) != expected {
            return None;
        }
        let mut case = Case::new(Some(self), expected);
        if !expected {
            if args.len() != self.0.len() {
                case = case
                    .add_product(Product::new("pattern length", self.0.len()))
                    .add_product(Product::new("argument count", args.len()));
            } else {
                for (i, (m, a)) in self.0.iter().zip(args).enumerate() {
                    if !m.matches(a) {
                        case = case.add_product(Product::new(
                            format!("argument {}", i),
                            format!("expected {}, got {:?}", m, a),
                        ));
                    }
                }
            }
        }
        Some(case)
    }
}

/// A configured result: a value to return or a failure to raise.
#[derive(Clone, Debug)]
enum Outcome<R, E> {
    Value(R),
    Failure(E),
}

struct ExpectationState<R, E> {
    outcomes: VecDeque<Outcome<R, E>>,
    always: bool,
    consumed: usize,
}

/// A single registered call pattern with its queue of outcomes.
///
/// Created by [`ExpectMock::expect`]; configured by chaining
/// [`returns`](Expectation::returns), [`raises`](Expectation::raises), and
/// [`always`](Expectation::always).
pub struct Expectation<A, R, E = Infallible> {
    pattern: Pattern<A>,
    state: Mutex<ExpectationState<R, E>>,
}

impl<A, R, E> Expectation<A, R, E> {
    fn new(pattern: Pattern<A>) -> Self {
        Expectation {
            pattern,
            state: Mutex::new(ExpectationState {
                outcomes: VecDeque::new(),
                always: false,
                consumed: 0,
            }),
        }
    }

    /// Append a value to return for the next matching call.
    pub fn returns(&self, value: R) -> &Self {
        self.state.lock().unwrap().outcomes.push_back(Outcome::Value(value));
        self
    }

    /// Append a failure to raise at the next matching call.  The failure is
    /// propagated to the caller exactly as configured.
    pub fn raises(&self, failure: E) -> &Self {
        self.state.lock().unwrap().outcomes
            .push_back(Outcome::Failure(failure));
        self
    }

    /// Mark this expectation as always-replay: its outcomes are never used
    /// up, and it is exempt from unused-outcome verification.
    ///
    /// With several chained outcomes, calls still advance through them in
    /// order; once a single outcome remains, that one replays indefinitely.
    pub fn always(&self) -> &Self {
        self.state.lock().unwrap().always = true;
        self
    }

    /// The argument pattern this expectation was registered under.
    pub fn pattern(&self) -> &Pattern<A> {
        &self.pattern
    }

    /// Has this expectation been marked always-replay?
    pub fn is_always(&self) -> bool {
        self.state.lock().unwrap().always
    }

    /// How many outcomes have been consumed so far.
    pub fn times_consumed(&self) -> usize {
        self.state.lock().unwrap().consumed
    }

    fn matches(&self, args: &[A]) -> bool
        where A: PartialEq + fmt::Debug
    {
        self.pattern.eval(args)
    }

    /// Can this expectation still serve a call?  Exhausted non-always
    /// expectations have an empty queue; always expectations never drop
    /// below one outcome.
    fn has_capacity(&self) -> bool {
        !self.state.lock().unwrap().outcomes.is_empty()
    }

    fn remaining(&self) -> usize {
        self.state.lock().unwrap().outcomes.len()
    }

    fn consume(&self) -> Result<R, E>
        where R: Clone, E: Clone
    {
        let mut state = self.state.lock().unwrap();
        state.consumed += 1;
        let outcome = if state.always && state.outcomes.len() == 1 {
            state.outcomes.front().cloned().unwrap()
        } else {
            state.outcomes.pop_front().unwrap()
        };
        match outcome {
            Outcome::Value(value) => Ok(value),
            Outcome::Failure(failure) => Err(failure),
        }
    }
}

struct MockState<A, R, E> {
    expectations: Vec<Arc<Expectation<A, R, E>>>,
    calls: Vec<Vec<A>>,
}

/// The callable stand-in: records every call and resolves it against its
/// registered expectations in registration order.
///
/// `A` is the argument type (a call is a `Vec<A>`), `R` the return type, and
/// `E` the failure type raised by [`raises`](Expectation::raises) outcomes
/// (defaulting to [`Infallible`] for mocks that never fail).
pub struct ExpectMock<A, R, E = Infallible> {
    name: String,
    state: Mutex<MockState<A, R, E>>,
}

impl<A, R, E> Default for ExpectMock<A, R, E> {
    fn default() -> Self {
        ExpectMock::named("ExpectMock")
    }
}

impl<A, R, E> ExpectMock<A, R, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock whose name appears in every panic and error message.
    pub fn named<S: Into<String>>(name: S) -> Self {
        ExpectMock {
            name: name.into(),
            state: Mutex::new(MockState {
                expectations: Vec::new(),
                calls: Vec::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a new expectation for the given argument pattern and return
    /// it for outcome configuration.
    ///
    /// Among expectations whose patterns match the same call, the first
    /// registered one with outcomes remaining wins.
    pub fn expect<P>(&self, pattern: P) -> Arc<Expectation<A, R, E>>
        where P: IntoIterator<Item = ArgMatcher<A>>
    {
        let e = Arc::new(Expectation::new(
            Pattern::new(pattern.into_iter().collect())));
        self.state.lock().unwrap().expectations.push(Arc::clone(&e));
        e
    }

    /// How many times this mock has been called.
    pub fn times_called(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }
}

impl<A, R, E> ExpectMock<A, R, E>
    where A: PartialEq + fmt::Debug, R: Clone, E: Clone
{
    /// Record the call and resolve it against the registered expectations.
    ///
    /// Returns the consumed outcome, or [`NoExpectationForCall`] if no live
    /// expectation matches the arguments.
    pub fn try_call(&self, args: Vec<A>)
        -> Result<Result<R, E>, NoExpectationForCall>
    {
        let mut guard = self.state.lock().unwrap();
        guard.calls.push(args);
        let state = &*guard;
        let args = state.calls.last().unwrap().as_slice();
        for e in &state.expectations {
            if e.has_capacity() && e.matches(args) {
                return Ok(e.consume());
            }
        }
        Err(self.no_expectation(args, &state.expectations))
    }

    /// Like [`try_call`](Self::try_call), but panics if no live expectation
    /// matches.  This is the surface used in place of the real callable.
    pub fn call(&self, args: Vec<A>) -> Result<R, E> {
        match self.try_call(args) {
            Ok(result) => result,
            Err(e) => panic!("{}", e),
        }
    }

    /// Panic unless the call log contains `expected`, in order, as a
    /// contiguous subsequence.
    pub fn assert_has_calls(&self, expected: &[Vec<A>]) {
        if expected.is_empty() {
            return;
        }
        let state = self.state.lock().unwrap();
        let found = state.calls.windows(expected.len())
            .any(|window| window == expected);
        assert!(found,
            "{}: expected calls {:?} not found in call log {:?}",
            self.name, expected, state.calls);
    }

    /// A snapshot of every call made so far, in invocation order.
    pub fn calls(&self) -> Vec<Vec<A>>
        where A: Clone
    {
        self.state.lock().unwrap().calls.clone()
    }

    /// Fail if any non-always expectation still has unconsumed outcomes.
    pub fn check_for_unused_mock_calls(&self) -> Result<(), UnusedCallsError> {
        let unused = self.unused_expectations();
        if unused.is_empty() {
            Ok(())
        } else {
            Err(UnusedCallsError::new(unused))
        }
    }

    pub(crate) fn unused_expectations(&self) -> Vec<UnusedExpectation> {
        self.state.lock().unwrap().expectations.iter()
            .filter(|e| !e.is_always() && e.remaining() > 0)
            .map(|e| UnusedExpectation {
                target: self.name.clone(),
                pattern: e.pattern().to_string(),
                remaining: e.remaining(),
            })
            .collect()
    }

    fn no_expectation(&self, args: &[A],
                      expectations: &[Arc<Expectation<A, R, E>>])
        -> NoExpectationForCall
    {
        let rendered: Vec<String> =
            args.iter().map(|a| format!("{:?}", a)).collect();
        // An exhausted match is the likelier mistake; report it over a
        // pattern mismatch.
        let detail = expectations.iter()
            .find(|e| e.matches(args))
            .map(|e| format!(
                "\npattern {} matched, but all its outcomes were consumed",
                e.pattern()))
            .or_else(|| {
                expectations.iter()
                    .find(|e| e.pattern().len() == args.len())
                    .and_then(|e| e.pattern().find_case(false, args))
                    .map(|case| format!(
                        "\nclosest pattern did not match:\n{}", case.tree()))
            })
            .unwrap_or_default();
        NoExpectationForCall {
            name: self.name.clone(),
            args: rendered.join(", "),
            detail,
        }
    }
}

impl<A, R, E> AnyMock for Arc<ExpectMock<A, R, E>>
    where A: PartialEq + fmt::Debug + Send + Sync + 'static,
          R: Clone + Send + Sync + 'static,
          E: Clone + Send + Sync + 'static
{
    fn unused_expectations(&self) -> Vec<UnusedExpectation> {
        ExpectMock::unused_expectations(self)
    }
}
