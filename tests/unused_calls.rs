// vim: tw=80
//! End-of-test verification: every non-always expectation must have all of
//! its outcomes consumed, and every violation is reported at once.
#![deny(warnings)]

use expectmock::{
    eq, ExpectMock, ExpectMockFixture, MockSlot, SharedExpectMock,
};

#[test]
fn leftover_outcomes_fail_verification() {
    static SLEEP: MockSlot<SharedExpectMock<u64, bool>> =
        MockSlot::new("unused.sleep");

    let mut fixture = ExpectMockFixture::new();
    let sleep = fixture.patch(&SLEEP);
    sleep.expect([eq(1)]).returns(true);
    sleep.expect([eq(2)]).returns(true);

    assert_eq!(SLEEP.get().call(vec![1]), Ok(true));

    let err = fixture.check_for_unused_mock_calls().unwrap_err();
    assert_eq!(err.unused().len(), 1);
    assert_eq!(err.unused()[0].target, "unused.sleep");
    assert_eq!(err.unused()[0].pattern, "(2)");
    assert_eq!(err.unused()[0].remaining, 1);

    // Consume the leftover so teardown passes.
    assert_eq!(SLEEP.get().call(vec![2]), Ok(true));
}

#[test]
fn all_violations_are_aggregated_across_bindings() {
    static A: MockSlot<SharedExpectMock<u64, bool>> =
        MockSlot::new("unused.a");
    static B: MockSlot<SharedExpectMock<u64, bool>> =
        MockSlot::new("unused.b");

    let mut fixture = ExpectMockFixture::new();
    let a = fixture.patch(&A);
    let b = fixture.patch(&B);
    a.expect([eq(1)]).returns(true).returns(false);
    b.expect([eq(2)]).returns(true);

    let err = fixture.check_for_unused_mock_calls().unwrap_err();
    let targets: Vec<&str> =
        err.unused().iter().map(|u| u.target.as_str()).collect();
    assert_eq!(targets, ["unused.a", "unused.b"]);
    assert_eq!(err.unused()[0].remaining, 2);
    let message = err.to_string();
    assert!(message.contains("unused.a((1)): 2 outcome(s)"), "{}", message);
    assert!(message.contains("unused.b((2)): 1 outcome(s)"), "{}", message);

    // Leave nothing behind for teardown.
    assert_eq!(A.get().call(vec![1]), Ok(true));
    assert_eq!(A.get().call(vec![1]), Ok(false));
    assert_eq!(B.get().call(vec![2]), Ok(true));
}

#[test]
fn ignored_bindings_are_exempt() {
    static SLEEP: MockSlot<SharedExpectMock<u64, bool>> =
        MockSlot::new("unused.ignored");

    let mut fixture = ExpectMockFixture::new();
    let sleep = fixture.patch_ignoring_unused(&SLEEP);
    sleep.expect([eq(1)]).returns(true);
    sleep.expect([eq(2)]).returns(true);

    assert_eq!(SLEEP.get().call(vec![1]), Ok(true));
    fixture.check_for_unused_mock_calls().unwrap();
}

#[test]
fn fully_consumed_expectations_pass() {
    static SLEEP: MockSlot<SharedExpectMock<u64, bool>> =
        MockSlot::new("unused.consumed");

    let mut fixture = ExpectMockFixture::new();
    let sleep = fixture.patch(&SLEEP);
    sleep.expect([eq(1)]).returns(true).returns(false);

    assert_eq!(SLEEP.get().call(vec![1]), Ok(true));
    assert_eq!(SLEEP.get().call(vec![1]), Ok(false));
    fixture.check_for_unused_mock_calls().unwrap();
}

#[test]
fn freestanding_tracked_mocks_are_verified_too() {
    let mut fixture = ExpectMockFixture::new();
    let mock: SharedExpectMock<u64, bool> = fixture.mock("helper");
    mock.expect([eq(1)]).returns(true);

    let err = fixture.check_for_unused_mock_calls().unwrap_err();
    assert_eq!(err.unused()[0].target, "helper");

    assert_eq!(mock.call(vec![1]), Ok(true));
    fixture.check_for_unused_mock_calls().unwrap();
}

#[test]
fn stopped_bindings_are_no_longer_checked() {
    static SLEEP: MockSlot<SharedExpectMock<u64, bool>> =
        MockSlot::new("unused.stopped");

    let mut fixture = ExpectMockFixture::new();
    let sleep = fixture.patch(&SLEEP);
    sleep.expect([eq(1)]).returns(true);

    fixture.stop_all();
    fixture.check_for_unused_mock_calls().unwrap();
}

#[test]
#[should_panic(expected = "outcome(s) never consumed")]
fn teardown_panics_on_leftover_outcomes() {
    static SLEEP: MockSlot<SharedExpectMock<u64, bool>> =
        MockSlot::new("unused.teardown");

    let mut fixture = ExpectMockFixture::new();
    let sleep = fixture.patch(&SLEEP);
    sleep.expect([eq(1)]).returns(true);
    // Never called; dropping the fixture verifies and panics.
}

#[test]
fn mock_level_verification_matches_fixture_behavior() {
    let mock = ExpectMock::<u64, bool>::new();
    mock.expect([eq(1)]).returns(true);

    assert!(mock.check_for_unused_mock_calls().is_err());
    assert_eq!(mock.call(vec![1]), Ok(true));
    mock.check_for_unused_mock_calls().unwrap();
}
