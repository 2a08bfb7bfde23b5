// vim: tw=80
//! Patching mocks into slots and restoring them at teardown.
//!
//! Each test uses its own slot: tests in one binary run concurrently, and
//! two tests patching one slot would race (a usage invariant of patching,
//! not something the fixture can enforce).
#![deny(warnings)]

use std::sync::Arc;

use expectmock::{
    any, eq, ExpectMock, ExpectMockFixture, MockSlot, PatchTarget,
    SharedAsyncExpectMock, SharedExpectMock,
};
use futures::executor::block_on;

#[test]
fn patched_slot_serves_the_mock() {
    static SLEEP: MockSlot<SharedExpectMock<u64, bool>> =
        MockSlot::new("time.sleep");
    fn nap(secs: u64) -> bool {
        SLEEP.get().call(vec![secs]).unwrap()
    }

    let mut fixture = ExpectMockFixture::new();
    let sleep = fixture.patch(&SLEEP);
    sleep.expect([eq(1)]).returns(true);

    assert!(nap(1));
}

#[test]
fn stop_all_restores_the_previous_value() {
    static SLOT: MockSlot<SharedExpectMock<u64, bool>> =
        MockSlot::new("example.slot");

    let original = Arc::new(ExpectMock::named("original"));
    original.expect([any()]).returns(false).always();
    // Install by hand; dropping the restore thunk leaves it in place.
    drop((&SLOT).install(Arc::clone(&original)));

    let mut fixture = ExpectMockFixture::new();
    let patched = fixture.patch(&SLOT);
    patched.expect([eq(1)]).returns(true);

    assert_eq!(SLOT.get().call(vec![1]), Ok(true));
    fixture.stop_all();
    assert!(Arc::ptr_eq(&SLOT.get(), &original));
    assert_eq!(SLOT.get().call(vec![1]), Ok(false));
}

#[test]
fn stop_all_is_idempotent() {
    static SLOT: MockSlot<SharedExpectMock<u64, bool>> =
        MockSlot::new("example.idempotent");

    let mut fixture = ExpectMockFixture::new();
    let patched = fixture.patch(&SLOT);
    patched.expect([eq(1)]).returns(true);
    assert_eq!(SLOT.get().call(vec![1]), Ok(true));

    fixture.stop_all();
    assert!(SLOT.try_get().is_none());
    fixture.stop_all();
    assert!(SLOT.try_get().is_none());
}

#[test]
fn nested_patches_restore_in_reverse_order() {
    static SLOT: MockSlot<SharedExpectMock<u64, u64>> =
        MockSlot::new("example.nested");

    let mut fixture = ExpectMockFixture::new();
    let outer = fixture.patch_ignoring_unused(&SLOT);
    let inner = fixture.patch_ignoring_unused(&SLOT);

    assert!(Arc::ptr_eq(&SLOT.get(), &inner));
    fixture.stop_all();
    // Inner pops first, restoring outer; outer pops last, restoring None.
    assert!(SLOT.try_get().is_none());
    drop(outer);
}

#[test]
fn teardown_restores_on_drop() {
    static SLOT: MockSlot<SharedExpectMock<u64, bool>> =
        MockSlot::new("example.teardown");

    {
        let mut fixture = ExpectMockFixture::new();
        let patched = fixture.patch(&SLOT);
        patched.expect([eq(1)]).returns(true);
        assert_eq!(SLOT.get().call(vec![1]), Ok(true));
    }
    assert!(SLOT.try_get().is_none());
}

#[test]
fn patch_async_serves_an_awaitable_mock() {
    static FETCH: MockSlot<SharedAsyncExpectMock<&'static str, u32>> =
        MockSlot::new("client.fetch");
    async fn fetch(url: &'static str) -> u32 {
        FETCH.get().call(vec![url]).await.unwrap()
    }

    let mut fixture = ExpectMockFixture::new();
    let mock = fixture.patch_async(&FETCH);
    mock.expect([eq("/status")]).returns(200);

    assert_eq!(block_on(fetch("/status")), 200);
}

#[test]
fn freestanding_async_mock_from_the_fixture() {
    let mut fixture = ExpectMockFixture::new();
    let item: SharedAsyncExpectMock<(), ()> = fixture.async_mock("item");
    let function: SharedAsyncExpectMock<&str, i32> =
        item.child::<(), (), std::convert::Infallible>("otherthing")
            .child("function");
    function.expect([eq("a"), eq("b")]).returns(10);

    assert_eq!(block_on(function.call(vec!["a", "b"])), Ok(10));
    fixture.check_for_unused_mock_calls().unwrap();
}

#[test]
fn unpatched_slot_yields_nothing() {
    static SLOT: MockSlot<SharedExpectMock<u64, bool>> =
        MockSlot::new("example.unpatched");
    assert!(SLOT.try_get().is_none());
}

#[test]
#[should_panic(expected = "example.bare: slot is not patched")]
fn getting_an_unpatched_slot_panics() {
    static SLOT: MockSlot<SharedExpectMock<u64, bool>> =
        MockSlot::new("example.bare");
    let _ = SLOT.get();
}

#[test]
fn patched_mock_is_named_after_the_slot() {
    static SLOT: MockSlot<SharedExpectMock<u64, bool>> =
        MockSlot::new("example.named");

    let mut fixture = ExpectMockFixture::new();
    let mock = fixture.patch(&SLOT);
    assert_eq!(mock.name(), "example.named");
}
