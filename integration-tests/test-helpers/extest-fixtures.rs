// Copyright (c) The extest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A harness binary with a fixed set of test cases, run by the integration tests.
//!
//! `EXTEST_FIXTURE_SET` selects the cases to register:
//!
//! * `passing`: only cases that pass.
//! * `all` (the default): every case, including failing and crashing ones.

use extest_runner::{
    Registry,
    checks::{assert_each, assert_that, expect_each, expect_that},
    harness_main,
};
use std::hint::black_box;

fn main() {
    let set = std::env::var("EXTEST_FIXTURE_SET").unwrap_or_default();
    harness_main(|registry| match set.as_str() {
        "passing" => register_passing(registry),
        _ => register_all(registry),
    })
}

fn register_passing(registry: &mut Registry) {
    registry
        .register(math_add, "Math", "Add")
        .register(self_test, "ExTest", "SelfTest")
        .register(math_sub, "Math", "Sub");
}

fn register_all(registry: &mut Registry) {
    registry
        .register(math_add, "Math", "Add")
        .register(math_add_wrong, "Math", "AddWrong")
        .register(self_test, "ExTest", "SelfTest")
        .register(failing_expect, "Checks", "FailingExpect")
        .register(failing_assertion, "Checks", "FailingAssertion")
        .register(many_passes, "Checks", "ManyPasses")
        .register(div_by_zero, "Crash", "DivByZero")
        .register(crash_null, "Crash", "Null")
        .register(panic_in_body, "Crash", "Panic")
        .register(fail_then_fault, "Crash", "FailThenFault")
        .register(math_sub, "Math", "Sub");
}

fn math_add() {
    assert_that(2 + 2).to_equal(4);
}

fn math_add_wrong() {
    expect_that(2 + 2).to_equal(5);
}

fn math_sub() {
    expect_that(7 - 2).to_equal(5);
    expect_that(7 - 2).to_be_less_than(7);
}

fn self_test() {
    expect_that("extest").to_not_equal("libtest");
    expect_that(vec![1, 2, 3]).to_contain(2);
    expect_that([1, 2, 3]).to_not_contain(7);
    expect_that(10).to_be_greater_than(3);
    expect_each([2, 4, 6]).to_be_greater_than(1);
    assert_each(["a", "a"]).to_equal("a");
}

fn failing_expect() {
    expect_that(1).to_equal(2);
    expect_that(3).to_be_less_than(1);
    expect_that(4).to_equal(4);
}

fn failing_assertion() {
    assert_that(vec![1, 2]).to_contain(9);
    expect_that("after the assertion").to_equal("never checked");
}

fn many_passes() {
    // Produces well over a pipe buffer's worth of check lines.
    expect_each(0..4000).to_be_greater_than(-1);
}

#[cfg(target_arch = "x86_64")]
fn div_by_zero() {
    let divisor = black_box(0i32);
    let mut quotient = 10i32;
    // Integer division by zero in Rust panics before it reaches the CPU, so divide directly.
    // SAFETY: idiv only touches the named registers, and faults on a zero divisor.
    unsafe {
        std::arch::asm!(
            "cdq",
            "idiv {divisor:e}",
            divisor = in(reg) divisor,
            inout("eax") quotient,
            out("edx") _,
        );
    }
    black_box(quotient);
}

#[cfg(not(target_arch = "x86_64"))]
fn div_by_zero() {
    // Not every architecture traps on integer division by zero.
    // SAFETY: raising a signal in the current process has no memory-safety preconditions.
    unsafe {
        libc::raise(libc::SIGFPE);
    }
}

#[inline(never)]
fn crash_null() {
    let ptr = black_box(std::ptr::without_provenance_mut::<u8>(8));
    // SAFETY: not safe at all. The write faults, which is the point of this case.
    unsafe { ptr.write_volatile(1) };
}

fn fail_then_fault() {
    expect_that(1).to_equal(2);
    crash_null();
}

fn panic_in_body() {
    let values: Vec<u32> = black_box(Vec::new());
    expect_that(values.len()).to_equal(0);
    panic!("fixture panicked with {} values", values.len());
}
