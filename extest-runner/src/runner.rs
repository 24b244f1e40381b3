// Copyright (c) The extest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs registered test cases, each in its own forked child process.
//!
//! The main structure in this module is [`TestRunner`].

mod child;
mod imp;

pub use imp::*;
