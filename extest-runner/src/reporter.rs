// Copyright (c) The extest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prints out and aggregates test case results.
//!
//! The main structure in this module is [`TestReporter`].

mod displayer;
pub mod events;

pub use displayer::*;
