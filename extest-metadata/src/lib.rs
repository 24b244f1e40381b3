// Copyright (c) The extest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Exit codes shared between an extest harness, the per-case child processes it forks, and
//! anything that drives a harness binary from the outside.

mod exit_codes;

pub use exit_codes::*;
