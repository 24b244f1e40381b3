// Copyright (c) The extest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Helpers for running harness binaries in integration tests.

pub mod harness_cli;
pub mod report;
