// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Resolution errors.
//!
//! An expression with no inferable value is not an error; it is an absent
//! entry in the reference map. [`ResolveError`] covers the hard failures
//! only: malformed input trees and cooperative cancellation.

use ecow::EcoString;
use thiserror::Error;

use crate::cancel::Cancelled;

/// Aborts a whole resolve call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The input tree violates a structural contract, e.g. node ids outside
    /// the module's declared bound after unsafe external mutation.
    #[error("malformed syntax tree: {0}")]
    MalformedTree(EcoString),

    /// The caller's cancel token fired or its deadline passed.
    #[error("resolution was cancelled")]
    Cancelled(#[from] Cancelled),
}
