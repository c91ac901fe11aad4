// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Parse-time errors and diagnostics.
//!
//! Two channels exist. [`Diagnostic`] is a recovered, positioned syntax error
//! accumulated in source order while parsing continues; it never aborts the
//! call. [`ParseError`] aborts the whole parse: a grammar violation in
//! fail-fast mode, a recovery loop that stopped making progress, or
//! cooperative cancellation. Malformed user source never panics the core.

use ecow::EcoString;

use crate::cancel::Cancelled;

use super::span::Span;

/// How severe a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

/// A positioned message describing a recovered problem in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    severity: Severity,
    message: EcoString,
    span: Span,
    hint: Option<EcoString>,
}

impl Diagnostic {
    /// Creates a new diagnostic.
    #[must_use]
    pub fn new(severity: Severity, message: impl Into<EcoString>, span: Span) -> Self {
        Self {
            severity,
            message: message.into(),
            span,
            hint: None,
        }
    }

    /// Shorthand for an error-severity diagnostic.
    #[must_use]
    pub fn error(message: impl Into<EcoString>, span: Span) -> Self {
        Self::new(Severity::Error, message, span)
    }

    /// Attaches a hint suggesting how to fix the problem.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<EcoString>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn span(&self) -> Span {
        self.span
    }

    #[must_use]
    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.span.start(), self.message)
    }
}

impl std::error::Error for Diagnostic {}

impl miette::Diagnostic for Diagnostic {
    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        Some(Box::new(std::iter::once(miette::LabeledSpan::underline(
            miette::SourceSpan::from(self.span),
        ))))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        self.hint
            .as_ref()
            .map(|h| Box::new(h.clone()) as Box<dyn std::fmt::Display>)
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(match self.severity {
            Severity::Error => miette::Severity::Error,
            Severity::Warning => miette::Severity::Warning,
        })
    }
}

/// A failure that aborts the whole parse call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// A grammar violation in fail-fast mode; no tree is produced.
    #[error("syntax error: {0}")]
    Syntax(Diagnostic),

    /// Error recovery repeatedly resynchronized without consuming input.
    /// Distinct from ordinary syntax errors: it indicates the recovery
    /// machinery itself gave up, not that the source merely has a mistake.
    #[error("too many parse errors without progress at offset {}", .0.start())]
    RecoveryExhausted(Span),

    /// The caller's cancellation token fired mid-parse.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl ParseError {
    /// The diagnostic for syntax failures, if this is one.
    #[must_use]
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            Self::Syntax(d) => Some(d),
            _ => None,
        }
    }
}
