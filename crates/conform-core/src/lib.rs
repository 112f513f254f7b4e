// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Shared plumbing for the conformance layer: tracing setup and the
//! diagnostic sink every validation path reports through.

use parking_lot::Mutex;
use std::fmt;

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}

/// Severity attached to a reported diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Verbose,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Verbose => "verbose",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Entry point that observed the problem.
    pub function: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.function, self.message)
    }
}

/// Destination for validation diagnostics.
///
/// Implementations must not panic and must return control to the caller:
/// reporting never changes what the intercepted call returns.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, severity: Severity, function: &str, message: fmt::Arguments<'_>);
}

/// Reports a non-conformance with [`Severity::Error`].
#[macro_export]
macro_rules! nonconformant {
    ($sink:expr, $function:expr, $($arg:tt)+) => {
        $crate::DiagnosticSink::report(
            &*$sink,
            $crate::Severity::Error,
            $function,
            format_args!($($arg)+),
        )
    };
}

/// Reports a non-conformance when `$cond` holds.
#[macro_export]
macro_rules! nonconformant_if {
    ($sink:expr, $function:expr, $cond:expr, $($arg:tt)+) => {
        if $cond {
            $crate::nonconformant!($sink, $function, $($arg)+);
        }
    };
}

/// Sink that accumulates diagnostics for later reporting and mirrors each
/// one to `tracing`.
#[derive(Debug, Default)]
pub struct DiagnosticLog {
    entries: Mutex<Vec<Diagnostic>>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    /// True if any recorded message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.entries.lock().iter().any(|d| d.message.contains(needle))
    }

    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.entries.lock())
    }
}

impl DiagnosticSink for DiagnosticLog {
    fn report(&self, severity: Severity, function: &str, message: fmt::Arguments<'_>) {
        let message = message.to_string();
        match severity {
            Severity::Error => tracing::error!(function, "{message}"),
            Severity::Warning => tracing::warn!(function, "{message}"),
            Severity::Info => tracing::info!(function, "{message}"),
            Severity::Verbose => tracing::debug!(function, "{message}"),
        }
        self.entries.lock().push(Diagnostic {
            severity,
            function: function.to_owned(),
            message,
        });
    }
}
