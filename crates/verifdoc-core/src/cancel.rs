// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cooperative cancellation for long-running analyzer loops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{AnalysisError, Result};

/// Shared flag an orchestrator raises when a module's deadline passes.
///
/// Analyzers poll [`check`](Self::check) between rows or blocks; once raised,
/// the next check returns [`AnalysisError::Timeout`] and the analyzer unwinds.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    raised: Arc<AtomicBool>,
    deadline_ms: u64,
}

impl CancelFlag {
    /// A flag that is never raised by anyone but the holder.
    pub fn never() -> Self {
        Self::default()
    }

    /// A flag tied to a deadline, reported in the resulting timeout error.
    pub fn with_deadline(deadline_ms: u64) -> Self {
        Self {
            raised: Arc::new(AtomicBool::new(false)),
            deadline_ms,
        }
    }

    pub fn cancel(&self) {
        self.raised.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.raised.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(AnalysisError::Timeout(self.deadline_ms))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let flag = CancelFlag::with_deadline(250);
        let worker_view = flag.clone();
        assert!(worker_view.check().is_ok());
        flag.cancel();
        let err = worker_view.check().unwrap_err();
        assert_eq!(err.code(), "timeout");
        assert_eq!(err.to_string(), "analysis timed out after 250 ms");
    }
}
