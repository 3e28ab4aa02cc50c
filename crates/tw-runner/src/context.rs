//! Cooperative cancellation for long-running fits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tw_types::EvalError;

/// Shared flag a driver can flip to abandon an in-flight trial.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Per-trial handle passed to the objective.
///
/// Objectives with long fit loops should call [`TrialContext::checkpoint`]
/// between units of work; when the trial's budget is exhausted or the
/// driver cancelled it, the checkpoint returns [`EvalError::Timeout`] and
/// the trial resolves to a failed result with reason `"timeout"` instead of
/// being left half-evaluated.
#[derive(Debug, Clone)]
pub struct TrialContext {
    token: CancelToken,
    deadline: Option<Instant>,
}

impl TrialContext {
    pub fn new(token: CancelToken, budget: Option<Duration>) -> Self {
        Self {
            token,
            deadline: budget.map(|b| Instant::now() + b),
        }
    }

    /// Context without budget or external cancellation, for direct
    /// objective calls.
    pub fn unbounded() -> Self {
        Self::new(CancelToken::new(), None)
    }

    pub fn cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Cheap check to sprinkle through fit loops.
    pub fn checkpoint(&self) -> Result<(), EvalError> {
        if self.cancelled() {
            Err(EvalError::Timeout)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_never_cancels() {
        let ctx = TrialContext::unbounded();
        assert!(!ctx.cancelled());
        assert!(ctx.checkpoint().is_ok());
    }

    #[test]
    fn zero_budget_cancels_immediately() {
        let ctx = TrialContext::new(CancelToken::new(), Some(Duration::ZERO));
        assert!(ctx.cancelled());
        assert_eq!(ctx.checkpoint(), Err(EvalError::Timeout));
    }

    #[test]
    fn token_cancels_across_clones() {
        let token = CancelToken::new();
        let ctx = TrialContext::new(token.clone(), None);
        assert!(!ctx.cancelled());
        token.cancel();
        assert!(ctx.cancelled());
    }
}
