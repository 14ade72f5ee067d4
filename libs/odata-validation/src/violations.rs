//! Violation sink shared by the fail-fast and collecting entry points.
//!
//! Every validator walks its input exactly once and hands each policy
//! violation to a [`Violations`] sink. In fail-fast mode the sink turns the
//! first violation into an `Err` that unwinds the walk through `?`; in collect
//! mode it records the violation and lets the walk continue. Defensive
//! failures always unwind, whatever the mode.

use crate::error::{ValidationError, ValidationErrors};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    FailFast,
    Collect,
}

#[derive(Debug)]
pub struct Violations {
    mode: Mode,
    collected: ValidationErrors,
}

impl Violations {
    #[must_use]
    pub fn fail_fast() -> Self {
        Self {
            mode: Mode::FailFast,
            collected: ValidationErrors::new(),
        }
    }

    #[must_use]
    pub fn collect() -> Self {
        Self {
            mode: Mode::Collect,
            collected: ValidationErrors::new(),
        }
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn is_collecting(&self) -> bool {
        self.mode == Mode::Collect
    }

    /// Number of violations recorded so far (always 0 in fail-fast mode).
    #[must_use]
    pub fn count(&self) -> usize {
        self.collected.len()
    }

    /// Report a violation.
    ///
    /// # Errors
    /// Returns `error` in fail-fast mode and for defensive failures in any mode.
    pub fn report(&mut self, error: ValidationError) -> Result<(), ValidationError> {
        if !error.is_policy_violation() {
            tracing::warn!(kind = error.kind(), error = %error, "OData validation aborted");
            return Err(error);
        }
        match self.mode {
            Mode::FailFast => Err(error),
            Mode::Collect => {
                tracing::debug!(kind = error.kind(), message = %error, "OData validation violation");
                self.collected.push(error);
                Ok(())
            }
        }
    }

    /// Fold the outcome of a collecting walk into the final error list.
    ///
    /// A walk that stopped early (defensive failure) contributes its error
    /// after everything collected before it.
    ///
    /// # Errors
    /// Returns the collected list when it is non-empty.
    pub fn finish(mut self, outcome: Result<(), ValidationError>) -> Result<(), ValidationErrors> {
        if let Err(error) = outcome {
            self.collected.push(error);
        }
        self.collected.into_result()
    }

    /// Run `walk` in fail-fast mode.
    ///
    /// # Errors
    /// Returns the first violation reported by `walk`.
    pub fn run_fail_fast<F>(walk: F) -> Result<(), ValidationError>
    where
        F: FnOnce(&mut Violations) -> Result<(), ValidationError>,
    {
        let mut violations = Violations::fail_fast();
        walk(&mut violations)
    }

    /// Run `walk` in collect mode.
    ///
    /// # Errors
    /// Returns every distinct violation reported by `walk`.
    pub fn run_collect<F>(walk: F) -> Result<(), ValidationErrors>
    where
        F: FnOnce(&mut Violations) -> Result<(), ValidationError>,
    {
        let mut violations = Violations::collect();
        let outcome = walk(&mut violations);
        violations.finish(outcome)
    }
}
