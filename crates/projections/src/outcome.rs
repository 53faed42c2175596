//! Two-tier handler results.
//!
//! Hard failures are [`HandlerError`](crate::HandlerError)s. Soft failures
//! are cache-only problems: they are carried as values inside a successful
//! outcome and it is the consumer that decides to log them.

use std::fmt;

/// A cache step whose failure does not fail the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoftStep {
    /// Deleting stale cache entries.
    Invalidate,
    /// Writing a fresh value through to the cache.
    WriteThrough,
}

impl SoftStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            SoftStep::Invalidate => "invalidate",
            SoftStep::WriteThrough => "write_through",
        }
    }
}

impl fmt::Display for SoftStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A swallowed cache failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftFailure {
    pub step: SoftStep,
    /// Cache keys the step was applied to.
    pub keys: Vec<String>,
    pub error: String,
}

/// The result of a handler whose hard steps all succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Every step succeeded.
    #[default]
    Completed,
    /// Hard steps succeeded but some cache steps failed.
    Degraded(Vec<SoftFailure>),
}

impl HandlerOutcome {
    /// Folds the result of a soft step into the outcome.
    pub fn soft<E: fmt::Display>(
        self,
        step: SoftStep,
        keys: &[String],
        result: Result<(), E>,
    ) -> Self {
        let Err(err) = result else {
            return self;
        };
        let failure = SoftFailure {
            step,
            keys: keys.to_vec(),
            error: err.to_string(),
        };
        match self {
            HandlerOutcome::Completed => HandlerOutcome::Degraded(vec![failure]),
            HandlerOutcome::Degraded(mut failures) => {
                failures.push(failure);
                HandlerOutcome::Degraded(failures)
            }
        }
    }

    /// Returns the swallowed failures, if any.
    pub fn soft_failures(&self) -> &[SoftFailure] {
        match self {
            HandlerOutcome::Completed => &[],
            HandlerOutcome::Degraded(failures) => failures,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, HandlerOutcome::Degraded(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_soft_steps_keep_outcome_completed() {
        let outcome = HandlerOutcome::Completed.soft::<String>(
            SoftStep::Invalidate,
            &["product:p1".to_string()],
            Ok(()),
        );
        assert_eq!(outcome, HandlerOutcome::Completed);
        assert!(outcome.soft_failures().is_empty());
    }

    #[test]
    fn failures_accumulate_in_order() {
        let outcome = HandlerOutcome::Completed
            .soft(SoftStep::WriteThrough, &["inventory:p1".to_string()], Err("down"))
            .soft(SoftStep::Invalidate, &["product:p1".to_string()], Err("still down"));

        assert!(outcome.is_degraded());
        let failures = outcome.soft_failures();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].step, SoftStep::WriteThrough);
        assert_eq!(failures[1].keys, vec!["product:p1".to_string()]);
        assert_eq!(failures[1].error, "still down");
    }
}
