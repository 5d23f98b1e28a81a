//! The error taxonomy surfaced by every lifecycle operation.

use mealplan_db::models::{MealPlanId, PlanState};

/// Errors returned by identity resolution, survey intake and the engine.
///
/// Every kind except [`MealPlanError::GenerationUnavailable`] and
/// [`MealPlanError::Internal`] describes a request that has to be corrected
/// before it is sent again.
#[derive(Debug, thiserror::Error)]
pub enum MealPlanError {
    #[error("missing identity: {0}")]
    MissingIdentity(String),

    #[error("invalid category: {0:?}")]
    InvalidCategory(String),

    #[error("missing required answers: {}", missing.join(", "))]
    InvalidAnswers { missing: Vec<String> },

    #[error("meal plan {0} not found")]
    NotFound(MealPlanId),

    #[error("meal plan {plan_id} is {state}, expected {expected}")]
    InvalidState {
        plan_id: MealPlanId,
        state: PlanState,
        expected: PlanState,
    },

    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    /// `blocking_plan` is the plan holding the free short plan, when it
    /// could be identified.
    #[error("{identity} already holds an unpaid free plan; upgrade it first")]
    FreePlanAlreadyUsed {
        identity: String,
        blocking_plan: Option<MealPlanId>,
    },

    #[error("content generation unavailable (payment recorded: {payment_recorded})")]
    GenerationUnavailable {
        payment_recorded: bool,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl MealPlanError {
    /// Whether the same request may be sent again unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::GenerationUnavailable { .. })
    }

    pub(crate) fn generation(source: anyhow::Error) -> Self {
        Self::GenerationUnavailable {
            payment_recorded: false,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_generation_failures_are_retryable() {
        assert!(MealPlanError::generation(anyhow::anyhow!("down")).is_retryable());
        assert!(
            MealPlanError::GenerationUnavailable {
                payment_recorded: true,
                source: anyhow::anyhow!("timeout"),
            }
            .is_retryable()
        );
        assert!(!MealPlanError::NotFound(1).is_retryable());
        assert!(!MealPlanError::InvalidSelection("x".into()).is_retryable());
        assert!(!MealPlanError::Internal(anyhow::anyhow!("db")).is_retryable());
    }

    #[test]
    fn messages_name_the_problem() {
        let err = MealPlanError::InvalidAnswers {
            missing: vec!["Full Name".into(), "Gender".into()],
        };
        assert_eq!(err.to_string(), "missing required answers: Full Name, Gender");

        let err = MealPlanError::InvalidState {
            plan_id: 7,
            state: PlanState::Selected,
            expected: PlanState::Submitted,
        };
        assert_eq!(err.to_string(), "meal plan 7 is selected, expected submitted");
    }
}
