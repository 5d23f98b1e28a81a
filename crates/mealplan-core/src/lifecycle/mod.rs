//! Meal plan lifecycle engine.
//!
//! ```text
//! submit ─▶ SUBMITTED ─select─▶ SELECTED ─upgrade─▶ UPGRADED
//! ```
//!
//! `select` runs under the identity lock and then the plan lock, so the
//! free-once check and the write that claims the free plan are atomic for
//! an identity. `upgrade` only takes the plan lock. Locks are always taken
//! identity first, and never more than one of each.

mod locks;

pub use locks::KeyedLocks;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use mealplan_db::models::{
    Amount, Category, Meal, MealId, MealPlan, MealPlanId, MealSchedule, Payment, PaymentStatus,
    PlanState,
};
use tracing::{debug, info, warn};

use crate::assessment;
use crate::config::EngineConfig;
use crate::content::{ContentProvider, PlanRequest};
use crate::error::MealPlanError;
use crate::identity::Identity;
use crate::store::{MealPlanStore, NewMealPlan, NewPayment, WriteOutcome};
use crate::survey::ValidatedAnswers;

/// Provider name stored with payments confirmed through `upgrade`.
pub const PAYMENT_PROVIDER: &str = "confirmation";

/// An already-verified payment, as delivered by the payment collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfirmation {
    pub amount: Amount,
    pub currency: String,
    pub reference: String,
}

impl PaymentConfirmation {
    pub fn new(amount: Amount, currency: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
            reference: reference.into(),
        }
    }
}

/// Owns every meal plan transition.
pub struct LifecycleEngine {
    store: Arc<dyn MealPlanStore>,
    provider: Arc<dyn ContentProvider>,
    config: EngineConfig,
    identity_locks: KeyedLocks<String>,
    plan_locks: KeyedLocks<MealPlanId>,
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<dyn MealPlanStore>,
        provider: Arc<dyn ContentProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
            identity_locks: KeyedLocks::new(),
            plan_locks: KeyedLocks::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Generate candidate meals and create a new plan in `SUBMITTED`, with
    /// the severity assessment of its answers.
    ///
    /// Nothing is persisted unless generation succeeds. Every call creates
    /// an independent plan, even for the same identity and category.
    pub async fn submit(
        &self,
        identity: &Identity,
        answers: ValidatedAnswers,
    ) -> Result<MealPlan, MealPlanError> {
        let category = answers.category();
        let meals = self
            .generate("candidate meals", Vec::is_empty, || {
                self.provider
                    .generate_candidate_meals(category, answers.answers())
            })
            .await
            .map_err(MealPlanError::generation)?;

        let assessment = assessment::assess(category, answers.answers());
        let plan = self
            .store
            .insert_plan(NewMealPlan {
                identity_key: &identity.key,
                identity_kind: identity.kind,
                category,
                answers: answers.answers(),
                assessment: &assessment,
                candidate_meals: &meals,
            })
            .await?;

        info!(
            plan_id = plan.id,
            identity = %identity.key,
            category = %category,
            severity = %plan.assessment.severity,
            candidates = plan.candidate_meals.len(),
            "meal plan submitted"
        );
        Ok(plan)
    }

    /// Store a selection and its free short plan: `SUBMITTED -> SELECTED`.
    ///
    /// Checks run in order: plan exists, plan is `SUBMITTED`, selection is
    /// valid, identity holds no other free plan. Generation happens only
    /// after every check passes, and a generation failure leaves the plan
    /// untouched.
    pub async fn select(
        &self,
        plan_id: MealPlanId,
        selected_meal_ids: &[MealId],
    ) -> Result<MealPlan, MealPlanError> {
        // The owner never changes, so it is safe to read before locking.
        let owner = self
            .store
            .get_plan(plan_id)
            .await?
            .ok_or(MealPlanError::NotFound(plan_id))?
            .identity_key;

        let _identity_guard = self.identity_locks.acquire(owner.clone()).await;
        let _plan_guard = self.plan_locks.acquire(plan_id).await;
        debug!(plan_id, identity = %owner, "select locks acquired");

        let plan = self.load(plan_id).await?;
        require_state(&plan, PlanState::Submitted)?;
        let ids = self.check_selection(&plan, selected_meal_ids)?;

        if let Some(blocking) = self
            .store
            .find_free_plan(&plan.identity_key)
            .await?
            .filter(|p| p.id != plan.id)
        {
            warn!(
                plan_id,
                identity = %plan.identity_key,
                blocking_plan = blocking.id,
                "free plan already in use"
            );
            return Err(MealPlanError::FreePlanAlreadyUsed {
                identity: plan.identity_key,
                blocking_plan: Some(blocking.id),
            });
        }

        let meals = meals_by_id(&plan, &ids);
        let request = PlanRequest {
            category: plan.category,
            selected_meals: &meals,
            answers: &plan.answers,
        };
        let short_plan = self
            .generate("short plan", MealSchedule::is_empty, || {
                self.provider.generate_short_plan(request)
            })
            .await
            .map_err(MealPlanError::generation)?;

        match self
            .store
            .record_selection(plan_id, &ids, &short_plan)
            .await?
        {
            WriteOutcome::Applied(updated) => {
                info!(
                    plan_id,
                    identity = %updated.identity_key,
                    selected = ids.len(),
                    "meal selection recorded"
                );
                Ok(updated)
            }
            WriteOutcome::Stale => Err(self.stale(plan_id, PlanState::Submitted).await),
            WriteOutcome::FreePlanConflict => {
                let blocking = self.store.find_free_plan(&plan.identity_key).await?;
                warn!(plan_id, identity = %plan.identity_key, "free plan claimed concurrently");
                Err(MealPlanError::FreePlanAlreadyUsed {
                    identity: plan.identity_key,
                    blocking_plan: blocking.map(|p| p.id),
                })
            }
        }
    }

    /// Record the payment and generate the extended plan:
    /// `SELECTED -> UPGRADED`.
    ///
    /// The payment is written once. When generation fails afterwards the
    /// plan stays `SELECTED` and paid; calling `upgrade` again retries only
    /// generation. On an `UPGRADED` plan this returns the plan unchanged.
    pub async fn upgrade(
        &self,
        plan_id: MealPlanId,
        payment: &PaymentConfirmation,
    ) -> Result<MealPlan, MealPlanError> {
        let _plan_guard = self.plan_locks.acquire(plan_id).await;
        debug!(plan_id, "upgrade lock acquired");

        let plan = self.load(plan_id).await?;
        match plan.state {
            PlanState::Upgraded => {
                info!(plan_id, "meal plan already upgraded");
                return Ok(plan);
            }
            PlanState::Submitted => {
                return Err(MealPlanError::InvalidState {
                    plan_id,
                    state: plan.state,
                    expected: PlanState::Selected,
                });
            }
            PlanState::Selected => {}
        }

        if plan.payment_status == PaymentStatus::Unpaid {
            let recorded = self
                .store
                .record_payment(
                    plan_id,
                    NewPayment {
                        amount: payment.amount,
                        currency: &payment.currency,
                        reference: &payment.reference,
                        provider: PAYMENT_PROVIDER,
                    },
                )
                .await?;
            let Some(recorded) = recorded else {
                return Err(self.stale(plan_id, PlanState::Selected).await);
            };
            info!(
                plan_id,
                payment_id = %recorded.id,
                amount = %recorded.amount,
                currency = %recorded.currency,
                reference = %recorded.reference,
                "payment recorded"
            );
        } else {
            debug!(plan_id, "payment already recorded, retrying extended plan generation");
        }

        let ids = plan.selected_meal_ids.clone().unwrap_or_default();
        let meals = meals_by_id(&plan, &ids);
        let request = PlanRequest {
            category: plan.category,
            selected_meals: &meals,
            answers: &plan.answers,
        };
        let extended_plan = self
            .generate("extended plan", MealSchedule::is_empty, || {
                self.provider.generate_extended_plan(request)
            })
            .await
            .map_err(|source| MealPlanError::GenerationUnavailable {
                payment_recorded: true,
                source,
            })?;

        match self
            .store
            .record_extended_plan(plan_id, &extended_plan)
            .await?
        {
            WriteOutcome::Applied(updated) => {
                info!(
                    plan_id,
                    identity = %updated.identity_key,
                    days = extended_plan.days.len(),
                    "meal plan upgraded"
                );
                Ok(updated)
            }
            WriteOutcome::Stale | WriteOutcome::FreePlanConflict => {
                Err(self.stale(plan_id, PlanState::Selected).await)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn get_meal_plan(&self, plan_id: MealPlanId) -> Result<MealPlan, MealPlanError> {
        self.load(plan_id).await
    }

    /// The most recently submitted plan of an identity in a category.
    pub async fn latest_meal_plan(
        &self,
        identity: &Identity,
        category: Category,
    ) -> Result<Option<MealPlan>, MealPlanError> {
        Ok(self.store.latest_plan(&identity.key, category).await?)
    }

    /// Every plan of an identity, newest first.
    pub async fn list_meal_plans(
        &self,
        identity: &Identity,
    ) -> Result<Vec<MealPlan>, MealPlanError> {
        Ok(self.store.list_plans(&identity.key).await?)
    }

    /// The payment recorded for a plan, if any.
    pub async fn payment_for(
        &self,
        plan_id: MealPlanId,
    ) -> Result<Option<Payment>, MealPlanError> {
        self.load(plan_id).await?;
        Ok(self.store.get_payment(plan_id).await?)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn load(&self, plan_id: MealPlanId) -> Result<MealPlan, MealPlanError> {
        self.store
            .get_plan(plan_id)
            .await?
            .ok_or(MealPlanError::NotFound(plan_id))
    }

    /// Explain a guarded write that touched nothing: the plan moved on or
    /// disappeared between the read and the write.
    async fn stale(&self, plan_id: MealPlanId, expected: PlanState) -> MealPlanError {
        match self.store.get_plan(plan_id).await {
            Ok(Some(plan)) if plan.state != expected => MealPlanError::InvalidState {
                plan_id,
                state: plan.state,
                expected,
            },
            Ok(Some(_)) => MealPlanError::Internal(anyhow!(
                "guarded write on meal plan {plan_id} was not applied"
            )),
            Ok(None) => MealPlanError::NotFound(plan_id),
            Err(e) => MealPlanError::Internal(e),
        }
    }

    /// Collapse duplicates (keeping first occurrence) and check the count
    /// and membership of a selection.
    fn check_selection(
        &self,
        plan: &MealPlan,
        requested: &[MealId],
    ) -> Result<Vec<MealId>, MealPlanError> {
        let mut seen = HashSet::new();
        let ids: Vec<MealId> = requested
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let bounds = self.config.selection_bounds();
        if !bounds.contains(&ids.len()) {
            return Err(MealPlanError::InvalidSelection(format!(
                "{} distinct meals selected, expected between {} and {}",
                ids.len(),
                bounds.start(),
                bounds.end()
            )));
        }

        let candidates = plan.candidate_ids();
        let unknown: Vec<MealId> = ids
            .iter()
            .copied()
            .filter(|id| !candidates.contains(id))
            .collect();
        if !unknown.is_empty() {
            return Err(MealPlanError::InvalidSelection(format!(
                "meal ids not in the candidate set: {unknown:?}"
            )));
        }

        Ok(ids)
    }

    /// Run one generation step under the timeout, retrying up to
    /// `generation_attempts` calls in total. Empty output counts as failure.
    async fn generate<T, F, Fut>(
        &self,
        step: &'static str,
        is_empty: fn(&T) -> bool,
        call: F,
    ) -> anyhow::Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let attempts = self.config.generation_attempts.max(1);
        let timeout = self.config.generation_timeout();
        let mut last_error = anyhow!("{step} generation was not attempted");

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(self.config.retry_backoff()).await;
            }
            last_error = match tokio::time::timeout(timeout, call()).await {
                Ok(Ok(content)) if !is_empty(&content) => return Ok(content),
                Ok(Ok(_)) => anyhow!("content provider returned no {step}"),
                Ok(Err(e)) => e.context(format!("{step} generation failed")),
                Err(_) => anyhow!("{step} generation timed out after {timeout:?}"),
            };
            warn!(step, attempt, attempts, error = %last_error, "generation attempt failed");
        }

        Err(last_error)
    }
}

fn require_state(plan: &MealPlan, expected: PlanState) -> Result<(), MealPlanError> {
    if plan.state == expected {
        Ok(())
    } else {
        Err(MealPlanError::InvalidState {
            plan_id: plan.id,
            state: plan.state,
            expected,
        })
    }
}

/// The candidate meals for `ids`, in the order of `ids`.
fn meals_by_id(plan: &MealPlan, ids: &[MealId]) -> Vec<Meal> {
    ids.iter()
        .filter_map(|id| plan.candidate_meals.iter().find(|m| m.id == *id))
        .cloned()
        .collect()
}
