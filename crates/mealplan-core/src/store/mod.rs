//! Persistence seam of the lifecycle engine.
//!
//! Writes that advance a plan are guarded on the state the engine observed,
//! so a write that lost a race reports [`WriteOutcome::Stale`] instead of
//! overwriting. Both stores also refuse a second free plan per identity
//! with [`WriteOutcome::FreePlanConflict`].

mod memory;
mod postgres;

use async_trait::async_trait;
use mealplan_db::models::{Category, MealId, MealPlan, MealPlanId, MealSchedule, Payment};

pub use mealplan_db::queries::meal_plans::{NewMealPlan, WriteOutcome};
pub use mealplan_db::queries::payments::NewPayment;
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Storage for meal plans and their payments.
#[async_trait]
pub trait MealPlanStore: Send + Sync {
    /// Create a plan in state `submitted`.
    async fn insert_plan(&self, new: NewMealPlan<'_>) -> anyhow::Result<MealPlan>;

    async fn get_plan(&self, id: MealPlanId) -> anyhow::Result<Option<MealPlan>>;

    /// Every plan of an identity, newest first.
    async fn list_plans(&self, identity_key: &str) -> anyhow::Result<Vec<MealPlan>>;

    /// The most recently created plan of an identity in a category.
    async fn latest_plan(
        &self,
        identity_key: &str,
        category: Category,
    ) -> anyhow::Result<Option<MealPlan>>;

    /// The identity's plan in state `selected`, if any.
    async fn find_free_plan(&self, identity_key: &str) -> anyhow::Result<Option<MealPlan>>;

    /// `submitted -> selected`, storing the selection and short plan.
    async fn record_selection(
        &self,
        id: MealPlanId,
        selected_meal_ids: &[MealId],
        short_plan: &MealSchedule,
    ) -> anyhow::Result<WriteOutcome>;

    /// Record the payment of a `selected` plan and mark it paid. A plan keeps
    /// its first payment; later calls return it unchanged. `None` when the
    /// plan is missing or not `selected`.
    async fn record_payment(
        &self,
        id: MealPlanId,
        payment: NewPayment<'_>,
    ) -> anyhow::Result<Option<Payment>>;

    async fn get_payment(&self, id: MealPlanId) -> anyhow::Result<Option<Payment>>;

    /// `selected -> upgraded` for a paid plan, storing the extended plan.
    async fn record_extended_plan(
        &self,
        id: MealPlanId,
        extended_plan: &MealSchedule,
    ) -> anyhow::Result<WriteOutcome>;
}
