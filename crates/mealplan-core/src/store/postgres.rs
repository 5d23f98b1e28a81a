use async_trait::async_trait;
use mealplan_db::models::{Category, MealId, MealPlan, MealPlanId, MealSchedule, Payment};
use mealplan_db::queries::{meal_plans, payments};
use sqlx::PgPool;

use super::{MealPlanStore, NewMealPlan, NewPayment, WriteOutcome};

/// [`MealPlanStore`] over the PostgreSQL schema in `mealplan-db`.
///
/// The free-once rule is backed by a partial unique index, so it holds
/// across processes sharing the database.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MealPlanStore for PgStore {
    async fn insert_plan(&self, new: NewMealPlan<'_>) -> anyhow::Result<MealPlan> {
        meal_plans::insert_meal_plan(&self.pool, &new).await
    }

    async fn get_plan(&self, id: MealPlanId) -> anyhow::Result<Option<MealPlan>> {
        meal_plans::get_meal_plan(&self.pool, id).await
    }

    async fn list_plans(&self, identity_key: &str) -> anyhow::Result<Vec<MealPlan>> {
        meal_plans::list_for_identity(&self.pool, identity_key).await
    }

    async fn latest_plan(
        &self,
        identity_key: &str,
        category: Category,
    ) -> anyhow::Result<Option<MealPlan>> {
        meal_plans::latest_for_category(&self.pool, identity_key, category).await
    }

    async fn find_free_plan(&self, identity_key: &str) -> anyhow::Result<Option<MealPlan>> {
        meal_plans::find_free_plan(&self.pool, identity_key).await
    }

    async fn record_selection(
        &self,
        id: MealPlanId,
        selected_meal_ids: &[MealId],
        short_plan: &MealSchedule,
    ) -> anyhow::Result<WriteOutcome> {
        meal_plans::record_selection(&self.pool, id, selected_meal_ids, short_plan).await
    }

    async fn record_payment(
        &self,
        id: MealPlanId,
        payment: NewPayment<'_>,
    ) -> anyhow::Result<Option<Payment>> {
        payments::record_payment(&self.pool, id, &payment).await
    }

    async fn get_payment(&self, id: MealPlanId) -> anyhow::Result<Option<Payment>> {
        payments::get_payment_for_plan(&self.pool, id).await
    }

    async fn record_extended_plan(
        &self,
        id: MealPlanId,
        extended_plan: &MealSchedule,
    ) -> anyhow::Result<WriteOutcome> {
        meal_plans::record_extended_plan(&self.pool, id, extended_plan).await
    }
}
