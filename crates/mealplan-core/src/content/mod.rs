//! Content provider adapter: the generation capability the engine consumes.
//!
//! Implementations may be slow, rate-limited or unavailable. The engine
//! bounds every call with a timeout and treats an empty result the same
//! as a failure.

pub mod catalog;

use async_trait::async_trait;
use mealplan_db::models::{Answers, Category, Meal, MealSchedule};

pub use catalog::{CatalogConfig, CatalogProvider};

/// Input to short and extended plan generation.
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub category: Category,
    /// The selected meals, in selection order.
    pub selected_meals: &'a [Meal],
    /// The validated survey answers, used for allergies and preferences.
    pub answers: &'a Answers,
}

/// Generates candidate meals and meal schedules.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// The candidate set a selection is drawn from.
    async fn generate_candidate_meals(
        &self,
        category: Category,
        answers: &Answers,
    ) -> anyhow::Result<Vec<Meal>>;

    /// The free short plan.
    async fn generate_short_plan(&self, request: PlanRequest<'_>) -> anyhow::Result<MealSchedule>;

    /// The paid extended plan.
    async fn generate_extended_plan(
        &self,
        request: PlanRequest<'_>,
    ) -> anyhow::Result<MealSchedule>;
}
