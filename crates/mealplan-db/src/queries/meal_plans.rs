//! Database query functions for the `meal_plans` table.
//!
//! Lifecycle writes are guarded on the expected current state in the
//! `WHERE` clause, so a write that lost a race touches zero rows and is
//! reported as [`WriteOutcome::Stale`] instead of overwriting fields.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use crate::models::{
    Answers, Assessment, Category, IdentityKind, Meal, MealId, MealPlan, MealPlanId,
    MealSchedule, PaymentStatus, PlanState,
};

/// Name of the partial unique index that keeps one free plan per identity.
pub const FREE_PLAN_INDEX: &str = "meal_plans_one_free_plan_idx";

/// Fields supplied when a submission creates a plan.
#[derive(Debug, Clone)]
pub struct NewMealPlan<'a> {
    pub identity_key: &'a str,
    pub identity_kind: IdentityKind,
    pub category: Category,
    pub answers: &'a Answers,
    pub assessment: &'a Assessment,
    pub candidate_meals: &'a [Meal],
}

/// Result of a state-guarded lifecycle write.
#[derive(Debug, Clone)]
pub enum WriteOutcome {
    /// The row was in the expected state and has been updated.
    Applied(MealPlan),
    /// The row is missing or no longer in the expected state.
    Stale,
    /// Another plan of the same identity already holds the free plan.
    FreePlanConflict,
}

#[derive(Debug, FromRow)]
struct MealPlanRow {
    id: i64,
    identity_key: String,
    identity_kind: IdentityKind,
    category: Category,
    state: PlanState,
    answers: Json<Answers>,
    assessment: Json<Assessment>,
    candidate_meals: Json<Vec<Meal>>,
    selected_meal_ids: Option<Json<Vec<MealId>>>,
    short_plan: Option<Json<MealSchedule>>,
    extended_plan: Option<Json<MealSchedule>>,
    payment_status: PaymentStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    short_generated_at: Option<DateTime<Utc>>,
    extended_generated_at: Option<DateTime<Utc>>,
}

impl From<MealPlanRow> for MealPlan {
    fn from(row: MealPlanRow) -> Self {
        Self {
            id: row.id,
            identity_key: row.identity_key,
            identity_kind: row.identity_kind,
            category: row.category,
            state: row.state,
            answers: row.answers.0,
            assessment: row.assessment.0,
            candidate_meals: row.candidate_meals.0,
            selected_meal_ids: row.selected_meal_ids.map(|j| j.0),
            short_plan: row.short_plan.map(|j| j.0),
            extended_plan: row.extended_plan.map(|j| j.0),
            payment_status: row.payment_status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            short_generated_at: row.short_generated_at,
            extended_generated_at: row.extended_generated_at,
        }
    }
}

/// Insert a new plan in state `submitted`. Returns the row with
/// server-generated defaults (id, timestamps, state, payment status).
pub async fn insert_meal_plan(pool: &PgPool, new: &NewMealPlan<'_>) -> Result<MealPlan> {
    let row = sqlx::query_as::<_, MealPlanRow>(
        "INSERT INTO meal_plans \
         (identity_key, identity_kind, category, answers, assessment, candidate_meals) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING *",
    )
    .bind(new.identity_key)
    .bind(new.identity_kind)
    .bind(new.category)
    .bind(Json(new.answers))
    .bind(Json(new.assessment))
    .bind(Json(new.candidate_meals))
    .fetch_one(pool)
    .await
    .context("failed to insert meal plan")?;

    Ok(row.into())
}

/// Fetch a single plan by id.
pub async fn get_meal_plan(pool: &PgPool, id: MealPlanId) -> Result<Option<MealPlan>> {
    let row = sqlx::query_as::<_, MealPlanRow>("SELECT * FROM meal_plans WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch meal plan")?;

    Ok(row.map(Into::into))
}

/// List every plan owned by an identity, newest first.
pub async fn list_for_identity(pool: &PgPool, identity_key: &str) -> Result<Vec<MealPlan>> {
    let rows = sqlx::query_as::<_, MealPlanRow>(
        "SELECT * FROM meal_plans WHERE identity_key = $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(identity_key)
    .fetch_all(pool)
    .await
    .context("failed to list meal plans for identity")?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// The most recently created plan for an identity and category.
pub async fn latest_for_category(
    pool: &PgPool,
    identity_key: &str,
    category: Category,
) -> Result<Option<MealPlan>> {
    let row = sqlx::query_as::<_, MealPlanRow>(
        "SELECT * FROM meal_plans \
         WHERE identity_key = $1 AND category = $2 \
         ORDER BY created_at DESC, id DESC \
         LIMIT 1",
    )
    .bind(identity_key)
    .bind(category)
    .fetch_optional(pool)
    .await
    .context("failed to fetch latest meal plan")?;

    Ok(row.map(Into::into))
}

/// The identity's plan currently holding the free short plan (state
/// `selected`), if any.
pub async fn find_free_plan(pool: &PgPool, identity_key: &str) -> Result<Option<MealPlan>> {
    let row = sqlx::query_as::<_, MealPlanRow>(
        "SELECT * FROM meal_plans WHERE identity_key = $1 AND state = 'selected' LIMIT 1",
    )
    .bind(identity_key)
    .fetch_optional(pool)
    .await
    .context("failed to look up free plan")?;

    Ok(row.map(Into::into))
}

/// Store a selection and its short plan, moving `submitted -> selected`.
///
/// The partial unique index on `(identity_key) WHERE state = 'selected'`
/// turns a concurrent second free plan into [`WriteOutcome::FreePlanConflict`].
pub async fn record_selection(
    pool: &PgPool,
    id: MealPlanId,
    selected_meal_ids: &[MealId],
    short_plan: &MealSchedule,
) -> Result<WriteOutcome> {
    let result = sqlx::query_as::<_, MealPlanRow>(
        "UPDATE meal_plans \
         SET state = 'selected', \
             selected_meal_ids = $1, \
             short_plan = $2, \
             short_generated_at = NOW(), \
             updated_at = NOW() \
         WHERE id = $3 AND state = 'submitted' \
         RETURNING *",
    )
    .bind(Json(selected_meal_ids))
    .bind(Json(short_plan))
    .bind(id)
    .fetch_optional(pool)
    .await;

    match result {
        Ok(Some(row)) => Ok(WriteOutcome::Applied(row.into())),
        Ok(None) => Ok(WriteOutcome::Stale),
        Err(sqlx::Error::Database(db)) if db.constraint() == Some(FREE_PLAN_INDEX) => {
            Ok(WriteOutcome::FreePlanConflict)
        }
        Err(e) => Err(e).context("failed to record meal selection"),
    }
}

/// Store the extended plan, moving `selected -> upgraded`. Requires the
/// payment to have been recorded already.
pub async fn record_extended_plan(
    pool: &PgPool,
    id: MealPlanId,
    extended_plan: &MealSchedule,
) -> Result<WriteOutcome> {
    let row = sqlx::query_as::<_, MealPlanRow>(
        "UPDATE meal_plans \
         SET state = 'upgraded', \
             extended_plan = $1, \
             extended_generated_at = NOW(), \
             updated_at = NOW() \
         WHERE id = $2 AND state = 'selected' AND payment_status = 'paid' \
         RETURNING *",
    )
    .bind(Json(extended_plan))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to record extended plan")?;

    Ok(match row {
        Some(row) => WriteOutcome::Applied(row.into()),
        None => WriteOutcome::Stale,
    })
}
