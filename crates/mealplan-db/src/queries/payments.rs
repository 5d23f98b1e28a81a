//! Database query functions for the `payments` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::{Amount, MealPlanId, Payment};

/// A payment confirmation as delivered by the payment collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment<'a> {
    pub amount: Amount,
    pub currency: &'a str,
    pub reference: &'a str,
    pub provider: &'a str,
}

#[derive(Debug, FromRow)]
struct PaymentRow {
    id: Uuid,
    meal_plan_id: i64,
    amount_minor: i64,
    currency: String,
    reference: String,
    provider: String,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = anyhow::Error;

    fn try_from(row: PaymentRow) -> Result<Self> {
        let amount = Amount::from_minor_units(row.amount_minor)
            .with_context(|| format!("payment {} has a negative amount", row.id))?;
        Ok(Self {
            id: row.id,
            meal_plan_id: row.meal_plan_id,
            amount,
            currency: row.currency,
            reference: row.reference,
            provider: row.provider,
            recorded_at: row.recorded_at,
        })
    }
}

/// Record a payment for a plan in state `selected` and mark it paid.
///
/// Both writes happen in one transaction. The insert is
/// `ON CONFLICT (meal_plan_id) DO NOTHING`, so a plan keeps its first
/// payment and repeated calls return that record unchanged.
///
/// Returns `None` when the plan is missing or not in state `selected`.
pub async fn record_payment(
    pool: &PgPool,
    meal_plan_id: MealPlanId,
    payment: &NewPayment<'_>,
) -> Result<Option<Payment>> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let marked = sqlx::query(
        "UPDATE meal_plans \
         SET payment_status = 'paid', updated_at = NOW() \
         WHERE id = $1 AND state = 'selected'",
    )
    .bind(meal_plan_id)
    .execute(&mut *tx)
    .await
    .context("failed to mark meal plan paid")?;

    if marked.rows_affected() == 0 {
        // Rolls back on drop.
        return Ok(None);
    }

    sqlx::query(
        "INSERT INTO payments (id, meal_plan_id, amount_minor, currency, reference, provider) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (meal_plan_id) DO NOTHING",
    )
    .bind(Uuid::new_v4())
    .bind(meal_plan_id)
    .bind(payment.amount.minor_units())
    .bind(payment.currency)
    .bind(payment.reference)
    .bind(payment.provider)
    .execute(&mut *tx)
    .await
    .context("failed to insert payment")?;

    let row = sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE meal_plan_id = $1")
        .bind(meal_plan_id)
        .fetch_one(&mut *tx)
        .await
        .context("failed to read back payment")?;

    tx.commit().await.context("failed to commit payment")?;

    row.try_into().map(Some)
}

/// Fetch the payment recorded for a plan, if any.
pub async fn get_payment_for_plan(
    pool: &PgPool,
    meal_plan_id: MealPlanId,
) -> Result<Option<Payment>> {
    let row = sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE meal_plan_id = $1")
        .bind(meal_plan_id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch payment")?;

    row.map(TryInto::try_into).transpose()
}

/// Count payments recorded for a plan. Used by reconciliation checks and
/// tests; the unique constraint keeps this at 0 or 1.
pub async fn count_payments_for_plan(pool: &PgPool, meal_plan_id: MealPlanId) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM payments WHERE meal_plan_id = $1")
        .bind(meal_plan_id)
        .fetch_one(pool)
        .await
        .context("failed to count payments")?;

    Ok(row.0)
}
