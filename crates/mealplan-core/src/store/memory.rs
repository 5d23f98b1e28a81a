use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use mealplan_db::models::{
    Category, MealId, MealPlan, MealPlanId, MealSchedule, Payment, PaymentStatus, PlanState,
};
use uuid::Uuid;

use super::{MealPlanStore, NewMealPlan, NewPayment, WriteOutcome};

/// In-process [`MealPlanStore`]. Enforces the same guards as the
/// PostgreSQL schema: state-guarded transitions, one payment per plan, and
/// one `selected` plan per identity.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    last_id: MealPlanId,
    plans: BTreeMap<MealPlanId, MealPlan>,
    payments: HashMap<MealPlanId, Payment>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> anyhow::Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    /// Number of payments recorded across all plans.
    pub fn payment_count(&self) -> anyhow::Result<usize> {
        Ok(self.state()?.payments.len())
    }
}

fn newest_first(a: &MealPlan, b: &MealPlan) -> std::cmp::Ordering {
    (b.created_at, b.id).cmp(&(a.created_at, a.id))
}

#[async_trait]
impl MealPlanStore for MemoryStore {
    async fn insert_plan(&self, new: NewMealPlan<'_>) -> anyhow::Result<MealPlan> {
        let mut state = self.state()?;
        state.last_id += 1;
        let now = Utc::now();
        let plan = MealPlan {
            id: state.last_id,
            identity_key: new.identity_key.to_string(),
            identity_kind: new.identity_kind,
            category: new.category,
            state: PlanState::Submitted,
            answers: new.answers.clone(),
            assessment: new.assessment.clone(),
            candidate_meals: new.candidate_meals.to_vec(),
            selected_meal_ids: None,
            short_plan: None,
            extended_plan: None,
            payment_status: PaymentStatus::Unpaid,
            created_at: now,
            updated_at: now,
            short_generated_at: None,
            extended_generated_at: None,
        };
        state.plans.insert(plan.id, plan.clone());
        Ok(plan)
    }

    async fn get_plan(&self, id: MealPlanId) -> anyhow::Result<Option<MealPlan>> {
        Ok(self.state()?.plans.get(&id).cloned())
    }

    async fn list_plans(&self, identity_key: &str) -> anyhow::Result<Vec<MealPlan>> {
        let state = self.state()?;
        let mut plans: Vec<MealPlan> = state
            .plans
            .values()
            .filter(|p| p.identity_key == identity_key)
            .cloned()
            .collect();
        plans.sort_by(newest_first);
        Ok(plans)
    }

    async fn latest_plan(
        &self,
        identity_key: &str,
        category: Category,
    ) -> anyhow::Result<Option<MealPlan>> {
        let state = self.state()?;
        Ok(state
            .plans
            .values()
            .filter(|p| p.identity_key == identity_key && p.category == category)
            .min_by(|a, b| newest_first(a, b))
            .cloned())
    }

    async fn find_free_plan(&self, identity_key: &str) -> anyhow::Result<Option<MealPlan>> {
        let state = self.state()?;
        Ok(state
            .plans
            .values()
            .find(|p| p.identity_key == identity_key && p.holds_free_plan())
            .cloned())
    }

    async fn record_selection(
        &self,
        id: MealPlanId,
        selected_meal_ids: &[MealId],
        short_plan: &MealSchedule,
    ) -> anyhow::Result<WriteOutcome> {
        let mut state = self.state()?;
        let Some(identity_key) = state
            .plans
            .get(&id)
            .filter(|p| p.state == PlanState::Submitted)
            .map(|p| p.identity_key.clone())
        else {
            return Ok(WriteOutcome::Stale);
        };

        let conflict = state
            .plans
            .values()
            .any(|p| p.id != id && p.identity_key == identity_key && p.holds_free_plan());
        if conflict {
            return Ok(WriteOutcome::FreePlanConflict);
        }

        let Some(plan) = state.plans.get_mut(&id) else {
            return Ok(WriteOutcome::Stale);
        };
        let now = Utc::now();
        plan.state = PlanState::Selected;
        plan.selected_meal_ids = Some(selected_meal_ids.to_vec());
        plan.short_plan = Some(short_plan.clone());
        plan.short_generated_at = Some(now);
        plan.updated_at = now;
        Ok(WriteOutcome::Applied(plan.clone()))
    }

    async fn record_payment(
        &self,
        id: MealPlanId,
        payment: NewPayment<'_>,
    ) -> anyhow::Result<Option<Payment>> {
        let mut state = self.state()?;
        let State {
            plans, payments, ..
        } = &mut *state;

        let Some(plan) = plans
            .get_mut(&id)
            .filter(|p| p.state == PlanState::Selected)
        else {
            return Ok(None);
        };

        let now = Utc::now();
        plan.payment_status = PaymentStatus::Paid;
        plan.updated_at = now;

        let recorded = payments.entry(id).or_insert_with(|| Payment {
            id: Uuid::new_v4(),
            meal_plan_id: id,
            amount: payment.amount,
            currency: payment.currency.to_string(),
            reference: payment.reference.to_string(),
            provider: payment.provider.to_string(),
            recorded_at: now,
        });
        Ok(Some(recorded.clone()))
    }

    async fn get_payment(&self, id: MealPlanId) -> anyhow::Result<Option<Payment>> {
        Ok(self.state()?.payments.get(&id).cloned())
    }

    async fn record_extended_plan(
        &self,
        id: MealPlanId,
        extended_plan: &MealSchedule,
    ) -> anyhow::Result<WriteOutcome> {
        let mut state = self.state()?;
        let Some(plan) = state.plans.get_mut(&id).filter(|p| {
            p.state == PlanState::Selected && p.payment_status == PaymentStatus::Paid
        }) else {
            return Ok(WriteOutcome::Stale);
        };

        let now = Utc::now();
        plan.state = PlanState::Upgraded;
        plan.extended_plan = Some(extended_plan.clone());
        plan.extended_generated_at = Some(now);
        plan.updated_at = now;
        Ok(WriteOutcome::Applied(plan.clone()))
    }
}

#[cfg(test)]
mod tests {
    use mealplan_db::models::{Answers, IdentityKind, Meal, PlanDay};

    use super::*;
    use crate::assessment;

    fn meals() -> Vec<Meal> {
        (1..=30)
            .map(|id| Meal {
                id,
                name: format!("meal {id}"),
                tags: vec![],
            })
            .collect()
    }

    fn schedule() -> MealSchedule {
        MealSchedule {
            days: vec![PlanDay {
                day: 1,
                breakfast: "b".into(),
                lunch: "l".into(),
                dinner: "d".into(),
                snacks: vec![],
            }],
        }
    }

    async fn insert(store: &MemoryStore, identity: &str, category: Category) -> MealPlanId {
        let answers = Answers::new();
        let assessment = assessment::assess(category, &answers);
        let meals = meals();
        store
            .insert_plan(NewMealPlan {
                identity_key: identity,
                identity_kind: IdentityKind::Guest,
                category,
                answers: &answers,
                assessment: &assessment,
                candidate_meals: &meals,
            })
            .await
            .unwrap()
            .id
    }

    fn payment(reference: &str) -> NewPayment<'_> {
        NewPayment {
            amount: "5000.00".parse().unwrap(),
            currency: "NGN",
            reference,
            provider: "confirmation",
        }
    }

    #[tokio::test]
    async fn ids_are_sequential_from_one() {
        let store = MemoryStore::new();
        assert_eq!(insert(&store, "a@x.com", Category::Diabetes).await, 1);
        assert_eq!(insert(&store, "a@x.com", Category::Detox).await, 2);
    }

    #[tokio::test]
    async fn selection_is_guarded() {
        let store = MemoryStore::new();
        let a = insert(&store, "a@x.com", Category::Diabetes).await;
        let b = insert(&store, "a@x.com", Category::Detox).await;
        let ids: Vec<MealId> = (1..=10).collect();

        assert!(matches!(
            store.record_selection(a, &ids, &schedule()).await.unwrap(),
            WriteOutcome::Applied(_)
        ));
        assert!(matches!(
            store.record_selection(a, &ids, &schedule()).await.unwrap(),
            WriteOutcome::Stale
        ));
        assert!(matches!(
            store.record_selection(b, &ids, &schedule()).await.unwrap(),
            WriteOutcome::FreePlanConflict
        ));
        assert!(matches!(
            store.record_selection(99, &ids, &schedule()).await.unwrap(),
            WriteOutcome::Stale
        ));
    }

    #[tokio::test]
    async fn payment_is_kept_once() {
        let store = MemoryStore::new();
        let a = insert(&store, "a@x.com", Category::Weight).await;
        assert!(store.record_payment(a, payment("r1")).await.unwrap().is_none());

        let ids: Vec<MealId> = (1..=10).collect();
        store.record_selection(a, &ids, &schedule()).await.unwrap();

        let first = store.record_payment(a, payment("r1")).await.unwrap().unwrap();
        let second = store.record_payment(a, payment("r2")).await.unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(second.reference, "r1");
        assert_eq!(store.payment_count().unwrap(), 1);

        let plan = store.get_plan(a).await.unwrap().unwrap();
        assert_eq!(plan.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn extended_plan_requires_payment() {
        let store = MemoryStore::new();
        let a = insert(&store, "a@x.com", Category::Hbp).await;
        let ids: Vec<MealId> = (1..=10).collect();
        store.record_selection(a, &ids, &schedule()).await.unwrap();

        assert!(matches!(
            store.record_extended_plan(a, &schedule()).await.unwrap(),
            WriteOutcome::Stale
        ));
        store.record_payment(a, payment("r1")).await.unwrap();
        let WriteOutcome::Applied(plan) = store.record_extended_plan(a, &schedule()).await.unwrap()
        else {
            panic!("expected applied");
        };
        assert_eq!(plan.state, PlanState::Upgraded);
        assert!(store.find_free_plan("a@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reads_are_newest_first() {
        let store = MemoryStore::new();
        let first = insert(&store, "a@x.com", Category::Diabetes).await;
        let second = insert(&store, "a@x.com", Category::Diabetes).await;
        insert(&store, "b@x.com", Category::Diabetes).await;

        let listed: Vec<MealPlanId> = store
            .list_plans("a@x.com")
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(listed, vec![second, first]);

        let latest = store
            .latest_plan("a@x.com", Category::Diabetes)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, second);
        assert!(store
            .latest_plan("a@x.com", Category::Detox)
            .await
            .unwrap()
            .is_none());
    }
}
