//! Shared fixtures for the lifecycle integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use mealplan_core::EngineConfig;
use mealplan_core::LifecycleEngine;
use mealplan_core::content::{ContentProvider, PlanRequest};
use mealplan_core::identity::Identity;
use mealplan_core::lifecycle::PaymentConfirmation;
use mealplan_core::store::{MealPlanStore, MemoryStore};
use mealplan_core::survey::format::QuestionKind;
use mealplan_core::survey::{
    BuiltinQuestionnaires, QuestionSchemaStore, SurveyIntake, ValidatedAnswers,
};
use mealplan_db::models::{Answers, Category, Meal, MealId, MealSchedule, PlanDay};

/// Content provider double: counts calls, can fail a number of upcoming
/// calls per step, and can be slowed down.
#[derive(Default)]
pub struct FakeProvider {
    candidates: usize,
    delay: Option<Duration>,
    candidate_calls: AtomicUsize,
    short_calls: AtomicUsize,
    extended_calls: AtomicUsize,
    fail_candidates: AtomicUsize,
    fail_short: AtomicUsize,
    fail_extended: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::with_candidates(100)
    }

    pub fn with_candidates(candidates: usize) -> Self {
        Self {
            candidates,
            ..Self::default()
        }
    }

    /// Every call sleeps for `delay` first.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn fail_next_candidates(&self, n: usize) {
        self.fail_candidates.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_short(&self, n: usize) {
        self.fail_short.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_extended(&self, n: usize) {
        self.fail_extended.store(n, Ordering::SeqCst);
    }

    pub fn candidate_calls(&self) -> usize {
        self.candidate_calls.load(Ordering::SeqCst)
    }

    pub fn short_calls(&self) -> usize {
        self.short_calls.load(Ordering::SeqCst)
    }

    pub fn extended_calls(&self) -> usize {
        self.extended_calls.load(Ordering::SeqCst)
    }

    async fn enter(&self, calls: &AtomicUsize, failures: &AtomicUsize) -> anyhow::Result<()> {
        calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failed = failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            anyhow::bail!("content provider unavailable");
        }
        Ok(())
    }
}

fn schedule(days: u32, meals: &[Meal]) -> MealSchedule {
    let name = |i: usize| {
        meals
            .get(i % meals.len().max(1))
            .map(|m| m.name.clone())
            .unwrap_or_else(|| "Grilled chicken".to_string())
    };
    MealSchedule {
        days: (1..=days)
            .map(|day| {
                let i = day as usize;
                PlanDay {
                    day,
                    breakfast: name(i),
                    lunch: name(i + 1),
                    dinner: name(i + 2),
                    snacks: vec!["Herbal tea (morning)".to_string()],
                }
            })
            .collect(),
    }
}

#[async_trait]
impl ContentProvider for FakeProvider {
    async fn generate_candidate_meals(
        &self,
        _category: Category,
        _answers: &Answers,
    ) -> anyhow::Result<Vec<Meal>> {
        self.enter(&self.candidate_calls, &self.fail_candidates)
            .await?;
        Ok((1..=self.candidates as MealId)
            .map(|id| Meal {
                id,
                name: format!("Meal {id}"),
                tags: vec!["protein".to_string()],
            })
            .collect())
    }

    async fn generate_short_plan(&self, request: PlanRequest<'_>) -> anyhow::Result<MealSchedule> {
        self.enter(&self.short_calls, &self.fail_short).await?;
        Ok(schedule(2, request.selected_meals))
    }

    async fn generate_extended_plan(
        &self,
        request: PlanRequest<'_>,
    ) -> anyhow::Result<MealSchedule> {
        self.enter(&self.extended_calls, &self.fail_extended)
            .await?;
        Ok(schedule(30, request.selected_meals))
    }
}

/// Config with a short timeout and no retries.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        generation_timeout_secs: 1,
        retry_backoff_ms: 10,
        ..EngineConfig::default()
    }
}

pub struct Harness {
    pub engine: Arc<LifecycleEngine>,
    pub store: Arc<MemoryStore>,
    pub provider: Arc<FakeProvider>,
}

pub fn harness(provider: FakeProvider) -> Harness {
    harness_with(provider, test_config())
}

pub fn harness_with(provider: FakeProvider, config: EngineConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(provider);
    let engine = LifecycleEngine::new(
        Arc::clone(&store) as Arc<dyn MealPlanStore>,
        Arc::clone(&provider) as Arc<dyn ContentProvider>,
        config,
    );
    Harness {
        engine: Arc::new(engine),
        store,
        provider,
    }
}

/// Answers every question of the category's questionnaire.
pub fn complete_answers(category: Category) -> Answers {
    let catalog = BuiltinQuestionnaires::load().expect("embedded questionnaires are valid");
    let questionnaire = catalog
        .questionnaire(category)
        .expect("questionnaire for every category");
    questionnaire
        .questions
        .iter()
        .map(|q| {
            let value = match q.kind {
                QuestionKind::Number => json!(30),
                QuestionKind::Multiselect => json!([q.options[0]]),
                QuestionKind::Choice => json!(q.options[0]),
                QuestionKind::Email => json!("a@x.com"),
                QuestionKind::Date => json!("01/01/1990"),
                QuestionKind::Text | QuestionKind::Textarea => json!("None"),
            };
            (q.label.clone(), value)
        })
        .collect()
}

pub fn validated(category: Category) -> ValidatedAnswers {
    validated_with(category, complete_answers(category))
}

pub fn validated_with(category: Category, answers: Answers) -> ValidatedAnswers {
    let intake = SurveyIntake::new(Arc::new(
        BuiltinQuestionnaires::load().expect("embedded questionnaires are valid"),
    ));
    intake
        .validate(&category.to_string(), answers, None)
        .expect("complete answers validate")
}

pub fn guest(email: &str) -> Identity {
    Identity::guest(email).expect("valid email")
}

pub fn ids(range: std::ops::RangeInclusive<MealId>) -> Vec<MealId> {
    range.collect()
}

pub fn payment(reference: &str) -> PaymentConfirmation {
    PaymentConfirmation::new(
        "5000.00".parse().expect("valid amount"),
        "NGN",
        reference,
    )
}
