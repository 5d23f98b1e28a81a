//! End-to-end walk through the service facade with the built-in
//! questionnaires and food catalog.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;

use mealplan_core::content::CatalogConfig;
use mealplan_core::identity::{IdentityRequest, IdentityResolver};
use mealplan_core::lifecycle::PaymentConfirmation;
use mealplan_core::store::MemoryStore;
use mealplan_core::survey::format::QuestionKind;
use mealplan_core::survey::{BuiltinQuestionnaires, QuestionSchemaStore};
use mealplan_core::{EngineConfig, MealPlanError, MealPlanService};
use mealplan_db::models::{Answers, Category, PaymentStatus, PlanState};

fn service() -> MealPlanService {
    MealPlanService::builtin(
        IdentityResolver::guests_only(),
        Arc::new(MemoryStore::new()),
        EngineConfig::default(),
        CatalogConfig::default(),
    )
    .unwrap()
}

fn answers_for(category: Category) -> Answers {
    let catalog = BuiltinQuestionnaires::load().unwrap();
    catalog
        .questionnaire(category)
        .unwrap()
        .questions
        .iter()
        .map(|q| {
            let value = match q.kind {
                QuestionKind::Number => json!("70"),
                QuestionKind::Multiselect => json!([q.options[0]]),
                QuestionKind::Choice => json!(q.options[0]),
                _ => json!("None"),
            };
            (q.label.clone(), value)
        })
        .collect()
}

#[tokio::test]
async fn guest_walks_free_then_paid_lifecycle() {
    let service = service();
    let caller = IdentityRequest::guest("A@X.com");
    let ids: Vec<i64> = (1..=10).collect();

    let plan = service
        .submit_survey(&caller, "diabetes", answers_for(Category::Diabetes), None)
        .await
        .unwrap();
    assert_eq!(plan.id, 1);
    assert_eq!(plan.identity_key, "a@x.com");
    assert_eq!(plan.state, PlanState::Submitted);
    assert_eq!(plan.candidate_meals.len(), 100);

    let selected = service.select(1, &ids).await.unwrap();
    assert_eq!(selected.state, PlanState::Selected);
    let short = selected.short_plan.as_ref().unwrap();
    assert_eq!(short.days.len(), 2);

    let other = service
        .submit_survey(&caller, "detox", answers_for(Category::Detox), None)
        .await
        .unwrap();
    assert_eq!(other.id, 2);
    let err = service.select(2, &ids).await.unwrap_err();
    assert!(matches!(
        err,
        MealPlanError::FreePlanAlreadyUsed {
            blocking_plan: Some(1),
            ..
        }
    ));

    let confirmation = PaymentConfirmation::new("5000.00".parse().unwrap(), "NGN", "REF-1");
    let upgraded = service.upgrade(1, &confirmation).await.unwrap();
    assert_eq!(upgraded.state, PlanState::Upgraded);
    assert_eq!(upgraded.payment_status, PaymentStatus::Paid);
    let extended = upgraded.extended_plan.as_ref().unwrap();
    assert_eq!(extended.days.len(), 30);
    let distinct: HashSet<_> = extended
        .days
        .iter()
        .map(|d| (&d.breakfast, &d.lunch, &d.dinner))
        .collect();
    assert_eq!(distinct.len(), 30, "every extended day differs");

    let payment = service.payment_for(1).await.unwrap().unwrap();
    assert_eq!(payment.reference, "REF-1");

    assert_eq!(
        service.select(2, &ids).await.unwrap().state,
        PlanState::Selected
    );

    let listed = service.list_meal_plans(&caller).await.unwrap();
    assert_eq!(
        listed.iter().map(|p| p.id).collect::<Vec<_>>(),
        vec![2, 1]
    );
    let latest = service
        .latest_meal_plan(&caller, "diabetes")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.id, 1);
}

#[tokio::test]
async fn incomplete_survey_is_rejected_before_generation() {
    let service = service();
    let caller = IdentityRequest::guest("a@x.com");
    let catalog = BuiltinQuestionnaires::load().unwrap();
    let removed = catalog
        .questionnaire(Category::Hbp)
        .unwrap()
        .questions
        .iter()
        .find(|q| q.required_when.is_none())
        .map(|q| q.label.clone())
        .unwrap();
    let mut answers = answers_for(Category::Hbp);
    answers.remove(&removed);

    let err = service
        .submit_survey(&caller, "hbp", answers, None)
        .await
        .unwrap_err();

    match err {
        MealPlanError::InvalidAnswers { missing } => assert!(missing.contains(&removed)),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(service.list_meal_plans(&caller).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_category_and_missing_identity_are_rejected() {
    let service = service();

    let err = service
        .submit_survey(
            &IdentityRequest::guest("a@x.com"),
            "keto",
            Answers::new(),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MealPlanError::InvalidCategory(c) if c == "keto"));

    let err = service
        .submit_survey(
            &IdentityRequest::default(),
            "diabetes",
            answers_for(Category::Diabetes),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MealPlanError::MissingIdentity(_)));
}
