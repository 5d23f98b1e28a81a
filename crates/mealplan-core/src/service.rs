//! Request-level facade: identity resolution, then survey intake, then the
//! lifecycle engine.

use std::sync::Arc;

use mealplan_db::models::{Answers, Category, MealId, MealPlan, MealPlanId, Payment};

use crate::config::EngineConfig;
use crate::content::{CatalogConfig, CatalogProvider, ContentProvider};
use crate::error::MealPlanError;
use crate::identity::{IdentityRequest, IdentityResolver};
use crate::lifecycle::{LifecycleEngine, PaymentConfirmation};
use crate::store::MealPlanStore;
use crate::survey::parser::QuestionnaireError;
use crate::survey::{Biodata, BuiltinQuestionnaires, SurveyIntake};

pub struct MealPlanService {
    resolver: IdentityResolver,
    intake: SurveyIntake,
    engine: Arc<LifecycleEngine>,
}

impl MealPlanService {
    pub fn new(
        resolver: IdentityResolver,
        intake: SurveyIntake,
        engine: Arc<LifecycleEngine>,
    ) -> Self {
        Self {
            resolver,
            intake,
            engine,
        }
    }

    /// A service using the embedded questionnaires and the catalog content
    /// provider.
    pub fn builtin(
        resolver: IdentityResolver,
        store: Arc<dyn MealPlanStore>,
        engine_config: EngineConfig,
        catalog_config: CatalogConfig,
    ) -> Result<Self, QuestionnaireError> {
        let intake = SurveyIntake::new(Arc::new(BuiltinQuestionnaires::load()?));
        let provider: Arc<dyn ContentProvider> = Arc::new(CatalogProvider::new(catalog_config));
        let engine = LifecycleEngine::new(store, provider, engine_config);
        Ok(Self::new(resolver, intake, Arc::new(engine)))
    }

    pub fn engine(&self) -> &LifecycleEngine {
        &self.engine
    }

    /// Resolve the caller, validate the answers, and submit.
    pub async fn submit_survey(
        &self,
        request: &IdentityRequest,
        category: &str,
        answers: Answers,
        biodata: Option<&Biodata>,
    ) -> Result<MealPlan, MealPlanError> {
        let identity = self.resolver.resolve(request).await?;
        let validated = self.intake.validate(category, answers, biodata)?;
        self.engine.submit(&identity, validated).await
    }

    pub async fn select(
        &self,
        plan_id: MealPlanId,
        selected_meal_ids: &[MealId],
    ) -> Result<MealPlan, MealPlanError> {
        self.engine.select(plan_id, selected_meal_ids).await
    }

    pub async fn upgrade(
        &self,
        plan_id: MealPlanId,
        payment: &PaymentConfirmation,
    ) -> Result<MealPlan, MealPlanError> {
        self.engine.upgrade(plan_id, payment).await
    }

    pub async fn get_meal_plan(&self, plan_id: MealPlanId) -> Result<MealPlan, MealPlanError> {
        self.engine.get_meal_plan(plan_id).await
    }

    pub async fn latest_meal_plan(
        &self,
        request: &IdentityRequest,
        category: &str,
    ) -> Result<Option<MealPlan>, MealPlanError> {
        let identity = self.resolver.resolve(request).await?;
        let category: Category = category
            .parse()
            .map_err(|_| MealPlanError::InvalidCategory(category.to_string()))?;
        self.engine.latest_meal_plan(&identity, category).await
    }

    pub async fn list_meal_plans(
        &self,
        request: &IdentityRequest,
    ) -> Result<Vec<MealPlan>, MealPlanError> {
        let identity = self.resolver.resolve(request).await?;
        self.engine.list_meal_plans(&identity).await
    }

    pub async fn payment_for(
        &self,
        plan_id: MealPlanId,
    ) -> Result<Option<Payment>, MealPlanError> {
        self.engine.payment_for(plan_id).await
    }
}
