//! Questionnaires compiled into the binary.

use std::collections::HashMap;

use mealplan_db::models::Category;

use super::QuestionSchemaStore;
use super::format::Questionnaire;
use super::parser::{QuestionnaireError, parse_questionnaire};

const DIABETES: &str = include_str!("../../questionnaires/diabetes.toml");
const HBP: &str = include_str!("../../questionnaires/hbp.toml");
const WEIGHT: &str = include_str!("../../questionnaires/weight.toml");
const DETOX: &str = include_str!("../../questionnaires/detox.toml");

/// The stock questionnaire for every category.
#[derive(Debug, Clone)]
pub struct BuiltinQuestionnaires {
    by_category: HashMap<Category, Questionnaire>,
}

impl BuiltinQuestionnaires {
    /// Parse and validate the embedded questionnaires.
    pub fn load() -> Result<Self, QuestionnaireError> {
        let mut by_category = HashMap::with_capacity(Category::ALL.len());
        for source in [DIABETES, HBP, WEIGHT, DETOX] {
            let questionnaire = parse_questionnaire(source)?;
            by_category.insert(questionnaire.category, questionnaire);
        }
        Ok(Self { by_category })
    }
}

impl QuestionSchemaStore for BuiltinQuestionnaires {
    fn questionnaire(&self, category: Category) -> Option<&Questionnaire> {
        self.by_category.get(&category)
    }
}
