//! Survey intake: the gate in front of the engine's submit transition.
//!
//! Answers are checked against the category's questionnaire before any
//! plan exists. Biodata the caller already holds may fill blank answers.

pub mod catalog;
pub mod format;
pub mod parser;

use std::sync::Arc;

use mealplan_db::models::{Answers, Category};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::MealPlanError;
use format::{BiodataField, Questionnaire};

pub use catalog::BuiltinQuestionnaires;

/// Source of the questionnaire for each category.
pub trait QuestionSchemaStore: Send + Sync {
    fn questionnaire(&self, category: Category) -> Option<&Questionnaire>;
}

/// Personal details on file for the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Biodata {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub marital_status: Option<String>,
    pub date_of_birth: Option<String>,
    pub address: Option<String>,
    pub occupation: Option<String>,
}

impl Biodata {
    /// The non-blank value for a field, normalized for use as an answer.
    pub fn value_for(&self, field: BiodataField) -> Option<String> {
        let raw = match field {
            BiodataField::FullName => &self.full_name,
            BiodataField::Email => &self.email,
            BiodataField::Phone => &self.phone,
            BiodataField::Gender => &self.gender,
            BiodataField::MaritalStatus => &self.marital_status,
            BiodataField::DateOfBirth => &self.date_of_birth,
            BiodataField::Address => &self.address,
            BiodataField::Occupation => &self.occupation,
        };
        let value = raw.as_deref().map(str::trim).filter(|v| !v.is_empty())?;
        if field == BiodataField::Gender {
            return Some(capitalize_gender(value));
        }
        Some(value.to_string())
    }
}

/// `male`, `female` and `other` become `Male`, `Female`, `Other` to match
/// the questionnaire options. Anything else is kept as given.
fn capitalize_gender(value: &str) -> String {
    match value.to_lowercase().as_str() {
        "male" => "Male".to_string(),
        "female" => "Female".to_string(),
        "other" => "Other".to_string(),
        _ => value.to_string(),
    }
}

/// Answers that passed intake for one category. Only [`SurveyIntake`] can
/// construct these, so the engine never sees unvalidated input.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAnswers {
    category: Category,
    answers: Answers,
}

impl ValidatedAnswers {
    pub(crate) fn new(category: Category, answers: Answers) -> Self {
        Self { category, answers }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn answers(&self) -> &Answers {
        &self.answers
    }

    pub fn into_answers(self) -> Answers {
        self.answers
    }
}

/// Validates questionnaire answers for a category.
#[derive(Clone)]
pub struct SurveyIntake {
    schemas: Arc<dyn QuestionSchemaStore>,
}

impl SurveyIntake {
    pub fn new(schemas: Arc<dyn QuestionSchemaStore>) -> Self {
        Self { schemas }
    }

    /// Resolve the category, prefill from `biodata`, and require every
    /// required question to be answered.
    pub fn validate(
        &self,
        category: &str,
        mut answers: Answers,
        biodata: Option<&Biodata>,
    ) -> Result<ValidatedAnswers, MealPlanError> {
        let parsed: Category = category
            .parse()
            .map_err(|_| MealPlanError::InvalidCategory(category.to_string()))?;
        let questionnaire = self
            .schemas
            .questionnaire(parsed)
            .ok_or_else(|| MealPlanError::InvalidCategory(category.to_string()))?;

        if let Some(biodata) = biodata {
            prefill(questionnaire, &mut answers, biodata);
        }

        let missing = questionnaire.missing_answers(&answers);
        if !missing.is_empty() {
            debug!(category = %parsed, missing = missing.len(), "answers rejected");
            return Err(MealPlanError::InvalidAnswers { missing });
        }

        Ok(ValidatedAnswers::new(parsed, answers))
    }
}

/// Fill absent or blank answers of biodata-backed questions.
fn prefill(questionnaire: &Questionnaire, answers: &mut Answers, biodata: &Biodata) {
    for question in &questionnaire.questions {
        let Some(field) = question.biodata else {
            continue;
        };
        let blank = match answers.get(&question.label) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        };
        if !blank {
            continue;
        }
        if let Some(value) = biodata.value_for(field) {
            answers.insert(question.label.clone(), Value::String(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn intake() -> SurveyIntake {
        SurveyIntake::new(Arc::new(
            BuiltinQuestionnaires::load().expect("embedded questionnaires are valid"),
        ))
    }

    /// A complete set of answers for a questionnaire, answering every
    /// conditional trigger with its first option.
    fn complete(questionnaire: &Questionnaire) -> Answers {
        questionnaire
            .questions
            .iter()
            .map(|q| {
                let value = match q.kind {
                    format::QuestionKind::Number => json!(42),
                    format::QuestionKind::Multiselect => json!([q.options[0].clone()]),
                    format::QuestionKind::Choice => json!(q.options[0].clone()),
                    _ => json!("answer"),
                };
                (q.label.clone(), value)
            })
            .collect()
    }

    fn questionnaire(category: Category) -> Questionnaire {
        BuiltinQuestionnaires::load()
            .unwrap()
            .questionnaire(category)
            .unwrap()
            .clone()
    }

    #[test]
    fn unknown_category_is_rejected() {
        let err = intake().validate("keto", Answers::new(), None).unwrap_err();
        assert!(matches!(err, MealPlanError::InvalidCategory(ref c) if c == "keto"));
    }

    #[test]
    fn category_aliases_are_accepted() {
        let answers = complete(&questionnaire(Category::Hbp));
        let validated = intake().validate("Hypertension", answers, None).unwrap();
        assert_eq!(validated.category(), Category::Hbp);
    }

    #[test]
    fn complete_answers_pass() {
        for category in Category::ALL {
            let answers = complete(&questionnaire(category));
            let validated = intake()
                .validate(&category.to_string(), answers.clone(), None)
                .unwrap();
            assert_eq!(validated.answers(), &answers);
        }
    }

    #[test]
    fn all_missing_labels_are_reported() {
        let q = questionnaire(Category::Weight);
        let mut answers = complete(&q);
        answers.remove("Full Name:");
        answers.insert("Meals per day:".into(), json!("several"));

        let err = intake().validate("weight", answers, None).unwrap_err();
        let MealPlanError::InvalidAnswers { missing } = err else {
            panic!("expected InvalidAnswers, got {err:?}");
        };
        assert_eq!(missing, vec!["Full Name:".to_string(), "Meals per day:".to_string()]);
    }

    #[test]
    fn conditional_follow_up_becomes_required() {
        let q = questionnaire(Category::Diabetes);
        let mut answers = complete(&q);
        answers.insert(
            "Have you ever been diagnosed with diabetes?".into(),
            json!("Yes"),
        );
        answers.remove("If yes, when? (YYYY-MM-DD)");
        let err = intake().validate("diabetes", answers.clone(), None).unwrap_err();
        assert!(matches!(err, MealPlanError::InvalidAnswers { .. }));

        answers.insert(
            "Have you ever been diagnosed with diabetes?".into(),
            json!("No"),
        );
        intake().validate("diabetes", answers, None).unwrap();
    }

    #[test]
    fn biodata_fills_blank_answers() {
        let q = questionnaire(Category::Detox);
        let mut answers = complete(&q);
        answers.insert("Full Name:".into(), json!("  "));
        answers.remove("Gender:");
        answers.remove("Email:");

        let biodata = Biodata {
            full_name: Some("Ada Obi".into()),
            gender: Some("female".into()),
            email: Some("ada@example.com".into()),
            ..Biodata::default()
        };
        let validated = intake()
            .validate("detox", answers, Some(&biodata))
            .unwrap();
        let answers = validated.answers();
        assert_eq!(answers["Full Name:"], json!("Ada Obi"));
        assert_eq!(answers["Gender:"], json!("Female"));
        assert_eq!(answers["Email:"], json!("ada@example.com"));
    }

    #[test]
    fn biodata_does_not_override_given_answers() {
        let q = questionnaire(Category::Hbp);
        let mut answers = complete(&q);
        answers.insert("Full Name:".into(), json!("Given Name"));
        let biodata = Biodata {
            full_name: Some("Biodata Name".into()),
            ..Biodata::default()
        };
        let validated = intake().validate("hbp", answers, Some(&biodata)).unwrap();
        assert_eq!(validated.answers()["Full Name:"], json!("Given Name"));
    }

    #[test]
    fn gender_capitalization() {
        assert_eq!(capitalize_gender("MALE"), "Male");
        assert_eq!(capitalize_gender("other"), "Other");
        assert_eq!(capitalize_gender("non-binary"), "non-binary");
    }
}
