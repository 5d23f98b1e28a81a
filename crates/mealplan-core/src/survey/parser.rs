//! Questionnaire parsing and structural validation.

use std::collections::HashSet;

use thiserror::Error;

use super::format::Questionnaire;

/// Errors that can occur while loading a questionnaire.
#[derive(Debug, Error)]
pub enum QuestionnaireError {
    #[error("failed to parse questionnaire TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("questionnaire for {0} has no questions")]
    NoQuestions(String),

    #[error("duplicate question id {0}")]
    DuplicateId(u32),

    #[error("duplicate question label {0:?}")]
    DuplicateLabel(String),

    #[error("question {question} is conditional on {references}, which is not an earlier question")]
    UnknownCondition { question: u32, references: u32 },

    #[error("question {0} is a choice but lists no options")]
    MissingOptions(u32),
}

/// Parse a questionnaire and check it is internally consistent.
pub fn parse_questionnaire(content: &str) -> Result<Questionnaire, QuestionnaireError> {
    let questionnaire: Questionnaire = toml::from_str(content)?;
    validate(&questionnaire)?;
    Ok(questionnaire)
}

fn validate(questionnaire: &Questionnaire) -> Result<(), QuestionnaireError> {
    if questionnaire.questions.is_empty() {
        return Err(QuestionnaireError::NoQuestions(
            questionnaire.category.to_string(),
        ));
    }

    let mut ids = HashSet::new();
    let mut labels = HashSet::new();
    for question in &questionnaire.questions {
        if let Some(cond) = &question.required_when {
            // Conditions may only look backwards.
            if !ids.contains(&cond.question) {
                return Err(QuestionnaireError::UnknownCondition {
                    question: question.id,
                    references: cond.question,
                });
            }
        }
        if !ids.insert(question.id) {
            return Err(QuestionnaireError::DuplicateId(question.id));
        }
        if !labels.insert(question.label.as_str()) {
            return Err(QuestionnaireError::DuplicateLabel(question.label.clone()));
        }
        if question.kind.needs_options() && question.options.is_empty() {
            return Err(QuestionnaireError::MissingOptions(question.id));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "category = \"hbp\"\ntitle = \"High Blood Pressure\"\n";

    fn parse(body: &str) -> Result<Questionnaire, QuestionnaireError> {
        parse_questionnaire(&format!("{HEADER}{body}"))
    }

    #[test]
    fn parse_valid_questionnaire() {
        let q = parse(
            r#"
[[questions]]
id = 1
label = "Smoke?"
kind = "choice"
options = ["Yes", "No"]

[[questions]]
id = 2
label = "How many?"
kind = "text"
required_when = { question = 1, values = ["Yes"] }
"#,
        )
        .expect("should parse");
        assert_eq!(q.questions.len(), 2);
    }

    #[test]
    fn rejects_missing_questions() {
        let err = parse("").unwrap_err();
        assert!(matches!(err, QuestionnaireError::NoQuestions(ref c) if c == "hbp"));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = parse(
            r#"
[[questions]]
id = 1
label = "A"
kind = "text"

[[questions]]
id = 1
label = "B"
kind = "text"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, QuestionnaireError::DuplicateId(1)));
    }

    #[test]
    fn rejects_duplicate_labels() {
        let err = parse(
            r#"
[[questions]]
id = 1
label = "Same"
kind = "text"

[[questions]]
id = 2
label = "Same"
kind = "number"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, QuestionnaireError::DuplicateLabel(_)));
    }

    #[test]
    fn rejects_forward_condition() {
        let err = parse(
            r#"
[[questions]]
id = 1
label = "If yes, which?"
kind = "text"
required_when = { question = 2, values = ["Yes"] }

[[questions]]
id = 2
label = "Any?"
kind = "choice"
options = ["Yes", "No"]
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            QuestionnaireError::UnknownCondition {
                question: 1,
                references: 2
            }
        ));
    }

    #[test]
    fn rejects_choice_without_options() {
        let err = parse(
            r#"
[[questions]]
id = 1
label = "Pick"
kind = "multiselect"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, QuestionnaireError::MissingOptions(1)));
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = parse(
            r#"
[[questions]]
id = 1
label = "Slider"
kind = "slider"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, QuestionnaireError::TomlError(_)));
    }
}
