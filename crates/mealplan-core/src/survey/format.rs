//! TOML format types for questionnaire files.
//!
//! Each category ships one `questionnaires/<category>.toml`. Answers are
//! keyed by question label, so labels double as answer keys.

use std::fmt;

use mealplan_db::models::{Answers, Category};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level structure of a questionnaire file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Questionnaire {
    pub category: Category,
    pub title: String,
    #[serde(default)]
    pub questions: Vec<Question>,
}

/// A single `[[questions]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    /// Position-stable id, referenced by `required_when`.
    pub id: u32,
    /// Question text; also the key of the answer.
    pub label: String,
    pub kind: QuestionKind,
    /// Allowed values for `choice` and `multiselect`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// Biodata field that can prefill this question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biodata: Option<BiodataField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_when: Option<RequiredWhen>,
}

/// Makes a question required only when an earlier question was answered
/// with one of `values`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequiredWhen {
    pub question: u32,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    Text,
    Email,
    Date,
    Textarea,
    Choice,
    Number,
    Multiselect,
}

impl QuestionKind {
    pub fn needs_options(self) -> bool {
        matches!(self, Self::Choice | Self::Multiselect)
    }

    /// Whether `value` counts as an answer for a question of this kind.
    pub fn is_filled(self, value: Option<&Value>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match self {
            Self::Text | Self::Email | Self::Date | Self::Textarea | Self::Choice => {
                value.as_str().is_some_and(|s| !s.trim().is_empty())
            }
            Self::Number => match value {
                Value::Number(_) => true,
                Value::String(s) => s.trim().parse::<f64>().is_ok_and(f64::is_finite),
                _ => false,
            },
            Self::Multiselect => value.as_array().is_some_and(|a| !a.is_empty()),
        }
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Text => "text",
            Self::Email => "email",
            Self::Date => "date",
            Self::Textarea => "textarea",
            Self::Choice => "choice",
            Self::Number => "number",
            Self::Multiselect => "multiselect",
        };
        f.write_str(s)
    }
}

/// Personal details that can prefill questionnaire answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiodataField {
    FullName,
    Email,
    Phone,
    Gender,
    MaritalStatus,
    DateOfBirth,
    Address,
    Occupation,
}

impl Questionnaire {
    pub fn question(&self, id: u32) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    /// Whether `question` must be answered given the other answers.
    pub fn is_required(&self, question: &Question, answers: &Answers) -> bool {
        let Some(cond) = &question.required_when else {
            return true;
        };
        let Some(referenced) = self.question(cond.question) else {
            return false;
        };
        answers
            .get(&referenced.label)
            .and_then(Value::as_str)
            .is_some_and(|given| cond.values.iter().any(|v| v == given))
    }

    /// Labels of every required question without an answer, in
    /// questionnaire order.
    pub fn missing_answers(&self, answers: &Answers) -> Vec<String> {
        self.questions
            .iter()
            .filter(|q| self.is_required(q, answers))
            .filter(|q| !q.kind.is_filled(answers.get(&q.label)))
            .map(|q| q.label.clone())
            .collect()
    }
}
