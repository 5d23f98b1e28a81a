//! `mealplan questions <category>`: print the questionnaire a submission
//! must answer.

use std::fmt::Write as _;

use anyhow::{Context, Result};

use mealplan_core::survey::format::Questionnaire;
use mealplan_core::survey::{BuiltinQuestionnaires, QuestionSchemaStore};
use mealplan_db::models::Category;

pub fn run_questions(category: &str) -> Result<()> {
    let parsed: Category = category.parse().with_context(|| {
        format!("unknown category {category:?} (try diabetes, hbp, weight, detox)")
    })?;
    let catalog = BuiltinQuestionnaires::load().context("failed to load questionnaires")?;
    let questionnaire = catalog
        .questionnaire(parsed)
        .with_context(|| format!("no questionnaire for category {parsed}"))?;

    print!("{}", render_questionnaire(questionnaire));
    Ok(())
}

fn render_questionnaire(questionnaire: &Questionnaire) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} ({}, {} questions)",
        questionnaire.title,
        questionnaire.category,
        questionnaire.questions.len()
    );
    let _ = writeln!(out);

    for q in &questionnaire.questions {
        let _ = writeln!(out, "{:>3}. {} [{}]", q.id, q.label, q.kind);
        if !q.options.is_empty() {
            let _ = writeln!(out, "     options: {}", q.options.join(" | "));
        }
        if let Some(cond) = &q.required_when {
            let _ = writeln!(
                out,
                "     required when #{} is {}",
                cond.question,
                cond.values.join(" or ")
            );
        }
        if let Some(field) = q.biodata {
            let _ = writeln!(out, "     prefilled from biodata: {field:?}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_lists_every_question() {
        let catalog = BuiltinQuestionnaires::load().unwrap();
        let questionnaire = catalog.questionnaire(Category::Diabetes).unwrap();

        let out = render_questionnaire(questionnaire);

        let header = out.lines().next().unwrap();
        assert!(header.contains("diabetes"), "{header}");
        for q in &questionnaire.questions {
            assert!(out.contains(&q.label), "missing {:?}", q.label);
        }
    }

    #[test]
    fn render_shows_conditions_and_options() {
        let catalog = BuiltinQuestionnaires::load().unwrap();
        let questionnaire = catalog.questionnaire(Category::Hbp).unwrap();

        let out = render_questionnaire(questionnaire);

        assert!(out.contains("options: "));
        if questionnaire.questions.iter().any(|q| q.required_when.is_some()) {
            assert!(out.contains("required when #"));
        }
    }

    #[test]
    fn unknown_category_is_an_error() {
        let err = run_questions("keto").unwrap_err();
        assert!(err.to_string().contains("unknown category"), "{err}");
    }
}
