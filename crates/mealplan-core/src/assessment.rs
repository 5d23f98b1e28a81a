//! Severity assessment of a submission.
//!
//! Each category reads a few clinical answers and maps them onto a mild,
//! moderate or severe tier:
//!
//! ```text
//! diabetes  fasting sugar mg/dL   100 / 126 / >180    HbA1c %  5.7 / 6.5 / 8.0
//! hbp       blood pressure mmHg   130/80 / 140/90 / 160/100
//! weight    BMI                   25 / 30 / 40
//! detox     always mild
//! ```
//!
//! The worst reading wins. Missing or unreadable answers never fail a
//! submission; they leave the plan at the mild tier.

use std::sync::LazyLock;

use mealplan_db::models::{
    Answers, Assessment, AssessmentMetrics, BloodPressure, Category, Severity,
};
use regex::Regex;
use serde_json::Value;

pub const FASTING_SUGAR_LABEL: &str = "Last known blood sugar reading (Fasting):";
pub const HBA1C_LABEL: &str = "Last known HbA1c (if tested):";
pub const DIABETES_BP_LABEL: &str = "Blood pressure (last reading, if known):";
pub const BP_READING_LABEL: &str = "Current Blood Pressure Reading:";
pub const BMI_LABEL: &str = "Body Mass Index (BMI):";
pub const WEIGHT_LABEL: &str = "Current Weight (kg):";
pub const HEIGHT_LABEL: &str = "Height (cm):";

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("number pattern is valid"));

static BP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{2,3})\s*/\s*(\d{2,3})").expect("blood pressure pattern is valid")
});

/// Assess the answers of a submission in `category`.
pub fn assess(category: Category, answers: &Answers) -> Assessment {
    match category {
        Category::Diabetes => assess_diabetes(answers),
        Category::Hbp => assess_blood_pressure(answers),
        Category::Weight => assess_weight(answers),
        Category::Detox => Assessment {
            condition: Category::Detox,
            severity: Severity::Mild,
            metrics: AssessmentMetrics::default(),
            reasoning: "Detox plans have a single tier.".to_string(),
        },
    }
}

fn assess_diabetes(answers: &Answers) -> Assessment {
    let fasting = answers.get(FASTING_SUGAR_LABEL).and_then(to_number);
    let hba1c = answers.get(HBA1C_LABEL).and_then(to_number);
    let bp = answers.get(DIABETES_BP_LABEL).and_then(parse_blood_pressure);

    let mut severity = Severity::Mild;
    let mut reasons = Vec::new();

    if let Some(value) = fasting {
        let (tier, band) = fasting_sugar_tier(value);
        severity = severity.max(tier);
        reasons.push(format!("fasting sugar {value} mg/dL {band} -> {tier}"));
    }
    if let Some(value) = hba1c {
        let (tier, band) = hba1c_tier(value);
        severity = severity.max(tier);
        reasons.push(format!("HbA1c {value}% {band} -> {tier}"));
    }
    // Recorded for context only; it does not move the diabetes tier.
    if let Some(bp) = bp {
        reasons.push(format!("blood pressure {bp} mmHg noted"));
    }

    let reasoning = if reasons.is_empty() {
        "No glucose readings; defaulted to mild.".to_string()
    } else {
        reasons.join("; ")
    };

    Assessment {
        condition: Category::Diabetes,
        severity,
        metrics: AssessmentMetrics {
            fasting_blood_sugar: fasting,
            hba1c_percent: hba1c,
            blood_pressure: bp,
            ..AssessmentMetrics::default()
        },
        reasoning,
    }
}

fn fasting_sugar_tier(mg_dl: f64) -> (Severity, &'static str) {
    if mg_dl > 180.0 {
        (Severity::Severe, "above 180")
    } else if mg_dl >= 126.0 {
        (Severity::Moderate, "in 126-180")
    } else if mg_dl >= 100.0 {
        (Severity::Mild, "in 100-125")
    } else {
        (Severity::Mild, "below 100")
    }
}

fn hba1c_tier(percent: f64) -> (Severity, &'static str) {
    if percent >= 8.0 {
        (Severity::Severe, "at or above 8.0")
    } else if percent >= 6.5 {
        (Severity::Moderate, "in 6.5-7.9")
    } else if percent >= 5.7 {
        (Severity::Mild, "in 5.7-6.4")
    } else {
        (Severity::Mild, "below 5.7")
    }
}

fn assess_blood_pressure(answers: &Answers) -> Assessment {
    let Some(bp) = answers.get(BP_READING_LABEL).and_then(parse_blood_pressure) else {
        return Assessment {
            condition: Category::Hbp,
            severity: Severity::Mild,
            metrics: AssessmentMetrics::default(),
            reasoning: "No blood pressure reading; defaulted to mild.".to_string(),
        };
    };

    let (severity, band) = blood_pressure_tier(bp);
    Assessment {
        condition: Category::Hbp,
        severity,
        metrics: AssessmentMetrics {
            blood_pressure: Some(bp),
            ..AssessmentMetrics::default()
        },
        reasoning: format!("blood pressure {bp} mmHg {band} -> {severity}"),
    }
}

/// Either number reaching a band is enough to place the reading in it.
fn blood_pressure_tier(bp: BloodPressure) -> (Severity, &'static str) {
    let BloodPressure {
        systolic,
        diastolic,
    } = bp;
    if systolic >= 160 || diastolic >= 100 {
        (Severity::Severe, "at or above 160/100")
    } else if systolic >= 140 || diastolic >= 90 {
        (Severity::Moderate, "in 140-159/90-99")
    } else if systolic >= 130 || diastolic >= 80 {
        (Severity::Mild, "in 130-139/80-89")
    } else {
        (Severity::Mild, "below 130/80")
    }
}

fn assess_weight(answers: &Answers) -> Assessment {
    let bmi = answers.get(BMI_LABEL).and_then(to_number).or_else(|| {
        compute_bmi(
            answers.get(WEIGHT_LABEL).and_then(to_number)?,
            answers.get(HEIGHT_LABEL).and_then(to_number)?,
        )
    });

    let Some(bmi) = bmi else {
        return Assessment {
            condition: Category::Weight,
            severity: Severity::Mild,
            metrics: AssessmentMetrics::default(),
            reasoning: "Not enough data to compute BMI; defaulted to mild.".to_string(),
        };
    };

    let (severity, band) = bmi_tier(bmi);
    Assessment {
        condition: Category::Weight,
        severity,
        metrics: AssessmentMetrics {
            bmi: Some(bmi),
            ..AssessmentMetrics::default()
        },
        reasoning: format!("BMI {bmi} {band} -> {severity}"),
    }
}

fn bmi_tier(bmi: f64) -> (Severity, &'static str) {
    if bmi >= 40.0 {
        (Severity::Severe, "at or above 40")
    } else if bmi >= 30.0 {
        (Severity::Moderate, "in 30-39.9")
    } else if bmi >= 25.0 {
        (Severity::Mild, "in 25-29.9")
    } else {
        (Severity::Mild, "below 25")
    }
}

/// BMI to one decimal place. `None` when either figure is not positive.
pub fn compute_bmi(weight_kg: f64, height_cm: f64) -> Option<f64> {
    if weight_kg <= 0.0 || height_cm <= 0.0 {
        return None;
    }
    let height_m = height_cm / 100.0;
    let bmi = weight_kg / (height_m * height_m);
    Some((bmi * 10.0).round() / 10.0)
}

/// Read a number from an answer. Strings such as `"110 mg/dL"` yield their
/// first number.
pub fn to_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<f64>()
                .ok()
                .or_else(|| NUMBER_RE.find(s)?.as_str().parse().ok())
        }
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

/// Read a `systolic/diastolic` pair, e.g. `"140 / 95 mmHg"`.
pub fn parse_blood_pressure(value: &Value) -> Option<BloodPressure> {
    let Value::String(s) = value else {
        return None;
    };
    let caps = BP_RE.captures(s)?;
    Some(BloodPressure {
        systolic: caps[1].parse().ok()?,
        diastolic: caps[2].parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn answers(pairs: &[(&str, Value)]) -> Answers {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn diabetes(fasting: Value, hba1c: Value) -> Assessment {
        assess(
            Category::Diabetes,
            &answers(&[(FASTING_SUGAR_LABEL, fasting), (HBA1C_LABEL, hba1c)]),
        )
    }

    fn hbp(reading: &str) -> Severity {
        assess(Category::Hbp, &answers(&[(BP_READING_LABEL, json!(reading))])).severity
    }

    fn weight_from_bmi(bmi: f64) -> Severity {
        assess(Category::Weight, &answers(&[(BMI_LABEL, json!(bmi))])).severity
    }

    #[test]
    fn fasting_sugar_boundaries() {
        let tier = |v: f64| diabetes(json!(v), Value::Null).severity;
        assert_eq!(tier(99.0), Severity::Mild);
        assert_eq!(tier(125.0), Severity::Mild);
        assert_eq!(tier(126.0), Severity::Moderate);
        assert_eq!(tier(180.0), Severity::Moderate);
        assert_eq!(tier(181.0), Severity::Severe);
    }

    #[test]
    fn hba1c_boundaries() {
        let tier = |v: f64| diabetes(Value::Null, json!(v)).severity;
        assert_eq!(tier(6.4), Severity::Mild);
        assert_eq!(tier(6.5), Severity::Moderate);
        assert_eq!(tier(7.9), Severity::Moderate);
        assert_eq!(tier(8.0), Severity::Severe);
    }

    #[test]
    fn diabetes_takes_worst_reading() {
        let assessment = diabetes(json!("110 mg/dL"), json!("8.2%"));
        assert_eq!(assessment.severity, Severity::Severe);
        assert_eq!(assessment.level(), 3);
        assert_eq!(assessment.metrics.fasting_blood_sugar, Some(110.0));
        assert_eq!(assessment.metrics.hba1c_percent, Some(8.2));
        assert!(assessment.reasoning.contains("fasting sugar 110 mg/dL in 100-125"));
        assert!(assessment.reasoning.contains("HbA1c 8.2% at or above 8.0"));
    }

    #[test]
    fn diabetes_blood_pressure_is_only_noted() {
        let assessment = assess(
            Category::Diabetes,
            &answers(&[
                (FASTING_SUGAR_LABEL, json!(90)),
                (DIABETES_BP_LABEL, json!("170/105")),
            ]),
        );
        assert_eq!(assessment.severity, Severity::Mild);
        assert_eq!(
            assessment.metrics.blood_pressure,
            Some(BloodPressure {
                systolic: 170,
                diastolic: 105
            })
        );
        assert!(assessment.reasoning.contains("170/105 mmHg noted"));
    }

    #[test]
    fn diabetes_without_readings_defaults_to_mild() {
        let assessment = diabetes(json!("not tested"), json!(""));
        assert_eq!(assessment.severity, Severity::Mild);
        assert_eq!(assessment.metrics, AssessmentMetrics::default());
        assert!(assessment.reasoning.contains("defaulted to mild"));
    }

    #[test]
    fn blood_pressure_boundaries() {
        assert_eq!(hbp("129/79"), Severity::Mild);
        assert_eq!(hbp("139/89"), Severity::Mild);
        assert_eq!(hbp("140/90"), Severity::Moderate);
        assert_eq!(hbp("139/90"), Severity::Moderate);
        assert_eq!(hbp("159/99"), Severity::Moderate);
        assert_eq!(hbp("160/100"), Severity::Severe);
        assert_eq!(hbp("120/100"), Severity::Severe);
    }

    #[test]
    fn blood_pressure_reading_formats() {
        let assessment = assess(
            Category::Hbp,
            &answers(&[(BP_READING_LABEL, json!("about 145 / 92 mmHg"))]),
        );
        assert_eq!(assessment.severity, Severity::Moderate);
        assert_eq!(assessment.metrics.blood_pressure.unwrap().to_string(), "145/92");

        let missing = assess(Category::Hbp, &answers(&[(BP_READING_LABEL, json!("unknown"))]));
        assert_eq!(missing.severity, Severity::Mild);
        assert_eq!(missing.metrics.blood_pressure, None);
    }

    #[test]
    fn bmi_boundaries() {
        assert_eq!(weight_from_bmi(24.9), Severity::Mild);
        assert_eq!(weight_from_bmi(29.9), Severity::Mild);
        assert_eq!(weight_from_bmi(30.0), Severity::Moderate);
        assert_eq!(weight_from_bmi(39.9), Severity::Moderate);
        assert_eq!(weight_from_bmi(40.0), Severity::Severe);
    }

    #[test]
    fn bmi_computed_from_weight_and_height() {
        let assessment = assess(
            Category::Weight,
            &answers(&[(WEIGHT_LABEL, json!("95 kg")), (HEIGHT_LABEL, json!(170))]),
        );
        assert_eq!(assessment.metrics.bmi, Some(32.9));
        assert_eq!(assessment.severity, Severity::Moderate);

        let no_height = assess(Category::Weight, &answers(&[(WEIGHT_LABEL, json!(95))]));
        assert_eq!(no_height.metrics.bmi, None);
        assert_eq!(no_height.severity, Severity::Mild);
    }

    #[test]
    fn detox_is_single_tier() {
        let assessment = assess(Category::Detox, &Answers::new());
        assert_eq!(assessment.condition, Category::Detox);
        assert_eq!(assessment.severity, Severity::Mild);
    }

    #[test]
    fn number_extraction() {
        assert_eq!(to_number(&json!(7)), Some(7.0));
        assert_eq!(to_number(&json!(" 6.5 ")), Some(6.5));
        assert_eq!(to_number(&json!("approx -3.25 units")), Some(-3.25));
        assert_eq!(to_number(&json!("NaN")), None);
        assert_eq!(to_number(&json!("none")), None);
        assert_eq!(to_number(&json!(["7"])), None);
        assert_eq!(compute_bmi(80.0, 0.0), None);
    }
}
