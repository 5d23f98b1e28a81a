use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Identifier of a meal inside a plan's candidate set.
pub type MealId = i64;

/// Identifier of a meal plan.
pub type MealPlanId = i64;

/// Questionnaire answers keyed by question label.
pub type Answers = BTreeMap<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Health-survey category a meal plan belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Diabetes,
    Hbp,
    Weight,
    Detox,
}

impl Category {
    /// All categories, in catalog order.
    pub const ALL: [Category; 4] = [Self::Diabetes, Self::Hbp, Self::Weight, Self::Detox];

    /// Human-readable title used by the questionnaire listing.
    pub fn title(self) -> &'static str {
        match self {
            Self::Diabetes => "Diabetes",
            Self::Hbp => "High Blood Pressure",
            Self::Weight => "Weight Management",
            Self::Detox => "Detox",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Diabetes => "diabetes",
            Self::Hbp => "hbp",
            Self::Weight => "weight",
            Self::Detox => "detox",
        };
        f.write_str(s)
    }
}

impl FromStr for Category {
    type Err = CategoryParseError;

    /// Accepts the canonical names case-insensitively, plus the aliases
    /// clients historically sent for blood pressure and weight.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "diabetes" => Ok(Self::Diabetes),
            "hbp" | "high blood pressure" | "hypertension" => Ok(Self::Hbp),
            "weight" | "weight management" | "obesity" => Ok(Self::Weight),
            "detox" => Ok(Self::Detox),
            _ => Err(CategoryParseError(s.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Category`] string.
#[derive(Debug, Clone)]
pub struct CategoryParseError(pub String);

impl fmt::Display for CategoryParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid category: {:?}", self.0)
    }
}

impl std::error::Error for CategoryParseError {}

// ---------------------------------------------------------------------------

/// Lifecycle state of a meal plan.
///
/// ```text
/// submitted -> selected   (selection + free short plan)
/// selected  -> upgraded   (payment + extended plan)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanState {
    Submitted,
    Selected,
    Upgraded,
}

impl PlanState {
    /// Whether `self -> to` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, to: PlanState) -> bool {
        matches!(
            (self, to),
            (Self::Submitted, Self::Selected) | (Self::Selected, Self::Upgraded)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Upgraded
    }
}

impl fmt::Display for PlanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Submitted => "submitted",
            Self::Selected => "selected",
            Self::Upgraded => "upgraded",
        };
        f.write_str(s)
    }
}

impl FromStr for PlanState {
    type Err = PlanStateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(Self::Submitted),
            "selected" => Ok(Self::Selected),
            "upgraded" => Ok(Self::Upgraded),
            other => Err(PlanStateParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`PlanState`] string.
#[derive(Debug, Clone)]
pub struct PlanStateParseError(pub String);

impl fmt::Display for PlanStateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid plan state: {:?}", self.0)
    }
}

impl std::error::Error for PlanStateParseError {}

// ---------------------------------------------------------------------------

/// Whether a payment confirmation has been recorded for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unpaid => "unpaid",
            Self::Paid => "paid",
        };
        f.write_str(s)
    }
}

impl FromStr for PaymentStatus {
    type Err = PaymentStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(Self::Unpaid),
            "paid" => Ok(Self::Paid),
            other => Err(PaymentStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`PaymentStatus`] string.
#[derive(Debug, Clone)]
pub struct PaymentStatusParseError(pub String);

impl fmt::Display for PaymentStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid payment status: {:?}", self.0)
    }
}

impl std::error::Error for PaymentStatusParseError {}

// ---------------------------------------------------------------------------

/// Channel an identity was resolved through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    Guest,
    Authenticated,
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Guest => "guest",
            Self::Authenticated => "authenticated",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// A non-negative monetary amount with two decimal places, held in minor
/// units (kobo, cents). Parsed from and rendered as `"5000.00"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

impl Amount {
    pub fn from_minor_units(minor: i64) -> Option<Self> {
        (minor >= 0).then_some(Self(minor))
    }

    pub fn minor_units(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || AmountParseError(s.to_owned());
        let trimmed = s.trim();
        let (whole, frac) = match trimmed.split_once('.') {
            Some((w, f)) => (w, f),
            None => (trimmed, ""),
        };
        if whole.is_empty()
            || frac.len() > 2
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(err());
        }
        let whole: i64 = whole.parse().map_err(|_| err())?;
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| err())? * 10,
            _ => frac.parse().map_err(|_| err())?,
        };
        whole
            .checked_mul(100)
            .and_then(|w| w.checked_add(frac))
            .map(Self)
            .ok_or_else(err)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error returned when parsing an invalid [`Amount`] string.
#[derive(Debug, Clone)]
pub struct AmountParseError(pub String);

impl fmt::Display for AmountParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid amount {:?} (expected a non-negative decimal with at most two places)",
            self.0
        )
    }
}

impl std::error::Error for AmountParseError {}

// ---------------------------------------------------------------------------
// Generated content
// ---------------------------------------------------------------------------

/// One entry of a plan's candidate set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meal {
    pub id: MealId,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Meal {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// A day-by-day meal schedule (the short and extended plans).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealSchedule {
    pub days: Vec<PlanDay>,
}

impl MealSchedule {
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDay {
    pub day: u32,
    pub breakfast: String,
    pub lunch: String,
    pub dinner: String,
    #[serde(default)]
    pub snacks: Vec<String>,
}

// ---------------------------------------------------------------------------
// Assessment
// ---------------------------------------------------------------------------

/// Severity tier assigned to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    /// Numeric level, 1 (mild) through 3 (severe).
    pub fn level(self) -> u8 {
        match self {
            Self::Mild => 1,
            Self::Moderate => 2,
            Self::Severe => 3,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Mild => "mild",
            Self::Moderate => "moderate",
            Self::Severe => "severe",
        };
        f.write_str(s)
    }
}

/// A systolic/diastolic reading in mmHg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloodPressure {
    pub systolic: u16,
    pub diastolic: u16,
}

impl fmt::Display for BloodPressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.systolic, self.diastolic)
    }
}

/// Clinical figures read from the answers. Only the ones relevant to the
/// plan's category are ever set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessmentMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fasting_blood_sugar: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hba1c_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_pressure: Option<BloodPressure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmi: Option<f64>,
}

/// Severity assessment computed once at submission and stored with the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub condition: Category,
    pub severity: Severity,
    #[serde(default)]
    pub metrics: AssessmentMetrics,
    pub reasoning: String,
}

impl Assessment {
    pub fn level(&self) -> u8 {
        self.severity.level()
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A meal plan and its lifecycle fields.
///
/// `state` is authoritative; the nullable fields follow from it:
/// `submitted` has no selection and no plans, `selected` has a selection and
/// a short plan, `upgraded` additionally has an extended plan and is paid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealPlan {
    pub id: MealPlanId,
    pub identity_key: String,
    pub identity_kind: IdentityKind,
    pub category: Category,
    pub state: PlanState,
    pub answers: Answers,
    pub assessment: Assessment,
    pub candidate_meals: Vec<Meal>,
    pub selected_meal_ids: Option<Vec<MealId>>,
    pub short_plan: Option<MealSchedule>,
    pub extended_plan: Option<MealSchedule>,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub short_generated_at: Option<DateTime<Utc>>,
    pub extended_generated_at: Option<DateTime<Utc>>,
}

impl MealPlan {
    /// Ids of the candidate set.
    pub fn candidate_ids(&self) -> HashSet<MealId> {
        self.candidate_meals.iter().map(|m| m.id).collect()
    }

    /// The selected meals, in selection order. Empty before selection.
    pub fn selected_meals(&self) -> Vec<Meal> {
        let Some(ids) = &self.selected_meal_ids else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| self.candidate_meals.iter().find(|m| m.id == *id))
            .cloned()
            .collect()
    }

    /// Whether this plan currently holds the identity's free plan.
    pub fn holds_free_plan(&self) -> bool {
        self.state == PlanState::Selected
    }

    /// Describe every lifecycle invariant this plan violates. An empty result
    /// means the plan is consistent.
    pub fn violations(&self, selection_bounds: &RangeInclusive<usize>) -> Vec<String> {
        let mut out = Vec::new();

        if let Some(ids) = &self.selected_meal_ids {
            let candidates = self.candidate_ids();
            let unknown: Vec<MealId> = ids
                .iter()
                .copied()
                .filter(|id| !candidates.contains(id))
                .collect();
            if !unknown.is_empty() {
                out.push(format!("selected ids outside candidate set: {unknown:?}"));
            }
            if !selection_bounds.contains(&ids.len()) {
                out.push(format!(
                    "selection size {} outside {}..={}",
                    ids.len(),
                    selection_bounds.start(),
                    selection_bounds.end()
                ));
            }
        }

        let selected = self.selected_meal_ids.is_some();
        let extended = self.extended_plan.is_some();
        let paid = self.payment_status == PaymentStatus::Paid;

        let selection_paired = self.short_plan.is_some() == selected;
        if !selection_paired {
            out.push("short plan and selection must be set together".to_owned());
        }
        let extension_paid = !extended || paid;
        if !extension_paid {
            out.push("extended plan present on an unpaid plan".to_owned());
        }

        // Fields reported above are skipped here.
        let (want_selected, want_extended, want_paid) = match self.state {
            PlanState::Submitted => (false, false, Some(false)),
            PlanState::Selected => (true, false, None),
            PlanState::Upgraded => (true, true, Some(true)),
        };
        let selection_mismatch = selection_paired && selected != want_selected;
        let extension_mismatch = extension_paid
            && (extended != want_extended || want_paid.is_some_and(|want| want != paid));
        if selection_mismatch || extension_mismatch {
            out.push(format!("fields do not match state {}", self.state));
        }

        out
    }
}

/// A recorded payment confirmation. At most one per meal plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub meal_plan_id: MealPlanId,
    pub amount: Amount,
    pub currency: String,
    pub reference: String,
    pub provider: String,
    pub recorded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
