//! Deterministic content provider built from a fixed food catalog.
//!
//! Candidate meals are single food items in four classes. Plans combine
//! them into zero-carb breakfasts and dinners (protein, vegetable, fat) and
//! a carb lunch, with herbal tea snacks.

use std::collections::HashSet;

use async_trait::async_trait;
use mealplan_db::models::{Answers, Category, Meal, MealSchedule, PlanDay};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{ContentProvider, PlanRequest};

const PROTEIN_BASES: &[&str] = &[
    "eggs",
    "egg whites",
    "chicken breast",
    "chicken thigh",
    "turkey",
    "lean beef",
    "lean goat meat",
    "tilapia",
    "mackerel",
    "catfish",
    "sardine (water)",
    "salmon",
    "shrimp",
    "prawns",
    "tuna (water)",
    "tofu",
    "snail",
    "gizzard",
    "kidney (moderate)",
];
const PROTEIN_METHODS: &[&str] = &[
    "grilled",
    "roasted",
    "baked",
    "boiled",
    "stewed",
    "smoked",
    "pan-seared",
];

const VEG_BASES: &[&str] = &[
    "spinach (efo)",
    "ugu (pumpkin leaves)",
    "soko (celosia)",
    "bitterleaf",
    "okra",
    "cabbage",
    "lettuce",
    "kale",
    "cucumber",
    "tomatoes",
    "carrots",
    "bell pepper",
    "green beans",
    "broccoli",
    "cauliflower",
    "garden egg",
    "amaranth greens",
];
const VEG_METHODS: &[&str] = &["steamed", "sautéed", "stir-fried", "raw salad"];

const CARB_BASES: &[&str] = &[
    "brown rice",
    "ofada rice",
    "white rice",
    "yam",
    "sweet potato",
    "Irish potato",
    "plantain",
    "garri (eba)",
    "amala",
    "semovita (semo)",
    "fufu",
    "tuwo",
    "beans (boiled)",
    "spaghetti",
    "macaroni",
    "couscous",
    "millet",
    "oats",
    "wheat semolina",
    "pounded yam",
];
const CARB_PORTIONS: &[&str] = &["small portion of", "moderate portion of"];

const FAT_BASES: &[&str] = &[
    "avocado (half)",
    "avocado (quarter)",
    "olive oil (1 tbsp)",
    "olive oil (2 tsp)",
    "groundnuts (handful)",
    "cashews (handful)",
    "almonds (handful)",
    "walnuts (handful)",
    "peanut butter, no sugar (1 tbsp)",
    "groundnut oil (1 tsp)",
    "palm oil (controlled, 1 tsp)",
    "coconut oil (1 tsp)",
    "flaxseed (1 tbsp)",
    "chia seeds (1 tbsp)",
    "sesame seeds (1 tbsp)",
];

const FALLBACK_PROTEINS: &[&str] = &[
    "Grilled chicken",
    "Roasted turkey",
    "Tofu (plant-based)",
    "Boiled chicken",
    "Pan-seared tilapia",
];
const FALLBACK_VEGS: &[&str] = &[
    "Steamed spinach (efo)",
    "Cabbage salad",
    "Sautéed kale",
    "Okra stir-fry",
    "Lettuce salad",
    "Broccoli (steamed)",
];
const FALLBACK_FATS: &[&str] = &[
    "Olive oil (1 tsp)",
    "Avocado (quarter)",
    "Flaxseed (1 tbsp)",
    "Walnuts (handful)",
    "Chia seeds (1 tbsp)",
];
const FALLBACK_CARBS: &[&str] = &[
    "Small portion of brown rice",
    "Small portion of boiled yam",
    "Small portion of sweet potato",
    "Small portion of plantain",
    "Small portion of couscous",
];

const SNACKS: [&str; 3] = [
    "Herbal tea (morning)",
    "Herbal tea (with lunch)",
    "Herbal tea (night)",
];

const SHORT_PLAN_DAYS: u32 = 2;
const EXTENDED_PLAN_DAYS: u32 = 30;
/// Dinner is offset from breakfast so the two rarely coincide.
const DINNER_OFFSET: usize = 13;
const MAX_SHIFT: usize = 25;

/// Allergy answers that mean "no allergies".
const NO_ALLERGY: &[&str] = &["none", "nil", "n/a", "na", "no", "nothing", "not applicable"];

/// Settings for the `[catalog]` table of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Items generated per food class. Four classes, so 25 gives 100 meals.
    pub per_class: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self { per_class: 25 }
    }
}

/// Content provider backed by the built-in food catalog.
#[derive(Debug, Clone, Default)]
pub struct CatalogProvider {
    config: CatalogConfig,
}

impl CatalogProvider {
    pub fn new(config: CatalogConfig) -> Self {
        Self { config }
    }

    /// The full candidate set, ids `1..=4 * per_class` in class order.
    pub fn candidate_meals(&self) -> Vec<Meal> {
        let n = self.config.per_class;
        let zero_carb = "zero-carb-suitable";
        let proteins = (0..n).map(|i| {
            let name = format!(
                "{} {}",
                capitalize(PROTEIN_METHODS[i % PROTEIN_METHODS.len()]),
                PROTEIN_BASES[i % PROTEIN_BASES.len()]
            );
            (name, vec!["protein", zero_carb])
        });
        let vegs = (0..n).map(|i| {
            let name = format!(
                "{} {}",
                capitalize(VEG_METHODS[i % VEG_METHODS.len()]),
                VEG_BASES[i % VEG_BASES.len()]
            );
            (name, vec!["veg", "vegetables", zero_carb])
        });
        let carbs = (0..n).map(|i| {
            let name = format!(
                "{} {}",
                capitalize(CARB_PORTIONS[i % CARB_PORTIONS.len()]),
                CARB_BASES[i % CARB_BASES.len()]
            );
            (name, vec!["lunch-carb", "carb"])
        });
        let fats = (0..n).map(|i| {
            let name = capitalize(FAT_BASES[i % FAT_BASES.len()]);
            (name, vec!["healthy-fat", zero_carb])
        });

        proteins
            .chain(vegs)
            .chain(carbs)
            .chain(fats)
            .zip(1..)
            .map(|((name, tags), id)| Meal {
                id,
                name,
                tags: std::iter::once("nigerian")
                    .chain(tags)
                    .map(str::to_string)
                    .collect(),
            })
            .collect()
    }

    fn schedule(&self, request: PlanRequest<'_>, days: u32) -> MealSchedule {
        let allergies = allergy_keywords(request.answers);
        let classes = MealClasses::from_selection(request.selected_meals, &allergies);
        debug!(
            category = %request.category,
            days,
            allergies = allergies.len(),
            "building meal schedule"
        );

        let mut seen = HashSet::new();
        let days = (0..days as usize)
            .map(|i| {
                let (breakfast, lunch, dinner) = classes.distinct_day(i, &seen);
                seen.insert((breakfast.clone(), lunch.clone(), dinner.clone()));
                PlanDay {
                    day: i as u32 + 1,
                    breakfast,
                    lunch,
                    dinner,
                    snacks: SNACKS.iter().map(|s| s.to_string()).collect(),
                }
            })
            .collect();

        MealSchedule { days }
    }
}

#[async_trait]
impl ContentProvider for CatalogProvider {
    async fn generate_candidate_meals(
        &self,
        category: Category,
        _answers: &Answers,
    ) -> anyhow::Result<Vec<Meal>> {
        let meals = self.candidate_meals();
        debug!(category = %category, count = meals.len(), "generated candidate meals");
        Ok(meals)
    }

    async fn generate_short_plan(&self, request: PlanRequest<'_>) -> anyhow::Result<MealSchedule> {
        Ok(self.schedule(request, SHORT_PLAN_DAYS))
    }

    async fn generate_extended_plan(
        &self,
        request: PlanRequest<'_>,
    ) -> anyhow::Result<MealSchedule> {
        Ok(self.schedule(request, EXTENDED_PLAN_DAYS))
    }
}

/// Breakfast, lunch and dinner of one day.
type DayMeals = (String, String, String);

/// Selected meal names split by class, with fallbacks for empty classes.
struct MealClasses {
    proteins: Vec<String>,
    vegs: Vec<String>,
    carbs: Vec<String>,
    fats: Vec<String>,
}

impl MealClasses {
    fn from_selection(selected: &[Meal], allergies: &[String]) -> Self {
        let safe: Vec<&Meal> = selected
            .iter()
            .filter(|m| !contains_allergen(&m.name, allergies))
            .collect();
        let class = |tags: &[&str], fallback: &[&str]| -> Vec<String> {
            let picked: Vec<String> = safe
                .iter()
                .filter(|m| tags.iter().any(|t| m.has_tag(t)))
                .map(|m| m.name.clone())
                .collect();
            if picked.is_empty() {
                fallback_names(fallback, allergies)
            } else {
                picked
            }
        };
        Self {
            proteins: class(&["protein"], FALLBACK_PROTEINS),
            vegs: class(&["veg", "vegetables"], FALLBACK_VEGS),
            carbs: class(&["lunch-carb", "carb"], FALLBACK_CARBS),
            fats: class(&["healthy-fat"], FALLBACK_FATS),
        }
    }

    fn zero_carb(&self, i: usize) -> String {
        let p = pick(&self.proteins, i);
        let v = pick(&self.vegs, i * 2);
        let f = pick(&self.fats, i * 3);
        format!("{p} with {} ({f})", v.to_lowercase())
    }

    fn lunch(&self, i: usize) -> String {
        let c = pick(&self.carbs, i);
        let p = pick(&self.proteins, i + 1);
        let v = pick(&self.vegs, i + 2);
        format!("{c} with {} and {}", p.to_lowercase(), v.to_lowercase())
    }

    /// The day-`i` meals, shifting lunch and dinner until the triple has
    /// not been served yet. Repeats only when the selection is too small.
    fn distinct_day(&self, i: usize, seen: &HashSet<DayMeals>) -> DayMeals {
        let breakfast = self.zero_carb(i);
        for lunch_shift in 0..MAX_SHIFT {
            for dinner_shift in 0..MAX_SHIFT {
                let triple = (
                    breakfast.clone(),
                    self.lunch(i + lunch_shift),
                    self.zero_carb(i + DINNER_OFFSET + dinner_shift),
                );
                if !seen.contains(&triple) {
                    return triple;
                }
            }
        }
        (breakfast, self.lunch(i), self.zero_carb(i + DINNER_OFFSET))
    }
}

fn pick(names: &[String], i: usize) -> &str {
    &names[i % names.len()]
}

/// Fallback names without allergens; all of them if every one matches.
fn fallback_names(fallback: &[&str], allergies: &[String]) -> Vec<String> {
    let safe: Vec<String> = fallback
        .iter()
        .filter(|name| !contains_allergen(name, allergies))
        .map(|name| name.to_string())
        .collect();
    if safe.is_empty() {
        fallback.iter().map(|name| name.to_string()).collect()
    } else {
        safe
    }
}

fn contains_allergen(name: &str, allergies: &[String]) -> bool {
    let name = name.to_lowercase();
    allergies.iter().any(|kw| name.contains(kw.as_str()))
}

/// Keywords from every answer whose question mentions allergies.
fn allergy_keywords(answers: &Answers) -> Vec<String> {
    let mut keywords = Vec::new();
    for (label, value) in answers {
        if !label.to_lowercase().contains("allerg") {
            continue;
        }
        let texts: Vec<&str> = match value {
            Value::String(s) => vec![s.as_str()],
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
            _ => continue,
        };
        for text in texts {
            for part in text
                .to_lowercase()
                .split([',', ';', '\n'])
                .flat_map(|p| p.split(" and "))
            {
                let kw = part.trim();
                let ignored = kw.is_empty() || NO_ALLERGY.contains(&kw);
                if !ignored && !keywords.iter().any(|k| k == kw) {
                    keywords.push(kw.to_string());
                }
            }
        }
    }
    keywords
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
