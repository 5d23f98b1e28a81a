//! Query functions, one module per table.

pub mod meal_plans;
pub mod payments;
