//! Meal-plan lifecycle engine: identity resolution, survey intake, severity
//! assessment, content generation adapters, persistence, and the state
//! machine that moves a plan from submission through selection to the paid
//! upgrade.

pub mod assessment;
pub mod config;
pub mod content;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod service;
pub mod store;
pub mod survey;
pub mod token;

pub use config::EngineConfig;
pub use error::MealPlanError;
pub use lifecycle::LifecycleEngine;
pub use service::MealPlanService;
