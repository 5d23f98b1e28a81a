//! Persistence layer for the meal-plan lifecycle: domain row types,
//! connection pool, embedded migrations, and query functions.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
