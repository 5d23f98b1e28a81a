//! Operator-mode CLI handlers for `mealplan plan` subcommands.
//!
//! Implements:
//! - `mealplan plan show <plan-id>`             -- show one meal plan
//! - `mealplan plan list <email>`               -- list an identity's plans
//! - `mealplan plan latest <email> <category>`  -- newest plan in a category
//!
//! Identity arguments accept a guest email or `--token <credential>`.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use tracing::debug;

use mealplan_core::MealPlanService;
use mealplan_core::identity::IdentityRequest;
use mealplan_db::models::{MealPlan, MealSchedule, Payment};

use crate::{IdentityArgs, PlanCommands};

// -----------------------------------------------------------------------
// Public entry point
// -----------------------------------------------------------------------

/// Dispatch a `PlanCommands` variant to the appropriate handler.
pub async fn run_plan_command(command: PlanCommands, service: &MealPlanService) -> Result<()> {
    match command {
        PlanCommands::Show { plan_id, json } => cmd_show(service, plan_id, json).await,
        PlanCommands::List { identity } => cmd_list(service, &identity).await,
        PlanCommands::Latest { identity, category } => {
            cmd_latest(service, &identity, &category).await
        }
    }
}

fn identity_request(args: &IdentityArgs) -> IdentityRequest {
    IdentityRequest {
        credential: args.token.clone(),
        email: args.email.clone(),
    }
}

// -----------------------------------------------------------------------
// mealplan plan show <plan-id>
// -----------------------------------------------------------------------

async fn cmd_show(service: &MealPlanService, plan_id: i64, json: bool) -> Result<()> {
    let plan = service
        .get_meal_plan(plan_id)
        .await
        .with_context(|| format!("failed to load meal plan {plan_id}"))?;
    debug!(plan_id, state = %plan.state, "meal plan loaded");

    if json {
        let rendered =
            serde_json::to_string_pretty(&plan).context("failed to serialize meal plan")?;
        println!("{rendered}");
        return Ok(());
    }

    let payment = service.payment_for(plan_id).await?;
    print!("{}", render_plan(&plan, payment.as_ref()));
    Ok(())
}

// -----------------------------------------------------------------------
// mealplan plan list <email>
// -----------------------------------------------------------------------

async fn cmd_list(service: &MealPlanService, identity: &IdentityArgs) -> Result<()> {
    let plans = service
        .list_meal_plans(&identity_request(identity))
        .await
        .context("failed to list meal plans")?;
    debug!(plans = plans.len(), "meal plans listed");

    if plans.is_empty() {
        println!("No meal plans found for this identity.");
        return Ok(());
    }

    print!("{}", render_plan_table(&plans));
    Ok(())
}

// -----------------------------------------------------------------------
// mealplan plan latest <email> <category>
// -----------------------------------------------------------------------

async fn cmd_latest(
    service: &MealPlanService,
    identity: &IdentityArgs,
    category: &str,
) -> Result<()> {
    let plan = service
        .latest_meal_plan(&identity_request(identity), category)
        .await
        .context("failed to look up latest meal plan")?;

    debug!(category, found = plan.is_some(), "latest meal plan lookup");
    match plan {
        Some(plan) => {
            let payment = service.payment_for(plan.id).await?;
            print!("{}", render_plan(&plan, payment.as_ref()));
        }
        None => println!("No {category} meal plan found for this identity."),
    }
    Ok(())
}

// -----------------------------------------------------------------------
// Rendering
// -----------------------------------------------------------------------

fn render_plan_table(plans: &[MealPlan]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<6}  {:<9}  {:<9}  {:<7}  {:<10}  CREATED",
        "ID", "CATEGORY", "STATE", "PAYMENT", "CANDIDATES"
    );
    let _ = writeln!(out, "{}", "-".repeat(70));
    for plan in plans {
        let _ = writeln!(
            out,
            "{:<6}  {:<9}  {:<9}  {:<7}  {:<10}  {}",
            plan.id,
            plan.category.to_string(),
            plan.state.to_string(),
            plan.payment_status.to_string(),
            plan.candidate_meals.len(),
            plan.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    out
}

fn render_plan(plan: &MealPlan, payment: Option<&Payment>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Meal plan {}", plan.id);
    let _ = writeln!(out);
    let _ = writeln!(out, "  Identity:    {} ({})", plan.identity_key, plan.identity_kind);
    let _ = writeln!(out, "  Category:    {}", plan.category.title());
    let _ = writeln!(out, "  State:       {}", plan.state);
    let _ = writeln!(out, "  Payment:     {}", plan.payment_status);
    let _ = writeln!(out, "  Created:     {}", plan.created_at.to_rfc3339());
    let _ = writeln!(out, "  Candidates:  {}", plan.candidate_meals.len());
    let _ = writeln!(
        out,
        "  Severity:    {} (level {})",
        plan.assessment.severity,
        plan.assessment.level()
    );
    let _ = writeln!(out, "  Assessment:  {}", plan.assessment.reasoning);

    if let Some(ids) = &plan.selected_meal_ids {
        let names: Vec<&str> = ids
            .iter()
            .filter_map(|id| plan.candidate_meals.iter().find(|m| m.id == *id))
            .map(|m| m.name.as_str())
            .collect();
        let _ = writeln!(out, "  Selected:    {} meals", ids.len());
        for name in names {
            let _ = writeln!(out, "    - {name}");
        }
    }

    if let Some(payment) = payment {
        let _ = writeln!(
            out,
            "  Paid:        {} {} (ref {}, {})",
            payment.amount,
            payment.currency,
            payment.reference,
            payment.recorded_at.to_rfc3339()
        );
    }

    if let Some(short) = &plan.short_plan {
        let _ = writeln!(out);
        let _ = writeln!(out, "Short plan ({} days):", short.days.len());
        render_schedule(&mut out, short);
    }
    if let Some(extended) = &plan.extended_plan {
        let _ = writeln!(out);
        let _ = writeln!(out, "Extended plan ({} days):", extended.days.len());
        render_schedule(&mut out, extended);
    }
    out
}

fn render_schedule(out: &mut String, schedule: &MealSchedule) {
    for day in &schedule.days {
        let _ = writeln!(out, "  Day {}", day.day);
        let _ = writeln!(out, "    breakfast: {}", day.breakfast);
        let _ = writeln!(out, "    lunch:     {}", day.lunch);
        let _ = writeln!(out, "    dinner:    {}", day.dinner);
        if !day.snacks.is_empty() {
            let _ = writeln!(out, "    snacks:    {}", day.snacks.join(", "));
        }
    }
}
