//! Command implementations for the augury CLI.
//!
//! Each submodule implements the logic for a command group.

pub mod chat;
pub mod memory;
pub mod seed;
pub mod session;

use augury_sdk::session::SessionEndResult;
use colored::Colorize;

/// Print what ending a session produced
pub(crate) fn print_session_end(result: &SessionEndResult) {
    println!(
        "{} Session {} {}",
        "✓".green(),
        result.session_id.cyan(),
        result.status.as_str()
    );
    match &result.synthesis.reflection {
        Some(reflection) => println!("  Reflection: {}", reflection.reflection_text),
        None => println!("  {}", "No reflection written".dimmed()),
    }
    if let Some(plan) = &result.synthesis.plan {
        println!("  Plan: {}", plan.plan_text);
    }
}
