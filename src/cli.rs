//! Command-line interface parsing for the food logger
//!
//! This module handles parsing of CLI arguments using clap: global options for
//! where data lives and how the AI estimator is reached, and one subcommand
//! per operation.

use std::convert::Infallible;
use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use thiserror::Error;

use crate::data::estimator::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::data::MealType;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified meal type is not recognized
    #[error("Invalid meal type: '{0}'. Valid meal types: breakfast, lunch, snack, dinner")]
    InvalidMeal(String),
}

/// Personal food logger with cached AI nutrition estimates
#[derive(Parser, Debug)]
#[command(name = "foodlog")]
#[command(about = "Personal food log with cached AI nutrition estimates")]
#[command(version)]
pub struct Cli {
    /// Directory holding the nutrition cache and the food log
    ///
    /// Defaults to the platform cache directory for the nutrition cache and
    /// the platform data directory for the food log.
    #[arg(long, global = true, env = "FOODLOG_DATA_DIR", value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Whether AI estimation is on when a command does not say
    #[arg(
        long = "ai-default",
        global = true,
        env = "USE_AI",
        value_name = "BOOL",
        action = ArgAction::Set,
        default_value = "false",
        value_parser = parse_use_ai
    )]
    pub use_ai_default: bool,

    /// Seconds to wait for another process holding a data file lock
    #[arg(
        long,
        global = true,
        env = "FOODLOG_LOCK_TIMEOUT_SECS",
        value_name = "SECS",
        default_value_t = 10
    )]
    pub lock_timeout_secs: u64,

    #[command(flatten)]
    pub openai: OpenAiArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Connection settings for the AI API
#[derive(Args, Debug, Clone)]
pub struct OpenAiArgs {
    /// API key; AI features are unavailable without one
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Chat model used for estimates and recipes
    #[arg(long, global = true, env = "OPENAI_MODEL", default_value = DEFAULT_MODEL)]
    pub openai_model: String,

    /// API root of an OpenAI-compatible server
    #[arg(long, global = true, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub openai_base_url: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Estimate nutrition for a food description
    Estimate {
        /// Food description, e.g. "grilled chicken breast"
        food_text: String,
        /// Force AI on (skipping the cache read) or off for this call
        #[arg(long, value_name = "BOOL")]
        use_ai: Option<bool>,
    },

    /// Inspect or maintain the nutrition cache
    #[command(subcommand)]
    Cache(CacheCommand),

    /// Work with today's food log
    #[command(subcommand)]
    Log(LogCommand),

    /// Show or change a user's settings
    Config {
        #[arg(long, value_name = "ID")]
        user: String,
        /// Daily calorie budget
        #[arg(long, value_name = "KCAL")]
        calories: Option<u32>,
        /// Comma-separated allowed basic foods
        #[arg(long, value_delimiter = ',', value_name = "FOODS")]
        foods: Option<Vec<String>>,
    },

    /// Suggest recipes from the user's allowed foods
    Recipes {
        #[arg(long, value_name = "ID")]
        user: String,
        /// breakfast, lunch, snack or dinner
        #[arg(long, value_name = "MEAL")]
        meal: Option<String>,
        #[arg(long, value_name = "KCAL")]
        max_calories: Option<u32>,
        #[arg(long, value_name = "BOOL")]
        use_ai: Option<bool>,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Show the cached entry for a food description
    Get { food_text: String },
    /// Remove the cached entry for a food description
    Delete { food_text: String },
    /// Drop every expired entry
    Purge,
    /// Show entry counts and age range
    Stats,
}

#[derive(Subcommand, Debug)]
pub enum LogCommand {
    /// Show today's log, totals and remaining calories
    Show {
        #[arg(long, value_name = "ID")]
        user: String,
    },
    /// Add a food to today's log
    Add {
        #[arg(long, value_name = "ID")]
        user: String,
        /// breakfast, lunch, snack or dinner
        #[arg(long, value_name = "MEAL")]
        meal: String,
        food_text: String,
        /// Estimate nutrition with AI for this entry
        #[arg(long, value_name = "BOOL")]
        use_ai: Option<bool>,
    },
    /// Remove an entry from today's log by position
    Remove {
        #[arg(long, value_name = "ID")]
        user: String,
        index: usize,
    },
}

/// Parses the ambient AI flag: only a case-insensitive "true" turns it on
pub fn parse_use_ai(s: &str) -> Result<bool, Infallible> {
    Ok(s.trim().eq_ignore_ascii_case("true"))
}

/// Parses a meal type argument into a MealType.
///
/// # Returns
/// * `Ok(MealType)` if the string matches a valid meal type
/// * `Err(CliError::InvalidMeal)` if the string doesn't match
pub fn parse_meal_arg(s: &str) -> Result<MealType, CliError> {
    MealType::from_str(s).ok_or_else(|| CliError::InvalidMeal(s.to_string()))
}
