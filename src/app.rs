//! Application wiring for the food logger
//!
//! Builds the services from an [`AppConfig`] and runs one CLI command against
//! them, producing the JSON document the binary prints.

use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::NutritionCache;
use crate::cli::{parse_meal_arg, CacheCommand, CliError, Command, LogCommand};
use crate::config::AppConfig;
use crate::data::{Estimator, OpenAiClient, RecipeQuery, RecipeService, RecipeSuggester};
use crate::estimate::{EstimateOutcome, EstimateResponse, EstimationService};
use crate::ledger::{DailyLedger, LedgerError};
use crate::store::StoreError;

/// Errors that end a command
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Cli(#[from] CliError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

/// The assembled services
pub struct App {
    estimation: EstimationService,
    ledger: DailyLedger,
    recipes: RecipeService,
}

impl App {
    /// Creates the services described by `config`
    ///
    /// One AI client is shared by estimation and recipe suggestions; without
    /// an API key both run without one.
    pub fn from_config(config: &AppConfig) -> Self {
        let client = config.openai.as_ref().map(|settings| {
            Arc::new(
                OpenAiClient::new(settings.api_key.clone())
                    .with_model(settings.model.clone())
                    .with_base_url(settings.base_url.clone()),
            )
        });
        if client.is_none() {
            debug!("no API key configured, AI features unavailable");
        }

        let estimator = client.clone().map(|c| c as Arc<dyn Estimator>);
        let suggester = client.map(|c| c as Arc<dyn RecipeSuggester>);

        let cache = NutritionCache::new(&config.cache_path).with_lock_timeout(config.lock_timeout);
        let ledger = DailyLedger::new(&config.ledger_path).with_lock_timeout(config.lock_timeout);

        Self {
            estimation: EstimationService::new(cache, estimator, config.use_ai_default),
            ledger,
            recipes: RecipeService::new(suggester, config.use_ai_default),
        }
    }

    /// Creates the app from already built services
    pub fn new(estimation: EstimationService, ledger: DailyLedger, recipes: RecipeService) -> Self {
        Self {
            estimation,
            ledger,
            recipes,
        }
    }

    /// Runs one command and returns its JSON output
    pub async fn run(&self, command: Command) -> Result<Value, AppError> {
        match command {
            Command::Estimate { food_text, use_ai } => {
                let outcome = self.estimation.estimate(&food_text, use_ai).await;
                report_outcome(&outcome);
                let response = EstimateResponse {
                    nutrition: outcome.into_response(),
                };
                Ok(serde_json::to_value(response)?)
            }
            Command::Cache(cmd) => self.run_cache(cmd),
            Command::Log(cmd) => self.run_log(cmd).await,
            Command::Config {
                user,
                calories,
                foods,
            } => {
                let config = self.ledger.update_config(&user, calories, foods)?;
                let remaining = self.ledger.remaining_calories(&user)?;
                Ok(json!({ "config": config, "remaining_calories": remaining }))
            }
            Command::Recipes {
                user,
                meal,
                max_calories,
                use_ai,
            } => {
                let meal = meal.as_deref().map(parse_meal_arg).transpose()?;
                let query = RecipeQuery {
                    allowed_foods: self.ledger.config(&user)?.allowed_basic_foods,
                    meal,
                    max_calories,
                };
                let suggestions = self.recipes.suggest(&query, use_ai).await;
                Ok(serde_json::to_value(suggestions)?)
            }
        }
    }

    fn run_cache(&self, command: CacheCommand) -> Result<Value, AppError> {
        let cache = self.estimation.cache();
        match command {
            CacheCommand::Get { food_text } => Ok(serde_json::to_value(cache.get(&food_text)?)?),
            CacheCommand::Delete { food_text } => {
                let success = cache.delete(&food_text)?;
                Ok(json!({ "success": success }))
            }
            CacheCommand::Purge => {
                let removed = cache.purge_expired()?;
                Ok(json!({ "removed": removed }))
            }
            CacheCommand::Stats => Ok(serde_json::to_value(cache.stats()?)?),
        }
    }

    async fn run_log(&self, command: LogCommand) -> Result<Value, AppError> {
        match command {
            LogCommand::Show { user } => Ok(serde_json::to_value(self.ledger.summary(&user)?)?),
            LogCommand::Add {
                user,
                meal,
                food_text,
                use_ai,
            } => {
                let meal = parse_meal_arg(&meal)?;
                let used_ai = self.estimation.ai_enabled(use_ai);
                let nutrition = if used_ai {
                    let outcome = self.estimation.estimate_cached(&food_text).await;
                    report_outcome(&outcome);
                    outcome.nutrition().cloned()
                } else {
                    None
                };

                let added = self
                    .ledger
                    .add_food(&user, &food_text, meal, nutrition, used_ai)?;
                let remaining = self.ledger.remaining_calories(&user)?;
                Ok(json!({ "added": added, "remaining_calories": remaining }))
            }
            LogCommand::Remove { user, index } => {
                let removed = self.ledger.remove_food(&user, index)?;
                let remaining = self.ledger.remaining_calories(&user)?;
                Ok(json!({ "removed": removed.is_some(), "remaining_calories": remaining }))
            }
        }
    }
}

fn report_outcome(outcome: &EstimateOutcome) {
    match outcome {
        EstimateOutcome::UpstreamError(e) => {
            warn!(kind = ?e.kind(), "no estimate available: {}", e)
        }
        EstimateOutcome::StoreError { error, .. } => {
            warn!(kind = ?error.kind(), "estimate not cached: {}", error)
        }
        EstimateOutcome::Hit(_) | EstimateOutcome::Miss(_) | EstimateOutcome::Disabled => {}
    }
}
