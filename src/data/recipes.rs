//! Recipe suggestions
//!
//! Suggestions come from the AI client when it is enabled and the user has
//! allowed foods configured, and otherwise from a small static recipe table
//! filtered by the user's allowed foods, meal type and calorie ceiling.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::estimator::{OpenAiClient, UpstreamError};
use super::MealType;

/// Most suggestions returned for one query
pub const MAX_SUGGESTIONS: usize = 10;

/// A suggested recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    pub calories: u32,
    #[serde(rename = "type")]
    pub meal: MealType,
    pub link: String,
}

/// Static recipe entry
///
/// Uses `&'static str` so the table can be initialized statically.
#[derive(Debug, Clone, Copy)]
pub struct RecipeSeed {
    pub name: &'static str,
    pub calories: u32,
    pub meal: MealType,
    pub link: &'static str,
}

impl From<&RecipeSeed> for Recipe {
    fn from(seed: &RecipeSeed) -> Self {
        Recipe {
            name: seed.name.to_string(),
            calories: seed.calories,
            meal: seed.meal,
            link: seed.link.to_string(),
        }
    }
}

/// Static recipe table used when AI suggestions are off or come back empty
pub static RECIPES: [RecipeSeed; 4] = [
    RecipeSeed {
        name: "Egg Omelet",
        calories: 250,
        meal: MealType::Breakfast,
        link: "https://example.com/egg-omelet",
    },
    RecipeSeed {
        name: "Grilled Chicken Salad",
        calories: 400,
        meal: MealType::Lunch,
        link: "https://example.com/chicken-salad",
    },
    RecipeSeed {
        name: "Apple Snack",
        calories: 100,
        meal: MealType::Snack,
        link: "https://example.com/apple-snack",
    },
    RecipeSeed {
        name: "Rice & Chicken",
        calories: 500,
        meal: MealType::Dinner,
        link: "https://example.com/rice-chicken",
    },
];

/// What the user wants suggestions for
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeQuery {
    pub allowed_foods: Vec<String>,
    pub meal: Option<MealType>,
    pub max_calories: Option<u32>,
}

/// Suggestions plus where they came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipeSuggestions {
    pub used_ai: bool,
    pub suggestions: Vec<Recipe>,
}

/// Source of AI recipe suggestions
#[async_trait]
pub trait RecipeSuggester: Send + Sync {
    /// Asks for recipes matching `query`; the JSON is untrusted
    async fn suggest_recipes(&self, query: &RecipeQuery) -> Result<Value, UpstreamError>;
}

#[async_trait]
impl RecipeSuggester for OpenAiClient {
    async fn suggest_recipes(&self, query: &RecipeQuery) -> Result<Value, UpstreamError> {
        self.chat_json(&recipe_prompt(query)).await
    }
}

fn recipe_prompt(query: &RecipeQuery) -> String {
    let meal = query.meal.map_or("any", |m| m.as_str());
    let max_calories = query
        .max_calories
        .map_or_else(|| "no limit".to_string(), |c| c.to_string());
    format!(
        "Suggest up to {MAX_SUGGESTIONS} {meal} recipes.\n\
         Allowed foods: {}.\n\
         Max calories: {max_calories}.\n\
         Return ONLY a valid JSON array (no markdown, no explanation).\n\
         Each item must include: name, calories, type, link.\n\
         Sort by calories ascending.",
        query.allowed_foods.join(", ")
    )
}

/// Whether `name` contains any allowed food as a whole word, ignoring case
pub fn contains_allowed_food(name: &str, allowed_foods: &[String]) -> bool {
    let name = name.to_lowercase();
    allowed_foods.iter().any(|food| {
        let food = food.trim().to_lowercase();
        !food.is_empty() && contains_word(&name, &food)
    })
}

fn contains_word(haystack: &str, word: &str) -> bool {
    let is_word_char = |c: char| c.is_alphanumeric() || c == '_';
    haystack.match_indices(word).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + word.len()..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}

/// Filters the static table for `query`, lowest calories first
pub fn table_suggestions(query: &RecipeQuery) -> Vec<Recipe> {
    let mut suggestions: Vec<Recipe> = RECIPES
        .iter()
        .filter(|seed| query.meal.is_none_or(|meal| seed.meal == meal))
        .filter(|seed| contains_allowed_food(seed.name, &query.allowed_foods))
        .filter(|seed| query.max_calories.is_none_or(|max| seed.calories <= max))
        .map(Recipe::from)
        .collect();

    suggestions.sort_by_key(|r| r.calories);
    suggestions.truncate(MAX_SUGGESTIONS);
    suggestions
}

/// Keeps the well-formed recipes from an untrusted AI payload
///
/// A single object is treated as a one-item list. Items need a name, a
/// non-negative numeric calorie count, a known meal type and an http(s) link.
pub fn sanitize_ai_recipes(payload: &Value, max_calories: Option<u32>) -> Vec<Recipe> {
    let items: Vec<&Value> = match payload {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![payload],
        _ => return Vec::new(),
    };

    items
        .into_iter()
        .filter_map(sanitize_ai_recipe)
        .filter(|r| max_calories.is_none_or(|max| r.calories <= max))
        .take(MAX_SUGGESTIONS)
        .collect()
}

fn sanitize_ai_recipe(item: &Value) -> Option<Recipe> {
    let fields = item.as_object()?;
    let name = match fields.get("name")? {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let calories = fields.get("calories")?.as_f64()?;
    if !calories.is_finite() || calories < 0.0 {
        return None;
    }
    let meal = MealType::from_str(fields.get("type")?.as_str()?)?;
    let link = fields.get("link")?.as_str()?;
    if !link.starts_with("http") {
        return None;
    }

    Some(Recipe {
        name,
        calories: calories.trunc() as u32,
        meal,
        link: link.to_string(),
    })
}

/// Recipe suggestion service
#[derive(Clone)]
pub struct RecipeService {
    suggester: Option<Arc<dyn RecipeSuggester>>,
    use_ai_default: bool,
}

impl RecipeService {
    /// Creates the service; `suggester` is `None` when no AI client is configured
    pub fn new(suggester: Option<Arc<dyn RecipeSuggester>>, use_ai_default: bool) -> Self {
        Self {
            suggester,
            use_ai_default,
        }
    }

    /// Suggests recipes, preferring AI when enabled and falling back to the table
    ///
    /// `use_ai` overrides the configured default when given.
    pub async fn suggest(&self, query: &RecipeQuery, use_ai: Option<bool>) -> RecipeSuggestions {
        let ai_enabled = use_ai.unwrap_or(self.use_ai_default);

        if ai_enabled && !query.allowed_foods.is_empty() {
            match &self.suggester {
                Some(suggester) => match suggester.suggest_recipes(query).await {
                    Ok(payload) => {
                        let recipes = sanitize_ai_recipes(&payload, query.max_calories);
                        if !recipes.is_empty() {
                            info!(count = recipes.len(), "using AI recipe suggestions");
                            return RecipeSuggestions {
                                used_ai: true,
                                suggestions: recipes,
                            };
                        }
                        warn!("AI returned no usable recipes, using recipe table");
                    }
                    Err(e) => warn!("AI recipe fetch failed, using recipe table: {}", e),
                },
                None => warn!("AI recipes requested but no AI client is configured"),
            }
        }

        RecipeSuggestions {
            used_ai: false,
            suggestions: table_suggestions(query),
        }
    }
}
