//! Core data models for the food logger
//!
//! This module contains the nutrition record shared by the cache, the
//! estimation service and the daily ledger, plus the meal types used to file
//! log entries and recipes.

pub mod estimator;
pub mod recipes;
pub mod sanitize;

pub use estimator::{Estimator, OpenAiClient, UpstreamError, UpstreamErrorKind};
pub use recipes::{Recipe, RecipeQuery, RecipeService, RecipeSuggester, RecipeSuggestions};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Estimated nutrition for one food description
///
/// All amounts are non-negative. Values coming from an estimator should be
/// built with [`Nutrition::from_untrusted`] so that they hold that guarantee.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Nutrition {
    /// Energy in kilocalories
    pub calories: u32,
    /// Protein in grams
    pub protein: f64,
    /// Carbohydrates in grams
    pub carbs: f64,
    /// Fat in grams
    pub fat: f64,
    /// Micronutrient amounts keyed by nutrient name
    #[serde(default)]
    pub micros: BTreeMap<String, f64>,
}

impl Nutrition {
    /// Adds another record's amounts into this one
    ///
    /// Calories saturate instead of overflowing; micronutrients are summed
    /// per name.
    pub fn accumulate(&mut self, other: &Nutrition) {
        self.calories = self.calories.saturating_add(other.calories);
        self.protein += other.protein;
        self.carbs += other.carbs;
        self.fat += other.fat;
        for (name, amount) in &other.micros {
            *self.micros.entry(name.clone()).or_insert(0.0) += amount;
        }
    }
}

/// Nutrition as handed to a caller, with the transient from-cache marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionResponse {
    #[serde(flatten)]
    pub nutrition: Nutrition,
    /// Whether the values were served from the cache
    pub from_cache: bool,
}

impl NutritionResponse {
    /// The all-zero record returned when no estimate is available
    pub fn empty() -> Self {
        Self {
            nutrition: Nutrition::default(),
            from_cache: false,
        }
    }
}

/// Meal a food log entry or recipe belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Snack,
    Dinner,
}

impl MealType {
    /// All meal types in the order they occur during a day
    pub fn all() -> &'static [MealType] {
        &[
            MealType::Breakfast,
            MealType::Lunch,
            MealType::Snack,
            MealType::Dinner,
        ]
    }

    /// Lower-case name as stored on disk
    pub fn as_str(&self) -> &'static str {
        match self {
            MealType::Breakfast => "breakfast",
            MealType::Lunch => "lunch",
            MealType::Snack => "snack",
            MealType::Dinner => "dinner",
        }
    }

    /// Parses a meal type name, case-insensitively
    ///
    /// Returns `None` for anything that is not one of the four meal types.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<MealType> {
        match s.to_lowercase().trim() {
            "breakfast" => Some(MealType::Breakfast),
            "lunch" => Some(MealType::Lunch),
            "snack" | "snacks" => Some(MealType::Snack),
            "dinner" | "supper" => Some(MealType::Dinner),
            _ => None,
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
