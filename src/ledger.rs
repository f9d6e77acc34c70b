//! Daily food log ledger
//!
//! Keeps one record per user id in a single JSON file: the user's calorie
//! budget and allowed foods, and today's food log. The log is cleared the
//! first time a user is touched on a new UTC day.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::data::{MealType, Nutrition};
use crate::store::{JsonStore, StoreError};

/// Daily calorie budget for new users
pub const DEFAULT_CALORIES_ALLOWED: u32 = 2000;

/// Allowed basic foods for new users
pub const DEFAULT_ALLOWED_FOODS: [&str; 4] = ["egg", "chicken", "rice", "apple"];

/// Errors from ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The ledger file could not be read or written
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-user settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    pub total_calories_allowed: u32,
    pub allowed_basic_foods: Vec<String>,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            total_calories_allowed: DEFAULT_CALORIES_ALLOWED,
            allowed_basic_foods: DEFAULT_ALLOWED_FOODS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// One logged food
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodLogEntry {
    pub food_text: String,
    pub food_type: MealType,
    pub nutrition: Nutrition,
    /// Whether AI estimation was requested for this entry
    pub used_ai: bool,
    pub date: NaiveDate,
}

/// Everything stored for one user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct UserRecord {
    #[serde(default)]
    last_active_date: Option<NaiveDate>,
    #[serde(default)]
    config: UserConfig,
    #[serde(default)]
    food_log: Vec<FoodLogEntry>,
}

impl UserRecord {
    /// Clears the log if `today` is a new day; returns whether anything changed
    fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.last_active_date == Some(today) {
            return false;
        }
        if !self.food_log.is_empty() {
            debug!(entries = self.food_log.len(), "new day, clearing food log");
        }
        self.food_log.clear();
        self.last_active_date = Some(today);
        true
    }

    fn calories_used(&self) -> u64 {
        self.food_log
            .iter()
            .map(|e| u64::from(e.nutrition.calories))
            .sum()
    }

    fn remaining_calories(&self) -> u32 {
        let allowed = u64::from(self.config.total_calories_allowed);
        // Fits in u32: at most `allowed`.
        allowed.saturating_sub(self.calories_used()) as u32
    }

    fn totals(&self) -> Nutrition {
        let mut totals = Nutrition::default();
        for entry in &self.food_log {
            totals.accumulate(&entry.nutrition);
        }
        totals
    }
}

type LedgerSnapshot = BTreeMap<String, UserRecord>;

/// Today's log with totals, as shown to the user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySummary {
    pub food_log: Vec<FoodLogEntry>,
    pub totals: Nutrition,
    pub remaining_calories: u32,
    pub config: UserConfig,
}

/// Per-user daily food ledger backed by one JSON file
#[derive(Debug, Clone)]
pub struct DailyLedger {
    store: JsonStore<LedgerSnapshot>,
}

impl DailyLedger {
    /// Creates a ledger backed by the JSON file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::new(path),
        }
    }

    /// Sets how long an operation waits for the file lock
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.store = self.store.with_lock_timeout(lock_timeout);
        self
    }

    /// Runs `f` on the user's record inside one locked load/save
    ///
    /// Creates the record with defaults if missing and applies the daily
    /// reset first. `f` returns its result and whether it changed the record;
    /// the file is only written when something changed.
    fn with_user<R>(
        &self,
        user_id: &str,
        today: NaiveDate,
        f: impl FnOnce(&mut UserRecord) -> (R, bool),
    ) -> Result<R, LedgerError> {
        let guard = self.store.lock()?;
        let mut snapshot = self.store.load_locked(&guard)?;

        let created = !snapshot.contains_key(user_id);
        if created {
            info!(user_id, "creating ledger record");
        }
        let record = snapshot.entry(user_id.to_string()).or_default();
        let rolled = record.roll_over(today);
        let (result, changed) = f(record);

        if created || rolled || changed {
            self.store.save_locked(&guard, &snapshot)?;
        }
        Ok(result)
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    /// Today's food log
    pub fn food_log(&self, user_id: &str) -> Result<Vec<FoodLogEntry>, LedgerError> {
        self.with_user(user_id, Self::today(), |r| (r.food_log.clone(), false))
    }

    /// Today's log, totals, remaining calories and settings in one read
    pub fn summary(&self, user_id: &str) -> Result<DaySummary, LedgerError> {
        self.summary_on(user_id, Self::today())
    }

    fn summary_on(&self, user_id: &str, today: NaiveDate) -> Result<DaySummary, LedgerError> {
        self.with_user(user_id, today, |r| {
            let summary = DaySummary {
                food_log: r.food_log.clone(),
                totals: r.totals(),
                remaining_calories: r.remaining_calories(),
                config: r.config.clone(),
            };
            (summary, false)
        })
    }

    /// Appends a food to today's log
    ///
    /// `nutrition` of `None` logs the all-zero record. Non-finite and
    /// negative amounts are logged as zero.
    pub fn add_food(
        &self,
        user_id: &str,
        food_text: &str,
        food_type: MealType,
        nutrition: Option<Nutrition>,
        used_ai: bool,
    ) -> Result<FoodLogEntry, LedgerError> {
        self.add_food_on(user_id, food_text, food_type, nutrition, used_ai, Self::today())
    }

    fn add_food_on(
        &self,
        user_id: &str,
        food_text: &str,
        food_type: MealType,
        nutrition: Option<Nutrition>,
        used_ai: bool,
        today: NaiveDate,
    ) -> Result<FoodLogEntry, LedgerError> {
        let entry = FoodLogEntry {
            food_text: food_text.to_string(),
            food_type,
            nutrition: nutrition.unwrap_or_default().clamped(),
            used_ai,
            date: today,
        };

        self.with_user(user_id, today, |r| {
            r.food_log.push(entry.clone());
            (entry, true)
        })
    }

    /// Removes the entry at `index` from today's log
    ///
    /// Returns `None` without writing if the index is out of range.
    pub fn remove_food(
        &self,
        user_id: &str,
        index: usize,
    ) -> Result<Option<FoodLogEntry>, LedgerError> {
        self.remove_food_on(user_id, index, Self::today())
    }

    fn remove_food_on(
        &self,
        user_id: &str,
        index: usize,
        today: NaiveDate,
    ) -> Result<Option<FoodLogEntry>, LedgerError> {
        self.with_user(user_id, today, |r| {
            if index < r.food_log.len() {
                (Some(r.food_log.remove(index)), true)
            } else {
                (None, false)
            }
        })
    }

    /// The user's settings
    pub fn config(&self, user_id: &str) -> Result<UserConfig, LedgerError> {
        self.with_user(user_id, Self::today(), |r| (r.config.clone(), false))
    }

    /// Updates whichever settings are given and returns the result
    pub fn update_config(
        &self,
        user_id: &str,
        total_calories_allowed: Option<u32>,
        allowed_basic_foods: Option<Vec<String>>,
    ) -> Result<UserConfig, LedgerError> {
        self.with_user(user_id, Self::today(), |r| {
            let changed = total_calories_allowed.is_some() || allowed_basic_foods.is_some();
            if let Some(total) = total_calories_allowed {
                r.config.total_calories_allowed = total;
            }
            if let Some(foods) = allowed_basic_foods {
                r.config.allowed_basic_foods = foods;
            }
            (r.config.clone(), changed)
        })
    }

    /// Calories left in today's budget, never below zero
    pub fn remaining_calories(&self, user_id: &str) -> Result<u32, LedgerError> {
        self.with_user(user_id, Self::today(), |r| (r.remaining_calories(), false))
    }
}
