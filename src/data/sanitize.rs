//! Coercion of untrusted nutrition payloads
//!
//! Estimators return loosely typed JSON: numbers as strings, amounts with unit
//! suffixes (`"5mg"`), missing or extra fields. Everything here is total: bad
//! input turns into zeros, never into an error.

use serde_json::Value;

use super::Nutrition;

/// Unit substrings stripped from string amounts, longest first so that `mg`
/// is removed before the bare `g`
const UNIT_SUFFIXES: [&str; 6] = ["kcal", "mcg", "µg", "μg", "mg", "g"];

/// Coerces a JSON value to a non-negative, finite amount
///
/// Numbers pass through; strings are parsed after stripping known units.
/// Anything unparseable, non-finite or negative yields `0.0`.
pub fn coerce_amount(value: &Value) -> f64 {
    let amount = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => parse_with_units(s),
        _ => 0.0,
    };

    clamp_amount(amount)
}

/// Maps non-finite and negative amounts to `0.0`
pub fn clamp_amount(amount: f64) -> f64 {
    if amount.is_finite() && amount > 0.0 {
        amount
    } else {
        0.0
    }
}

fn parse_with_units(raw: &str) -> f64 {
    let mut cleaned = raw.trim().to_lowercase();
    for unit in UNIT_SUFFIXES {
        cleaned = cleaned.replace(unit, "");
    }
    cleaned.trim().parse::<f64>().unwrap_or(0.0)
}

/// Coerces a JSON value to whole calories, truncating toward zero
pub fn coerce_calories(value: &Value) -> u32 {
    // `as` saturates at u32::MAX; the amount is already finite and >= 0.
    coerce_amount(value).trunc() as u32
}

impl Nutrition {
    /// Returns the record with every amount finite and non-negative
    ///
    /// JSON has no NaN or infinity, so only clamped records round-trip
    /// through a snapshot file.
    pub fn clamped(mut self) -> Nutrition {
        self.protein = clamp_amount(self.protein);
        self.carbs = clamp_amount(self.carbs);
        self.fat = clamp_amount(self.fat);
        for amount in self.micros.values_mut() {
            *amount = clamp_amount(*amount);
        }
        self
    }

    /// Builds a nutrition record from an untrusted payload
    ///
    /// A payload that is not a JSON object yields the all-zero record.
    /// Unknown fields are ignored and missing ones default to zero.
    pub fn from_untrusted(payload: &Value) -> Nutrition {
        let Some(fields) = payload.as_object() else {
            return Nutrition::default();
        };

        let amount = |name: &str| fields.get(name).map(coerce_amount).unwrap_or(0.0);

        let micros = fields
            .get("micros")
            .and_then(Value::as_object)
            .map(|micros| {
                micros
                    .iter()
                    .map(|(name, value)| (name.clone(), coerce_amount(value)))
                    .collect()
            })
            .unwrap_or_default();

        Nutrition {
            calories: fields.get("calories").map(coerce_calories).unwrap_or(0),
            protein: amount("protein"),
            carbs: amount("carbs"),
            fat: amount("fat"),
            micros,
        }
    }
}
