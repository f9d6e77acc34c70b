//! Nutrition estimation service
//!
//! Sits between callers and the AI estimator: consults the nutrition cache
//! before making the expensive call and stores the sanitized result after it.
//! The outcome is reported as an [`EstimateOutcome`] so the caller decides
//! what to show when no estimate is available.

use std::panic;
use std::sync::Arc;

use serde::Serialize;
use tokio::task;
use tracing::{debug, info, warn};

use crate::cache::NutritionCache;
use crate::data::{Estimator, Nutrition, NutritionResponse, UpstreamError};
use crate::store::StoreError;

/// What happened while estimating one food description
#[derive(Debug)]
pub enum EstimateOutcome {
    /// Served from the cache
    Hit(Nutrition),
    /// Estimated live and cached
    Miss(Nutrition),
    /// Estimation is switched off for this call
    Disabled,
    /// The estimator failed or returned nothing usable; nothing was cached
    UpstreamError(UpstreamError),
    /// Estimated live, but the result could not be cached
    StoreError {
        nutrition: Nutrition,
        error: StoreError,
    },
}

impl EstimateOutcome {
    /// The estimated nutrition, if there is one
    pub fn nutrition(&self) -> Option<&Nutrition> {
        match self {
            EstimateOutcome::Hit(n)
            | EstimateOutcome::Miss(n)
            | EstimateOutcome::StoreError { nutrition: n, .. } => Some(n),
            EstimateOutcome::Disabled | EstimateOutcome::UpstreamError(_) => None,
        }
    }

    /// Whether the value came from the cache
    pub fn is_hit(&self) -> bool {
        matches!(self, EstimateOutcome::Hit(_))
    }

    /// Converts to the user-facing record, substituting the all-zero record
    /// when no estimate is available
    pub fn into_response(self) -> NutritionResponse {
        let from_cache = self.is_hit();
        match self {
            EstimateOutcome::Hit(nutrition)
            | EstimateOutcome::Miss(nutrition)
            | EstimateOutcome::StoreError { nutrition, .. } => NutritionResponse {
                nutrition,
                from_cache,
            },
            EstimateOutcome::Disabled | EstimateOutcome::UpstreamError(_) => {
                NutritionResponse::empty()
            }
        }
    }
}

/// Wire shape of an estimate response
#[derive(Debug, Clone, Serialize)]
pub struct EstimateResponse {
    pub nutrition: NutritionResponse,
}

/// Estimation service shared by every command that needs nutrition
#[derive(Clone)]
pub struct EstimationService {
    cache: NutritionCache,
    estimator: Option<Arc<dyn Estimator>>,
    use_ai_default: bool,
}

impl EstimationService {
    /// Creates the service
    ///
    /// `estimator` is `None` when no AI client is configured; estimates that
    /// reach the estimator then report [`UpstreamError::NotConfigured`].
    pub fn new(
        cache: NutritionCache,
        estimator: Option<Arc<dyn Estimator>>,
        use_ai_default: bool,
    ) -> Self {
        Self {
            cache,
            estimator,
            use_ai_default,
        }
    }

    /// The cache this service reads and writes
    pub fn cache(&self) -> &NutritionCache {
        &self.cache
    }

    /// Whether estimation is on for a call with the given override
    pub fn ai_enabled(&self, use_ai: Option<bool>) -> bool {
        use_ai.unwrap_or(self.use_ai_default)
    }

    /// Estimates nutrition honouring the per-call `use_ai` override
    ///
    /// * `None` uses the configured default and reads the cache first.
    /// * `Some(true)` skips the cache read and always calls the estimator,
    ///   but still overwrites the cache with the fresh result.
    /// * `Some(false)` returns [`EstimateOutcome::Disabled`].
    pub async fn estimate(&self, food_text: &str, use_ai: Option<bool>) -> EstimateOutcome {
        if !self.ai_enabled(use_ai) {
            debug!("AI estimation disabled");
            return EstimateOutcome::Disabled;
        }

        let read_cache = use_ai.is_none();
        self.resolve(food_text, read_cache).await
    }

    /// Estimates nutrition with the cache consulted first, regardless of the
    /// configured default
    pub async fn estimate_cached(&self, food_text: &str) -> EstimateOutcome {
        self.resolve(food_text, true).await
    }

    /// Runs a cache operation on the blocking pool
    ///
    /// Cache calls may wait on the file lock; they must not stall the async
    /// worker while they do.
    async fn with_cache<R, F>(&self, op: F) -> Result<R, StoreError>
    where
        R: Send + 'static,
        F: FnOnce(&NutritionCache) -> Result<R, StoreError> + Send + 'static,
    {
        let cache = self.cache.clone();
        match task::spawn_blocking(move || op(&cache)).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => panic::resume_unwind(e.into_panic()),
            Err(_) => Err(StoreError::Interrupted {
                path: self.cache.path().to_path_buf(),
            }),
        }
    }

    async fn resolve(&self, food_text: &str, read_cache: bool) -> EstimateOutcome {
        if read_cache {
            let text = food_text.to_string();
            match self.with_cache(move |cache| cache.get(&text)).await {
                Ok(Some(hit)) => return EstimateOutcome::Hit(hit.nutrition),
                Ok(None) => {}
                Err(e) => warn!("nutrition cache unavailable, treating as miss: {}", e),
            }
        } else {
            debug!("cache read bypassed");
        }

        let Some(estimator) = &self.estimator else {
            return EstimateOutcome::UpstreamError(UpstreamError::NotConfigured);
        };

        let payload = match estimator.estimate(food_text).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(kind = ?e.kind(), "AI nutrition estimate failed: {}", e);
                return EstimateOutcome::UpstreamError(e);
            }
        };

        let nutrition = Nutrition::from_untrusted(&payload);
        info!(calories = nutrition.calories, "nutrition estimated");

        let text = food_text.to_string();
        let stored = nutrition.clone();
        match self.with_cache(move |cache| cache.set(&text, &stored)).await {
            Ok(()) => EstimateOutcome::Miss(nutrition),
            Err(error) => {
                warn!("could not cache nutrition estimate: {}", error);
                EstimateOutcome::StoreError { nutrition, error }
            }
        }
    }
}
