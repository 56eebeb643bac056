use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// General interface for a single, composable risk validation.
///
/// See [`CheckHigherThan`] for a simple example. A [`RiskManager`](crate::RiskManager)
/// implementation typically runs several of these in sequence and folds the
/// first failure into a [`RiskRefused`](crate::RiskRefused).
pub trait RiskCheck {
    type Input;
    type Error;

    /// Returns the name of the risk check.
    fn name() -> &'static str;

    /// Performs the risk check on the provided `Input`.
    fn check(&self, input: &Self::Input) -> Result<(), Self::Error>;
}

/// Risk check that validates an input value does not exceed an upper limit.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize, Constructor)]
pub struct CheckHigherThan<T> {
    /// The upper limit value; check passes if input is <= limit.
    pub limit: T,
}

impl<T> RiskCheck for CheckHigherThan<T>
where
    T: Clone + PartialOrd,
{
    type Input = T;
    type Error = CheckHigherThanError<T>;

    fn name() -> &'static str {
        "CheckHigherThan"
    }

    fn check(&self, input: &Self::Input) -> Result<(), Self::Error> {
        if input > &self.limit {
            Err(CheckHigherThanError {
                input: input.clone(),
                limit: self.limit.clone(),
            })
        } else {
            Ok(())
        }
    }
}

/// Error returned when a [`CheckHigherThan`] validation fails.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Error, Constructor,
)]
#[error("CheckHigherThan failed: input {input:?} > limit {limit:?}")]
pub struct CheckHigherThanError<T> {
    pub input: T,
    pub limit: T,
}

/// Per-instrument order-volume limit, built on [`CheckHigherThan`].
///
/// Used by [`MaxOrderVolumeManager`](crate::MaxOrderVolumeManager) to reject
/// intents whose `volume` exceeds what is configured for their instrument.
#[derive(Debug, Clone, Default)]
pub struct MaxOrderVolume {
    limits: std::collections::HashMap<String, CheckHigherThan<u32>>,
    default_limit: Option<CheckHigherThan<u32>>,
}

impl MaxOrderVolume {
    pub fn new(default_limit: Option<u32>) -> Self {
        Self {
            limits: std::collections::HashMap::new(),
            default_limit: default_limit.map(CheckHigherThan::new),
        }
    }

    pub fn with_instrument_limit(mut self, instrument_id: impl Into<String>, limit: u32) -> Self {
        self.limits
            .insert(instrument_id.into(), CheckHigherThan::new(limit));
        self
    }

    pub fn check(&self, instrument_id: &str, volume: u32) -> Result<(), CheckHigherThanError<u32>> {
        match self.limits.get(instrument_id).or(self.default_limit.as_ref()) {
            Some(check) => check.check(&volume),
            None => Ok(()),
        }
    }
}
