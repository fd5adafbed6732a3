use async_trait::async_trait;
use thiserror::Error;

use crate::model::DetectedService;
use crate::Target;

#[derive(Debug, Error)]
#[error("{detector}: {message}")]
pub struct DetectorError {
    pub detector: String,
    pub message: String,
}

impl DetectorError {
    pub fn new(detector: impl Into<String>, message: impl Into<String>) -> Self {
        DetectorError { detector: detector.into(), message: message.into() }
    }
}

/// Network probing capability the scan engine awaits.
///
/// Implementations return every service observed on the target; an empty
/// list is a valid answer. Errors mean the probe itself could not run and
/// abort the scan without touching the catalog. Callers bound the call with
/// a timeout and drop the future to cancel it.
#[async_trait]
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;

    async fn detect(&self, target: &Target) -> Result<Vec<DetectedService>, DetectorError>;
}
