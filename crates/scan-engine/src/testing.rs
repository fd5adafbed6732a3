use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use catalog_sqlite::Db;
use homescan_core::{DetectedService, Detector, DetectorError, Target};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::{EngineConfig, ScanEngine};

/// Replays canned answers, then reports nothing.
pub(crate) struct ScriptedDetector {
    answers: Mutex<VecDeque<Result<Vec<DetectedService>, String>>>,
}

#[async_trait]
impl Detector for ScriptedDetector {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn detect(&self, _target: &Target) -> Result<Vec<DetectedService>, DetectorError> {
        match self.answers.lock().pop_front() {
            Some(Ok(found)) => Ok(found),
            Some(Err(msg)) => Err(DetectorError::new("scripted", msg)),
            None => Ok(Vec::new()),
        }
    }
}

struct SlowDetector(Duration);

#[async_trait]
impl Detector for SlowDetector {
    fn name(&self) -> &str {
        "slow"
    }

    async fn detect(&self, _target: &Target) -> Result<Vec<DetectedService>, DetectorError> {
        tokio::time::sleep(self.0).await;
        Ok(Vec::new())
    }
}

/// Blocks scans of one target until a permit is added to the gate.
struct GatedDetector {
    gated: String,
    gate: Arc<Semaphore>,
}

#[async_trait]
impl Detector for GatedDetector {
    fn name(&self) -> &str {
        "gated"
    }

    async fn detect(&self, target: &Target) -> Result<Vec<DetectedService>, DetectorError> {
        let host = target.to_string();
        if host == self.gated {
            let permit = self.gate.acquire().await.map_err(|e| DetectorError::new("gated", e.to_string()))?;
            permit.forget();
        }
        Ok(vec![DetectedService::new(host, 80, "http", "")])
    }
}

fn build(detector: Arc<dyn Detector>, scan_timeout: Duration) -> ScanEngine {
    let db = Db::open_in_memory().unwrap();
    ScanEngine::new(db, detector, EngineConfig { scan_timeout }).unwrap()
}

pub(crate) fn engine() -> ScanEngine {
    engine_with(Vec::new()).0
}

pub(crate) fn engine_with(answers: Vec<Result<Vec<DetectedService>, String>>) -> (ScanEngine, Arc<ScriptedDetector>) {
    let detector = Arc::new(ScriptedDetector { answers: Mutex::new(answers.into()) });
    (build(detector.clone(), Duration::from_secs(5)), detector)
}

pub(crate) fn slow_engine(delay: Duration, scan_timeout: Duration) -> ScanEngine {
    build(Arc::new(SlowDetector(delay)), scan_timeout)
}

pub(crate) fn gated_engine(gated: &str) -> (ScanEngine, Arc<Semaphore>) {
    let gate = Arc::new(Semaphore::new(0));
    let detector = GatedDetector { gated: gated.to_string(), gate: gate.clone() };
    (build(Arc::new(detector), Duration::from_secs(5)), gate)
}
