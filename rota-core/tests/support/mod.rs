#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use rota_core::{
    AllocationEngine, AllocationOutcome, AllocationRequest, Directory, EngineConfig,
    EngineStores, ManualClock, Notifier, Result,
};
use rota_core::store::DIRECTORY_KEY;
use rota_model::{DeliveryContext, OwnerGroup, RequesterId, ResourceKind};

/// Notifier that keeps every delivered message.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(DeliveryContext, String)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn containing(&self, needle: &str) -> usize {
        self.messages()
            .iter()
            .filter(|text| text.contains(needle))
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, context: &DeliveryContext, message: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((context.clone(), message.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub engine: AllocationEngine,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub stores: EngineStores,
}

/// 2024-05-10 12:00 UTC, well inside a logical day.
pub fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
}

/// Config with requester throttling out of the way.
pub fn relaxed_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.quota.window_limit_per_requester = None;
    config.quota.numbers_per_requester_per_day = 1_000;
    config
}

pub async fn harness(directory: Directory, config: EngineConfig) -> Harness {
    harness_at(directory, config, noon()).await
}

pub async fn harness_at(
    directory: Directory,
    config: EngineConfig,
    start: DateTime<Utc>,
) -> Harness {
    let stores = EngineStores::in_memory();
    stores
        .blobs
        .save_blob(DIRECTORY_KEY, &directory.encode().unwrap())
        .await
        .unwrap();

    let clock = Arc::new(ManualClock::new(start));
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = AllocationEngine::load(stores.clone(), notifier.clone(), clock.clone(), config)
        .await
        .unwrap();

    Harness {
        engine,
        clock,
        notifier,
        stores,
    }
}

pub fn owners_with_aliases(names: &[&str]) -> Directory {
    Directory::new(
        names
            .iter()
            .map(|name| OwnerGroup::new(*name).with_aliases([format!("{name}-alias")]))
            .collect(),
    )
}

pub fn owners_with_numbers(layout: &[(&str, &[&str])]) -> Directory {
    Directory::new(
        layout.iter()
            .map(|(name, numbers)| OwnerGroup::new(*name).with_numbers(numbers.iter().copied()))
            .collect(),
    )
}

pub fn request(requester: i64, kind: ResourceKind) -> AllocationRequest {
    AllocationRequest::new(
        RequesterId(requester),
        kind,
        DeliveryContext::replying_to(500 + requester, 1),
    )
}

/// Owner served by an issued outcome; panics otherwise.
pub fn owner_of(outcome: &AllocationOutcome) -> String {
    outcome
        .issued()
        .unwrap_or_else(|| panic!("expected an issued value, got {outcome:?}"))
        .owner
        .clone()
}

pub async fn next_owners(
    engine: &AllocationEngine,
    kind: ResourceKind,
    calls: usize,
) -> Vec<String> {
    let mut owners = Vec::with_capacity(calls);
    for call in 0..calls {
        let outcome = engine.allocate(request(call as i64 + 1, kind)).await;
        owners.push(owner_of(&outcome));
    }
    owners
}
