//! Fixtures shared by unit tests.

use crate::config::StoreConfig;
use crate::store::Store;
use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use mockable::Clock;
use std::sync::Mutex;
use tempfile::TempDir;

/// Clock that only moves when told to.
#[derive(Debug)]
pub(crate) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub(crate) fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub(crate) fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().expect("clock lock");
        *now += delta;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_at(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
                .single()
                .expect("valid start time"),
        )
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

/// A store in a temporary directory, removed on drop.
pub(crate) struct TempStore {
    pub(crate) store: Store,
    _dir: TempDir,
}

pub(crate) fn temp_store() -> TempStore {
    let dir = TempDir::new().expect("temp dir");
    let config = StoreConfig {
        path: dir.path().join("conveyor.db"),
        ..StoreConfig::default()
    };
    let store = Store::open(&config).expect("open store");
    TempStore { store, _dir: dir }
}
