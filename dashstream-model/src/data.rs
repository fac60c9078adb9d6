use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Single timestamped value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TsValue {
    pub ts: i64,
    pub value: serde_json::Value,
}

impl TsValue {
    pub fn new(ts: i64, value: impl Into<serde_json::Value>) -> Self {
        Self {
            ts,
            value: value.into(),
        }
    }
}

/// Batch of datapoints keyed by data key name, as delivered by the
/// telemetry collaborator.
pub type SubscriptionData = HashMap<String, Vec<TsValue>>;

/// One update frame from a live data feed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataUpdate {
    #[serde(default)]
    pub data: SubscriptionData,
    /// Latest-value frames update only the newest sample per key and bypass
    /// series accumulation.
    #[serde(default)]
    pub latest: bool,
}

impl DataUpdate {
    pub fn series(data: SubscriptionData) -> Self {
        Self {
            data,
            latest: false,
        }
    }

    pub fn latest(data: SubscriptionData) -> Self {
        Self { data, latest: true }
    }

    pub fn of_key(key: impl Into<String>, values: Vec<TsValue>) -> Self {
        let mut data = SubscriptionData::new();
        data.insert(key.into(), values);
        Self::series(data)
    }
}
