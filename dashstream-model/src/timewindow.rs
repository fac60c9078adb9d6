use serde::{Deserialize, Serialize};

pub const DEFAULT_REALTIME_WINDOW_MS: i64 = 60_000;
pub const DEFAULT_AGGREGATION_LIMIT: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregationType {
    Min,
    Max,
    Avg,
    Sum,
    Count,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregation {
    #[serde(rename = "type")]
    pub agg_type: AggregationType,
    pub limit: u32,
}

impl Default for Aggregation {
    fn default() -> Self {
        Self {
            agg_type: AggregationType::Avg,
            limit: DEFAULT_AGGREGATION_LIMIT,
        }
    }
}

/// Sliding realtime window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalWindow {
    pub time_window_ms: i64,
    pub interval: i64,
}

/// Historical window, either anchored to "now" or fully fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", untagged)]
pub enum HistoryWindow {
    Last {
        time_window_ms: i64,
        interval: i64,
    },
    Fixed {
        start_time_ms: i64,
        end_time_ms: i64,
        interval: i64,
    },
}

/// Declarative timewindow as stored in widget/dashboard config. At most one
/// of `realtime`/`history` is set; both absent means "use defaults".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timewindow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realtime: Option<IntervalWindow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<HistoryWindow>,
    #[serde(default)]
    pub aggregation: Aggregation,
}

impl Timewindow {
    pub fn realtime_last(time_window_ms: i64, interval: i64) -> Self {
        Self {
            realtime: Some(IntervalWindow {
                time_window_ms,
                interval,
            }),
            history: None,
            aggregation: Aggregation::default(),
        }
    }

    pub fn history_fixed(start_time_ms: i64, end_time_ms: i64, interval: i64) -> Self {
        Self {
            realtime: None,
            history: Some(HistoryWindow::Fixed {
                start_time_ms,
                end_time_ms,
                interval,
            }),
            aggregation: Aggregation::default(),
        }
    }

    pub fn is_history(&self) -> bool {
        self.history.is_some()
    }
}

/// Fixed absolute window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedWindow {
    pub start_time_ms: i64,
    pub end_time_ms: i64,
}

/// Resolved form attached to an active subscription. Exactly one of
/// `realtime_window_ms`/`fixed_window` is set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionTimewindow {
    pub start_ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realtime_window_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_window: Option<FixedWindow>,
    pub interval: i64,
    pub aggregation: Aggregation,
}

impl SubscriptionTimewindow {
    /// Resolve a declarative timewindow against the current wall clock.
    pub fn resolve(tw: &Timewindow, now_ms: i64) -> Self {
        if let Some(history) = tw.history {
            match history {
                HistoryWindow::Fixed {
                    start_time_ms,
                    end_time_ms,
                    interval,
                } => Self {
                    start_ts: start_time_ms,
                    realtime_window_ms: None,
                    fixed_window: Some(FixedWindow {
                        start_time_ms,
                        end_time_ms,
                    }),
                    interval,
                    aggregation: tw.aggregation,
                },
                HistoryWindow::Last {
                    time_window_ms,
                    interval,
                } => Self {
                    start_ts: now_ms - time_window_ms,
                    realtime_window_ms: None,
                    fixed_window: Some(FixedWindow {
                        start_time_ms: now_ms - time_window_ms,
                        end_time_ms: now_ms,
                    }),
                    interval,
                    aggregation: tw.aggregation,
                },
            }
        } else {
            let window = tw.realtime.unwrap_or(IntervalWindow {
                time_window_ms: DEFAULT_REALTIME_WINDOW_MS,
                interval: 1_000,
            });
            Self {
                start_ts: now_ms - window.time_window_ms,
                realtime_window_ms: Some(window.time_window_ms),
                fixed_window: None,
                interval: window.interval,
                aggregation: tw.aggregation,
            }
        }
    }

    pub fn is_history(&self) -> bool {
        self.fixed_window.is_some()
    }
}
