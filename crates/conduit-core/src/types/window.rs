//! Windows and windowed elements

use crate::types::value::Value;
use serde::{Deserialize, Serialize};

/// Smallest representable timestamp, in milliseconds
pub const MIN_TIMESTAMP_MILLIS: i64 = i64::MIN / 1000;
/// Largest timestamp an element may carry, in milliseconds
pub const MAX_TIMESTAMP_MILLIS: i64 = i64::MAX / 1000;

/// A window an element belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BoundedWindow {
    Global,
    /// Half-open interval `[start, end)` in milliseconds
    Interval { start: i64, end: i64 },
}

impl BoundedWindow {
    /// Latest timestamp an element in this window can have
    pub fn max_timestamp(&self) -> i64 {
        match self {
            // One day short of the end of time, as other runners do
            BoundedWindow::Global => MAX_TIMESTAMP_MILLIS - 24 * 60 * 60 * 1000,
            BoundedWindow::Interval { end, .. } => end - 1,
        }
    }
}

/// Firing information attached to an output element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaneInfo {
    pub is_first: bool,
    pub is_last: bool,
    pub index: u64,
}

impl PaneInfo {
    pub const NO_FIRING: PaneInfo = PaneInfo {
        is_first: true,
        is_last: true,
        index: 0,
    };

    pub fn on_time_and_only_firing() -> Self {
        Self::NO_FIRING
    }
}

/// An element with its timestamp, windows and pane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowedValue {
    pub value: Value,
    pub timestamp_millis: i64,
    pub windows: Vec<BoundedWindow>,

    #[serde(default)]
    pub pane: PaneInfo,
}

impl WindowedValue {
    pub fn new(value: Value, timestamp_millis: i64, windows: Vec<BoundedWindow>) -> Self {
        Self {
            value,
            timestamp_millis,
            windows,
            pane: PaneInfo::NO_FIRING,
        }
    }

    /// An element in the global window at the minimum timestamp
    pub fn in_global_window(value: Value) -> Self {
        Self::new(value, MIN_TIMESTAMP_MILLIS, vec![BoundedWindow::Global])
    }

    /// Same timestamp, windows and pane around a new value
    pub fn with_value(&self, value: Value) -> Self {
        Self {
            value,
            timestamp_millis: self.timestamp_millis,
            windows: self.windows.clone(),
            pane: self.pane,
        }
    }

    /// One element per window this element belongs to
    pub fn explode_windows(&self) -> Vec<WindowedValue> {
        self.windows
            .iter()
            .map(|w| Self {
                value: self.value.clone(),
                timestamp_millis: self.timestamp_millis,
                windows: vec![w.clone()],
                pane: self.pane,
            })
            .collect()
    }
}

/// All elements seen for one key, as handed from GBKO to GABW
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyedWorkItem {
    pub key: Value,
    pub elements: Vec<WindowedValue>,
}
