use chrono::{
    DateTime,
    Local,
};

/// Format used for the `Time` column of a merged table.
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// One observation of a source. `value` is `None` when the fetch failed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Local>,
    pub value: Option<f64>,
}

impl Sample {
    pub fn new(timestamp: DateTime<Local>, value: Option<f64>) -> Self {
        Self { timestamp, value }
    }

    /// Sample stamped with the current wall-clock time.
    pub fn now(value: Option<f64>) -> Self {
        Self::new(Local::now(), value)
    }

    pub fn is_absent(&self) -> bool {
        self.value.is_none()
    }

    pub fn time_label(&self) -> String {
        self.timestamp.format(TIME_FORMAT).to_string()
    }
}
