use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Capture-hour bucket used to narrow album queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    /// 06:00 to 11:59
    Morning,
    /// 12:00 to 17:59
    Afternoon,
    /// 18:00 to 23:59
    Evening,
    /// 00:00 to 05:59
    Night,
}

impl TimeOfDay {
    /// Half-open hour range `[start, end)` covered by this bucket.
    pub fn hours(&self) -> (u32, u32) {
        match self {
            TimeOfDay::Morning => (6, 12),
            TimeOfDay::Afternoon => (12, 18),
            TimeOfDay::Evening => (18, 24),
            TimeOfDay::Night => (0, 6),
        }
    }

    #[cfg(test)]
    pub fn contains(&self, hour: u32) -> bool {
        let (start, end) = self.hours();
        hour >= start && hour < end
    }
}
