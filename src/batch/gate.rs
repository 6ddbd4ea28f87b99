use chrono::{Local, NaiveTime};
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

use crate::error::{Result, PolysubError};

/// Poll interval while waiting for the window to open
const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Daily clock-time window in which full processing may run.
/// The window may wrap past midnight (e.g. 22:00 - 06:00). Waiting is
/// cooperative: coarse one-minute polls, no preemption of in-flight work.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl WorkWindow {
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start = NaiveTime::parse_from_str(start, "%H:%M").map_err(|e| {
            PolysubError::Config(format!("invalid work window start '{}': {}", start, e))
        })?;
        let end = NaiveTime::parse_from_str(end, "%H:%M").map_err(|e| {
            PolysubError::Config(format!("invalid work window end '{}': {}", end, e))
        })?;
        Ok(Self { start, end })
    }

    /// Build from optional config values; both must be present to gate
    pub fn from_config(start: &Option<String>, end: &Option<String>) -> Result<Option<Self>> {
        match (start, end) {
            (Some(start), Some(end)) => Ok(Some(Self::parse(start, end)?)),
            _ => Ok(None),
        }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time < self.end
        } else {
            // Wraps past midnight
            time >= self.start || time < self.end
        }
    }

    /// Block until the current local time is inside the window
    pub async fn wait_until_open(&self) {
        loop {
            let now = Local::now().time();
            if self.contains(now) {
                return;
            }
            info!(
                "Outside work window ({} - {}), waiting",
                self.start.format("%H:%M"),
                self.end.format("%H:%M")
            );
            sleep(POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(text: &str) -> NaiveTime {
        NaiveTime::parse_from_str(text, "%H:%M").unwrap()
    }

    #[test]
    fn test_simple_window() {
        let window = WorkWindow::parse("09:00", "17:30").unwrap();
        assert!(window.contains(t("09:00")));
        assert!(window.contains(t("12:00")));
        assert!(!window.contains(t("17:30")));
        assert!(!window.contains(t("08:59")));
        assert!(!window.contains(t("23:00")));
    }

    #[test]
    fn test_wrapping_window() {
        let window = WorkWindow::parse("22:00", "06:00").unwrap();
        assert!(window.contains(t("23:30")));
        assert!(window.contains(t("00:00")));
        assert!(window.contains(t("05:59")));
        assert!(!window.contains(t("06:00")));
        assert!(!window.contains(t("12:00")));
    }

    #[test]
    fn test_invalid_format_rejected() {
        assert!(WorkWindow::parse("9am", "17:00").is_err());
        assert!(WorkWindow::parse("09:00", "25:00").is_err());
    }

    #[test]
    fn test_from_config_requires_both_ends() {
        let window =
            WorkWindow::from_config(&Some("09:00".to_string()), &Some("17:00".to_string()))
                .unwrap();
        assert!(window.is_some());

        let window = WorkWindow::from_config(&Some("09:00".to_string()), &None).unwrap();
        assert!(window.is_none());

        let window = WorkWindow::from_config(&None, &None).unwrap();
        assert!(window.is_none());
    }
}
