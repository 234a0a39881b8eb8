//! Ramp stages and the virtual-user schedule they describe

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LoadCheckError, Result};

/// One window of the ramp: reach `target` VUs linearly over `duration`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Length of the window
    #[serde(with = "duration_literal")]
    pub duration: Duration,

    /// VU count reached at the end of the window
    pub target: u32,
}

impl Stage {
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }

    /// Build a stage from a duration literal such as `"1m30s"`
    pub fn parse(duration: &str, target: u32) -> Result<Self> {
        Ok(Self::new(parse_duration(duration)?, target))
    }
}

/// Ordered stages forming a trapezoidal VU ramp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RampProfile {
    start_vus: u32,
    stages: Vec<Stage>,
}

impl RampProfile {
    /// Create a profile starting from zero VUs
    pub fn new(stages: Vec<Stage>) -> Result<Self> {
        Self::with_start(0, stages)
    }

    /// Create a profile starting from `start_vus`
    pub fn with_start(start_vus: u32, stages: Vec<Stage>) -> Result<Self> {
        if stages.is_empty() {
            return Err(LoadCheckError::InvalidStages("no stages defined".into()));
        }
        if stages.iter().all(|s| s.duration.is_zero()) {
            return Err(LoadCheckError::InvalidStages(
                "total duration is zero".into(),
            ));
        }
        Ok(Self { start_vus, stages })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Sum of all stage durations
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Highest concurrency the schedule ever asks for
    pub fn max_target(&self) -> u32 {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start_vus, u32::max)
    }

    /// Target VU count at `elapsed`, interpolated linearly inside a stage.
    ///
    /// Past the end of the schedule the last stage's target holds.
    pub fn target_at(&self, elapsed: Duration) -> u32 {
        let mut stage_start = Duration::ZERO;
        let mut previous = self.start_vus;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let progress = (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                let diff = stage.target as f64 - previous as f64;
                return (previous as f64 + diff * progress).floor().max(0.0) as u32;
            }
            stage_start = stage_end;
            previous = stage.target;
        }

        previous
    }

    /// Index of the stage active at `elapsed`
    pub fn stage_index_at(&self, elapsed: Duration) -> Option<usize> {
        let mut stage_end = Duration::ZERO;
        for (index, stage) in self.stages.iter().enumerate() {
            stage_end += stage.duration;
            if elapsed < stage_end {
                return Some(index);
            }
        }
        None
    }
}

// ============================================================================
// DURATION LITERALS
// ============================================================================

/// Parse literals like `30s`, `1m`, `1m30s`, `500ms`, `2h`, `1.5s`
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = || LoadCheckError::InvalidDuration(input.to_string());

    let mut rest = input.trim();
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total = Duration::ZERO;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let seconds = match &rest[..unit_len] {
            "ms" => value / 1000.0,
            "s" => value,
            "m" => value * 60.0,
            "h" => value * 3600.0,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];

        let part = Duration::try_from_secs_f64(seconds).map_err(|_| invalid())?;
        total = total.checked_add(part).ok_or_else(invalid)?;
    }

    Ok(total)
}

/// Render a duration in the compact literal form accepted by [`parse_duration`]
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 != 0 {
        return format!("{}ms", millis);
    }

    let secs = millis / 1000;
    if secs == 0 {
        return "0s".to_string();
    }

    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if seconds > 0 {
        out.push_str(&format!("{}s", seconds));
    }
    out
}

/// Serde adapter storing [`Duration`] as a literal string
pub mod duration_literal {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap(), secs(30));
        assert_eq!(parse_duration("1m").unwrap(), secs(60));
        assert_eq!(parse_duration("1m30s").unwrap(), secs(90));
        assert_eq!(parse_duration("2h").unwrap(), secs(7200));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        for bad in [
            "",
            "30",
            "s",
            "10x",
            "1m30",
            "abc",
            "99999999999999999999999h",
            "18446744073709551615s1s",
        ] {
            assert!(parse_duration(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(secs(90)), "1m30s");
        assert_eq!(format_duration(secs(3600)), "1h");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn test_stage_serde() {
        let stage: Stage = serde_json::from_str(r#"{"duration":"2m","target":20}"#).unwrap();
        assert_eq!(stage, Stage::new(secs(120), 20));

        let json = serde_json::to_string(&stage).unwrap();
        assert_eq!(json, r#"{"duration":"2m","target":20}"#);
    }

    #[test]
    fn test_empty_profile_rejected() {
        assert!(RampProfile::new(vec![]).is_err());
        assert!(RampProfile::new(vec![Stage::new(Duration::ZERO, 3)]).is_err());
    }

    #[test]
    fn test_target_interpolation() {
        let profile = RampProfile::new(vec![
            Stage::new(secs(10), 10),
            Stage::new(secs(10), 10),
            Stage::new(secs(10), 0),
        ])
        .unwrap();

        assert_eq!(profile.total_duration(), secs(30));
        assert_eq!(profile.max_target(), 10);
        assert_eq!(profile.target_at(Duration::ZERO), 0);
        assert_eq!(profile.target_at(secs(5)), 5);
        assert_eq!(profile.target_at(secs(15)), 10);
        assert_eq!(profile.target_at(secs(25)), 5);
        assert_eq!(profile.target_at(secs(60)), 0);
    }

    #[test]
    fn test_start_vus() {
        let profile = RampProfile::with_start(4, vec![Stage::new(secs(4), 0)]).unwrap();
        assert_eq!(profile.target_at(Duration::ZERO), 4);
        assert_eq!(profile.target_at(secs(2)), 2);
        assert_eq!(profile.max_target(), 4);
    }

    #[test]
    fn test_stage_index() {
        let profile =
            RampProfile::new(vec![Stage::new(secs(30), 2), Stage::new(secs(60), 5)]).unwrap();
        assert_eq!(profile.stage_index_at(secs(0)), Some(0));
        assert_eq!(profile.stage_index_at(secs(30)), Some(1));
        assert_eq!(profile.stage_index_at(secs(90)), None);
    }
}
