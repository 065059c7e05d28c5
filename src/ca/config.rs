use crate::cert::Template;
use crate::utils::errors::{DpkiError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const SECONDS_PER_DAY: u64 = 86_400;

/// Duration written with a unit suffix: `500ms`, `300s`, `15m`, `2h`, `795d`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HumanDuration {
    value: u64,
    unit: DurationUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DurationUnit {
    Millis,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl DurationUnit {
    fn suffix(&self) -> &'static str {
        match self {
            DurationUnit::Millis => "ms",
            DurationUnit::Seconds => "s",
            DurationUnit::Minutes => "m",
            DurationUnit::Hours => "h",
            DurationUnit::Days => "d",
        }
    }
}

impl HumanDuration {
    pub fn from_secs(secs: u64) -> Self {
        Self {
            value: secs,
            unit: DurationUnit::Seconds,
        }
    }

    pub fn from_days(days: u64) -> Self {
        Self {
            value: days,
            unit: DurationUnit::Days,
        }
    }

    pub fn as_duration(&self) -> Duration {
        match self.unit {
            DurationUnit::Millis => Duration::from_millis(self.value),
            DurationUnit::Seconds => Duration::from_secs(self.value),
            DurationUnit::Minutes => Duration::from_secs(self.value * 60),
            DurationUnit::Hours => Duration::from_secs(self.value * 3600),
            DurationUnit::Days => Duration::from_secs(self.value * SECONDS_PER_DAY),
        }
    }

    /// Whole days, rounded down
    pub fn as_days(&self) -> u64 {
        self.as_duration().as_secs() / SECONDS_PER_DAY
    }
}

impl FromStr for HumanDuration {
    type Err = DpkiError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, suffix) = s.split_at(split);
        let value: u64 = digits
            .parse()
            .map_err(|_| DpkiError::Config(format!("Bad duration `{s}`")))?;
        let unit = match suffix {
            "ms" => DurationUnit::Millis,
            "s" => DurationUnit::Seconds,
            "m" => DurationUnit::Minutes,
            "h" => DurationUnit::Hours,
            "d" => DurationUnit::Days,
            _ => {
                return Err(DpkiError::Config(format!(
                    "Bad duration `{s}`: expected one of ms, s, m, h, d"
                )))
            }
        };
        Ok(Self { value, unit })
    }
}

impl TryFrom<String> for HumanDuration {
    type Error = DpkiError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<HumanDuration> for String {
    fn from(value: HumanDuration) -> Self {
        value.to_string()
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

/// `[ca]` section of the node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaConfig {
    /// Tendermint key file, relative to the node home
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_key_file: Option<PathBuf>,
    pub allow_templates: Vec<String>,
    pub next_path_length: u32,
    pub ca_valid_for: HumanDuration,
    pub host_valid_for: HumanDuration,
    pub user_valid_for: HumanDuration,
    pub waiting_for_downstream: HumanDuration,
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            ca_key_file: None,
            allow_templates: Template::ALL.iter().map(|t| t.to_string()).collect(),
            next_path_length: 3,
            ca_valid_for: HumanDuration::from_days(795),
            host_valid_for: HumanDuration::from_days(530),
            user_valid_for: HumanDuration::from_days(365),
            waiting_for_downstream: HumanDuration::from_secs(300),
        }
    }
}

impl CaConfig {
    pub fn allows(&self, template: Template) -> bool {
        self.allow_templates
            .iter()
            .filter_map(|name| name.parse::<Template>().ok())
            .any(|allowed| allowed == template)
    }

    /// Validity period in days for certificates of the given template
    pub fn valid_days(&self, template: Template) -> u64 {
        match template {
            Template::Ca => self.ca_valid_for.as_days(),
            Template::Node => self.host_valid_for.as_days(),
            Template::User => self.user_valid_for.as_days(),
        }
    }
}
