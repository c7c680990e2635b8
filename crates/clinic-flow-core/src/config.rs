//! Engine configuration.
//!
//! Resolved once at startup and handed to the engines; nothing reads the
//! environment while an operation runs.

use std::env;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{FlowError, FlowResult};

pub const ENV_NAME_MATCH_THRESHOLD: &str = "CLINIC_FLOW_NAME_MATCH_THRESHOLD";
pub const ENV_CREATE_MISSING_PATIENTS: &str = "CLINIC_FLOW_CREATE_MISSING_PATIENTS";
pub const ENV_DEFAULT_SESSIONS_PER_ZONE: &str = "CLINIC_FLOW_DEFAULT_SESSIONS_PER_ZONE";
pub const ENV_CSV_DELIMITER: &str = "CLINIC_FLOW_CSV_DELIMITER";

/// Tunables for matching, import and patient creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FlowConfig {
    /// Normalized Levenshtein similarity at or above which two names are the same person
    pub name_match_threshold: f64,
    /// Create a patient for unmatched import rows that carry a name pair
    pub create_missing_patients: bool,
    /// Planned sessions per zone when patient creation gives no count
    pub default_sessions_per_zone: u32,
    /// Field delimiter of imported sheets; sniffed from the header when `None`
    pub csv_delimiter: Option<char>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            name_match_threshold: 0.85,
            create_missing_patients: false,
            default_sessions_per_zone: 6,
            csv_delimiter: None,
        }
    }
}

impl FlowConfig {
    /// Build from `CLINIC_FLOW_*` variables, keeping defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            name_match_threshold: parse_var(ENV_NAME_MATCH_THRESHOLD, defaults.name_match_threshold),
            create_missing_patients: parse_var(
                ENV_CREATE_MISSING_PATIENTS,
                defaults.create_missing_patients,
            ),
            default_sessions_per_zone: parse_var(
                ENV_DEFAULT_SESSIONS_PER_ZONE,
                defaults.default_sessions_per_zone,
            ),
            csv_delimiter: env::var(ENV_CSV_DELIMITER)
                .ok()
                .and_then(|v| parse_delimiter(&v)),
        }
    }

    pub fn validate(&self) -> FlowResult<()> {
        if !(self.name_match_threshold > 0.0 && self.name_match_threshold <= 1.0) {
            return Err(FlowError::Validation(format!(
                "name_match_threshold must be in (0, 1], got {}",
                self.name_match_threshold
            )));
        }
        if self.default_sessions_per_zone == 0 {
            return Err(FlowError::Validation(
                "default_sessions_per_zone cannot be zero".into(),
            ));
        }
        if let Some(d) = self.csv_delimiter {
            if !d.is_ascii() {
                return Err(FlowError::Validation(format!(
                    "csv_delimiter must be ASCII, got {:?}",
                    d
                )));
            }
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has unparsable value {:?}, using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

/// A single character, or `tab` / `\t` spelled out.
fn parse_delimiter(raw: &str) -> Option<char> {
    let mut chars = raw.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Some(c);
    }
    let trimmed = raw.trim_matches(' ');
    if trimmed.eq_ignore_ascii_case("tab") || trimmed == "\\t" {
        return Some('\t');
    }
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        (None, _) => None,
        (Some(_), Some(_)) => {
            warn!("{} has unusable value {:?}, sniffing instead", ENV_CSV_DELIMITER, raw);
            None
        }
    }
}
