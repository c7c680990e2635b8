//! One row of an appointment sheet.

use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::matcher::{name_key, normalize_name, normalize_phone};

/// Accepted spellings of the date column, after header normalization.
pub(crate) const DATE_COLUMNS: &[&str] = &["date", "jour"];

/// Accepted spellings of the start-time column, after header normalization.
pub(crate) const TIME_COLUMNS: &[&str] = &["time", "heure", "start_time", "horaire"];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y", "%d-%m-%Y"];

const TIME_FORMATS: &[&str] = &["%H:%M", "%H:%M:%S", "%Hh%M"];

/// Raw row as deserialized from the sheet. Headers are normalized first
/// ("Prénom" → `prenom`, "Start Time" → `start_time`), so aliases are plain ASCII.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ScheduleRow {
    #[serde(default, alias = "jour")]
    pub date: Option<String>,
    #[serde(default, alias = "heure", alias = "start_time", alias = "horaire")]
    pub time: Option<String>,
    #[serde(default, alias = "nom", alias = "last_name")]
    pub family_name: Option<String>,
    #[serde(default, alias = "prenom", alias = "first_name")]
    pub given_name: Option<String>,
    #[serde(default, alias = "telephone", alias = "tel")]
    pub phone: Option<String>,
    #[serde(default, alias = "medecin", alias = "docteur")]
    pub doctor: Option<String>,
    #[serde(default)]
    pub zones: Option<String>,
    #[serde(default, alias = "remarques")]
    pub notes: Option<String>,
}

/// Row that passed required-field validation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedRow {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub given_name: String,
    pub family_name: String,
    pub phone: Option<String>,
    pub doctor: Option<String>,
    pub zone_ids: Vec<String>,
    pub notes: Option<String>,
}

impl ScheduleRow {
    /// Validate required fields: date, time, and a name pair or a usable phone.
    pub fn parse(self) -> Result<ParsedRow, String> {
        let date = clean(self.date);
        let time = clean(self.time);
        let given_name = clean(self.given_name).unwrap_or_default();
        let family_name = clean(self.family_name).unwrap_or_default();
        let phone = clean(self.phone);
        let doctor = clean(self.doctor);

        if date.is_none() && time.is_none() && given_name.is_empty() && family_name.is_empty() && phone.is_none() {
            return Err("empty row".into());
        }

        let date = match date {
            Some(raw) => parse_date(&raw).ok_or_else(|| format!("invalid date '{}'", raw))?,
            None => return Err("missing date".into()),
        };
        let time = match time {
            Some(raw) => parse_time(&raw).ok_or_else(|| format!("invalid time '{}'", raw))?,
            None => return Err("missing time".into()),
        };

        let phone = phone.filter(|p| normalize_phone(p).is_some());
        let has_name_pair =
            !normalize_name(&given_name).is_empty() && !normalize_name(&family_name).is_empty();
        if !has_name_pair && phone.is_none() {
            return Err("row has neither a full name nor a phone".into());
        }

        let zone_ids = clean(self.zones)
            .map(|z| {
                z.split(|c| matches!(c, ',' | '+' | '|' | '/'))
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(ParsedRow {
            date,
            time,
            given_name,
            family_name,
            phone,
            doctor,
            zone_ids,
            notes: clean(self.notes),
        })
    }
}

impl ParsedRow {
    /// Stable identity of a planned visit; the same row imported twice hashes the same.
    pub fn fingerprint(&self, doctor_id: &str) -> String {
        let canonical = format!(
            "{}|{}|{}|{}|{}",
            self.date,
            self.time.format("%H:%M"),
            doctor_id,
            name_key(&self.given_name, &self.family_name),
            self.phone.as_deref().and_then(normalize_phone).unwrap_or_default()
        );
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Header cell → lookup key.
pub(crate) fn normalize_header(raw: &str) -> String {
    normalize_name(raw).replace(' ', "_")
}

pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw.trim(), fmt).ok())
}

pub(crate) fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim().to_lowercase();
    // "9h" means 9h00
    let raw = if raw.ends_with('h') {
        format!("{}00", raw)
    } else {
        raw
    };
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(&raw, fmt).ok())
}

/// Pick the delimiter that occurs most in the header line.
pub(crate) fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    [b';', b',', b'\t']
        .into_iter()
        .max_by_key(|d| header.bytes().filter(|b| b == d).count())
        .filter(|d| header.bytes().any(|b| b == *d))
        .unwrap_or(b',')
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(date: &str, time: &str, given: &str, family: &str, phone: &str) -> ScheduleRow {
        let some = |s: &str| (!s.is_empty()).then(|| s.to_string());
        ScheduleRow {
            date: some(date),
            time: some(time),
            given_name: some(given),
            family_name: some(family),
            phone: some(phone),
            ..ScheduleRow::default()
        }
    }

    #[test]
    fn test_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 4);
        assert_eq!(parse_date("2024-03-04"), expected);
        assert_eq!(parse_date("04/03/2024"), expected);
        assert_eq!(parse_date("04.03.2024"), expected);
        assert_eq!(parse_date("04-03-2024"), expected);
        assert_eq!(parse_date("31/02/2024"), None);
        assert_eq!(parse_date("demain"), None);
    }

    #[test]
    fn test_time_formats() {
        let nine_thirty = NaiveTime::from_hms_opt(9, 30, 0);
        assert_eq!(parse_time("09:30"), nine_thirty);
        assert_eq!(parse_time("9:30:00"), nine_thirty);
        assert_eq!(parse_time("9h30"), nine_thirty);
        assert_eq!(parse_time("14H"), NaiveTime::from_hms_opt(14, 0, 0));
        assert_eq!(parse_time("25:00"), None);
    }

    #[test]
    fn test_header_normalization() {
        assert_eq!(normalize_header("Prénom"), "prenom");
        assert_eq!(normalize_header(" Téléphone "), "telephone");
        assert_eq!(normalize_header("Start Time"), "start_time");
        assert_eq!(normalize_header("start_time"), "start_time");
    }

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("date;heure;nom\n1;2;3"), b';');
        assert_eq!(sniff_delimiter("date,time,family_name"), b',');
        assert_eq!(sniff_delimiter("date\ttime"), b'\t');
        assert_eq!(sniff_delimiter("date"), b',');
    }

    #[test]
    fn test_parse_requires_identity() {
        assert!(row("2024-03-04", "09:00", "Amel", "Boudiaf", "").parse().is_ok());
        assert!(row("2024-03-04", "09:00", "", "", "0555111111").parse().is_ok());

        let err = row("2024-03-04", "09:00", "Amel", "", "").parse().unwrap_err();
        assert!(err.contains("neither"));
        // Too short to be a phone
        assert!(row("2024-03-04", "09:00", "", "", "12").parse().is_err());
    }

    #[test]
    fn test_parse_reports_reason() {
        assert_eq!(row("", "", "", "", "").parse().unwrap_err(), "empty row");
        assert_eq!(
            row("", "09:00", "Amel", "Boudiaf", "").parse().unwrap_err(),
            "missing date"
        );
        assert_eq!(
            row("2024-13-40", "09:00", "Amel", "Boudiaf", "").parse().unwrap_err(),
            "invalid date '2024-13-40'"
        );
        assert_eq!(
            row("2024-03-04", "", "Amel", "Boudiaf", "").parse().unwrap_err(),
            "missing time"
        );
    }

    #[test]
    fn test_zones_split() {
        let mut r = row("2024-03-04", "09:00", "Amel", "Boudiaf", "");
        r.zones = Some("z-legs + z-arms, ,z-face".into());
        let parsed = r.parse().unwrap();
        assert_eq!(parsed.zone_ids, vec!["z-legs", "z-arms", "z-face"]);
    }

    #[test]
    fn test_fingerprint_ignores_cosmetic_differences() {
        let a = row("2024-03-04", "09:00", "Amel", "Boudiaf", "0555 111 111").parse().unwrap();
        let b = row("04/03/2024", "9h00", "BOUDIAF", "amel", "+213555111111").parse().unwrap();
        assert_eq!(a.fingerprint("dr-1"), b.fingerprint("dr-1"));
        assert_ne!(a.fingerprint("dr-1"), a.fingerprint("dr-2"));
        assert_eq!(a.fingerprint("dr-1").len(), 64);
    }
}
