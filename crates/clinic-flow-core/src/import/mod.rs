//! Appointment sheet import.
//!
//! Pipeline: decode → header check → per row: validate → doctor → dedupe → match → create
//!
//! Rows are independent. A bad row is skipped and reported; entries created
//! before a later failure stay in place.

mod row;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::FlowConfig;
use crate::directory::DoctorDirectory;
use crate::error::{FlowError, FlowResult};
use crate::matcher::PatientMatcher;
use crate::models::{ImportReport, MatchMethod, MatchQuery, NewEntry, NewPatient};
use crate::queue::QueueEngine;
use crate::registry::PatientRegistry;

use row::{normalize_header, sniff_delimiter, ParsedRow, ScheduleRow, DATE_COLUMNS, TIME_COLUMNS};

/// Per-import choices made by the operator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImportOptions {
    /// Doctor for rows whose sheet has no doctor column or leaves it blank
    pub default_doctor_id: Option<String>,
}

/// Turns an appointment sheet into schedule entries.
pub struct ScheduleImporter<'a> {
    registry: &'a dyn PatientRegistry,
    queue: &'a QueueEngine,
    directory: &'a dyn DoctorDirectory,
    config: &'a FlowConfig,
}

impl<'a> ScheduleImporter<'a> {
    pub fn new(
        registry: &'a dyn PatientRegistry,
        queue: &'a QueueEngine,
        directory: &'a dyn DoctorDirectory,
        config: &'a FlowConfig,
    ) -> Self {
        Self {
            registry,
            queue,
            directory,
            config,
        }
    }

    pub fn import_path<P: AsRef<Path>>(
        &self,
        path: P,
        options: &ImportOptions,
    ) -> FlowResult<ImportReport> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| FlowError::UnreadableFile(format!("{}: {}", path.display(), e)))?;
        self.import_bytes(&data, options)
    }

    /// Import a CSV sheet.
    ///
    /// Fails only when the file itself cannot be read as a schedule; nothing is
    /// created in that case.
    pub fn import_bytes(&self, data: &[u8], options: &ImportOptions) -> FlowResult<ImportReport> {
        let text = std::str::from_utf8(data)
            .map_err(|e| FlowError::UnreadableFile(format!("not UTF-8 text: {}", e)))?;
        let text = text.trim_start_matches('\u{feff}');

        let delimiter = match self.config.csv_delimiter {
            Some(d) => u8::try_from(d).map_err(|_| {
                FlowError::Validation(format!("csv_delimiter must be ASCII, got {:?}", d))
            })?,
            None => sniff_delimiter(text),
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers: csv::StringRecord = reader
            .headers()
            .map_err(|e| FlowError::UnreadableFile(format!("bad header row: {}", e)))?
            .iter()
            .map(normalize_header)
            .collect();
        if headers.iter().all(str::is_empty) {
            return Err(FlowError::UnreadableFile("no header row".into()));
        }
        for (label, accepted) in [("date", DATE_COLUMNS), ("time", TIME_COLUMNS)] {
            if !headers.iter().any(|h| accepted.contains(&h)) {
                return Err(FlowError::UnreadableFile(format!(
                    "no {} column (expected one of {})",
                    label,
                    accepted.join(", ")
                )));
            }
        }
        reader.set_headers(headers);

        let matcher = PatientMatcher::with_threshold(self.registry, self.config.name_match_threshold);
        let mut report = ImportReport::default();

        for (index, result) in reader.deserialize::<ScheduleRow>().enumerate() {
            let row_number = index + 1;
            let parsed = match result {
                Ok(raw) => raw.parse(),
                Err(e) => Err(format!("unreadable row: {}", e)),
            };
            match parsed {
                Ok(parsed) => {
                    match self.import_row(row_number, parsed, options, &matcher, &mut report) {
                        Ok(()) => {}
                        Err(e @ FlowError::LockPoisoned(_)) => return Err(e),
                        Err(e) => {
                            warn!("Skipping row {}: {}", row_number, e);
                            report.skip(row_number, e.to_string());
                        }
                    }
                }
                Err(reason) => {
                    warn!("Skipping row {}: {}", row_number, reason);
                    report.skip(row_number, reason);
                }
            }
        }

        info!(
            "Imported schedule: {} created, {} phone-matched, {} name-matched, {} unmatched, {} skipped, {} duplicates, {} phone conflicts",
            report.entries_created,
            report.phone_matched,
            report.name_matched,
            report.unmatched,
            report.skipped_rows,
            report.duplicate_rows,
            report.phone_conflicts.len()
        );
        Ok(report)
    }

    fn import_row(
        &self,
        row_number: usize,
        row: ParsedRow,
        options: &ImportOptions,
        matcher: &PatientMatcher<'_>,
        report: &mut ImportReport,
    ) -> FlowResult<()> {
        let doctor_id = match (&row.doctor, &options.default_doctor_id) {
            (Some(name), _) => match self.directory.find_doctor(name) {
                Some(id) => id,
                None => {
                    warn!("Skipping row {}: unknown doctor '{}'", row_number, name);
                    report.skip(row_number, format!("unknown doctor '{}'", name));
                    return Ok(());
                }
            },
            (None, Some(default)) => default.clone(),
            (None, None) => {
                warn!("Skipping row {}: no doctor", row_number);
                report.skip(row_number, "no doctor column and no default doctor");
                return Ok(());
            }
        };

        let fingerprint = row.fingerprint(&doctor_id);
        if self.queue.is_imported(&fingerprint)? {
            report.duplicate_rows += 1;
            return Ok(());
        }

        let query = MatchQuery::new(&row.given_name, &row.family_name, row.phone.as_deref());
        let matched = matcher.match_row(&query)?;

        let mut patient_id = matched.patient_id.clone();
        let mut created_patient = false;
        if patient_id.is_none()
            && matched.method == MatchMethod::Unmatched
            && self.config.create_missing_patients
            && !row.given_name.is_empty()
            && !row.family_name.is_empty()
        {
            let patient = self.registry.create_patient(NewPatient {
                given_name: row.given_name.clone(),
                family_name: row.family_name.clone(),
                phone: row.phone.clone(),
                ..NewPatient::default()
            })?;
            info!("Created patient {} from import row {}", patient.id, row_number);
            patient_id = Some(patient.id);
            created_patient = true;
        }

        let created = self.queue.try_create_entry(NewEntry {
            date: row.date,
            start_time: row.time,
            doctor_id,
            box_id: None,
            patient_id: patient_id.clone(),
            given_name: row.given_name,
            family_name: row.family_name,
            phone: row.phone,
            zone_ids: row.zone_ids,
            notes: row.notes,
            from_import: true,
            import_fingerprint: Some(fingerprint),
        })?;
        let Some(entry) = created else {
            report.duplicate_rows += 1;
            return Ok(());
        };

        report.entries_created += 1;
        report.entry_ids.push(entry.id);
        if created_patient {
            report.patients_created += 1;
        }
        match matched.method {
            MatchMethod::Phone => report.phone_matched += 1,
            MatchMethod::Name => report.name_matched += 1,
            MatchMethod::Ambiguous | MatchMethod::Unmatched if patient_id.is_none() => {
                report.unmatched += 1
            }
            _ => {}
        }
        if let Some(conflict) = matched.phone_conflict {
            warn!(
                "Row {}: phone {} belongs to {} {}, sheet says {} {}",
                row_number,
                conflict.entry_telephone,
                conflict.matched_patient_prenom,
                conflict.matched_patient_nom,
                conflict.entry_prenom,
                conflict.entry_nom
            );
            report.phone_conflicts.push(conflict);
        }
        Ok(())
    }
}
