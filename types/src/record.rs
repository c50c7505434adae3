//! Logbook records as handed over by the history collaborator.
//!
//! Only `procedure_name` feeds suggestion ranking; the remaining fields are
//! carried so callers can pass whole records through without mapping.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Role {
    #[default]
    #[serde(rename = "Main Surgeon")]
    MainSurgeon,
    #[serde(rename = "First Assistant")]
    FirstAssistant,
    #[serde(rename = "Second Assistant")]
    SecondAssistant,
    #[serde(rename = "Third Assistant")]
    ThirdAssistant,
    Observer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Gender {
    #[default]
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Local,
    Syncing,
    Synced,
    Error,
}

/// One logged procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureRecord {
    pub id: String,
    #[serde(default)]
    pub patient_id: String,
    pub procedure_name: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub patient_age: String,
    #[serde(default, rename = "patientGender")]
    pub gender: Gender,
    #[serde(default)]
    pub role: Role,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub sync_status: SyncStatus,
}

impl ProcedureRecord {
    /// Minimal record for a procedure name; used by importers and tests.
    #[must_use]
    pub fn named(id: impl Into<String>, procedure_name: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            id: id.into(),
            patient_id: String::new(),
            procedure_name: procedure_name.into(),
            date,
            patient_age: String::new(),
            gender: Gender::default(),
            role: Role::default(),
            created_at: 0,
            sync_status: SyncStatus::default(),
        }
    }
}
