//! Pregnancy tracking records and risk assessments.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Naegele's rule: due date is 280 days after the last menstrual period.
const GESTATION_DAYS: i64 = 280;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PregnancyRecord {
    pub id: i64,
    pub patient_id: i64,
    #[serde(default)]
    pub last_menstrual_period: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub blood_pressure_systolic: Option<u32>,
    #[serde(default)]
    pub blood_pressure_diastolic: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl PregnancyRecord {
    /// Due date from the record, else estimated from the last period.
    pub fn expected_due_date(&self) -> Option<NaiveDate> {
        self.due_date.or_else(|| {
            self.last_menstrual_period
                .map(|lmp| lmp + Duration::days(GESTATION_DAYS))
        })
    }

    /// Gestational age as (weeks, days) on `today`, counted from the last period.
    pub fn gestational_age(&self, today: NaiveDate) -> Option<(i64, i64)> {
        let lmp = self.last_menstrual_period.or_else(|| {
            self.due_date.map(|due| due - Duration::days(GESTATION_DAYS))
        })?;
        let days = (today - lmp).num_days();
        if days < 0 {
            return None;
        }
        Some((days / 7, days % 7))
    }

    pub fn blood_pressure_display(&self) -> Option<String> {
        match (self.blood_pressure_systolic, self.blood_pressure_diastolic) {
            (Some(sys), Some(dia)) => Some(format!("{}/{} mmHg", sys, dia)),
            _ => None,
        }
    }
}

/// Create/update payload. Unset fields are left out of the request.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PregnancyRecordInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_menstrual_period: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blood_pressure_systolic: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blood_pressure_diastolic: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    #[serde(other)]
    Unknown,
}

/// Answers to the risk questionnaire, keyed by question id.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RiskAssessmentRequest {
    pub answers: BTreeMap<String, Value>,
}

impl RiskAssessmentRequest {
    pub fn answer(mut self, question: impl Into<String>, value: impl Into<Value>) -> Self {
        self.answers.insert(question.into(), value.into());
        self
    }
}

/// Server-scored assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub record_id: Option<i64>,
    pub score: f64,
    #[serde(rename = "riskLevel", alias = "level")]
    pub level: RiskLevel,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub assessed_at: Option<DateTime<Utc>>,
}
