use serde::Serialize;
use tracing::debug;

use super::require_role;
use crate::api::{ApiClient, ApiError};
use crate::auth::Role;
use crate::models::{PregnancyRecord, PregnancyRecordInput, RiskAssessment, RiskAssessmentRequest};

const RECORDS_PATH: &str = "/pregnancy/records";
const PATIENTS_PATH: &str = "/pregnancy/patients";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PatientQuery {
    patient_id: i64,
}

/// Pregnancy health records and risk assessments.
#[derive(Clone)]
pub struct PregnancyService {
    api: ApiClient,
}

impl PregnancyService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn list_records(&self, patient_id: i64) -> Result<Vec<PregnancyRecord>, ApiError> {
        self.api
            .get_query(RECORDS_PATH, &PatientQuery { patient_id })
            .await
    }

    pub async fn get_record(&self, record_id: i64) -> Result<PregnancyRecord, ApiError> {
        self.api.get(&format!("{}/{}", RECORDS_PATH, record_id)).await
    }

    pub async fn create_record(&self, input: &PregnancyRecordInput) -> Result<PregnancyRecord, ApiError> {
        let record: PregnancyRecord = self.api.post(RECORDS_PATH, input).await?;
        debug!(record_id = record.id, "Pregnancy record created");
        Ok(record)
    }

    pub async fn update_record(
        &self,
        record_id: i64,
        input: &PregnancyRecordInput,
    ) -> Result<PregnancyRecord, ApiError> {
        self.api
            .put(&format!("{}/{}", RECORDS_PATH, record_id), input)
            .await
    }

    /// Records are clinical history; only doctors and above remove them.
    pub async fn delete_record(&self, record_id: i64) -> Result<(), ApiError> {
        require_role(self.api.session(), Role::Doctor)?;
        self.api.delete(&format!("{}/{}", RECORDS_PATH, record_id)).await
    }

    /// Submit questionnaire answers; scoring happens server-side.
    pub async fn submit_risk_assessment(
        &self,
        record_id: i64,
        request: &RiskAssessmentRequest,
    ) -> Result<RiskAssessment, ApiError> {
        let assessment: RiskAssessment = self
            .api
            .post(&format!("{}/{}/risk-assessment", RECORDS_PATH, record_id), request)
            .await?;
        debug!(record_id, score = assessment.score, level = ?assessment.level, "Risk assessment scored");
        Ok(assessment)
    }

    pub async fn risk_history(&self, patient_id: i64) -> Result<Vec<RiskAssessment>, ApiError> {
        self.api
            .get(&format!("{}/{}/risk-assessments", PATIENTS_PATH, patient_id))
            .await
    }
}
