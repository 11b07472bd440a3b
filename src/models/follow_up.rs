use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::counselor::CounselorRef;
use super::enums::SessionStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpSession {
    pub id: Uuid,
    pub counselor_id: CounselorRef,
    pub student_id: String,
    pub parent_appointment_id: Uuid,
    /// 1-based position in the parent's chain.
    pub follow_up_sequence: u32,
    pub preferred_date: NaiveDate,
    pub preferred_time: String,
    pub consultation_type: String,
    pub status: SessionStatus,
    pub reason: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Request payload for scheduling the next session in a chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFollowUp {
    pub counselor_id: CounselorRef,
    pub student_id: String,
    pub parent_appointment_id: Uuid,
    pub preferred_date: NaiveDate,
    pub preferred_time: String,
    pub consultation_type: String,
}
