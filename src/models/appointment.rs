use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::counselor::CounselorRef;
use super::enums::SessionStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub student_id: String,
    pub counselor_preference: CounselorRef,
    pub preferred_date: NaiveDate,
    pub preferred_time: String,
    pub method_type: String,
    pub consultation_type: String,
    pub purpose: String,
    pub status: SessionStatus,
    pub reason: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Request payload for booking an appointment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppointment {
    pub student_id: String,
    pub counselor_preference: CounselorRef,
    pub preferred_date: NaiveDate,
    pub preferred_time: String,
    pub method_type: String,
    pub consultation_type: String,
    pub purpose: String,
}
