use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{EntityKind, NotificationKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub entity_kind: EntityKind,
    pub entity_id: Uuid,
    pub message: String,
    pub created_at: NaiveDateTime,
}
