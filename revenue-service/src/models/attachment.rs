//! Attachment metadata; file bytes live in the attachment store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attachment {
    pub attachment_id: Uuid,
    pub revenue_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub storage_key: String,
    pub size_bytes: i64,
    pub is_deleted: bool,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub attachment_id: Uuid,
    pub revenue_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub storage_key: String,
    pub size_bytes: i64,
}
