use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A specialist as published in the directory. Profile management lives
/// elsewhere; this cell only reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Specialist {
    pub id: Uuid,
    pub full_name: String,
    pub specialty: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialtySummary {
    pub specialty: String,
    pub specialist_count: usize,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SpecialistError {
    #[error("Specialist not found")]
    NotFound,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
