use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use uuid::Uuid;

pub const ACTIVE_STATE_TEXTS: [&str; 2] = ["Publicada", "Publicada - Segundo llamado"];
pub const CLOSED_STATE_TEXT: &str = "Cerrada";

/// A single procurement opportunity. `code` is globally unique; static
/// fields (name, publication date, organism) are set once at first insert
/// and never overwritten by a later bulk upsert.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tender {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub amount: Option<i64>,
    pub publication_date: NaiveDate,
    pub close_at: DateTime<Utc>,
    pub second_call_close_at: Option<DateTime<Utc>>,
    pub state_text: String,
    pub state_tag: i32,
    pub bidder_count: i32,
    pub description: Option<String>,
    pub address: Option<String>,
    pub lead_time_days: Option<i32>,
    pub products: Option<Value>,
    pub score: i64,
    pub trace: Json<Vec<String>>,
    pub organism_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One listing row as harvested from the upstream API, before organism
/// names have been resolved to ids.
#[derive(Debug, Clone)]
pub struct TenderUpsert {
    pub code: String,
    pub name: String,
    pub amount: Option<i64>,
    pub publication_date: NaiveDate,
    pub close_at: DateTime<Utc>,
    pub second_call_close_at: Option<DateTime<Utc>>,
    pub state_text: String,
    pub state_tag: i32,
    pub bidder_count: i32,
    pub organism_name: String,
}

/// Lightweight projection used to recompute scores against a fresh rules
/// snapshot without paying for the full row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScoreCandidate {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub state_text: String,
    pub description: Option<String>,
    pub products: Option<Value>,
    pub score: i64,
    pub organism_name: String,
}

/// Identifies a tender still missing its detail fetch.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DetailCandidate {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub organism_name: String,
}

/// Normalized detail payload. `state_text`/`state_tag` are only written when
/// present: the detail fetch doesn't always carry a fresher state than the
/// listing did.
#[derive(Debug, Clone, Default)]
pub struct DetailRecord {
    pub description: Option<String>,
    pub address: Option<String>,
    pub lead_time_days: Option<i32>,
    pub second_call_close_at: Option<DateTime<Utc>>,
    pub products: Option<Value>,
    pub state_text: Option<String>,
    pub state_tag: Option<i32>,
}

/// One pending score write, produced by a recompute pass.
#[derive(Debug, Clone)]
pub struct ScoreUpdate {
    pub id: Uuid,
    pub score: i64,
    pub trace: Vec<String>,
}
