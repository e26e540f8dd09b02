/// Reference records
use crate::db;
use crate::error::{MarketError, MarketResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use std::collections::BTreeSet;

/// Reference status
///
/// Only moves forward: `open -> matched`. `closed` is terminal and has no
/// driving operation yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceStatus {
    Open,
    Matched,
    Closed,
}

impl ReferenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceStatus::Open => "open",
            ReferenceStatus::Matched => "matched",
            ReferenceStatus::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> MarketResult<Self> {
        match s.to_lowercase().as_str() {
            "open" => Ok(ReferenceStatus::Open),
            "matched" => Ok(ReferenceStatus::Matched),
            "closed" => Ok(ReferenceStatus::Closed),
            _ => Err(MarketError::InvalidInput(format!(
                "Invalid reference status: {}",
                s
            ))),
        }
    }
}

/// A client's visual request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub id: String,
    pub client_id: String,
    pub image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub tags: Vec<String>,
    pub city: String,
    pub status: ReferenceStatus,
    pub created_at: DateTime<Utc>,
}

impl Reference {
    pub(crate) fn from_row(row: &sqlx::sqlite::SqliteRow) -> MarketResult<Self> {
        let status_str: String = row.get("status");
        let created_at_str: String = row.get("created_at");
        let tags_json: String = row.get("tags");
        let tags = serde_json::from_str(&tags_json)
            .map_err(|e| MarketError::Internal(format!("Invalid tags column: {}", e)))?;

        Ok(Reference {
            id: row.get("id"),
            client_id: row.get("client_id"),
            image_url: row.get("image_url"),
            note: row.get("note"),
            tags,
            city: row.get("city"),
            status: ReferenceStatus::from_str(&status_str)?,
            created_at: db::parse_timestamp(&created_at_str)?,
        })
    }

    pub fn is_open(&self) -> bool {
        self.status == ReferenceStatus::Open
    }
}

/// Input for creating a reference
#[derive(Debug, Clone, Default)]
pub struct NewReference {
    pub image_url: String,
    pub city: String,
    pub tags: Vec<String>,
    pub note: Option<String>,
}

impl NewReference {
    /// Check required fields and normalise the tag set
    pub(crate) fn normalize(self) -> MarketResult<Self> {
        let image_url = self.image_url.trim().to_string();
        if image_url.is_empty() {
            return Err(MarketError::InvalidInput("imageUrl is required".to_string()));
        }

        let city = self.city.trim().to_string();
        if city.is_empty() {
            return Err(MarketError::InvalidInput("city is required".to_string()));
        }

        // Tags are a set: trimmed, lowercased, empty entries dropped
        let tags: BTreeSet<String> = self
            .tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        let note = self
            .note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        Ok(NewReference {
            image_url,
            city,
            tags: tags.into_iter().collect(),
            note,
        })
    }
}

/// Filters for listing references
#[derive(Debug, Clone, Default)]
pub struct ReferenceFilter {
    pub city: Option<String>,
    pub status: Option<ReferenceStatus>,
    pub owner_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
