/// Offer records and pro contact cards
use crate::db;
use crate::error::{MarketError, MarketResult};
use crate::reference::ReferenceStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

/// Offer status
///
/// `offer -> accepted` and `offer -> declined`; both are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Offer,
    Accepted,
    Declined,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Offer => "offer",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Declined => "declined",
        }
    }

    pub fn from_str(s: &str) -> MarketResult<Self> {
        match s.to_lowercase().as_str() {
            "offer" => Ok(OfferStatus::Offer),
            "accepted" => Ok(OfferStatus::Accepted),
            "declined" => Ok(OfferStatus::Declined),
            _ => Err(MarketError::InvalidInput(format!("Invalid offer status: {}", s))),
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, OfferStatus::Offer)
    }
}

/// Contact fields revealed once an offer is accepted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProContact {
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub phone: Option<String>,
}

/// A pro's response to a reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub id: String,
    pub ref_id: String,
    pub pro_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_pln: Option<i64>,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
    /// Only populated for an accepted offer shown to an authorized reader
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pro_contact: Option<ProContact>,
}

impl Offer {
    /// Parse an offer row; contact columns are read if the query joined them
    pub(crate) fn from_row(row: &sqlx::sqlite::SqliteRow) -> MarketResult<Self> {
        let status_str: String = row.get("status");
        let created_at_str: String = row.get("created_at");
        let accepted_at = match row.try_get::<Option<String>, _>("accepted_at")? {
            Some(s) => Some(db::parse_timestamp(&s)?),
            None => None,
        };

        let pro_contact = row
            .try_get::<Option<String>, _>("display_name")
            .ok()
            .flatten()
            .map(|display_name| ProContact {
                display_name,
                avatar_url: row.try_get("avatar_url").ok().flatten(),
                phone: row.try_get("phone").ok().flatten(),
            });

        Ok(Offer {
            id: row.get("id"),
            ref_id: row.get("ref_id"),
            pro_id: row.get("pro_id"),
            message: row.get("message"),
            price_pln: row.get("price_pln"),
            status: OfferStatus::from_str(&status_str)?,
            created_at: db::parse_timestamp(&created_at_str)?,
            accepted_at,
            pro_contact,
        })
    }
}

/// Input for creating an offer
#[derive(Debug, Clone, Default)]
pub struct NewOffer {
    pub message: Option<String>,
    pub price_pln: Option<i64>,
}

impl NewOffer {
    pub(crate) fn normalize(self) -> MarketResult<Self> {
        if let Some(price) = self.price_pln {
            if price < 0 {
                return Err(MarketError::InvalidInput(
                    "pricePln must be non-negative".to_string(),
                ));
            }
        }

        Ok(NewOffer {
            message: self
                .message
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty()),
            price_pln: self.price_pln,
        })
    }
}

/// An offer as seen from the pro's dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProOffer {
    #[serde(flatten)]
    pub offer: Offer,
    pub reference_status: ReferenceStatus,
}

/// Contact card a pro publishes for accepted engagements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProProfile {
    pub pro_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub phone: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_resolution() {
        assert!(!OfferStatus::Offer.is_resolved());
        assert!(OfferStatus::Accepted.is_resolved());
        assert!(OfferStatus::Declined.is_resolved());
        assert_eq!(OfferStatus::from_str("accepted").unwrap(), OfferStatus::Accepted);
        assert!(OfferStatus::from_str("withdrawn").is_err());
    }

    #[test]
    fn test_negative_price_rejected() {
        let input = NewOffer {
            message: None,
            price_pln: Some(-1),
        };
        assert!(matches!(input.normalize(), Err(MarketError::InvalidInput(_))));

        let free = NewOffer {
            message: Some("  ".to_string()),
            price_pln: Some(0),
        };
        let normalized = free.normalize().unwrap();
        assert_eq!(normalized.price_pln, Some(0));
        assert_eq!(normalized.message, None);
    }
}
