/// Offer lifecycle manager
use crate::{
    auth::{Principal, Role},
    db::{self, ConstraintViolation},
    error::{ConflictKind, MarketError, MarketResult},
    metrics,
    offer::models::{NewOffer, Offer, OfferStatus, ProContact, ProOffer, ProProfile},
    policy,
    reference::{ReferenceManager, ReferenceStatus},
};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

const OFFER_COLUMNS: &str =
    "o.id, o.ref_id, o.pro_id, o.message, o.price_pln, o.status, o.created_at, o.accepted_at";

/// Offer manager
#[derive(Clone)]
pub struct OfferManager {
    db: SqlitePool,
    references: ReferenceManager,
}

impl OfferManager {
    pub fn new(db: SqlitePool, references: ReferenceManager) -> Self {
        Self { db, references }
    }

    /// Submit an offer on an open reference
    pub async fn create_offer(
        &self,
        principal: Option<&Principal>,
        ref_id: &str,
        input: NewOffer,
    ) -> MarketResult<Offer> {
        policy::can_create_offer(principal).ensure("submit an offer")?;
        let pro_id = principal
            .map(|p| p.id.clone())
            .ok_or_else(|| MarketError::Unauthorized("No principal".to_string()))?;

        let input = input.normalize()?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        // The open check and the insert are one statement; it is not
        // serialized against a concurrent accept on the same reference.
        let result = sqlx::query(
            r#"
            INSERT INTO offer (id, ref_id, pro_id, message, price_pln, status, created_at)
            SELECT ?, r.id, ?, ?, ?, 'offer', ?
            FROM reference r
            WHERE r.id = ? AND r.status = 'open'
            "#,
        )
        .bind(&id)
        .bind(&pro_id)
        .bind(&input.message)
        .bind(input.price_pln)
        .bind(db::timestamp(now))
        .bind(ref_id)
        .execute(&self.db)
        .await;

        let result = match result {
            Ok(result) => result,
            Err(e) if db::constraint_violation(&e) == Some(ConstraintViolation::Unique) => {
                info!(reference_id = %ref_id, pro_id = %pro_id, "duplicate offer rejected");
                return Err(MarketError::conflict(
                    ConflictKind::DuplicateOffer,
                    "You already have an offer on this reference",
                ));
            }
            Err(e) => return Err(e.into()),
        };

        if result.rows_affected() == 0 {
            return match self.references.load(ref_id).await? {
                None => Err(MarketError::NotFound(format!("Reference {} not found", ref_id))),
                Some(_) => Err(MarketError::conflict(
                    ConflictKind::ReferenceNotOpen,
                    "Reference is no longer accepting offers",
                )),
            };
        }

        metrics::OFFERS_CREATED_TOTAL.inc();
        info!(offer_id = %id, reference_id = %ref_id, pro_id = %pro_id, "offer created");

        Ok(Offer {
            id,
            ref_id: ref_id.to_string(),
            pro_id,
            message: input.message,
            price_pln: input.price_pln,
            status: OfferStatus::Offer,
            created_at: now,
            accepted_at: None,
            pro_contact: None,
        })
    }

    /// Get a single offer; visible to its pro and to the reference owner
    pub async fn get_offer(&self, id: &str, requester: Option<&Principal>) -> MarketResult<Offer> {
        let not_found = || MarketError::NotFound(format!("Offer {} not found", id));

        let mut offer = self.load(id).await?.ok_or_else(not_found)?;
        let reference = self.references.load(&offer.ref_id).await?.ok_or_else(not_found)?;

        let is_pro = requester.map_or(false, |p| p.role == Role::Pro && p.id == offer.pro_id);
        let is_owner = policy::can_resolve_offer(requester, &reference).is_allowed();
        if !is_pro && !is_owner {
            return Err(not_found());
        }

        if offer.status == OfferStatus::Accepted {
            offer.pro_contact = self.contact_for(&offer.pro_id).await?;
        }

        Ok(offer)
    }

    /// Withdraw an offer; only its pro, only while unresolved
    pub async fn delete_offer(&self, id: &str, principal: Option<&Principal>) -> MarketResult<()> {
        let offer = self
            .load(id)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("Offer {} not found", id)))?;

        policy::can_delete_offer(principal, &offer).ensure("withdraw this offer")?;

        if offer.status.is_resolved() {
            return Err(MarketError::InvalidState(format!(
                "Offer is already {}",
                offer.status.as_str()
            )));
        }

        let result = sqlx::query("DELETE FROM offer WHERE id = ? AND pro_id = ? AND status = 'offer'")
            .bind(id)
            .bind(&offer.pro_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            // Resolved between the read and the delete
            return Err(MarketError::InvalidState(
                "Offer was resolved before it could be withdrawn".to_string(),
            ));
        }

        info!(offer_id = %id, "offer withdrawn");
        Ok(())
    }

    /// Offers on a reference, newest first.
    ///
    /// The accepted offer carries the pro's contact card, but only for the
    /// owning client and the accepted pro.
    pub async fn list_offers_by_reference(
        &self,
        ref_id: &str,
        requester: Option<&Principal>,
    ) -> MarketResult<Vec<Offer>> {
        let reference = self.references.get_reference(ref_id, requester).await?;
        let accepted_pro = self.references.accepted_pro_id(ref_id).await?;
        let reveal = policy::can_view_contact(requester, &reference, accepted_pro.as_deref());

        let sql = format!(
            r#"
            SELECT {}, p.display_name, p.avatar_url, p.phone
            FROM offer o
            LEFT JOIN pro_profile p ON p.pro_id = o.pro_id AND o.status = 'accepted'
            WHERE o.ref_id = ?
            ORDER BY o.created_at DESC, o.id DESC
            "#,
            OFFER_COLUMNS
        );

        let rows = sqlx::query(&sql).bind(ref_id).fetch_all(&self.db).await?;

        let mut offers = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut offer = Offer::from_row(row)?;
            if !reveal {
                offer.pro_contact = None;
            }
            offers.push(offer);
        }

        debug!(reference_id = %ref_id, count = offers.len(), reveal, "listed offers");
        Ok(offers)
    }

    /// A pro's own offers, newest first, with each reference's status
    pub async fn list_offers_by_pro(
        &self,
        pro_id: &str,
        principal: Option<&Principal>,
    ) -> MarketResult<Vec<ProOffer>> {
        policy::can_act_for_pro(principal, pro_id).ensure("view these offers")?;

        let sql = format!(
            r#"
            SELECT {}, r.status AS reference_status, p.display_name, p.avatar_url, p.phone
            FROM offer o
            JOIN reference r ON r.id = o.ref_id
            LEFT JOIN pro_profile p ON p.pro_id = o.pro_id AND o.status = 'accepted'
            WHERE o.pro_id = ?
            ORDER BY o.created_at DESC, o.id DESC
            "#,
            OFFER_COLUMNS
        );

        let rows = sqlx::query(&sql).bind(pro_id).fetch_all(&self.db).await?;

        let mut offers = Vec::with_capacity(rows.len());
        for row in &rows {
            let reference_status: String = row.get("reference_status");
            offers.push(ProOffer {
                offer: Offer::from_row(row)?,
                reference_status: ReferenceStatus::from_str(&reference_status)?,
            });
        }

        Ok(offers)
    }

    /// Publish or replace the caller's contact card
    pub async fn upsert_pro_profile(
        &self,
        principal: Option<&Principal>,
        display_name: &str,
        avatar_url: Option<String>,
        phone: Option<String>,
    ) -> MarketResult<ProProfile> {
        let pro_id = principal
            .map(|p| p.id.clone())
            .ok_or_else(|| MarketError::Unauthorized("Sign in to publish a profile".to_string()))?;
        policy::can_act_for_pro(principal, &pro_id).ensure("publish a profile")?;

        let display_name = display_name.trim().to_string();
        if display_name.is_empty() {
            return Err(MarketError::InvalidInput("displayName is required".to_string()));
        }

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO pro_profile (pro_id, display_name, avatar_url, phone, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (pro_id) DO UPDATE SET
                display_name = excluded.display_name,
                avatar_url = excluded.avatar_url,
                phone = excluded.phone,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&pro_id)
        .bind(&display_name)
        .bind(&avatar_url)
        .bind(&phone)
        .bind(db::timestamp(now))
        .execute(&self.db)
        .await?;

        Ok(ProProfile {
            pro_id,
            display_name,
            avatar_url,
            phone,
            updated_at: now,
        })
    }

    /// Load an offer without contact fields or visibility filtering
    pub(crate) async fn load(&self, id: &str) -> MarketResult<Option<Offer>> {
        let sql = format!("SELECT {} FROM offer o WHERE o.id = ?", OFFER_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.db).await?;

        row.as_ref().map(Offer::from_row).transpose()
    }

    pub(crate) async fn contact_for(&self, pro_id: &str) -> MarketResult<Option<ProContact>> {
        let row = sqlx::query("SELECT display_name, avatar_url, phone FROM pro_profile WHERE pro_id = ?")
            .bind(pro_id)
            .fetch_optional(&self.db)
            .await?;

        Ok(row.map(|row| ProContact {
            display_name: row.get("display_name"),
            avatar_url: row.get("avatar_url"),
            phone: row.get("phone"),
        }))
    }
}
