/// Accept/decline of offers
use crate::{
    auth::Principal,
    db::{self, ConstraintViolation},
    error::{ConflictKind, MarketError, MarketResult},
    metrics,
    offer::{Offer, OfferManager, OfferStatus},
    policy,
    reference::{Reference, ReferenceManager, ReferenceStatus},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::time::Instant;
use tracing::{debug, info, warn};

/// The client's decision on an offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Decline,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Accept => "accept",
            Decision::Decline => "decline",
        }
    }
}

/// State of both records after a successful resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub offer: Offer,
    pub reference: Reference,
}

/// Matching coordinator
#[derive(Clone)]
pub struct MatchingCoordinator {
    db: SqlitePool,
    offers: OfferManager,
    references: ReferenceManager,
}

impl MatchingCoordinator {
    pub fn new(db: SqlitePool, offers: OfferManager, references: ReferenceManager) -> Self {
        Self {
            db,
            offers,
            references,
        }
    }

    /// Accept or decline an offer on behalf of the reference owner.
    ///
    /// Errors:
    /// - `Forbidden` unless the principal is the client owning the reference
    /// - `AlreadyResolved` when the offer already left `offer` status
    /// - `Conflict(AlreadyMatched)` when a competing accept won
    pub async fn resolve_offer(
        &self,
        offer_id: &str,
        decision: Decision,
        principal: Option<&Principal>,
    ) -> MarketResult<Resolution> {
        let outcome = self.try_resolve(offer_id, decision, principal).await;

        let label = match &outcome {
            Ok(_) => "applied",
            Err(MarketError::Conflict { .. }) => "conflict",
            Err(MarketError::AlreadyResolved(_)) => "already_resolved",
            Err(MarketError::Forbidden(_)) | Err(MarketError::Unauthorized(_)) => "forbidden",
            Err(_) => "error",
        };
        metrics::record_resolution(decision.as_str(), label);

        outcome
    }

    async fn try_resolve(
        &self,
        offer_id: &str,
        decision: Decision,
        principal: Option<&Principal>,
    ) -> MarketResult<Resolution> {
        if principal.is_none() {
            return Err(MarketError::Unauthorized(
                "Sign in to resolve offers".to_string(),
            ));
        }

        let not_found = || MarketError::NotFound(format!("Offer {} not found", offer_id));
        let offer = self.offers.load(offer_id).await?.ok_or_else(not_found)?;
        let reference = self
            .references
            .load(&offer.ref_id)
            .await?
            .ok_or_else(not_found)?;

        policy::can_resolve_offer(principal, &reference).ensure("resolve this offer")?;

        // Early exit only; the conditional updates below re-check under the
        // write lock.
        if offer.status.is_resolved() {
            return Err(MarketError::AlreadyResolved(format!(
                "Offer is already {}",
                offer.status.as_str()
            )));
        }

        match decision {
            Decision::Decline => self.decline(offer, reference).await,
            Decision::Accept => self.accept(offer, reference).await,
        }
    }

    /// Single conditional update; touches nothing but the offer
    async fn decline(&self, mut offer: Offer, reference: Reference) -> MarketResult<Resolution> {
        let result = sqlx::query("UPDATE offer SET status = 'declined' WHERE id = ? AND status = 'offer'")
            .bind(&offer.id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return match self.offers.load(&offer.id).await? {
                None => Err(MarketError::NotFound(format!("Offer {} not found", offer.id))),
                Some(current) => Err(MarketError::AlreadyResolved(format!(
                    "Offer is already {}",
                    current.status.as_str()
                ))),
            };
        }

        info!(offer_id = %offer.id, reference_id = %reference.id, "offer declined");
        offer.status = OfferStatus::Declined;
        Ok(Resolution { offer, reference })
    }

    /// One transaction: CAS the offer to `accepted`, then the reference to
    /// `matched`. Either both commit or neither does.
    async fn accept(&self, mut offer: Offer, mut reference: Reference) -> MarketResult<Resolution> {
        let timer = Instant::now();
        let accepted_at = Utc::now();

        let mut tx = self.db.begin().await?;
        let applied = Self::apply_accept(&mut tx, &offer, &reference, accepted_at).await;

        match applied {
            Ok(()) => tx.commit().await?,
            Err(e) => {
                tx.rollback().await?;
                debug!(offer_id = %offer.id, error = %e, "accept rolled back");
                return Err(e);
            }
        }

        metrics::MATCH_TRANSACTION_DURATION_SECONDS.observe(timer.elapsed().as_secs_f64());
        info!(
            offer_id = %offer.id,
            reference_id = %reference.id,
            pro_id = %offer.pro_id,
            "offer accepted; reference matched"
        );

        offer.status = OfferStatus::Accepted;
        offer.accepted_at = Some(accepted_at);
        // Committed: a failed contact lookup must not report the accept as failed
        offer.pro_contact = match self.offers.contact_for(&offer.pro_id).await {
            Ok(contact) => contact,
            Err(e) => {
                warn!(offer_id = %offer.id, pro_id = %offer.pro_id, error = %e, "contact lookup failed after accept");
                None
            }
        };
        reference.status = ReferenceStatus::Matched;

        Ok(Resolution { offer, reference })
    }

    async fn apply_accept(
        tx: &mut Transaction<'_, Sqlite>,
        offer: &Offer,
        reference: &Reference,
        accepted_at: DateTime<Utc>,
    ) -> MarketResult<()> {
        // Step 1: the offer, conditioned on still being unresolved. The write
        // comes first so the transaction takes the write lock before reading.
        let cas = sqlx::query(
            "UPDATE offer SET status = 'accepted', accepted_at = ? WHERE id = ? AND status = 'offer'",
        )
        .bind(db::timestamp(accepted_at))
        .bind(&offer.id)
        .execute(&mut **tx)
        .await;

        let cas = match cas {
            Ok(result) => result,
            Err(e) if db::constraint_violation(&e) == Some(ConstraintViolation::Unique) => {
                // uq_offer_one_accepted_per_ref: a sibling offer got there first
                info!(offer_id = %offer.id, reference_id = %reference.id, "accept lost to a sibling offer");
                return Err(MarketError::conflict(
                    ConflictKind::AlreadyMatched,
                    "Another offer on this reference was already accepted",
                ));
            }
            Err(e) => return Err(e.into()),
        };

        if cas.rows_affected() == 0 {
            info!(offer_id = %offer.id, "accept lost to a concurrent resolution of the same offer");
            return Err(MarketError::conflict(
                ConflictKind::AlreadyMatched,
                "Offer was resolved by a concurrent request",
            ));
        }

        // Step 2: the reference, conditioned on still being open
        let matched = sqlx::query("UPDATE reference SET status = 'matched' WHERE id = ? AND status = 'open'")
            .bind(&reference.id)
            .execute(&mut **tx)
            .await?;

        if matched.rows_affected() == 0 {
            let status: Option<String> = sqlx::query_scalar("SELECT status FROM reference WHERE id = ?")
                .bind(&reference.id)
                .fetch_optional(&mut **tx)
                .await?;

            return Err(match status.as_deref() {
                None => MarketError::NotFound(format!("Reference {} not found", reference.id)),
                Some("matched") => MarketError::conflict(
                    ConflictKind::AlreadyMatched,
                    "Reference was already matched",
                ),
                Some(_) => MarketError::conflict(
                    ConflictKind::ReferenceNotOpen,
                    "Reference is no longer open",
                ),
            });
        }

        Ok(())
    }
}
