/// Reference lifecycle manager
use crate::{
    auth::{Principal, Role},
    config::ListingConfig,
    db,
    error::{MarketError, MarketResult},
    metrics, policy,
    reference::models::{NewReference, Reference, ReferenceFilter, ReferenceStatus},
};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

const REFERENCE_COLUMNS: &str =
    "r.id, r.client_id, r.image_url, r.note, r.tags, r.city, r.status, r.created_at";

/// Reference manager
#[derive(Clone)]
pub struct ReferenceManager {
    db: SqlitePool,
    listing: ListingConfig,
}

impl ReferenceManager {
    pub fn new(db: SqlitePool, listing: ListingConfig) -> Self {
        Self { db, listing }
    }

    /// Create a reference; always starts `open`
    pub async fn create_reference(
        &self,
        principal: Option<&Principal>,
        input: NewReference,
    ) -> MarketResult<Reference> {
        policy::can_create_reference(principal).ensure("create a reference")?;
        let client_id = principal
            .map(|p| p.id.clone())
            .ok_or_else(|| MarketError::Unauthorized("No principal".to_string()))?;

        let input = input.normalize()?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let tags_json = serde_json::to_string(&input.tags)
            .map_err(|e| MarketError::Internal(format!("Failed to encode tags: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO reference (id, client_id, image_url, note, tags, city, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 'open', ?)
            "#,
        )
        .bind(&id)
        .bind(&client_id)
        .bind(&input.image_url)
        .bind(&input.note)
        .bind(&tags_json)
        .bind(&input.city)
        .bind(db::timestamp(now))
        .execute(&self.db)
        .await?;

        metrics::REFERENCES_CREATED_TOTAL.inc();
        info!(reference_id = %id, client_id = %client_id, city = %input.city, "reference created");

        Ok(Reference {
            id,
            client_id,
            image_url: input.image_url,
            note: input.note,
            tags: input.tags,
            city: input.city,
            status: ReferenceStatus::Open,
            created_at: now,
        })
    }

    /// Get a reference as seen by `requester`.
    ///
    /// A matched reference is reported as `NotFound` to everyone except its
    /// owner and the accepted pro.
    pub async fn get_reference(
        &self,
        id: &str,
        requester: Option<&Principal>,
    ) -> MarketResult<Reference> {
        let reference = self
            .load(id)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("Reference {} not found", id)))?;

        if !reference.is_open() {
            let accepted_pro = self.accepted_pro_id(id).await?;
            if !policy::can_view_reference(requester, &reference, accepted_pro.as_deref()) {
                debug!(reference_id = %id, "hiding non-open reference from requester");
                return Err(MarketError::NotFound(format!("Reference {} not found", id)));
            }
        }

        Ok(reference)
    }

    /// List references, newest first, within the configured window.
    ///
    /// Non-open references only appear to the parties of the engagement.
    pub async fn list_references(
        &self,
        filter: &ReferenceFilter,
        requester: Option<&Principal>,
    ) -> MarketResult<Vec<Reference>> {
        let limit = self.listing.clamp(filter.limit);
        let offset = filter.offset.unwrap_or(0).max(0);

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT ");
        query.push(REFERENCE_COLUMNS);
        query.push(" FROM reference r WHERE 1 = 1");

        if let Some(city) = &filter.city {
            query.push(" AND r.city = ").push_bind(city.trim().to_string());
        }
        if let Some(status) = filter.status {
            query.push(" AND r.status = ").push_bind(status.as_str());
        }
        if let Some(owner_id) = &filter.owner_id {
            query.push(" AND r.client_id = ").push_bind(owner_id.clone());
        }

        query.push(" AND (r.status = 'open'");
        match requester {
            Some(p) if p.role == Role::Client => {
                query.push(" OR r.client_id = ").push_bind(p.id.clone());
            }
            Some(p) if p.role == Role::Pro => {
                query
                    .push(" OR EXISTS (SELECT 1 FROM offer o WHERE o.ref_id = r.id AND o.status = 'accepted' AND o.pro_id = ")
                    .push_bind(p.id.clone())
                    .push(")");
            }
            _ => {}
        }
        query.push(")");

        query
            .push(" ORDER BY r.created_at DESC, r.id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = query.build().fetch_all(&self.db).await?;

        let mut references = Vec::with_capacity(rows.len());
        for row in &rows {
            references.push(Reference::from_row(row)?);
        }

        Ok(references)
    }

    /// Delete a reference and, by cascade, every offer on it
    pub async fn delete_reference(&self, id: &str, principal: Option<&Principal>) -> MarketResult<()> {
        let reference = self
            .load(id)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("Reference {} not found", id)))?;

        // Non-owners must not learn that a matched reference exists
        if !reference.is_open() {
            let accepted_pro = self.accepted_pro_id(id).await?;
            if !policy::can_view_reference(principal, &reference, accepted_pro.as_deref()) {
                return Err(MarketError::NotFound(format!("Reference {} not found", id)));
            }
        }

        policy::can_delete_reference(principal, &reference).ensure("delete this reference")?;

        // Feeds the log line only; the delete below is a single statement
        let severed = self.accepted_pro_id(id).await?;

        let result = sqlx::query("DELETE FROM reference WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MarketError::NotFound(format!("Reference {} not found", id)));
        }

        if severed.is_some() {
            warn!(reference_id = %id, "deleted reference with an accepted offer; engagement severed");
        }
        info!(reference_id = %id, "reference deleted");

        Ok(())
    }

    /// Load a reference without any visibility filtering
    pub(crate) async fn load(&self, id: &str) -> MarketResult<Option<Reference>> {
        let sql = format!("SELECT {} FROM reference r WHERE r.id = ?", REFERENCE_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.db).await?;

        row.as_ref().map(Reference::from_row).transpose()
    }

    /// Pro holding the accepted offer on a reference, if any
    pub(crate) async fn accepted_pro_id(&self, ref_id: &str) -> MarketResult<Option<String>> {
        let pro_id = sqlx::query_scalar(
            "SELECT pro_id FROM offer WHERE ref_id = ? AND status = 'accepted'",
        )
        .bind(ref_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(pro_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_reference(city: &str) -> NewReference {
        NewReference {
            image_url: "https://cdn.example/ref.jpg".to_string(),
            city: city.to_string(),
            tags: vec!["french".to_string(), "chrome".to_string()],
            note: Some("short almond".to_string()),
        }
    }

    async fn manager() -> (ReferenceManager, SqlitePool, tempfile::TempDir) {
        let (pool, dir) = db::test_pool().await;
        (
            ReferenceManager::new(pool.clone(), ListingConfig::default()),
            pool,
            dir,
        )
    }

    #[tokio::test]
    async fn test_create_reference_starts_open() {
        let (manager, _pool, _dir) = manager().await;
        let client = Principal::client("client-1");

        let reference = manager
            .create_reference(Some(&client), new_reference("Warsaw"))
            .await
            .unwrap();

        assert_eq!(reference.status, ReferenceStatus::Open);
        assert_eq!(reference.client_id, "client-1");
        assert_eq!(reference.tags, vec!["chrome", "french"]);

        let loaded = manager.get_reference(&reference.id, None).await.unwrap();
        assert_eq!(loaded, Reference {
            created_at: loaded.created_at,
            ..reference
        });
    }

    #[tokio::test]
    async fn test_pro_cannot_create_reference() {
        let (manager, _pool, _dir) = manager().await;

        let err = manager
            .create_reference(Some(&Principal::pro("pro-1")), new_reference("Warsaw"))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));

        let err = manager
            .create_reference(None, new_reference("Warsaw"))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_matched_reference_hidden_from_strangers() {
        let (manager, pool, _dir) = manager().await;
        let owner = Principal::client("client-1");
        let reference = manager
            .create_reference(Some(&owner), new_reference("Warsaw"))
            .await
            .unwrap();

        sqlx::query("INSERT INTO offer (id, ref_id, pro_id, status, created_at, accepted_at) VALUES ('o1', ?, 'pro-1', 'accepted', ?, ?)")
            .bind(&reference.id)
            .bind(db::timestamp(Utc::now()))
            .bind(db::timestamp(Utc::now()))
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("UPDATE reference SET status = 'matched' WHERE id = ?")
            .bind(&reference.id)
            .execute(&pool)
            .await
            .unwrap();

        assert!(manager.get_reference(&reference.id, Some(&owner)).await.is_ok());
        assert!(manager
            .get_reference(&reference.id, Some(&Principal::pro("pro-1")))
            .await
            .is_ok());

        for stranger in [Some(Principal::pro("pro-2")), Some(Principal::client("client-2")), None] {
            let err = manager
                .get_reference(&reference.id, stranger.as_ref())
                .await
                .unwrap_err();
            assert!(matches!(err, MarketError::NotFound(_)));
        }

        let listed = manager
            .list_references(&ReferenceFilter::default(), Some(&Principal::pro("pro-2")))
            .await
            .unwrap();
        assert!(listed.is_empty());

        let listed = manager
            .list_references(&ReferenceFilter::default(), Some(&Principal::pro("pro-1")))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_list_filters_and_orders_newest_first() {
        let (manager, _pool, _dir) = manager().await;
        let alice = Principal::client("alice");
        let bob = Principal::client("bob");

        let first = manager
            .create_reference(Some(&alice), new_reference("Warsaw"))
            .await
            .unwrap();
        let second = manager
            .create_reference(Some(&bob), new_reference("Warsaw"))
            .await
            .unwrap();
        let third = manager
            .create_reference(Some(&alice), new_reference("Poznań"))
            .await
            .unwrap();

        let all = manager
            .list_references(&ReferenceFilter::default(), None)
            .await
            .unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![third.id.as_str(), second.id.as_str(), first.id.as_str()]);

        let warsaw = manager
            .list_references(
                &ReferenceFilter {
                    city: Some("Warsaw".to_string()),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(warsaw.len(), 2);

        let alices = manager
            .list_references(
                &ReferenceFilter {
                    owner_id: Some("alice".to_string()),
                    status: Some(ReferenceStatus::Open),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(alices.len(), 2);
        assert!(alices.iter().all(|r| r.client_id == "alice"));

        let page = manager
            .list_references(
                &ReferenceFilter {
                    limit: Some(1),
                    offset: Some(1),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, second.id);
    }

    #[tokio::test]
    async fn test_delete_reference_cascades_offers() {
        let (manager, pool, _dir) = manager().await;
        let owner = Principal::client("client-1");
        let reference = manager
            .create_reference(Some(&owner), new_reference("Warsaw"))
            .await
            .unwrap();

        for (id, pro) in [("o1", "pro-1"), ("o2", "pro-2")] {
            sqlx::query("INSERT INTO offer (id, ref_id, pro_id, status, created_at) VALUES (?, ?, ?, 'offer', ?)")
                .bind(id)
                .bind(&reference.id)
                .bind(pro)
                .bind(db::timestamp(Utc::now()))
                .execute(&pool)
                .await
                .unwrap();
        }

        let err = manager
            .delete_reference(&reference.id, Some(&Principal::client("client-2")))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));

        manager
            .delete_reference(&reference.id, Some(&owner))
            .await
            .unwrap();

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM offer")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);

        assert!(matches!(
            manager.get_reference(&reference.id, Some(&owner)).await,
            Err(MarketError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_matched_reference_severs_accepted_offer() {
        use crate::matching::{Decision, MatchingCoordinator};
        use crate::offer::{NewOffer, OfferManager};

        let (manager, pool, _dir) = manager().await;
        let offers = OfferManager::new(pool.clone(), manager.clone());
        let matching = MatchingCoordinator::new(pool.clone(), offers.clone(), manager.clone());

        let owner = Principal::client("client-1");
        let accepted_pro = Principal::pro("pro-1");
        let reference = manager
            .create_reference(Some(&owner), new_reference("Warsaw"))
            .await
            .unwrap();
        let offer = offers
            .create_offer(
                Some(&accepted_pro),
                &reference.id,
                NewOffer {
                    message: None,
                    price_pln: Some(150),
                },
            )
            .await
            .unwrap();
        matching
            .resolve_offer(&offer.id, Decision::Accept, Some(&owner))
            .await
            .unwrap();

        // The accepted pro may see the reference but not delete it
        let err = manager
            .delete_reference(&reference.id, Some(&accepted_pro))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));

        // Strangers do not learn it exists
        let err = manager
            .delete_reference(&reference.id, Some(&Principal::client("client-2")))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::NotFound(_)));

        manager
            .delete_reference(&reference.id, Some(&owner))
            .await
            .unwrap();

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM offer")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
