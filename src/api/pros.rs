/// Pro dashboard and contact card endpoints
use crate::{
    api::validated,
    auth::AuthContext,
    context::AppContext,
    error::MarketResult,
    offer::{ProOffer, ProProfile},
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Build pro routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/pros/me/profile", put(upsert_profile))
        .route("/api/pros/:id/offers", get(list_offers_by_pro))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct UpsertProfileRequest {
    #[validate(length(min = 1, max = 80, message = "displayName is required"))]
    display_name: String,
    #[validate(url)]
    avatar_url: Option<String>,
    #[validate(length(min = 3, max = 32))]
    phone: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListProOffersResponse {
    offers: Vec<ProOffer>,
}

async fn upsert_profile(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    payload: Result<Json<UpsertProfileRequest>, JsonRejection>,
) -> MarketResult<Json<ProProfile>> {
    let req = validated(payload)?;

    let profile = ctx
        .offers
        .upsert_pro_profile(
            Some(&auth.principal),
            &req.display_name,
            req.avatar_url,
            req.phone,
        )
        .await?;

    Ok(Json(profile))
}

async fn list_offers_by_pro(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(pro_id): Path<String>,
) -> MarketResult<Json<ListProOffersResponse>> {
    let offers = ctx
        .offers
        .list_offers_by_pro(&pro_id, Some(&auth.principal))
        .await?;
    Ok(Json(ListProOffersResponse { offers }))
}
