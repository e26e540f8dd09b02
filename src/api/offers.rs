/// Offer endpoints, including the accept/decline resolution
use crate::{
    api::validated,
    auth::{AuthContext, OptionalAuthContext},
    context::AppContext,
    error::MarketResult,
    matching::{Decision, Resolution},
    offer::{NewOffer, Offer},
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Build offer routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/api/references/:id/offers",
            get(list_offers_by_reference).post(create_offer),
        )
        .route("/api/offers/:id", get(get_offer).delete(delete_offer))
        .route("/api/offers/:id/accept", post(accept_offer))
        .route("/api/offers/:id/decline", post(decline_offer))
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateOfferRequest {
    #[validate(length(max = 2000))]
    message: Option<String>,
    #[validate(range(min = 0, message = "pricePln must not be negative"))]
    price_pln: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListOffersResponse {
    offers: Vec<Offer>,
}

async fn create_offer(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(ref_id): Path<String>,
    payload: Result<Json<CreateOfferRequest>, JsonRejection>,
) -> MarketResult<(StatusCode, Json<Offer>)> {
    let req = validated(payload)?;

    let offer = ctx
        .offers
        .create_offer(
            Some(&auth.principal),
            &ref_id,
            NewOffer {
                message: req.message,
                price_pln: req.price_pln,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(offer)))
}

async fn list_offers_by_reference(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    Path(ref_id): Path<String>,
) -> MarketResult<Json<ListOffersResponse>> {
    let offers = ctx
        .offers
        .list_offers_by_reference(&ref_id, auth.principal.as_ref())
        .await?;
    Ok(Json(ListOffersResponse { offers }))
}

async fn get_offer(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    Path(id): Path<String>,
) -> MarketResult<Json<Offer>> {
    let offer = ctx.offers.get_offer(&id, auth.principal.as_ref()).await?;
    Ok(Json(offer))
}

async fn delete_offer(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> MarketResult<StatusCode> {
    ctx.offers.delete_offer(&id, Some(&auth.principal)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn accept_offer(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> MarketResult<Json<Resolution>> {
    let resolution = ctx
        .matching
        .resolve_offer(&id, Decision::Accept, Some(&auth.principal))
        .await?;
    Ok(Json(resolution))
}

async fn decline_offer(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> MarketResult<Json<Resolution>> {
    let resolution = ctx
        .matching
        .resolve_offer(&id, Decision::Decline, Some(&auth.principal))
        .await?;
    Ok(Json(resolution))
}
