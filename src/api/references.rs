/// Reference endpoints
use crate::{
    api::validated,
    auth::{AuthContext, OptionalAuthContext},
    context::AppContext,
    error::MarketResult,
    reference::{NewReference, Reference, ReferenceFilter, ReferenceStatus},
};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Build reference routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/api/references",
            get(list_references).post(create_reference),
        )
        .route(
            "/api/references/:id",
            get(get_reference).delete(delete_reference),
        )
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateReferenceRequest {
    #[validate(url(message = "imageUrl must be a URL"))]
    image_url: String,
    #[validate(length(min = 1, max = 120, message = "city is required"))]
    city: String,
    #[serde(default)]
    #[validate(length(max = 20, message = "at most 20 tags"))]
    tags: Vec<String>,
    #[validate(length(max = 2000))]
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListReferencesQuery {
    city: Option<String>,
    status: Option<String>,
    owner: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListReferencesResponse {
    references: Vec<Reference>,
}

async fn create_reference(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    payload: Result<Json<CreateReferenceRequest>, JsonRejection>,
) -> MarketResult<(StatusCode, Json<Reference>)> {
    let req = validated(payload)?;

    let reference = ctx
        .references
        .create_reference(
            Some(&auth.principal),
            NewReference {
                image_url: req.image_url,
                city: req.city,
                tags: req.tags,
                note: req.note,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(reference)))
}

async fn list_references(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    Query(query): Query<ListReferencesQuery>,
) -> MarketResult<Json<ListReferencesResponse>> {
    let status = query
        .status
        .as_deref()
        .map(ReferenceStatus::from_str)
        .transpose()?;

    let filter = ReferenceFilter {
        city: query.city.filter(|c| !c.trim().is_empty()),
        status,
        owner_id: query.owner,
        limit: query.limit,
        offset: query.offset,
    };

    let references = ctx
        .references
        .list_references(&filter, auth.principal.as_ref())
        .await?;

    Ok(Json(ListReferencesResponse { references }))
}

async fn get_reference(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    Path(id): Path<String>,
) -> MarketResult<Json<Reference>> {
    let reference = ctx
        .references
        .get_reference(&id, auth.principal.as_ref())
        .await?;
    Ok(Json(reference))
}

async fn delete_reference(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> MarketResult<StatusCode> {
    ctx.references
        .delete_reference(&id, Some(&auth.principal))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::TestApp;
    use crate::auth::Principal;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    fn body() -> serde_json::Value {
        json!({
            "imageUrl": "https://cdn.example/ref.jpg",
            "city": "Krakow",
            "tags": ["Chrome", "almond", "chrome"],
            "note": "short almond"
        })
    }

    #[tokio::test]
    async fn test_create_reference_requires_auth() {
        let app = TestApp::new().await;

        let (status, json) = app
            .call(Method::POST, "/api/references", None, Some(body()))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "AuthenticationRequired");
    }

    #[tokio::test]
    async fn test_create_reference_as_client() {
        let app = TestApp::new().await;
        let client = Principal::client("client-1");

        let (status, json) = app
            .call(Method::POST, "/api/references", Some(&client), Some(body()))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["status"], "open");
        assert_eq!(json["clientId"], "client-1");
        assert_eq!(json["tags"], json!(["almond", "chrome"]));
    }

    #[tokio::test]
    async fn test_create_reference_forbidden_for_pro() {
        let app = TestApp::new().await;

        let (status, _) = app
            .call(
                Method::POST,
                "/api/references",
                Some(&Principal::pro("pro-1")),
                Some(body()),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_create_reference_rejects_bad_input() {
        let app = TestApp::new().await;
        let client = Principal::client("client-1");

        let (status, json) = app
            .call(
                Method::POST,
                "/api/references",
                Some(&client),
                Some(json!({ "imageUrl": "not a url", "city": "Krakow" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "InvalidRequest");

        let (status, _) = app
            .call(
                Method::POST,
                "/api/references",
                Some(&client),
                Some(json!({ "city": "Krakow" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_and_get_references() {
        let app = TestApp::new().await;
        let client = Principal::client("client-1");

        let (_, created) = app
            .call(Method::POST, "/api/references", Some(&client), Some(body()))
            .await;
        let id = created["id"].as_str().unwrap().to_string();

        let (status, json) = app
            .call(Method::GET, "/api/references?city=Krakow&limit=10", None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["references"].as_array().unwrap().len(), 1);

        let (status, json) = app
            .call(Method::GET, "/api/references?city=Gdansk", None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["references"].as_array().unwrap().is_empty());

        let (status, json) = app
            .call(Method::GET, &format!("/api/references/{}", id), None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["id"], id.as_str());

        let (status, _) = app
            .call(Method::GET, "/api/references?status=bogus", None, None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_reference() {
        let app = TestApp::new().await;
        let client = Principal::client("client-1");

        let (_, created) = app
            .call(Method::POST, "/api/references", Some(&client), Some(body()))
            .await;
        let uri = format!("/api/references/{}", created["id"].as_str().unwrap());

        let (status, _) = app
            .call(Method::DELETE, &uri, Some(&Principal::client("client-2")), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app.call(Method::DELETE, &uri, Some(&client), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = app.call(Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
