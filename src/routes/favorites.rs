use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    audit,
    dto::favorites::{FavoriteIds, FavoriteProductList, ToggleFavoriteResponse},
    error::AppResult,
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::favorite_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_favorites))
        .route("/ids", get(favorite_ids))
        .route("/{product_id}/toggle", post(toggle_favorite))
}

#[utoipa::path(
    get,
    path = "/api/favorites",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20")
    ),
    responses(
        (status = 200, description = "List favorites", body = ApiResponse<FavoriteProductList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Favorites"
)]
pub async fn list_favorites(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<FavoriteProductList>>> {
    let resp = favorite_service::list_favorites(&state, user.user_id, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/favorites/ids",
    responses(
        (status = 200, description = "Favorited product ids", body = ApiResponse<FavoriteIds>)
    ),
    security(("bearer_auth" = [])),
    tag = "Favorites"
)]
pub async fn favorite_ids(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<FavoriteIds>>> {
    let mut product_ids: Vec<Uuid> = favorite_service::load(&state, user.user_id)
        .await?
        .into_iter()
        .collect();
    product_ids.sort();
    Ok(Json(ApiResponse::success(
        "OK",
        FavoriteIds { product_ids },
        Some(Meta::empty()),
    )))
}

#[utoipa::path(
    post,
    path = "/api/favorites/{product_id}/toggle",
    params(
        ("product_id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Membership after the toggle", body = ApiResponse<ToggleFavoriteResponse>),
        (status = 400, description = "Product not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Favorites"
)]
pub async fn toggle_favorite(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ToggleFavoriteResponse>>> {
    let favorited = favorite_service::toggle(&state, user.user_id, product_id).await?;

    let action = if favorited { "favorite_add" } else { "favorite_remove" };
    audit::record(
        &state,
        Some(user.user_id),
        action,
        "favorites",
        serde_json::json!({ "product_id": product_id }),
    )
    .await;

    let message = if favorited {
        "Added to favorites"
    } else {
        "Removed from favorites"
    };
    Ok(Json(ApiResponse::success(
        message,
        ToggleFavoriteResponse {
            product_id,
            favorited,
        },
        Some(Meta::empty()),
    )))
}
