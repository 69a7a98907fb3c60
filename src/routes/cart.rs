use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, patch, post},
};
use uuid::Uuid;

use crate::{
    audit,
    client::reconcile::merge_carts,
    dto::cart::{AddLineRequest, CartView, MergeResponse, SetQuantityRequest},
    error::{AppError, AppResult},
    middleware::auth::{AnonymousId, AuthUser, CartOwner},
    models::{CartLine, LineKey, Owner},
    response::{ApiResponse, Meta},
    services::cart_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/lines", post(add_line))
        .route("/lines/{line_id}", patch(set_line_quantity).delete(remove_line))
        .route("/merge", post(merge_cart))
}

async fn cart_view(state: &AppState, owner: &Owner) -> AppResult<CartView> {
    let Some(cart) = cart_service::find_cart(state, owner).await? else {
        return Ok(CartView::new(None, Vec::new()));
    };
    let lines = cart_service::list_lines(state, cart.id).await?;
    Ok(CartView::new(Some(cart), lines))
}

/// Loads a line and checks it belongs to the caller's cart. Lines of other
/// carts look missing.
async fn owned_line(state: &AppState, owner: &Owner, line_id: Uuid) -> AppResult<CartLine> {
    let cart = cart_service::find_cart(state, owner)
        .await?
        .ok_or(AppError::NotFound)?;
    let line = cart_service::get_line(state, line_id).await?;
    if line.cart_id != cart.id {
        return Err(AppError::NotFound);
    }
    Ok(line)
}

#[utoipa::path(
    get,
    path = "/api/cart",
    params(
        ("X-Anonymous-Id" = Option<Uuid>, Header, description = "Anonymous session when signed out")
    ),
    responses(
        (status = 200, description = "Current cart with lines", body = ApiResponse<CartView>),
        (status = 400, description = "No owner in request")
    ),
    security((), ("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    CartOwner(owner): CartOwner,
) -> AppResult<Json<ApiResponse<CartView>>> {
    let view = cart_view(&state, &owner).await?;
    Ok(Json(ApiResponse::success("OK", view, Some(Meta::empty()))))
}

#[utoipa::path(
    post,
    path = "/api/cart/lines",
    request_body = AddLineRequest,
    params(
        ("X-Anonymous-Id" = Option<Uuid>, Header, description = "Anonymous session when signed out")
    ),
    responses(
        (status = 200, description = "Line added or incremented", body = ApiResponse<CartLine>),
        (status = 400, description = "Invalid quantity, product or variant"),
        (status = 503, description = "Database unavailable")
    ),
    security((), ("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn add_line(
    State(state): State<AppState>,
    CartOwner(owner): CartOwner,
    Json(payload): Json<AddLineRequest>,
) -> AppResult<Json<ApiResponse<CartLine>>> {
    cart_service::validate_quantity(payload.quantity)?;
    let cart = cart_service::get_or_create_cart(&state, &owner).await?;
    let key = LineKey::new(payload.product_id, payload.variant_id);
    let line = cart_service::add_line(&state, cart.id, key, payload.quantity).await?;

    audit::record(
        &state,
        owner.user_id(),
        "cart_add",
        "cart_lines",
        serde_json::json!({
            "owner": owner.to_string(),
            "product_id": payload.product_id,
            "variant_id": payload.variant_id,
            "quantity": payload.quantity,
        }),
    )
    .await;

    Ok(Json(ApiResponse::success("OK", line, None)))
}

#[utoipa::path(
    patch,
    path = "/api/cart/lines/{line_id}",
    request_body = SetQuantityRequest,
    params(
        ("line_id" = Uuid, Path, description = "Cart line ID"),
        ("X-Anonymous-Id" = Option<Uuid>, Header, description = "Anonymous session when signed out")
    ),
    responses(
        (status = 200, description = "Quantity set; a quantity of 0 removes the line", body = ApiResponse<CartLine>),
        (status = 404, description = "Line not in caller's cart")
    ),
    security((), ("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn set_line_quantity(
    State(state): State<AppState>,
    CartOwner(owner): CartOwner,
    Path(line_id): Path<Uuid>,
    Json(payload): Json<SetQuantityRequest>,
) -> AppResult<Json<ApiResponse<CartLine>>> {
    owned_line(&state, &owner, line_id).await?;
    let line = cart_service::set_line_quantity(&state, line_id, payload.quantity).await?;

    audit::record(
        &state,
        owner.user_id(),
        "cart_update",
        "cart_lines",
        serde_json::json!({ "owner": owner.to_string(), "line_id": line_id, "quantity": payload.quantity }),
    )
    .await;

    let resp = match line {
        Some(line) => ApiResponse::success("Updated", line, None),
        None => ApiResponse::empty("Removed from cart"),
    };
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/cart/lines/{line_id}",
    params(
        ("line_id" = Uuid, Path, description = "Cart line ID"),
        ("X-Anonymous-Id" = Option<Uuid>, Header, description = "Anonymous session when signed out")
    ),
    responses(
        (status = 200, description = "OK", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Line not in caller's cart")
    ),
    security((), ("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_line(
    State(state): State<AppState>,
    CartOwner(owner): CartOwner,
    Path(line_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    owned_line(&state, &owner, line_id).await?;
    cart_service::remove_line(&state, line_id).await?;

    audit::record(
        &state,
        owner.user_id(),
        "cart_remove",
        "cart_lines",
        serde_json::json!({ "owner": owner.to_string(), "line_id": line_id }),
    )
    .await;

    Ok(Json(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    )))
}

#[utoipa::path(
    delete,
    path = "/api/cart",
    params(
        ("X-Anonymous-Id" = Option<Uuid>, Header, description = "Anonymous session when signed out")
    ),
    responses(
        (status = 200, description = "All lines removed", body = ApiResponse<serde_json::Value>)
    ),
    security((), ("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    CartOwner(owner): CartOwner,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    if let Some(cart) = cart_service::find_cart(&state, &owner).await? {
        cart_service::clear_cart(&state, cart.id).await?;
        audit::record(
            &state,
            owner.user_id(),
            "cart_clear",
            "carts",
            serde_json::json!({ "owner": owner.to_string(), "cart_id": cart.id }),
        )
        .await;
    }

    Ok(Json(ApiResponse::success(
        "Cart cleared",
        serde_json::json!({}),
        Some(Meta::empty()),
    )))
}

#[utoipa::path(
    post,
    path = "/api/cart/merge",
    params(
        ("X-Anonymous-Id" = Uuid, Header, description = "Anonymous session to fold into the user's cart")
    ),
    responses(
        (status = 200, description = "Anonymous cart merged into the user's cart", body = ApiResponse<MergeResponse>),
        (status = 400, description = "Missing anonymous session"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn merge_cart(
    State(state): State<AppState>,
    user: AuthUser,
    AnonymousId(anonymous_id): AnonymousId,
) -> AppResult<Json<ApiResponse<MergeResponse>>> {
    let anonymous = Owner::Anonymous(anonymous_id);
    let owner = Owner::User(user.user_id);
    let report = merge_carts(&state, &anonymous, &owner).await?;

    if report.moved + report.combined + report.failed > 0 {
        audit::record(
            &state,
            Some(user.user_id),
            "cart_merge",
            "carts",
            serde_json::json!({
                "anonymous_id": anonymous_id,
                "moved": report.moved,
                "combined": report.combined,
                "failed": report.failed,
            }),
        )
        .await;
    }

    let view = cart_view(&state, &owner).await?;
    let data = MergeResponse {
        moved: report.moved,
        combined: report.combined,
        failed: report.failed,
        lines: view.lines,
    };
    Ok(Json(ApiResponse::success("Cart merged", data, None)))
}
