use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, put},
};
use uuid::Uuid;

use crate::{
    dto::cart::{AddItemRequest, CartCount, CartItemDto, CartItemList, CartTotal, UpdateQuantityRequest},
    error::AppResult,
    middleware::auth::{AuthUser, ensure_self_or_admin},
    response::ApiResponse,
    services::cart_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{user_id}", get(get_items))
        .route("/{user_id}/items", axum::routing::post(add_item))
        .route("/{user_id}/items/{cart_item_id}", put(update_item_quantity))
        .route("/{user_id}/items/{cart_item_id}", delete(remove_item))
        .route("/{user_id}/clear", delete(clear_cart))
        .route("/{user_id}/total", get(get_total))
        .route("/{user_id}/count", get(get_item_count))
}

#[utoipa::path(
    get,
    path = "/api/cart/{user_id}",
    params(("user_id" = Uuid, Path, description = "Cart owner")),
    responses(
        (status = 200, description = "List cart items", body = ApiResponse<CartItemList>),
        (status = 403, description = "Not the cart owner")
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn get_items(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<CartItemList>>> {
    ensure_self_or_admin(&user, user_id)?;
    let resp = cart_service::get_items(&state.pool, user_id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/cart/{user_id}/items",
    params(("user_id" = Uuid, Path, description = "Cart owner")),
    request_body = AddItemRequest,
    responses(
        (status = 200, description = "Created or incremented cart line", body = ApiResponse<CartItemDto>),
        (status = 400, description = "Quantity out of range"),
        (status = 404, description = "Product or user not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn add_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<AddItemRequest>,
) -> AppResult<Json<ApiResponse<CartItemDto>>> {
    ensure_self_or_admin(&user, user_id)?;
    let resp = cart_service::add_item(&state.pool, user_id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/cart/{user_id}/items/{cart_item_id}",
    params(
        ("user_id" = Uuid, Path, description = "Cart owner"),
        ("cart_item_id" = Uuid, Path, description = "Cart line id")
    ),
    request_body = UpdateQuantityRequest,
    responses(
        (status = 200, description = "Updated cart line", body = ApiResponse<CartItemDto>),
        (status = 400, description = "Quantity out of range"),
        (status = 403, description = "Own-product line"),
        (status = 404, description = "Cart or cart item not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn update_item_quantity(
    State(state): State<AppState>,
    user: AuthUser,
    Path((user_id, cart_item_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> AppResult<Json<ApiResponse<CartItemDto>>> {
    ensure_self_or_admin(&user, user_id)?;
    let resp =
        cart_service::update_item_quantity(&state.pool, user_id, cart_item_id, payload.quantity)
            .await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/cart/{user_id}/items/{cart_item_id}",
    params(
        ("user_id" = Uuid, Path, description = "Cart owner"),
        ("cart_item_id" = Uuid, Path, description = "Cart line id")
    ),
    responses(
        (status = 204, description = "Removed"),
        (status = 404, description = "Cart or cart item not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path((user_id, cart_item_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    ensure_self_or_admin(&user, user_id)?;
    cart_service::remove_item(&state.pool, user_id, cart_item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/api/cart/{user_id}/clear",
    params(("user_id" = Uuid, Path, description = "Cart owner")),
    responses((status = 204, description = "Cleared, no-op if already empty")),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    ensure_self_or_admin(&user, user_id)?;
    cart_service::clear_cart(&state.pool, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/cart/{user_id}/total",
    params(("user_id" = Uuid, Path, description = "Cart owner")),
    responses((status = 200, description = "Cart total at live prices", body = ApiResponse<CartTotal>)),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn get_total(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<CartTotal>>> {
    ensure_self_or_admin(&user, user_id)?;
    let total = cart_service::get_total(&state.pool, user_id).await?;
    Ok(Json(ApiResponse::success("OK", CartTotal { total }, None)))
}

#[utoipa::path(
    get,
    path = "/api/cart/{user_id}/count",
    params(("user_id" = Uuid, Path, description = "Cart owner")),
    responses((status = 200, description = "Sum of quantities", body = ApiResponse<CartCount>)),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn get_item_count(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<CartCount>>> {
    ensure_self_or_admin(&user, user_id)?;
    let count = cart_service::get_item_count(&state.pool, user_id).await?;
    Ok(Json(ApiResponse::success("OK", CartCount { count }, None)))
}
