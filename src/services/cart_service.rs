use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::DbPool,
    dto::cart::{AddItemRequest, CartItemDto, CartItemList},
    error::{AppError, AppResult},
    models::{CartItem, Product},
    response::{ApiResponse, Meta},
};

/// Stored quantities are clamped here: each request must be in [1, 100], and
/// repeated adds saturate at 100 instead of growing without bound.
pub const MAX_QUANTITY: i32 = 100;

fn validate_quantity(quantity: i32) -> AppResult<()> {
    if !(1..=MAX_QUANTITY).contains(&quantity) {
        return Err(AppError::Validation(format!(
            "quantity must be between 1 and {MAX_QUANTITY}, got {quantity}"
        )));
    }
    Ok(())
}

#[derive(FromRow)]
struct CartItemWithProductRow {
    cart_item_id: Uuid,
    quantity: i32,
    product_id: Uuid,
    name: String,
    description: Option<String>,
    price: i64,
    image_url: Option<String>,
    created_by: Uuid,
    product_created_at: DateTime<Utc>,
    product_modified_at: Option<DateTime<Utc>>,
}

impl CartItemWithProductRow {
    fn into_dto(self) -> CartItemDto {
        CartItemDto {
            id: self.cart_item_id,
            product: Product {
                id: self.product_id,
                name: self.name,
                description: self.description,
                price: self.price,
                image_url: self.image_url,
                created_by: self.created_by,
                created_at: self.product_created_at,
                modified_at: self.product_modified_at,
            },
            quantity: self.quantity,
        }
    }
}

const ITEM_WITH_PRODUCT_COLUMNS: &str = r#"
    ci.id AS cart_item_id, ci.quantity,
    p.id AS product_id, p.name, p.description, p.price, p.image_url,
    p.created_by, p.created_at AS product_created_at, p.modified_at AS product_modified_at
"#;

/// Carts are created lazily; a user without one simply has an empty cart.
async fn find_cart_id(pool: &DbPool, user_id: Uuid) -> AppResult<Option<Uuid>> {
    let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM carts WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(id,)| id))
}

async fn get_or_create_cart(pool: &DbPool, user_id: Uuid) -> AppResult<Uuid> {
    // The no-op update makes the upsert always return the row, new or old.
    let (cart_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO carts (id, user_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(cart_id)
}

pub async fn get_items(pool: &DbPool, user_id: Uuid) -> AppResult<ApiResponse<CartItemList>> {
    let rows = sqlx::query_as::<_, CartItemWithProductRow>(&format!(
        r#"
        SELECT {ITEM_WITH_PRODUCT_COLUMNS}
        FROM cart_items ci
        JOIN carts c ON c.id = ci.cart_id
        JOIN products p ON p.id = ci.product_id
        WHERE c.user_id = $1
        ORDER BY ci.created_at ASC
        "#
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let items: Vec<CartItemDto> = rows.into_iter().map(CartItemWithProductRow::into_dto).collect();
    Ok(ApiResponse::success(
        "OK",
        CartItemList { items },
        Some(Meta::empty()),
    ))
}

pub async fn add_item(
    pool: &DbPool,
    user_id: Uuid,
    payload: AddItemRequest,
) -> AppResult<ApiResponse<CartItemDto>> {
    validate_quantity(payload.quantity)?;

    let product: Option<Product> = sqlx::query_as("SELECT * FROM products WHERE id = $1")
        .bind(payload.product_id)
        .fetch_optional(pool)
        .await?;
    let product = product.ok_or_else(|| AppError::NotFound("product not found".into()))?;

    let user_exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    if user_exists.is_none() {
        return Err(AppError::NotFound("user not found".into()));
    }

    let cart_id = get_or_create_cart(pool, user_id).await?;

    let existing: Option<CartItem> =
        sqlx::query_as("SELECT * FROM cart_items WHERE cart_id = $1 AND product_id = $2")
            .bind(cart_id)
            .bind(payload.product_id)
            .fetch_optional(pool)
            .await?;

    let item: CartItem = if let Some(existing) = existing {
        sqlx::query_as(
            r#"
            UPDATE cart_items
            SET quantity = LEAST(quantity + $2, $3)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(existing.id)
        .bind(payload.quantity)
        .bind(MAX_QUANTITY)
        .fetch_one(pool)
        .await?
    } else {
        sqlx::query_as(
            r#"
            INSERT INTO cart_items (id, cart_id, product_id, quantity)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(cart_id)
        .bind(payload.product_id)
        .bind(payload.quantity)
        .fetch_one(pool)
        .await?
    };

    if let Err(err) = log_audit(
        pool,
        Some(user_id),
        "cart_add",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": payload.product_id, "quantity": payload.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Added to cart",
        CartItemDto {
            id: item.id,
            product,
            quantity: item.quantity,
        },
        None,
    ))
}

pub async fn update_item_quantity(
    pool: &DbPool,
    user_id: Uuid,
    cart_item_id: Uuid,
    quantity: i32,
) -> AppResult<ApiResponse<CartItemDto>> {
    validate_quantity(quantity)?;

    let cart_id = find_cart_id(pool, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("cart not found".into()))?;

    let row: Option<CartItemWithProductRow> = sqlx::query_as(&format!(
        r#"
        SELECT {ITEM_WITH_PRODUCT_COLUMNS}
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        WHERE ci.id = $1 AND ci.cart_id = $2
        "#
    ))
    .bind(cart_item_id)
    .bind(cart_id)
    .fetch_optional(pool)
    .await?;
    let row = row.ok_or_else(|| AppError::NotFound("cart item not found".into()))?;

    // A seller may not adjust quantities of their own product sitting in
    // their own cart.
    if row.created_by == user_id {
        return Err(AppError::Forbidden(
            "you cannot modify cart items containing your own products".into(),
        ));
    }

    let updated: CartItem =
        sqlx::query_as("UPDATE cart_items SET quantity = $2 WHERE id = $1 RETURNING *")
            .bind(cart_item_id)
            .bind(quantity)
            .fetch_one(pool)
            .await?;

    if let Err(err) = log_audit(
        pool,
        Some(user_id),
        "cart_update",
        Some("cart_items"),
        Some(serde_json::json!({ "cart_item_id": cart_item_id, "quantity": quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let mut dto = row.into_dto();
    dto.quantity = updated.quantity;
    Ok(ApiResponse::success("Quantity updated", dto, None))
}

pub async fn remove_item(
    pool: &DbPool,
    user_id: Uuid,
    cart_item_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let cart_id = find_cart_id(pool, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("cart not found".into()))?;

    let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND cart_id = $2")
        .bind(cart_item_id)
        .bind(cart_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("cart item not found".into()));
    }

    if let Err(err) = log_audit(
        pool,
        Some(user_id),
        "cart_remove",
        Some("cart_items"),
        Some(serde_json::json!({ "cart_item_id": cart_item_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

/// Succeeds as a no-op when the cart is missing or already empty.
pub async fn clear_cart(pool: &DbPool, user_id: Uuid) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = sqlx::query(
        r#"
        DELETE FROM cart_items
        WHERE cart_id IN (SELECT id FROM carts WHERE user_id = $1)
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await?;

    if result.rows_affected() > 0 {
        if let Err(err) = log_audit(
            pool,
            Some(user_id),
            "cart_clear",
            Some("cart_items"),
            Some(serde_json::json!({ "removed": result.rows_affected() })),
        )
        .await
        {
            tracing::warn!(error = %err, "audit log failed");
        }
    }

    Ok(ApiResponse::success(
        "Cart cleared",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

/// Totals use the live catalog price, not a snapshot taken at add time.
pub async fn get_total(pool: &DbPool, user_id: Uuid) -> AppResult<i64> {
    let (total,): (i64,) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(p.price * ci.quantity), 0)::BIGINT
        FROM cart_items ci
        JOIN carts c ON c.id = ci.cart_id
        JOIN products p ON p.id = ci.product_id
        WHERE c.user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(total)
}

pub async fn get_item_count(pool: &DbPool, user_id: Uuid) -> AppResult<i64> {
    let (count,): (i64,) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(ci.quantity), 0)::BIGINT
        FROM cart_items ci
        JOIN carts c ON c.id = ci.cart_id
        WHERE c.user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}
