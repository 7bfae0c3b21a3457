use axum_storefront_api::{
    db::{create_orm_conn, create_pool},
    dto::cart::AddItemRequest,
    error::AppError,
    services::cart_service,
    state::AppState,
};
use uuid::Uuid;

// Integration flow: add twice merges into one line, out-of-range update is
// rejected, own-product update is forbidden, remove is not idempotent, clear
// is. Requires a database; skipped otherwise.
#[tokio::test]
async fn cart_add_update_remove_clear_flow() -> anyhow::Result<()> {
    let database_url =
        match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(url) => url,
            Err(_) => {
                eprintln!(
                    "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
                );
                return Ok(());
            }
        };

    let state = setup_state(&database_url).await?;

    let buyer = create_user(&state, "buyer").await?;
    let seller = create_user(&state, "seller").await?;
    let widget = create_product(&state, seller, "Test Widget", 1000).await?;

    // Empty cart reads as an empty list, not an error.
    let items = cart_service::get_items(&state.pool, buyer).await?;
    assert!(items.data.unwrap().items.is_empty());
    assert_eq!(cart_service::get_item_count(&state.pool, buyer).await?, 0);

    // First add creates the line.
    let added = cart_service::add_item(
        &state.pool,
        buyer,
        AddItemRequest {
            product_id: widget,
            quantity: 2,
        },
    )
    .await?;
    let line = added.data.unwrap();
    assert_eq!(line.quantity, 2);
    assert_eq!(cart_service::get_item_count(&state.pool, buyer).await?, 2);

    // Second add increments the same line instead of duplicating it.
    cart_service::add_item(
        &state.pool,
        buyer,
        AddItemRequest {
            product_id: widget,
            quantity: 3,
        },
    )
    .await?;
    let items = cart_service::get_items(&state.pool, buyer).await?.data.unwrap();
    assert_eq!(items.items.len(), 1);
    assert_eq!(items.items[0].quantity, 5);
    assert_eq!(cart_service::get_item_count(&state.pool, buyer).await?, 5);
    assert_eq!(cart_service::get_total(&state.pool, buyer).await?, 5000);

    // Out-of-range quantity fails validation and mutates nothing.
    let err = cart_service::update_item_quantity(&state.pool, buyer, line.id, 200)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(cart_service::get_item_count(&state.pool, buyer).await?, 5);

    // Live price changes flow into the total.
    sqlx::query("UPDATE products SET price = $2 WHERE id = $1")
        .bind(widget)
        .bind(1200_i64)
        .execute(&state.pool)
        .await?;
    assert_eq!(cart_service::get_total(&state.pool, buyer).await?, 6000);

    // Remove succeeds once, then reports not-found.
    cart_service::remove_item(&state.pool, buyer, line.id).await?;
    let err = cart_service::remove_item(&state.pool, buyer, line.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    // Clearing an empty cart is a no-op success, twice over.
    cart_service::clear_cart(&state.pool, buyer).await?;
    cart_service::clear_cart(&state.pool, buyer).await?;
    assert_eq!(cart_service::get_item_count(&state.pool, buyer).await?, 0);

    Ok(())
}

#[tokio::test]
async fn own_product_quantity_update_is_forbidden() -> anyhow::Result<()> {
    let database_url =
        match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(url) => url,
            Err(_) => {
                eprintln!(
                    "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
                );
                return Ok(());
            }
        };

    let state = setup_state(&database_url).await?;

    let seller = create_user(&state, "seller").await?;
    let own_product = create_product(&state, seller, "Own Listing", 2500).await?;

    // The own-product exclusion only guards updates; the add itself goes
    // through (the client-side reconciliation is what filters own listings).
    let added = cart_service::add_item(
        &state.pool,
        seller,
        AddItemRequest {
            product_id: own_product,
            quantity: 1,
        },
    )
    .await?;
    let line = added.data.unwrap();

    let err = cart_service::update_item_quantity(&state.pool, seller, line.id, 2)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    Ok(())
}

#[tokio::test]
async fn cumulative_adds_saturate_at_the_quantity_cap() -> anyhow::Result<()> {
    let database_url =
        match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(url) => url,
            Err(_) => {
                eprintln!(
                    "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
                );
                return Ok(());
            }
        };

    let state = setup_state(&database_url).await?;

    let buyer = create_user(&state, "buyer").await?;
    let seller = create_user(&state, "seller").await?;
    let widget = create_product(&state, seller, "Bulk Widget", 100).await?;

    for _ in 0..3 {
        cart_service::add_item(
            &state.pool,
            buyer,
            AddItemRequest {
                product_id: widget,
                quantity: 60,
            },
        )
        .await?;
    }

    // 60 + 60 + 60 clamps to the 100 cap instead of growing unbounded.
    let items = cart_service::get_items(&state.pool, buyer).await?.data.unwrap();
    assert_eq!(items.items.len(), 1);
    assert_eq!(items.items[0].quantity, 100);

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(AppState { pool, orm })
}

async fn create_user(state: &AppState, name: &str) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (id, username, email, password_hash) VALUES ($1, $2, $3, 'x')",
    )
    .bind(id)
    .bind(name)
    .bind(format!("{name}-{id}@example.com"))
    .execute(&state.pool)
    .await?;
    Ok(id)
}

async fn create_product(
    state: &AppState,
    owner: Uuid,
    name: &str,
    price: i64,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO products (id, name, description, price, created_by) VALUES ($1, $2, NULL, $3, $4)",
    )
    .bind(id)
    .bind(name)
    .bind(price)
    .bind(owner)
    .execute(&state.pool)
    .await?;
    Ok(id)
}
