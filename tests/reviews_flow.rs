use axum_storefront_api::{
    db::{create_orm_conn, create_pool},
    dto::reviews::{CreateReviewRequest, UpdateReviewRequest},
    error::AppError,
    middleware::auth::AuthUser,
    services::review_service,
    state::AppState,
};
use uuid::Uuid;

// Review rules: no reviewing your own product, one review per user per
// product, only the author edits. Requires a database; skipped otherwise.
#[tokio::test]
async fn review_ownership_and_uniqueness_flow() -> anyhow::Result<()> {
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

    let seller_id = create_user(&state, "seller").await?;
    let reviewer_id = create_user(&state, "reviewer").await?;
    let product = create_product(&state, seller_id, "Reviewable Widget", 1500).await?;

    let seller = AuthUser {
        user_id: seller_id,
        role: "user".into(),
    };
    let reviewer = AuthUser {
        user_id: reviewer_id,
        role: "user".into(),
    };

    // Rating bounds are validated before anything else.
    let err = review_service::create_review(
        &state,
        &reviewer,
        CreateReviewRequest {
            product_id: product,
            rating: 6,
            comment: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // The seller cannot review their own listing.
    let err = review_service::create_review(
        &state,
        &seller,
        CreateReviewRequest {
            product_id: product,
            rating: 5,
            comment: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let created = review_service::create_review(
        &state,
        &reviewer,
        CreateReviewRequest {
            product_id: product,
            rating: 4,
            comment: Some("Solid".into()),
        },
    )
    .await?;
    let review = created.data.unwrap();

    // Second review for the same product is rejected.
    let err = review_service::create_review(
        &state,
        &reviewer,
        CreateReviewRequest {
            product_id: product,
            rating: 2,
            comment: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // Only the author may edit.
    let err = review_service::update_review(
        &state,
        &seller,
        review.id,
        UpdateReviewRequest {
            rating: 1,
            comment: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let updated = review_service::update_review(
        &state,
        &reviewer,
        review.id,
        UpdateReviewRequest {
            rating: 5,
            comment: Some("Even better after a week".into()),
        },
    )
    .await?;
    assert_eq!(updated.data.unwrap().rating, 5);

    let average = review_service::average_rating(&state, product).await?.data.unwrap();
    assert_eq!(average.count, 1);
    assert!((average.average - 5.0).abs() < f64::EPSILON);

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
    sqlx::query("INSERT INTO users (id, username, email, password_hash) VALUES ($1, $2, $3, 'x')")
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
