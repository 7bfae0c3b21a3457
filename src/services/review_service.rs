use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::dto::reviews::{
    AverageRating, CreateReviewRequest, ReviewDto, ReviewList, UpdateReviewRequest,
};
use crate::{
    audit::log_audit,
    entity::{
        Users,
        products::Entity as Products,
        reviews::{ActiveModel, Column, Entity as Reviews, Model as ReviewModel},
        users::Model as UserModel,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    state::AppState,
};

fn validate_review(rating: i32, comment: Option<&str>) -> AppResult<()> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::Validation(format!(
            "rating must be between 1 and 5, got {rating}"
        )));
    }
    if let Some(comment) = comment {
        if comment.len() > 1000 {
            return Err(AppError::Validation(
                "comment must be at most 1000 characters".into(),
            ));
        }
    }
    Ok(())
}

pub async fn list_by_product(
    state: &AppState,
    product_id: Uuid,
) -> AppResult<ApiResponse<ReviewList>> {
    let rows = Reviews::find()
        .filter(Column::ProductId.eq(product_id))
        .order_by_desc(Column::CreatedAt)
        .find_also_related(Users)
        .all(&state.orm)
        .await?;

    let items = rows
        .into_iter()
        .map(|(review, user)| review_dto(review, user))
        .collect();
    Ok(ApiResponse::success("Reviews", ReviewList { items }, None))
}

pub async fn list_by_user(state: &AppState, user_id: Uuid) -> AppResult<ApiResponse<ReviewList>> {
    let rows = Reviews::find()
        .filter(Column::UserId.eq(user_id))
        .order_by_desc(Column::CreatedAt)
        .find_also_related(Users)
        .all(&state.orm)
        .await?;

    let items = rows
        .into_iter()
        .map(|(review, user)| review_dto(review, user))
        .collect();
    Ok(ApiResponse::success("Reviews", ReviewList { items }, None))
}

pub async fn get_review(state: &AppState, review_id: Uuid) -> AppResult<ApiResponse<ReviewDto>> {
    let (review, user) = Reviews::find_by_id(review_id)
        .find_also_related(Users)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::NotFound("review not found".into()))?;
    Ok(ApiResponse::success("Review", review_dto(review, user), None))
}

pub async fn create_review(
    state: &AppState,
    user: &AuthUser,
    payload: CreateReviewRequest,
) -> AppResult<ApiResponse<ReviewDto>> {
    validate_review(payload.rating, payload.comment.as_deref())?;

    let product = Products::find_by_id(payload.product_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::NotFound("product not found".into()))?;

    if product.created_by == user.user_id {
        return Err(AppError::Forbidden(
            "you cannot review your own product".into(),
        ));
    }

    let existing = Reviews::find()
        .filter(Column::ProductId.eq(payload.product_id))
        .filter(Column::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?;
    if existing.is_some() {
        return Err(AppError::Validation(
            "you have already reviewed this product".into(),
        ));
    }

    let active = ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(payload.product_id),
        user_id: Set(user.user_id),
        rating: Set(payload.rating),
        comment: Set(payload.comment),
        created_at: NotSet,
        modified_at: NotSet,
    };
    let review = active.insert(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "review_create",
        Some("reviews"),
        Some(serde_json::json!({ "review_id": review.id, "product_id": review.product_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Review created",
        review_dto(review, None),
        Some(Meta::empty()),
    ))
}

pub async fn update_review(
    state: &AppState,
    user: &AuthUser,
    review_id: Uuid,
    payload: UpdateReviewRequest,
) -> AppResult<ApiResponse<ReviewDto>> {
    validate_review(payload.rating, payload.comment.as_deref())?;

    let existing = Reviews::find_by_id(review_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::NotFound("review not found".into()))?;

    if existing.user_id != user.user_id {
        return Err(AppError::Forbidden(
            "you don't have permission to edit this review".into(),
        ));
    }

    let mut active: ActiveModel = existing.into();
    active.rating = Set(payload.rating);
    active.comment = Set(payload.comment);
    active.modified_at = Set(Some(Utc::now().into()));
    let review = active.update(&state.orm).await?;

    Ok(ApiResponse::success(
        "Review updated",
        review_dto(review, None),
        Some(Meta::empty()),
    ))
}

pub async fn delete_review(
    state: &AppState,
    user: &AuthUser,
    review_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let existing = Reviews::find_by_id(review_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::NotFound("review not found".into()))?;

    if existing.user_id != user.user_id {
        return Err(AppError::Forbidden(
            "you don't have permission to delete this review".into(),
        ));
    }

    existing.delete(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "review_delete",
        Some("reviews"),
        Some(serde_json::json!({ "review_id": review_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Review deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn average_rating(
    state: &AppState,
    product_id: Uuid,
) -> AppResult<ApiResponse<AverageRating>> {
    let reviews = Reviews::find()
        .filter(Column::ProductId.eq(product_id))
        .all(&state.orm)
        .await?;

    let count = reviews.len() as i64;
    let average = if count == 0 {
        0.0
    } else {
        reviews.iter().map(|r| r.rating as f64).sum::<f64>() / count as f64
    };

    Ok(ApiResponse::success(
        "Average rating",
        AverageRating { average, count },
        None,
    ))
}

fn review_dto(review: ReviewModel, user: Option<UserModel>) -> ReviewDto {
    ReviewDto {
        id: review.id,
        product_id: review.product_id,
        user_id: review.user_id,
        username: user.map(|u| u.username),
        rating: review.rating,
        comment: review.comment,
        created_at: review.created_at.with_timezone(&Utc),
        modified_at: review.modified_at.map(|t| t.with_timezone(&Utc)),
    }
}
