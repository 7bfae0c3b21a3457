use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        cart::{AddItemRequest, CartCount, CartItemDto, CartItemList, CartTotal, UpdateQuantityRequest},
        products::{CreateProductRequest, ProductList, UpdateProductRequest},
        reviews::{AverageRating, CreateReviewRequest, ReviewDto, ReviewList, UpdateReviewRequest},
    },
    models::{CartItem, Product, Review, User},
    response::{ApiResponse, Meta},
    routes::{auth, cart, health, params, products as product_routes, reviews},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        cart::get_items,
        cart::add_item,
        cart::update_item_quantity,
        cart::remove_item,
        cart::clear_cart,
        cart::get_total,
        cart::get_item_count,
        product_routes::list_products,
        product_routes::get_product,
        product_routes::list_products_by_user,
        product_routes::create_product,
        product_routes::update_product,
        product_routes::delete_product,
        reviews::list_by_product,
        reviews::list_by_user,
        reviews::get_review,
        reviews::average_rating,
        reviews::create_review,
        reviews::update_review,
        reviews::delete_review
    ),
    components(
        schemas(
            User,
            Product,
            Review,
            CartItem,
            CartItemDto,
            CartItemList,
            CartTotal,
            CartCount,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            AddItemRequest,
            UpdateQuantityRequest,
            CreateProductRequest,
            UpdateProductRequest,
            ProductList,
            CreateReviewRequest,
            UpdateReviewRequest,
            ReviewDto,
            ReviewList,
            AverageRating,
            params::Pagination,
            params::ProductQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<CartItemList>,
            ApiResponse<ReviewList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Products", description = "Product catalog endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Reviews", description = "Review endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
