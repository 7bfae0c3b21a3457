//! Client-side cart state: the guest-cart local store, the optimistic update
//! coordinator and the login-time reconciliation that drains a guest cart
//! into the server-authoritative one.
//!
//! Nothing here touches the UI; the coordinator is a plain state container
//! that callers inject a [`CartBackend`] and a [`local::KeyValueStorage`]
//! into, so both the optimistic protocol and the reconciliation loop are
//! testable without a server.

pub mod local;
pub mod store;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use local::{KeyValueStorage, LocalCartStore, MemoryStorage};
pub use store::{CartStore, MigrationOutcome, MigrationStatus};

/// Denormalized product snapshot carried by guest cart lines (there is no
/// session to join against the catalog) and by the view-state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: Uuid,
    pub name: String,
    pub price: i64,
    /// Listing owner, used for the own-listing exclusion at reconciliation.
    pub created_by: Uuid,
}

/// One guest cart line, serialized into the guest storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalCartItem {
    pub product_id: Uuid,
    pub quantity: i32,
    pub product: Option<ProductSummary>,
}

/// One view-state line. Server-backed lines carry the server-assigned cart
/// item id; optimistic placeholders and guest lines do not.
#[derive(Debug, Clone, PartialEq)]
pub struct CartEntry {
    pub cart_item_id: Option<Uuid>,
    pub product_id: Uuid,
    pub quantity: i32,
    pub product: Option<ProductSummary>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CartClientError {
    /// The server answered with a business failure (validation, not-found,
    /// forbidden); the message is surfaced to the caller verbatim.
    #[error("{0}")]
    Api(String),

    #[error("request failed: {0}")]
    Transport(String),
}

/// The seam between the coordinator and the cart server. Production code
/// backs this with an HTTP client; tests back it with an in-memory mock.
#[allow(async_fn_in_trait)]
pub trait CartBackend {
    async fn fetch_items(&self, user_id: Uuid) -> Result<Vec<CartEntry>, CartClientError>;
    async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), CartClientError>;
    async fn update_quantity(
        &self,
        user_id: Uuid,
        cart_item_id: Uuid,
        quantity: i32,
    ) -> Result<(), CartClientError>;
    async fn remove_item(&self, user_id: Uuid, cart_item_id: Uuid)
    -> Result<(), CartClientError>;
    async fn clear(&self, user_id: Uuid) -> Result<(), CartClientError>;
}
