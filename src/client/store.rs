use uuid::Uuid;

use super::local::{KeyValueStorage, LocalCartStore};
use super::{CartBackend, CartEntry, LocalCartItem, ProductSummary};

/// Per-item result of the guest-cart reconciliation, kept structured so
/// partial failure is observable instead of silently dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationOutcome {
    pub product_id: Uuid,
    pub status: MigrationStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MigrationStatus {
    Migrated,
    /// The logged-in user owns this listing; it is dropped, not migrated.
    SkippedOwnListing,
    Failed(String),
}

/// Optimistic cart coordinator.
///
/// Every mutation is applied to the in-memory view-state first, then
/// confirmed or rolled back on the backend's answer. Adds re-fetch the full
/// cart on success because the server assigns line ids the optimistic
/// placeholder lacks; updates, removes and clears keep the already-applied
/// state. Without an authenticated session all mutations go straight to the
/// guest store, which is synchronous, so there is nothing to roll back.
///
/// Each state replacement bumps a version token and rollbacks carry the
/// token of the state they would restore past; a rollback that arrives
/// after a newer mutation already replaced the state is discarded so it
/// cannot clobber the later mutation's effect.
pub struct CartStore<B, S> {
    backend: B,
    local: LocalCartStore<S>,
    session: Option<Uuid>,
    items: Vec<CartEntry>,
    total: i64,
    item_count: i64,
    last_error: Option<String>,
    version: u64,
}

impl<B: CartBackend, S: KeyValueStorage> CartStore<B, S> {
    pub fn new(backend: B, local: LocalCartStore<S>) -> Self {
        Self {
            backend,
            local,
            session: None,
            items: Vec::new(),
            total: 0,
            item_count: 0,
            last_error: None,
            version: 0,
        }
    }

    pub fn items(&self) -> &[CartEntry] {
        &self.items
    }

    /// Derived from the current view-state; never separately persisted.
    pub fn total(&self) -> i64 {
        self.total
    }

    pub fn item_count(&self) -> i64 {
        self.item_count
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Load the view-state: from the server when a session is given, from
    /// the guest store otherwise.
    pub async fn load(&mut self, user: Option<Uuid>) {
        self.session = user;
        self.last_error = None;
        match user {
            Some(user_id) => match self.backend.fetch_items(user_id).await {
                Ok(items) => {
                    self.install(items);
                }
                Err(err) => self.last_error = Some(err.to_string()),
            },
            None => {
                let items = self.local.items().into_iter().map(entry_from_local).collect();
                self.install(items);
            }
        }
    }

    pub async fn add_to_cart(&mut self, product: &ProductSummary, quantity: i32) {
        self.last_error = None;

        let Some(user_id) = self.session else {
            self.local.add(product.id, quantity, Some(product.clone()));
            let items = self.local.items().into_iter().map(entry_from_local).collect();
            self.install(items);
            return;
        };

        let mut updated = self.items.clone();
        if let Some(existing) = updated.iter_mut().find(|e| e.product_id == product.id) {
            existing.quantity += quantity;
        } else {
            updated.push(CartEntry {
                cart_item_id: None,
                product_id: product.id,
                quantity,
                product: Some(product.clone()),
            });
        }

        let (snapshot, token) = self.apply(updated);
        match self.backend.add_item(user_id, product.id, quantity).await {
            // The optimistic line has no server id; replace the whole state
            // with the authoritative cart.
            Ok(()) => match self.backend.fetch_items(user_id).await {
                Ok(items) => {
                    self.install(items);
                }
                Err(err) => self.rollback(snapshot, token, err.to_string()),
            },
            Err(err) => self.rollback(snapshot, token, err.to_string()),
        }
    }

    pub async fn update_quantity(&mut self, product_id: Uuid, quantity: i32) {
        self.last_error = None;

        // Zero or below means remove, never an update call.
        if quantity <= 0 {
            self.remove_from_cart(product_id).await;
            return;
        }

        let Some(index) = self.items.iter().position(|e| e.product_id == product_id) else {
            return;
        };

        let Some(user_id) = self.session else {
            self.local.update_quantity(product_id, quantity);
            let items = self.local.items().into_iter().map(entry_from_local).collect();
            self.install(items);
            return;
        };

        let Some(cart_item_id) = self.items[index].cart_item_id else {
            // Placeholder line still awaiting its server id.
            return;
        };

        let mut updated = self.items.clone();
        updated[index].quantity = quantity;

        let (snapshot, token) = self.apply(updated);
        if let Err(err) = self
            .backend
            .update_quantity(user_id, cart_item_id, quantity)
            .await
        {
            self.rollback(snapshot, token, err.to_string());
        }
    }

    pub async fn remove_from_cart(&mut self, product_id: Uuid) {
        self.last_error = None;

        let Some(index) = self.items.iter().position(|e| e.product_id == product_id) else {
            return;
        };

        let Some(user_id) = self.session else {
            self.local.remove(product_id);
            let items = self.local.items().into_iter().map(entry_from_local).collect();
            self.install(items);
            return;
        };

        let Some(cart_item_id) = self.items[index].cart_item_id else {
            return;
        };

        let updated: Vec<CartEntry> = self
            .items
            .iter()
            .filter(|e| e.product_id != product_id)
            .cloned()
            .collect();

        let (snapshot, token) = self.apply(updated);
        if let Err(err) = self.backend.remove_item(user_id, cart_item_id).await {
            self.rollback(snapshot, token, err.to_string());
        }
    }

    pub async fn clear_cart(&mut self) {
        self.last_error = None;

        let Some(user_id) = self.session else {
            self.local.clear();
            self.install(Vec::new());
            return;
        };

        let (snapshot, token) = self.apply(Vec::new());
        if let Err(err) = self.backend.clear(user_id).await {
            self.rollback(snapshot, token, err.to_string());
        }
    }

    /// Drain the guest cart into the authoritative one after login.
    ///
    /// Own listings are skipped and reported; a single item's failure does
    /// not abort the loop. The guest store is cleared unconditionally and
    /// the authoritative cart reloaded afterwards.
    pub async fn sync_to_server(&mut self, user_id: Uuid) -> Vec<MigrationOutcome> {
        self.session = Some(user_id);

        let local_items = self.local.items();
        if local_items.is_empty() {
            return Vec::new();
        }

        let mut outcomes = Vec::with_capacity(local_items.len());
        let mut skipped_names: Vec<String> = Vec::new();

        for item in &local_items {
            if let Some(product) = &item.product {
                if product.created_by == user_id {
                    skipped_names.push(product.name.clone());
                    outcomes.push(MigrationOutcome {
                        product_id: item.product_id,
                        status: MigrationStatus::SkippedOwnListing,
                    });
                    continue;
                }
            }
            match self
                .backend
                .add_item(user_id, item.product_id, item.quantity)
                .await
            {
                Ok(()) => outcomes.push(MigrationOutcome {
                    product_id: item.product_id,
                    status: MigrationStatus::Migrated,
                }),
                Err(err) => {
                    tracing::warn!(product_id = %item.product_id, error = %err, "cart migration failed for item");
                    outcomes.push(MigrationOutcome {
                        product_id: item.product_id,
                        status: MigrationStatus::Failed(err.to_string()),
                    });
                }
            }
        }

        // Skipped items are discarded with the rest of the guest cart, not
        // kept for the user to resolve.
        self.local.clear();
        self.load(Some(user_id)).await;

        if !skipped_names.is_empty() {
            self.last_error = Some(format!(
                "these products were not added to your cart because you are their seller: {}",
                skipped_names.join(", ")
            ));
        }

        outcomes
    }

    /// Replace the view-state, returning the prior state and the token a
    /// matching rollback must present.
    fn apply(&mut self, items: Vec<CartEntry>) -> (Vec<CartEntry>, u64) {
        let snapshot = std::mem::replace(&mut self.items, items);
        self.version += 1;
        let token = self.version;
        self.recalculate();
        (snapshot, token)
    }

    /// Install authoritative state (confirm step).
    fn install(&mut self, items: Vec<CartEntry>) {
        self.items = items;
        self.version += 1;
        self.recalculate();
    }

    /// Restore the pre-mutation snapshot unless a newer mutation has already
    /// replaced the state; the error is surfaced either way.
    fn rollback(&mut self, snapshot: Vec<CartEntry>, token: u64, message: String) {
        if self.version == token {
            self.items = snapshot;
            self.version += 1;
            self.recalculate();
        } else {
            tracing::debug!(token, current = self.version, "discarding stale rollback");
        }
        self.last_error = Some(message);
    }

    fn recalculate(&mut self) {
        let mut total = 0_i64;
        let mut count = 0_i64;
        for entry in &self.items {
            count += i64::from(entry.quantity);
            let price = entry.product.as_ref().map_or(0, |p| p.price);
            total += price * i64::from(entry.quantity);
        }
        self.total = total;
        self.item_count = count;
    }
}

fn entry_from_local(item: LocalCartItem) -> CartEntry {
    CartEntry {
        cart_item_id: None,
        product_id: item.product_id,
        quantity: item.quantity,
        product: item.product,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::super::local::MemoryStorage;
    use super::super::CartClientError;
    use super::*;

    #[derive(Default)]
    struct MockBackend {
        state: RefCell<MockState>,
    }

    #[derive(Default)]
    struct MockState {
        items: Vec<CartEntry>,
        catalog: HashMap<Uuid, ProductSummary>,
        fail_next: Option<String>,
        add_calls: Vec<(Uuid, i32)>,
    }

    impl MockBackend {
        fn with_catalog(products: &[ProductSummary]) -> Self {
            let backend = Self::default();
            {
                let mut state = backend.state.borrow_mut();
                for product in products {
                    state.catalog.insert(product.id, product.clone());
                }
            }
            backend
        }

        fn fail_next(&self, message: &str) {
            self.state.borrow_mut().fail_next = Some(message.to_string());
        }

        fn take_failure(&self) -> Option<CartClientError> {
            self.state
                .borrow_mut()
                .fail_next
                .take()
                .map(CartClientError::Api)
        }
    }

    impl CartBackend for MockBackend {
        async fn fetch_items(&self, _user_id: Uuid) -> Result<Vec<CartEntry>, CartClientError> {
            Ok(self.state.borrow().items.clone())
        }

        async fn add_item(
            &self,
            _user_id: Uuid,
            product_id: Uuid,
            quantity: i32,
        ) -> Result<(), CartClientError> {
            if let Some(err) = self.take_failure() {
                return Err(err);
            }
            let mut state = self.state.borrow_mut();
            state.add_calls.push((product_id, quantity));
            let product = state.catalog.get(&product_id).cloned();
            if let Some(existing) = state.items.iter_mut().find(|e| e.product_id == product_id) {
                existing.quantity += quantity;
            } else {
                state.items.push(CartEntry {
                    cart_item_id: Some(Uuid::new_v4()),
                    product_id,
                    quantity,
                    product,
                });
            }
            Ok(())
        }

        async fn update_quantity(
            &self,
            _user_id: Uuid,
            cart_item_id: Uuid,
            quantity: i32,
        ) -> Result<(), CartClientError> {
            if let Some(err) = self.take_failure() {
                return Err(err);
            }
            let mut state = self.state.borrow_mut();
            if let Some(entry) = state
                .items
                .iter_mut()
                .find(|e| e.cart_item_id == Some(cart_item_id))
            {
                entry.quantity = quantity;
            }
            Ok(())
        }

        async fn remove_item(
            &self,
            _user_id: Uuid,
            cart_item_id: Uuid,
        ) -> Result<(), CartClientError> {
            if let Some(err) = self.take_failure() {
                return Err(err);
            }
            self.state
                .borrow_mut()
                .items
                .retain(|e| e.cart_item_id != Some(cart_item_id));
            Ok(())
        }

        async fn clear(&self, _user_id: Uuid) -> Result<(), CartClientError> {
            if let Some(err) = self.take_failure() {
                return Err(err);
            }
            self.state.borrow_mut().items.clear();
            Ok(())
        }
    }

    fn product(name: &str, price: i64, owner: Uuid) -> ProductSummary {
        ProductSummary {
            id: Uuid::new_v4(),
            name: name.into(),
            price,
            created_by: owner,
        }
    }

    fn guest_store() -> CartStore<MockBackend, MemoryStorage> {
        CartStore::new(
            MockBackend::default(),
            LocalCartStore::new(MemoryStorage::default()),
        )
    }

    #[tokio::test]
    async fn guest_add_merges_lines_and_derives_totals() {
        let mut store = guest_store();
        let mug = product("Ceramic Mug", 1800, Uuid::new_v4());

        store.add_to_cart(&mug, 2).await;
        store.add_to_cart(&mug, 3).await;

        assert_eq!(store.items().len(), 1);
        assert_eq!(store.items()[0].quantity, 5);
        assert_eq!(store.item_count(), 5);
        assert_eq!(store.total(), 9000);
        assert!(store.last_error().is_none());
    }

    #[tokio::test]
    async fn quantity_zero_update_removes_the_line() {
        let mut store = guest_store();
        let mug = product("Ceramic Mug", 1800, Uuid::new_v4());

        store.add_to_cart(&mug, 2).await;
        store.update_quantity(mug.id, 0).await;

        assert!(store.items().is_empty());
        assert_eq!(store.total(), 0);
        assert_eq!(store.item_count(), 0);
    }

    #[tokio::test]
    async fn authenticated_add_adopts_server_assigned_ids() {
        let user_id = Uuid::new_v4();
        let mug = product("Ceramic Mug", 1800, Uuid::new_v4());
        let backend = MockBackend::with_catalog(&[mug.clone()]);
        let mut store = CartStore::new(backend, LocalCartStore::new(MemoryStorage::default()));

        store.load(Some(user_id)).await;
        store.add_to_cart(&mug, 2).await;

        assert_eq!(store.items().len(), 1);
        assert!(store.items()[0].cart_item_id.is_some());
        assert_eq!(store.total(), 3600);
    }

    #[tokio::test]
    async fn failed_update_restores_the_exact_prior_state() {
        let user_id = Uuid::new_v4();
        let mug = product("Ceramic Mug", 1800, Uuid::new_v4());
        let backend = MockBackend::with_catalog(&[mug.clone()]);
        let mut store = CartStore::new(backend, LocalCartStore::new(MemoryStorage::default()));

        store.load(Some(user_id)).await;
        store.add_to_cart(&mug, 2).await;

        let items_before = store.items().to_vec();
        let total_before = store.total();
        let count_before = store.item_count();

        store.backend.fail_next("quantity must be between 1 and 100, got 200");
        store.update_quantity(mug.id, 200).await;

        assert_eq!(store.items(), items_before.as_slice());
        assert_eq!(store.total(), total_before);
        assert_eq!(store.item_count(), count_before);
        assert_eq!(
            store.last_error(),
            Some("quantity must be between 1 and 100, got 200")
        );
    }

    #[tokio::test]
    async fn failed_remove_rolls_back() {
        let user_id = Uuid::new_v4();
        let mug = product("Ceramic Mug", 1800, Uuid::new_v4());
        let backend = MockBackend::with_catalog(&[mug.clone()]);
        let mut store = CartStore::new(backend, LocalCartStore::new(MemoryStorage::default()));

        store.load(Some(user_id)).await;
        store.add_to_cart(&mug, 1).await;

        store.backend.fail_next("cart item not found");
        store.remove_from_cart(mug.id).await;

        assert_eq!(store.items().len(), 1);
        assert_eq!(store.last_error(), Some("cart item not found"));
    }

    #[tokio::test]
    async fn stale_rollback_is_discarded() {
        let mut store = guest_store();
        let first = vec![CartEntry {
            cart_item_id: None,
            product_id: Uuid::new_v4(),
            quantity: 1,
            product: None,
        }];
        let second = vec![CartEntry {
            cart_item_id: None,
            product_id: Uuid::new_v4(),
            quantity: 7,
            product: None,
        }];

        let (snapshot, token) = store.apply(first);
        let (_later_snapshot, _later_token) = store.apply(second.clone());

        // The first mutation's rollback arrives after the second mutation
        // already replaced the state; it must not clobber it.
        store.rollback(snapshot, token, "late failure".into());

        assert_eq!(store.items(), second.as_slice());
        assert_eq!(store.last_error(), Some("late failure"));
    }

    #[tokio::test]
    async fn reconciliation_skips_own_listings_and_reports_them() {
        let user_id = Uuid::new_v4();
        let own = product("Walnut Desk Organizer", 4500, user_id);
        let other = product("Ceramic Mug", 1800, Uuid::new_v4());
        let backend = MockBackend::with_catalog(&[own.clone(), other.clone()]);
        let mut store = CartStore::new(backend, LocalCartStore::new(MemoryStorage::default()));

        store.add_to_cart(&own, 1).await;
        store.add_to_cart(&other, 2).await;

        let outcomes = store.sync_to_server(user_id).await;

        assert_eq!(
            outcomes,
            vec![
                MigrationOutcome {
                    product_id: own.id,
                    status: MigrationStatus::SkippedOwnListing,
                },
                MigrationOutcome {
                    product_id: other.id,
                    status: MigrationStatus::Migrated,
                },
            ]
        );
        // Only the other seller's product reached the server cart.
        assert_eq!(store.items().len(), 1);
        assert_eq!(store.items()[0].product_id, other.id);
        // The guest store ends empty either way.
        assert!(store.local.items().is_empty());
        let warning = store.last_error().unwrap();
        assert!(warning.contains("Walnut Desk Organizer"));
    }

    #[tokio::test]
    async fn reconciliation_continues_past_a_failed_item() {
        let user_id = Uuid::new_v4();
        let first = product("Linen Tote Bag", 2900, Uuid::new_v4());
        let second = product("Ceramic Mug", 1800, Uuid::new_v4());
        let backend = MockBackend::with_catalog(&[first.clone(), second.clone()]);
        let mut store = CartStore::new(backend, LocalCartStore::new(MemoryStorage::default()));

        store.add_to_cart(&first, 1).await;
        store.add_to_cart(&second, 1).await;

        store.backend.fail_next("product not found");
        let outcomes = store.sync_to_server(user_id).await;

        assert_eq!(outcomes[0].status, MigrationStatus::Failed("product not found".into()));
        assert_eq!(outcomes[1].status, MigrationStatus::Migrated);
        assert!(store.local.items().is_empty());
    }

    #[tokio::test]
    async fn empty_guest_cart_reconciliation_is_a_noop() {
        let user_id = Uuid::new_v4();
        let mut store = guest_store();

        let outcomes = store.sync_to_server(user_id).await;

        assert!(outcomes.is_empty());
        assert!(store.backend.state.borrow().add_calls.is_empty());
    }
}
