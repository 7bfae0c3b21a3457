use std::collections::HashMap;

use super::{LocalCartItem, ProductSummary};
use uuid::Uuid;

/// Well-known key the serialized guest cart lives under.
pub const CART_STORAGE_KEY: &str = "guest_cart";

/// Durable browser-style key-value storage. Synchronous by design: guest
/// mutations have no optimistic/rollback distinction.
pub trait KeyValueStorage {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String);
    fn remove(&mut self, key: &str);
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

/// Guest cart over a key-value storage: one JSON list under one key.
#[derive(Debug)]
pub struct LocalCartStore<S> {
    storage: S,
}

impl<S: KeyValueStorage> LocalCartStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Unreadable or corrupt stored data reads as an empty cart.
    pub fn items(&self) -> Vec<LocalCartItem> {
        let Some(raw) = self.storage.get(CART_STORAGE_KEY) else {
            return Vec::new();
        };
        match serde_json::from_str(&raw) {
            Ok(items) => items,
            Err(err) => {
                tracing::warn!(error = %err, "discarding unreadable guest cart");
                Vec::new()
            }
        }
    }

    /// Adding an already-present product increments its quantity instead of
    /// duplicating the line.
    pub fn add(&mut self, product_id: Uuid, quantity: i32, product: Option<ProductSummary>) {
        let mut items = self.items();
        if let Some(existing) = items.iter_mut().find(|i| i.product_id == product_id) {
            existing.quantity += quantity;
        } else {
            items.push(LocalCartItem {
                product_id,
                quantity,
                product,
            });
        }
        self.save(&items);
    }

    /// A quantity of zero or below removes the line.
    pub fn update_quantity(&mut self, product_id: Uuid, quantity: i32) {
        let mut items = self.items();
        let Some(index) = items.iter().position(|i| i.product_id == product_id) else {
            return;
        };
        if quantity <= 0 {
            items.remove(index);
        } else {
            items[index].quantity = quantity;
        }
        self.save(&items);
    }

    pub fn remove(&mut self, product_id: Uuid) {
        let mut items = self.items();
        items.retain(|i| i.product_id != product_id);
        self.save(&items);
    }

    pub fn clear(&mut self) {
        self.storage.remove(CART_STORAGE_KEY);
    }

    fn save(&mut self, items: &[LocalCartItem]) {
        match serde_json::to_string(items) {
            Ok(raw) => self.storage.set(CART_STORAGE_KEY, raw),
            Err(err) => tracing::warn!(error = %err, "failed to persist guest cart"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(owner: Uuid) -> ProductSummary {
        ProductSummary {
            id: Uuid::new_v4(),
            name: "Ceramic Mug".into(),
            price: 1800,
            created_by: owner,
        }
    }

    #[test]
    fn add_merges_quantities_per_product() {
        let mut store = LocalCartStore::new(MemoryStorage::default());
        let product_id = Uuid::new_v4();
        store.add(product_id, 2, Some(summary(Uuid::new_v4())));
        store.add(product_id, 3, None);

        let items = store.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 5);
        // The original snapshot is kept on merge.
        assert!(items[0].product.is_some());
    }

    #[test]
    fn update_to_zero_removes_the_line() {
        let mut store = LocalCartStore::new(MemoryStorage::default());
        let product_id = Uuid::new_v4();
        store.add(product_id, 4, None);

        store.update_quantity(product_id, 0);
        assert!(store.items().is_empty());
    }

    #[test]
    fn update_of_absent_product_is_a_noop() {
        let mut store = LocalCartStore::new(MemoryStorage::default());
        store.update_quantity(Uuid::new_v4(), 3);
        assert!(store.items().is_empty());
    }

    #[test]
    fn corrupt_storage_reads_as_empty() {
        let mut storage = MemoryStorage::default();
        storage.set(CART_STORAGE_KEY, "{not json".into());
        let store = LocalCartStore::new(storage);
        assert!(store.items().is_empty());
    }

    #[test]
    fn clear_drops_the_key() {
        let mut store = LocalCartStore::new(MemoryStorage::default());
        store.add(Uuid::new_v4(), 1, None);
        store.clear();
        assert!(store.items().is_empty());
    }
}
