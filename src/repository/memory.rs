use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    AppError, Item, ListEntry, ListEntryView, NewItem, ShoppingList, ShoppingListView,
};

use super::{
    EntryChanges, ItemRepository, ListItemRepository, ShoppingListChanges,
    ShoppingListRepository,
};

/// Backing store for the in-memory repositories. All three repositories share
/// one store so relation loading sees a consistent picture, mirroring what the
/// database gives the Postgres implementations.
#[derive(Debug, Default)]
pub struct StoreInner {
    items: Vec<Item>,
    lists: Vec<ShoppingList>,
    entries: Vec<ListEntry>,
}

pub type SharedStore = Arc<RwLock<StoreInner>>;

pub fn shared_store() -> SharedStore {
    Arc::new(RwLock::new(StoreInner::default()))
}

impl StoreInner {
    fn entry_views(&self, list_id: Uuid) -> Vec<ListEntryView> {
        self.entries
            .iter()
            .filter(|e| e.list_id == list_id)
            .filter_map(|e| {
                let item = self.items.iter().find(|i| i.id == e.item_id)?;
                Some(ListEntryView {
                    quantity: e.quantity,
                    is_purchased: e.is_purchased,
                    item: item.clone(),
                })
            })
            .collect()
    }

    fn view(&self, list: &ShoppingList, with_relations: bool) -> ShoppingListView {
        ShoppingListView {
            list: list.clone(),
            shopping_list_items: with_relations.then(|| self.entry_views(list.id)),
        }
    }
}

pub struct InMemoryItemRepository {
    store: SharedStore,
}

impl InMemoryItemRepository {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ItemRepository for InMemoryItemRepository {
    async fn list(&self) -> Result<Vec<Item>, AppError> {
        let store = self.store.read().await;
        let mut items = store.items.clone();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Item>, AppError> {
        let store = self.store.read().await;
        Ok(store.items.iter().find(|i| i.id == id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Item>, AppError> {
        let store = self.store.read().await;
        Ok(store.items.iter().find(|i| i.name == name).cloned())
    }

    async fn find_by_names_or_ids(
        &self,
        names: &[String],
        ids: &[Uuid],
    ) -> Result<Vec<Item>, AppError> {
        let store = self.store.read().await;
        Ok(store
            .items
            .iter()
            .filter(|i| ids.contains(&i.id) || names.contains(&i.name))
            .cloned()
            .collect())
    }

    async fn create_many(&self, items: Vec<NewItem>) -> Result<Vec<Item>, AppError> {
        let mut store = self.store.write().await;
        let mut created = Vec::new();
        for item in items {
            // conflict-do-nothing on the unique name
            if store.items.iter().any(|i| i.name == item.name) {
                continue;
            }
            let item = Item {
                id: Uuid::new_v4(),
                name: item.name,
                description: item.description,
            };
            store.items.push(item.clone());
            created.push(item);
        }
        Ok(created)
    }

    async fn update(&self, id: Uuid, item: NewItem) -> Result<Item, AppError> {
        let mut store = self.store.write().await;
        let existing = store
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| AppError::NotFound("Item not found".into()))?;
        existing.name = item.name;
        existing.description = item.description;
        Ok(existing.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let mut store = self.store.write().await;
        store.items.retain(|i| i.id != id);
        Ok(())
    }
}

pub struct InMemoryShoppingListRepository {
    store: SharedStore,
}

impl InMemoryShoppingListRepository {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ShoppingListRepository for InMemoryShoppingListRepository {
    async fn list(&self, with_relations: bool) -> Result<Vec<ShoppingListView>, AppError> {
        let store = self.store.read().await;
        let mut lists = store.lists.clone();
        lists.sort_by_key(|l| l.created_at);
        Ok(lists.iter().map(|l| store.view(l, with_relations)).collect())
    }

    async fn find_by_id(
        &self,
        id: Uuid,
        with_relations: bool,
    ) -> Result<Option<ShoppingListView>, AppError> {
        let store = self.store.read().await;
        Ok(store
            .lists
            .iter()
            .find(|l| l.id == id)
            .map(|l| store.view(l, with_relations)))
    }

    async fn search(
        &self,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Vec<ShoppingList>, AppError> {
        let store = self.store.read().await;
        let mut hits: Vec<ShoppingList> = if name.is_none() && description.is_none() {
            store.lists.clone()
        } else {
            store
                .lists
                .iter()
                .filter(|l| {
                    let name_hit = name.is_some_and(|n| l.name.contains(n));
                    let desc_hit = description.is_some_and(|d| {
                        l.description.as_deref().is_some_and(|ld| ld.contains(d))
                    });
                    name_hit || desc_hit
                })
                .cloned()
                .collect()
        };
        hits.sort_by_key(|l| l.created_at);
        Ok(hits)
    }

    async fn create(
        &self,
        name: String,
        description: Option<String>,
    ) -> Result<ShoppingList, AppError> {
        let mut store = self.store.write().await;
        let list = ShoppingList {
            id: Uuid::new_v4(),
            name,
            description,
            is_favorite: false,
            created_at: Utc::now(),
        };
        store.lists.push(list.clone());
        Ok(list)
    }

    async fn update(
        &self,
        id: Uuid,
        changes: ShoppingListChanges,
    ) -> Result<ShoppingList, AppError> {
        let mut store = self.store.write().await;
        let list = store
            .lists
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| AppError::NotFound("ShoppingList not found".into()))?;
        if let Some(name) = changes.name {
            list.name = name;
        }
        if let Some(description) = changes.description {
            list.description = Some(description);
        }
        Ok(list.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let mut store = self.store.write().await;
        store.lists.retain(|l| l.id != id);
        Ok(())
    }

    async fn attach_items(&self, list_id: Uuid, item_ids: &[Uuid]) -> Result<(), AppError> {
        let mut store = self.store.write().await;
        for item_id in item_ids {
            store.entries.push(ListEntry {
                list_id,
                item_id: *item_id,
                quantity: 1,
                is_purchased: false,
            });
        }
        Ok(())
    }

    async fn favorites(&self, with_relations: bool) -> Result<Vec<ShoppingListView>, AppError> {
        let store = self.store.read().await;
        let mut favorites: Vec<&ShoppingList> =
            store.lists.iter().filter(|l| l.is_favorite).collect();
        favorites.sort_by_key(|l| l.created_at);
        Ok(favorites
            .into_iter()
            .map(|l| store.view(l, with_relations))
            .collect())
    }

    async fn set_favorite(&self, id: Uuid, is_favorite: bool) -> Result<ShoppingList, AppError> {
        let mut store = self.store.write().await;
        let list = store
            .lists
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| AppError::NotFound("ShoppingList not found".into()))?;
        list.is_favorite = is_favorite;
        Ok(list.clone())
    }
}

pub struct InMemoryListItemRepository {
    store: SharedStore,
}

impl InMemoryListItemRepository {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ListItemRepository for InMemoryListItemRepository {
    async fn find_entry(
        &self,
        list_id: Uuid,
        item_id: Uuid,
    ) -> Result<Option<ListEntry>, AppError> {
        let store = self.store.read().await;
        Ok(store
            .entries
            .iter()
            .find(|e| e.list_id == list_id && e.item_id == item_id)
            .cloned())
    }

    async fn find_any_for_item(&self, item_id: Uuid) -> Result<Option<ListEntry>, AppError> {
        let store = self.store.read().await;
        Ok(store.entries.iter().find(|e| e.item_id == item_id).cloned())
    }

    async fn find_any_for_list(&self, list_id: Uuid) -> Result<Option<ListEntry>, AppError> {
        let store = self.store.read().await;
        Ok(store.entries.iter().find(|e| e.list_id == list_id).cloned())
    }

    async fn entries_for_item(&self, item_id: Uuid) -> Result<Vec<ListEntry>, AppError> {
        let store = self.store.read().await;
        Ok(store
            .entries
            .iter()
            .filter(|e| e.item_id == item_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, entry: ListEntry) -> Result<ListEntry, AppError> {
        let mut store = self.store.write().await;
        if store
            .entries
            .iter()
            .any(|e| e.list_id == entry.list_id && e.item_id == entry.item_id)
        {
            return Err(AppError::Conflict("Item already in the ShoppingList".into()));
        }
        store.entries.push(entry.clone());
        Ok(entry)
    }

    async fn update_entry(
        &self,
        list_id: Uuid,
        item_id: Uuid,
        changes: EntryChanges,
    ) -> Result<Option<ListEntry>, AppError> {
        let mut store = self.store.write().await;
        let Some(entry) = store
            .entries
            .iter_mut()
            .find(|e| e.list_id == list_id && e.item_id == item_id)
        else {
            return Ok(None);
        };
        if let Some(quantity) = changes.quantity {
            entry.quantity = quantity;
        }
        if let Some(is_purchased) = changes.is_purchased {
            entry.is_purchased = is_purchased;
        }
        Ok(Some(entry.clone()))
    }

    async fn delete_entry(&self, list_id: Uuid, item_id: Uuid) -> Result<u64, AppError> {
        let mut store = self.store.write().await;
        let before = store.entries.len();
        store
            .entries
            .retain(|e| !(e.list_id == list_id && e.item_id == item_id));
        Ok((before - store.entries.len()) as u64)
    }

    async fn delete_for_list(&self, list_id: Uuid) -> Result<u64, AppError> {
        let mut store = self.store.write().await;
        let before = store.entries.len();
        store.entries.retain(|e| e.list_id != list_id);
        Ok((before - store.entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::super::RepositoryFactory;
    use super::*;

    #[tokio::test]
    async fn create_many_skips_duplicate_names() {
        let repos = RepositoryFactory::in_memory();
        let first = repos
            .items
            .create_many(vec![NewItem { name: "Milk".into(), description: None }])
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        let second = repos
            .items
            .create_many(vec![
                NewItem { name: "Milk".into(), description: None },
                NewItem { name: "Bread".into(), description: Some("whole grain".into()) },
            ])
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].name, "Bread");
    }

    #[tokio::test]
    async fn relations_are_visible_across_repositories() {
        let repos = RepositoryFactory::in_memory();
        let items = repos
            .items
            .create_many(vec![NewItem { name: "Eggs".into(), description: None }])
            .await
            .unwrap();
        let list = repos.lists.create("Weekly".into(), None).await.unwrap();
        repos.lists.attach_items(list.id, &[items[0].id]).await.unwrap();

        let view = repos.lists.find_by_id(list.id, true).await.unwrap().unwrap();
        let entries = view.shopping_list_items.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].item.name, "Eggs");
        assert_eq!(entries[0].quantity, 1);
        assert!(!entries[0].is_purchased);

        let bare = repos.lists.find_by_id(list.id, false).await.unwrap().unwrap();
        assert!(bare.shopping_list_items.is_none());
    }

    #[tokio::test]
    async fn duplicate_entry_insert_conflicts() {
        let repos = RepositoryFactory::in_memory();
        let entry = ListEntry {
            list_id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            quantity: 2,
            is_purchased: false,
        };
        repos.entries.insert(entry.clone()).await.unwrap();
        let err = repos.entries.insert(entry).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn search_and_favorites_order_by_creation_time() {
        let repos = RepositoryFactory::in_memory();
        let first = repos.lists.create("Alpha".into(), Some("tagged".into())).await.unwrap();
        let second = repos.lists.create("Beta".into(), Some("tagged".into())).await.unwrap();

        // Favoriting out of order must not affect the result order.
        repos.lists.set_favorite(second.id, true).await.unwrap();
        repos.lists.set_favorite(first.id, true).await.unwrap();

        let favorites = repos.lists.favorites(false).await.unwrap();
        let names: Vec<&str> = favorites.iter().map(|v| v.list.name.as_str()).collect();
        assert_eq!(names, ["Alpha", "Beta"]);

        let hits = repos.lists.search(None, Some("tagged")).await.unwrap();
        let names: Vec<&str> = hits.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["Alpha", "Beta"]);
    }

    #[tokio::test]
    async fn search_matches_name_or_description() {
        let repos = RepositoryFactory::in_memory();
        repos.lists.create("Groceries".into(), Some("weekly run".into())).await.unwrap();
        repos.lists.create("Hardware".into(), None).await.unwrap();

        let by_name = repos.lists.search(Some("Groc"), None).await.unwrap();
        assert_eq!(by_name.len(), 1);

        let by_desc = repos.lists.search(None, Some("weekly")).await.unwrap();
        assert_eq!(by_desc.len(), 1);

        let all = repos.lists.search(None, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let none = repos.lists.search(Some("xyz"), None).await.unwrap();
        assert!(none.is_empty());
    }
}
