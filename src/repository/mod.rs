use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    AppError, Item, ListEntry, NewItem, ShoppingList, ShoppingListView,
};

mod memory;
mod postgres;

pub use memory::{InMemoryItemRepository, InMemoryListItemRepository, InMemoryShoppingListRepository};
pub use postgres::{PgItemRepository, PgListItemRepository, PgShoppingListRepository};

/// Fields of a list update; `None` means "leave unchanged".
#[derive(Debug, Clone, Default)]
pub struct ShoppingListChanges {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl ShoppingListChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

/// Fields of a join-row update; `None` means "leave unchanged".
#[derive(Debug, Clone, Default)]
pub struct EntryChanges {
    pub quantity: Option<i32>,
    pub is_purchased: Option<bool>,
}

#[async_trait]
pub trait ItemRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Item>, AppError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Item>, AppError>;
    async fn find_by_name(&self, name: &str) -> Result<Option<Item>, AppError>;
    /// Items whose id is in `ids` or whose name is in `names`.
    async fn find_by_names_or_ids(
        &self,
        names: &[String],
        ids: &[Uuid],
    ) -> Result<Vec<Item>, AppError>;
    /// Inserts with conflict-do-nothing on the unique name; returns the rows
    /// that were actually created.
    async fn create_many(&self, items: Vec<NewItem>) -> Result<Vec<Item>, AppError>;
    async fn update(&self, id: Uuid, item: NewItem) -> Result<Item, AppError>;
    async fn delete(&self, id: Uuid) -> Result<(), AppError>;
}

#[async_trait]
pub trait ShoppingListRepository: Send + Sync {
    async fn list(&self, with_relations: bool) -> Result<Vec<ShoppingListView>, AppError>;
    async fn find_by_id(
        &self,
        id: Uuid,
        with_relations: bool,
    ) -> Result<Option<ShoppingListView>, AppError>;
    /// Substring search over name and/or description; both absent returns all.
    async fn search(
        &self,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Vec<ShoppingList>, AppError>;
    async fn create(
        &self,
        name: String,
        description: Option<String>,
    ) -> Result<ShoppingList, AppError>;
    async fn update(
        &self,
        id: Uuid,
        changes: ShoppingListChanges,
    ) -> Result<ShoppingList, AppError>;
    async fn delete(&self, id: Uuid) -> Result<(), AppError>;
    /// Attaches items with quantity 1, not purchased.
    async fn attach_items(&self, list_id: Uuid, item_ids: &[Uuid]) -> Result<(), AppError>;
    async fn favorites(&self, with_relations: bool) -> Result<Vec<ShoppingListView>, AppError>;
    async fn set_favorite(&self, id: Uuid, is_favorite: bool) -> Result<ShoppingList, AppError>;
}

#[async_trait]
pub trait ListItemRepository: Send + Sync {
    async fn find_entry(&self, list_id: Uuid, item_id: Uuid)
        -> Result<Option<ListEntry>, AppError>;
    /// Any join row referencing the item, in whichever list.
    async fn find_any_for_item(&self, item_id: Uuid) -> Result<Option<ListEntry>, AppError>;
    /// Any join row belonging to the list.
    async fn find_any_for_list(&self, list_id: Uuid) -> Result<Option<ListEntry>, AppError>;
    async fn entries_for_item(&self, item_id: Uuid) -> Result<Vec<ListEntry>, AppError>;
    async fn insert(&self, entry: ListEntry) -> Result<ListEntry, AppError>;
    /// Updates the (list, item) row if it exists; `None` when no row matched.
    async fn update_entry(
        &self,
        list_id: Uuid,
        item_id: Uuid,
        changes: EntryChanges,
    ) -> Result<Option<ListEntry>, AppError>;
    /// Returns the number of rows removed.
    async fn delete_entry(&self, list_id: Uuid, item_id: Uuid) -> Result<u64, AppError>;
    async fn delete_for_list(&self, list_id: Uuid) -> Result<u64, AppError>;
}

/// The three repositories the handlers work against, wired either to Postgres
/// or to a shared in-memory store.
#[derive(Clone)]
pub struct Repositories {
    pub items: Arc<dyn ItemRepository>,
    pub lists: Arc<dyn ShoppingListRepository>,
    pub entries: Arc<dyn ListItemRepository>,
}

#[derive(Debug, Clone)]
pub struct RepositoryFactory;

impl RepositoryFactory {
    pub fn postgres(pool: PgPool) -> Repositories {
        Repositories {
            items: Arc::new(PgItemRepository::new(pool.clone())),
            lists: Arc::new(PgShoppingListRepository::new(pool.clone())),
            entries: Arc::new(PgListItemRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Repositories {
        let store = memory::shared_store();
        Repositories {
            items: Arc::new(InMemoryItemRepository::new(store.clone())),
            lists: Arc::new(InMemoryShoppingListRepository::new(store.clone())),
            entries: Arc::new(InMemoryListItemRepository::new(store)),
        }
    }
}
