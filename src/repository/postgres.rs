use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    AppError, Item, ListEntry, ListEntryView, NewItem, ShoppingList, ShoppingListView,
};

use super::{
    EntryChanges, ItemRepository, ListItemRepository, ShoppingListChanges,
    ShoppingListRepository,
};

fn item_from_row(row: &sqlx::postgres::PgRow) -> Item {
    Item {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
    }
}

fn list_from_row(row: &sqlx::postgres::PgRow) -> ShoppingList {
    ShoppingList {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        is_favorite: row.get("is_favorite"),
        created_at: row.get("created_at"),
    }
}

fn entry_from_row(row: &sqlx::postgres::PgRow) -> ListEntry {
    ListEntry {
        list_id: row.get("list_id"),
        item_id: row.get("item_id"),
        quantity: row.get("quantity"),
        is_purchased: row.get("is_purchased"),
    }
}

#[derive(Clone)]
pub struct PgItemRepository {
    pool: PgPool,
}

impl PgItemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ItemRepository for PgItemRepository {
    async fn list(&self) -> Result<Vec<Item>, AppError> {
        let rows = sqlx::query("SELECT id, name, description FROM item ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(item_from_row).collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Item>, AppError> {
        let row = sqlx::query("SELECT id, name, description FROM item WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(item_from_row))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Item>, AppError> {
        let row = sqlx::query("SELECT id, name, description FROM item WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(item_from_row))
    }

    async fn find_by_names_or_ids(
        &self,
        names: &[String],
        ids: &[Uuid],
    ) -> Result<Vec<Item>, AppError> {
        let rows = sqlx::query(
            r#"SELECT id, name, description FROM item
               WHERE id = ANY($1) OR name = ANY($2)"#,
        )
        .bind(ids.to_vec())
        .bind(names.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(item_from_row).collect())
    }

    async fn create_many(&self, items: Vec<NewItem>) -> Result<Vec<Item>, AppError> {
        let mut created = Vec::with_capacity(items.len());
        for item in items {
            let row = sqlx::query(
                r#"INSERT INTO item (id, name, description)
                   VALUES ($1, $2, $3)
                   ON CONFLICT (name) DO NOTHING
                   RETURNING id, name, description"#,
            )
            .bind(Uuid::new_v4())
            .bind(&item.name)
            .bind(&item.description)
            .fetch_optional(&self.pool)
            .await?;
            if let Some(row) = row {
                created.push(item_from_row(&row));
            }
        }
        Ok(created)
    }

    async fn update(&self, id: Uuid, item: NewItem) -> Result<Item, AppError> {
        let row = sqlx::query(
            r#"UPDATE item SET name = $2, description = $3
               WHERE id = $1
               RETURNING id, name, description"#,
        )
        .bind(id)
        .bind(&item.name)
        .bind(&item.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(item_from_row(&row))
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM item WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgShoppingListRepository {
    pool: PgPool,
}

impl PgShoppingListRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Entries joined with their items, grouped by list id. With a `list_id`
    /// the result holds at most that one group.
    async fn entry_views(
        &self,
        list_id: Option<Uuid>,
    ) -> Result<HashMap<Uuid, Vec<ListEntryView>>, AppError> {
        let base = r#"SELECT e.list_id, e.quantity, e.is_purchased,
                             i.id AS item_id, i.name AS item_name,
                             i.description AS item_description
                      FROM shopping_list_item e
                      JOIN item i ON i.id = e.item_id"#;
        let rows = match list_id {
            Some(id) => {
                sqlx::query(&format!("{base} WHERE e.list_id = $1"))
                    .bind(id)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => sqlx::query(base).fetch_all(&self.pool).await?,
        };
        let mut grouped: HashMap<Uuid, Vec<ListEntryView>> = HashMap::new();
        for row in rows {
            let list_id: Uuid = row.get("list_id");
            grouped.entry(list_id).or_default().push(ListEntryView {
                quantity: row.get("quantity"),
                is_purchased: row.get("is_purchased"),
                item: Item {
                    id: row.get("item_id"),
                    name: row.get("item_name"),
                    description: row.get("item_description"),
                },
            });
        }
        Ok(grouped)
    }

    fn into_views(
        lists: Vec<ShoppingList>,
        with_relations: bool,
        mut grouped: HashMap<Uuid, Vec<ListEntryView>>,
    ) -> Vec<ShoppingListView> {
        lists
            .into_iter()
            .map(|list| {
                let items = if with_relations {
                    Some(grouped.remove(&list.id).unwrap_or_default())
                } else {
                    None
                };
                ShoppingListView { list, shopping_list_items: items }
            })
            .collect()
    }
}

#[async_trait]
impl ShoppingListRepository for PgShoppingListRepository {
    async fn list(&self, with_relations: bool) -> Result<Vec<ShoppingListView>, AppError> {
        let rows = sqlx::query(
            r#"SELECT id, name, description, is_favorite, created_at
               FROM shopping_list ORDER BY created_at ASC"#,
        )
        .fetch_all(&self.pool)
        .await?;
        let lists: Vec<ShoppingList> = rows.iter().map(list_from_row).collect();
        let grouped = if with_relations { self.entry_views(None).await? } else { HashMap::new() };
        Ok(Self::into_views(lists, with_relations, grouped))
    }

    async fn find_by_id(
        &self,
        id: Uuid,
        with_relations: bool,
    ) -> Result<Option<ShoppingListView>, AppError> {
        let row = sqlx::query(
            r#"SELECT id, name, description, is_favorite, created_at
               FROM shopping_list WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else { return Ok(None) };
        let list = list_from_row(&row);
        let items = if with_relations {
            let mut grouped = self.entry_views(Some(id)).await?;
            Some(grouped.remove(&id).unwrap_or_default())
        } else {
            None
        };
        Ok(Some(ShoppingListView { list, shopping_list_items: items }))
    }

    async fn search(
        &self,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Vec<ShoppingList>, AppError> {
        let rows = sqlx::query(
            r#"SELECT id, name, description, is_favorite, created_at
               FROM shopping_list
               WHERE ($1::text IS NULL AND $2::text IS NULL)
                  OR ($1::text IS NOT NULL AND name LIKE '%' || $1 || '%')
                  OR ($2::text IS NOT NULL AND description LIKE '%' || $2 || '%')
               ORDER BY created_at ASC"#,
        )
        .bind(name)
        .bind(description)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(list_from_row).collect())
    }

    async fn create(
        &self,
        name: String,
        description: Option<String>,
    ) -> Result<ShoppingList, AppError> {
        let row = sqlx::query(
            r#"INSERT INTO shopping_list (id, name, description, is_favorite, created_at)
               VALUES ($1, $2, $3, FALSE, $4)
               RETURNING id, name, description, is_favorite, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(&name)
        .bind(&description)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(list_from_row(&row))
    }

    async fn update(
        &self,
        id: Uuid,
        changes: ShoppingListChanges,
    ) -> Result<ShoppingList, AppError> {
        let row = sqlx::query(
            r#"UPDATE shopping_list
               SET name = COALESCE($2, name),
                   description = COALESCE($3, description)
               WHERE id = $1
               RETURNING id, name, description, is_favorite, created_at"#,
        )
        .bind(id)
        .bind(&changes.name)
        .bind(&changes.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(list_from_row(&row))
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM shopping_list WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn attach_items(&self, list_id: Uuid, item_ids: &[Uuid]) -> Result<(), AppError> {
        for item_id in item_ids {
            sqlx::query(
                r#"INSERT INTO shopping_list_item (list_id, item_id, quantity, is_purchased)
                   VALUES ($1, $2, 1, FALSE)"#,
            )
            .bind(list_id)
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn favorites(&self, with_relations: bool) -> Result<Vec<ShoppingListView>, AppError> {
        let rows = sqlx::query(
            r#"SELECT id, name, description, is_favorite, created_at
               FROM shopping_list WHERE is_favorite = TRUE
               ORDER BY created_at ASC"#,
        )
        .fetch_all(&self.pool)
        .await?;
        let lists: Vec<ShoppingList> = rows.iter().map(list_from_row).collect();
        let grouped = if with_relations { self.entry_views(None).await? } else { HashMap::new() };
        Ok(Self::into_views(lists, with_relations, grouped))
    }

    async fn set_favorite(&self, id: Uuid, is_favorite: bool) -> Result<ShoppingList, AppError> {
        let row = sqlx::query(
            r#"UPDATE shopping_list SET is_favorite = $2
               WHERE id = $1
               RETURNING id, name, description, is_favorite, created_at"#,
        )
        .bind(id)
        .bind(is_favorite)
        .fetch_one(&self.pool)
        .await?;
        Ok(list_from_row(&row))
    }
}

#[derive(Clone)]
pub struct PgListItemRepository {
    pool: PgPool,
}

impl PgListItemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ListItemRepository for PgListItemRepository {
    async fn find_entry(
        &self,
        list_id: Uuid,
        item_id: Uuid,
    ) -> Result<Option<ListEntry>, AppError> {
        let row = sqlx::query(
            r#"SELECT list_id, item_id, quantity, is_purchased
               FROM shopping_list_item WHERE list_id = $1 AND item_id = $2"#,
        )
        .bind(list_id)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(entry_from_row))
    }

    async fn find_any_for_item(&self, item_id: Uuid) -> Result<Option<ListEntry>, AppError> {
        let row = sqlx::query(
            r#"SELECT list_id, item_id, quantity, is_purchased
               FROM shopping_list_item WHERE item_id = $1 LIMIT 1"#,
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(entry_from_row))
    }

    async fn find_any_for_list(&self, list_id: Uuid) -> Result<Option<ListEntry>, AppError> {
        let row = sqlx::query(
            r#"SELECT list_id, item_id, quantity, is_purchased
               FROM shopping_list_item WHERE list_id = $1 LIMIT 1"#,
        )
        .bind(list_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(entry_from_row))
    }

    async fn entries_for_item(&self, item_id: Uuid) -> Result<Vec<ListEntry>, AppError> {
        let rows = sqlx::query(
            r#"SELECT list_id, item_id, quantity, is_purchased
               FROM shopping_list_item WHERE item_id = $1"#,
        )
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(entry_from_row).collect())
    }

    async fn insert(&self, entry: ListEntry) -> Result<ListEntry, AppError> {
        let row = sqlx::query(
            r#"INSERT INTO shopping_list_item (list_id, item_id, quantity, is_purchased)
               VALUES ($1, $2, $3, $4)
               RETURNING list_id, item_id, quantity, is_purchased"#,
        )
        .bind(entry.list_id)
        .bind(entry.item_id)
        .bind(entry.quantity)
        .bind(entry.is_purchased)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return AppError::Conflict("Item already in the ShoppingList".into());
                }
            }
            AppError::Repo(e.to_string())
        })?;
        Ok(entry_from_row(&row))
    }

    async fn update_entry(
        &self,
        list_id: Uuid,
        item_id: Uuid,
        changes: EntryChanges,
    ) -> Result<Option<ListEntry>, AppError> {
        let row = sqlx::query(
            r#"UPDATE shopping_list_item
               SET quantity = COALESCE($3, quantity),
                   is_purchased = COALESCE($4, is_purchased)
               WHERE list_id = $1 AND item_id = $2
               RETURNING list_id, item_id, quantity, is_purchased"#,
        )
        .bind(list_id)
        .bind(item_id)
        .bind(changes.quantity)
        .bind(changes.is_purchased)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(entry_from_row))
    }

    async fn delete_entry(&self, list_id: Uuid, item_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM shopping_list_item WHERE list_id = $1 AND item_id = $2",
        )
        .bind(list_id)
        .bind(item_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_for_list(&self, list_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM shopping_list_item WHERE list_id = $1")
            .bind(list_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
