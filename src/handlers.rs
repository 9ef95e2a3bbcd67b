use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, patch, put};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::{
    validate_name, validate_quantity, AddItemRequest, AppError, AppJson, CreateListRequest,
    FavoriteRequest, ItemPayload, ListEntry, NewItem, QuantityRequest, UpdateListRequest,
};
use crate::repository::{EntryChanges, Repositories, ShoppingListChanges};

#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
}

pub fn app(state: AppState) -> Router {
    let item_routes = Router::new()
        .route("/", get(get_items).post(create_items))
        .route("/name/:item_name", get(get_item_by_name))
        .route("/:item_id", put(update_item).delete(delete_item).get(get_item_by_id));

    let list_routes = Router::new()
        .route("/", get(get_shopping_lists).post(create_shopping_list))
        .route("/search", get(search_shopping_lists))
        .route("/search/favorites", get(get_favorite_shopping_lists))
        .route("/items/:item_id", get(get_lists_containing_item))
        .route("/toggle/:list_id/:item_id", patch(toggle_purchased))
        .route("/updateQuantity/:list_id/:item_id", patch(update_quantity))
        .route(
            "/:list_id",
            get(get_shopping_list_by_id)
                .put(update_shopping_list)
                .delete(delete_shopping_list),
        )
        .route("/:list_id/favorites", put(update_favorite_status))
        .route(
            "/:list_id/items/:item_id",
            put(add_item_to_list).delete(delete_item_from_list),
        );

    let api = Router::new()
        .route("/health", get(health))
        .nest("/items", item_routes)
        .nest("/shoppingLists", list_routes);

    Router::new().nest("/api", api).with_state(state)
}

#[derive(Debug, Deserialize)]
struct RelationsQuery {
    #[serde(rename = "withRelations")]
    with_relations: Option<String>,
}

impl RelationsQuery {
    // Relations load by default; only an explicit `withRelations=false`
    // (or any value other than "true") turns them off.
    fn wanted(&self) -> bool {
        self.with_relations.as_deref().map_or(true, |v| v == "true")
    }
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    name: Option<String>,
    description: Option<String>,
}

fn parse_item_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| {
        AppError::Validation("Invalid itemId format. please provide a valid UUID".into())
    })
}

fn parse_list_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| {
        AppError::Validation("Invalid shoppingListId format. please provide a valid UUID".into())
    })
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "date": chrono::Utc::now().to_rfc3339() }))
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

async fn get_items(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let items = state.repos.items.list().await?;
    Ok(Json(items))
}

async fn get_item_by_id(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let item_id = parse_item_id(&item_id)?;
    let item = state
        .repos
        .items
        .find_by_id(item_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Item not found".into()))?;
    Ok(Json(item))
}

async fn get_item_by_name(
    State(state): State<AppState>,
    Path(item_name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let item = state
        .repos
        .items
        .find_by_name(&item_name)
        .await?
        .ok_or_else(|| AppError::NotFound("Item not found".into()))?;
    Ok(Json(item))
}

async fn create_items(
    State(state): State<AppState>,
    AppJson(payload): AppJson<Vec<ItemPayload>>,
) -> Result<impl IntoResponse, AppError> {
    for item in &payload {
        validate_name(&item.name)?;
    }
    for item in &payload {
        if state.repos.items.find_by_name(&item.name).await?.is_some() {
            return Err(AppError::Conflict("Creation canceled! Item already exists".into()));
        }
    }
    let created = state
        .repos
        .items
        .create_many(payload.into_iter().map(NewItem::from).collect())
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    payload: Result<AppJson<ItemPayload>, AppError>,
) -> Result<impl IntoResponse, AppError> {
    let item_id = parse_item_id(&item_id)?;
    state
        .repos
        .items
        .find_by_id(item_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Item not found".into()))?;

    // The id and existence checks come first; only then is the body parsed.
    let AppJson(payload) = payload?;
    validate_name(&payload.name)?;
    if let Some(other) = state.repos.items.find_by_name(&payload.name).await? {
        if other.id != item_id {
            return Err(AppError::Conflict("Update canceled! ItemName already exists".into()));
        }
    }

    let updated = state.repos.items.update(item_id, NewItem::from(payload)).await?;
    Ok(Json(updated))
}

async fn delete_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let item_id = parse_item_id(&item_id)?;
    state
        .repos
        .items
        .find_by_id(item_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Item not found".into()))?;

    // Deleting an item still referenced by a list would orphan its entries.
    if state.repos.entries.find_any_for_item(item_id).await?.is_some() {
        return Err(AppError::Conflict(
            "Deletion canceled. Item exists in a ShoppingList".into(),
        ));
    }

    state.repos.items.delete(item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Shopping lists
// ---------------------------------------------------------------------------

async fn get_shopping_lists(
    State(state): State<AppState>,
    Query(q): Query<RelationsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let lists = state.repos.lists.list(q.wanted()).await?;
    Ok(Json(lists))
}

async fn search_shopping_lists(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    let lists = state
        .repos
        .lists
        .search(q.name.as_deref(), q.description.as_deref())
        .await?;
    if lists.is_empty() {
        return Err(AppError::NotFound("ShoppingList not found".into()));
    }
    Ok(Json(lists))
}

async fn get_favorite_shopping_lists(
    State(state): State<AppState>,
    Query(q): Query<RelationsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let lists = state.repos.lists.favorites(q.wanted()).await?;
    Ok(Json(lists))
}

async fn get_shopping_list_by_id(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
    Query(q): Query<RelationsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let list_id = parse_list_id(&list_id)?;
    let list = state
        .repos
        .lists
        .find_by_id(list_id, q.wanted())
        .await?
        .ok_or_else(|| AppError::NotFound("ShoppingList not found".into()))?;
    Ok(Json(list))
}

async fn get_lists_containing_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let item_id = parse_item_id(&item_id)?;
    if state.repos.entries.find_any_for_item(item_id).await?.is_none() {
        return Err(AppError::NotFound("Item not found in any ShoppingList".into()));
    }
    let entries = state.repos.entries.entries_for_item(item_id).await?;
    Ok(Json(entries))
}

async fn create_shopping_list(
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateListRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_name(&payload.name)?;
    if let Some(refs) = &payload.items {
        for r in refs {
            r.validate()?;
        }
    }

    let created = state
        .repos
        .lists
        .create(payload.name, payload.description)
        .await?;

    // Split the payload into existing items (by id) and items to create
    // inline (by name).
    let mut item_ids = Vec::new();
    let mut new_items = Vec::new();
    if let Some(refs) = payload.items {
        for r in refs {
            if let Some(id) = r.id {
                item_ids.push(id);
            } else if let Some(name) = r.name {
                new_items.push(NewItem { name, description: r.description });
            }
        }
    }

    let new_names: Vec<String> = new_items.iter().map(|i| i.name.clone()).collect();
    if !new_items.is_empty() {
        let created_items = state.repos.items.create_many(new_items).await?;
        item_ids.extend(created_items.into_iter().map(|i| i.id));
    }

    if !item_ids.is_empty() {
        // Resolve the final set in one query; names cover the case where an
        // inline item already existed and the insert was a no-op.
        let items = state
            .repos
            .items
            .find_by_names_or_ids(&new_names, &item_ids)
            .await?;
        let ids: Vec<Uuid> = items.into_iter().map(|i| i.id).collect();
        state.repos.lists.attach_items(created.id, &ids).await?;
    }

    let view = state
        .repos
        .lists
        .find_by_id(created.id, true)
        .await?
        .ok_or_else(|| AppError::Repo("shopping list missing after insert".into()))?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn update_shopping_list(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
    payload: Result<AppJson<UpdateListRequest>, AppError>,
) -> Result<impl IntoResponse, AppError> {
    let list_id = parse_list_id(&list_id)?;
    let existing = state
        .repos
        .lists
        .find_by_id(list_id, false)
        .await?
        .ok_or_else(|| AppError::NotFound("ShoppingList not found".into()))?;

    let AppJson(payload) = payload?;
    if let Some(name) = &payload.name {
        validate_name(name)?;
    }
    if let Some(items) = &payload.items {
        if !items.is_empty() {
            if state.repos.entries.find_any_for_list(list_id).await?.is_none() {
                return Err(AppError::NotFound(
                    "Update canceled! Updating list has no items".into(),
                ));
            }
            for r in items {
                if let Some(quantity) = r.quantity {
                    validate_quantity(quantity)?;
                }
                if state.repos.entries.find_any_for_item(r.id).await?.is_none() {
                    return Err(AppError::NotFound(
                        "Update canceled! updating item not found in the shoppingList".into(),
                    ));
                }
            }
        }
    }

    let changes = ShoppingListChanges {
        name: payload.name,
        description: payload.description,
    };
    let updated = if changes.is_empty() {
        existing.list
    } else {
        state.repos.lists.update(list_id, changes).await?
    };

    if let Some(items) = payload.items {
        for r in items {
            state
                .repos
                .entries
                .update_entry(
                    list_id,
                    r.id,
                    EntryChanges { quantity: r.quantity, is_purchased: r.is_purchased },
                )
                .await?;
        }
    }

    Ok(Json(updated))
}

async fn add_item_to_list(
    State(state): State<AppState>,
    Path((list_id, item_id)): Path<(String, String)>,
    payload: Result<AppJson<AddItemRequest>, AppError>,
) -> Result<impl IntoResponse, AppError> {
    // Ids are reported before body problems.
    let list_id = parse_list_id(&list_id)?;
    let item_id = parse_item_id(&item_id)?;
    let AppJson(payload) = payload?;
    validate_quantity(payload.quantity)?;

    if state.repos.lists.find_by_id(list_id, false).await?.is_none() {
        return Err(AppError::NotFound("ShoppingList not found".into()));
    }
    if state.repos.items.find_by_id(item_id).await?.is_none() {
        return Err(AppError::NotFound("Item not found".into()));
    }
    if state.repos.entries.find_entry(list_id, item_id).await?.is_some() {
        return Err(AppError::Conflict("Item already in the ShoppingList".into()));
    }

    let entry = state
        .repos
        .entries
        .insert(ListEntry {
            list_id,
            item_id,
            quantity: payload.quantity,
            is_purchased: payload.is_purchased.unwrap_or(false),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn toggle_purchased(
    State(state): State<AppState>,
    Path((list_id, item_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let list_id = parse_list_id(&list_id)?;
    let item_id = parse_item_id(&item_id)?;

    ensure_list_has_items(&state, list_id).await?;
    let entry = state
        .repos
        .entries
        .find_entry(list_id, item_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Item not found in the ShoppingList".into()))?;

    let updated = state
        .repos
        .entries
        .update_entry(
            list_id,
            item_id,
            EntryChanges { quantity: None, is_purchased: Some(!entry.is_purchased) },
        )
        .await?
        .ok_or_else(|| AppError::NotFound("Item not found in the ShoppingList".into()))?;
    Ok(Json(updated))
}

async fn update_quantity(
    State(state): State<AppState>,
    Path((list_id, item_id)): Path<(String, String)>,
    payload: Result<AppJson<QuantityRequest>, AppError>,
) -> Result<impl IntoResponse, AppError> {
    let list_id = parse_list_id(&list_id)?;
    let item_id = parse_item_id(&item_id)?;
    let AppJson(payload) = payload?;
    validate_quantity(payload.quantity)?;

    ensure_list_has_items(&state, list_id).await?;
    if state.repos.entries.find_entry(list_id, item_id).await?.is_none() {
        return Err(AppError::NotFound("Item not found in the ShoppingList".into()));
    }

    let updated = state
        .repos
        .entries
        .update_entry(
            list_id,
            item_id,
            EntryChanges { quantity: Some(payload.quantity), is_purchased: None },
        )
        .await?
        .ok_or_else(|| AppError::NotFound("Item not found in the ShoppingList".into()))?;
    Ok(Json(updated))
}

async fn delete_item_from_list(
    State(state): State<AppState>,
    Path((list_id, item_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let list_id = parse_list_id(&list_id)?;
    let item_id = parse_item_id(&item_id)?;

    ensure_list_has_items(&state, list_id).await?;
    let deleted = state.repos.entries.delete_entry(list_id, item_id).await?;
    if deleted == 0 {
        return Err(AppError::NotFound("Item not found in the ShoppingList".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_shopping_list(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let list_id = parse_list_id(&list_id)?;
    if state.repos.lists.find_by_id(list_id, false).await?.is_none() {
        return Err(AppError::NotFound("ShoppingList not found".into()));
    }

    // Join rows first, then the list itself.
    state.repos.entries.delete_for_list(list_id).await?;
    state.repos.lists.delete(list_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_favorite_status(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
    AppJson(payload): AppJson<FavoriteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let list_id = parse_list_id(&list_id)?;
    if state.repos.lists.find_by_id(list_id, false).await?.is_none() {
        return Err(AppError::NotFound("ShoppingList not found".into()));
    }
    let updated = state.repos.lists.set_favorite(list_id, payload.is_favorite).await?;
    Ok(Json(updated))
}

async fn ensure_list_has_items(state: &AppState, list_id: Uuid) -> Result<(), AppError> {
    if state.repos.entries.find_any_for_list(list_id).await?.is_none() {
        return Err(AppError::NotFound("ShoppingList has no Items".into()));
    }
    Ok(())
}
