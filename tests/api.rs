use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::util::ServiceExt; // for `oneshot`

use shopping_list_server::handlers::{app, AppState};
use shopping_list_server::repository::RepositoryFactory;

fn test_app() -> Router {
    app(AppState { repos: RepositoryFactory::in_memory() })
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn json_req(method: &str, uri: &str, payload: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

async fn create_item(app: &Router, name: &str) -> String {
    let (status, body) =
        send(app, json_req("POST", "/api/items", &json!([{ "name": name }]))).await;
    assert_eq!(status, StatusCode::CREATED);
    body[0]["id"].as_str().unwrap().to_string()
}

async fn create_list(app: &Router, name: &str) -> String {
    let (status, body) =
        send(app, json_req("POST", "/api/shoppingLists", &json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_returns_date() {
    let app = test_app();
    let (status, body) = send(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["date"].is_string());
}

#[tokio::test]
async fn item_crud_flow() {
    let app = test_app();

    // Create two items in one call
    let (status, body) = send(
        &app,
        json_req(
            "POST",
            "/api/items",
            &json!([
                { "name": "Milk", "description": "whole" },
                { "name": "Bread" }
            ]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body.as_array().unwrap().len(), 2);
    let milk_id = body[0]["id"].as_str().unwrap().to_string();

    // Duplicate name is rejected before anything is written
    let (status, body) =
        send(&app, json_req("POST", "/api/items", &json!([{ "name": "Milk" }]))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["errors"][0], "Creation canceled! Item already exists");

    // Lookup by id and by name
    let (status, body) = send(&app, get(&format!("/api/items/{milk_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Milk");
    assert_eq!(body["description"], "whole");

    let (status, body) = send(&app, get("/api/items/name/Bread")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["description"], Value::Null);

    // Unknown id and malformed id
    let (status, body) =
        send(&app, get("/api/items/123e4567-e89b-12d3-a456-426614174999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errors"][0], "Item not found");

    let (status, body) = send(&app, get("/api/items/invalid-id")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0], "Invalid itemId format. please provide a valid UUID");

    // Renaming onto another item's name conflicts
    let (status, body) = send(
        &app,
        json_req("PUT", &format!("/api/items/{milk_id}"), &json!({ "name": "Bread" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["errors"][0], "Update canceled! ItemName already exists");

    // Keeping its own name is fine
    let (status, body) = send(
        &app,
        json_req(
            "PUT",
            &format!("/api/items/{milk_id}"),
            &json!({ "name": "Milk", "description": "semi-skimmed" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["description"], "semi-skimmed");

    // Delete, then the item is gone
    let (status, _) = send(
        &app,
        Request::delete(format!("/api/items/{milk_id}")).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, get(&format!("/api/items/{milk_id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn empty_item_name_is_rejected() {
    let app = test_app();
    let (status, _) =
        send(&app, json_req("POST", "/api/items", &json!([{ "name": "" }]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_list_with_inline_and_existing_items() {
    let app = test_app();
    let milk_id = create_item(&app, "Milk").await;

    // One existing item by id, one created inline by name
    let (status, body) = send(
        &app,
        json_req(
            "POST",
            "/api/shoppingLists",
            &json!({
                "name": "Weekly",
                "description": "weekly run",
                "items": [
                    { "id": milk_id },
                    { "name": "Bread", "description": "whole grain" }
                ]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "Weekly");
    assert_eq!(body["isFavorite"], false);
    let entries = body["shoppingListItems"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    for entry in entries {
        assert_eq!(entry["quantity"], 1);
        assert_eq!(entry["isPurchased"], false);
        assert!(entry["item"]["id"].is_string());
    }

    // The inline item landed in the catalog
    let (status, _) = send(&app, get("/api/items/name/Bread")).await;
    assert_eq!(status, StatusCode::OK);

    // An items entry needs an id or a name
    let (status, body) = send(
        &app,
        json_req(
            "POST",
            "/api/shoppingLists",
            &json!({ "name": "Broken", "items": [ { "description": "nothing else" } ] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0], "At least one of id or name must be provided");
}

#[tokio::test]
async fn inline_item_with_existing_name_attaches_instead_of_duplicating() {
    let app = test_app();
    create_item(&app, "Milk").await;

    // "Milk" already exists: its insert is a no-op, but the names-or-ids
    // resolution still picks it up alongside the freshly created "Bread".
    let (status, body) = send(
        &app,
        json_req(
            "POST",
            "/api/shoppingLists",
            &json!({ "name": "Weekly", "items": [ { "name": "Milk" }, { "name": "Bread" } ] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let entries = body["shoppingListItems"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    let mut names: Vec<&str> =
        entries.iter().map(|e| e["item"]["name"].as_str().unwrap()).collect();
    names.sort_unstable();
    assert_eq!(names, ["Bread", "Milk"]);

    // Still exactly one Milk in the catalog
    let (_, items) = send(&app, get("/api/items")).await;
    assert_eq!(items.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn add_toggle_quantity_and_remove_entry() {
    let app = test_app();
    let item_id = create_item(&app, "Eggs").await;
    let list_id = create_list(&app, "Weekend").await;

    // Attach with an explicit quantity
    let (status, body) = send(
        &app,
        json_req(
            "PUT",
            &format!("/api/shoppingLists/{list_id}/items/{item_id}"),
            &json!({ "quantity": 2 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["quantity"], 2);
    assert_eq!(body["isPurchased"], false);

    // Attaching twice conflicts
    let (status, body) = send(
        &app,
        json_req(
            "PUT",
            &format!("/api/shoppingLists/{list_id}/items/{item_id}"),
            &json!({ "quantity": 1 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["errors"][0], "Item already in the ShoppingList");

    // Toggle flips the purchased flag both ways
    let toggle_uri = format!("/api/shoppingLists/toggle/{list_id}/{item_id}");
    let (status, body) = send(&app, json_req("PATCH", &toggle_uri, &json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isPurchased"], true);
    let (_, body) = send(&app, json_req("PATCH", &toggle_uri, &json!({}))).await;
    assert_eq!(body["isPurchased"], false);

    // Quantity update, including the lower bound
    let quantity_uri = format!("/api/shoppingLists/updateQuantity/{list_id}/{item_id}");
    let (status, body) =
        send(&app, json_req("PATCH", &quantity_uri, &json!({ "quantity": 5 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quantity"], 5);

    let (status, _) =
        send(&app, json_req("PATCH", &quantity_uri, &json!({ "quantity": 0 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Remove the entry, then the list is empty again
    let (status, _) = send(
        &app,
        Request::delete(format!("/api/shoppingLists/{list_id}/items/{item_id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, json_req("PATCH", &toggle_uri, &json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errors"][0], "ShoppingList has no Items");
}

#[tokio::test]
async fn item_referenced_by_list_cannot_be_deleted() {
    let app = test_app();
    let item_id = create_item(&app, "Butter").await;
    let list_id = create_list(&app, "Weekly").await;
    send(
        &app,
        json_req(
            "PUT",
            &format!("/api/shoppingLists/{list_id}/items/{item_id}"),
            &json!({ "quantity": 1 }),
        ),
    )
    .await;

    let (status, body) = send(
        &app,
        Request::delete(format!("/api/items/{item_id}")).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["errors"][0], "Deletion canceled. Item exists in a ShoppingList");

    // Lists containing the item are discoverable through the join
    let (status, body) = send(&app, get(&format!("/api/shoppingLists/items/{item_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["listId"].as_str().unwrap(), list_id);

    // Deleting the list removes its entries, freeing the item
    let (status, _) = send(
        &app,
        Request::delete(format!("/api/shoppingLists/{list_id}")).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, get(&format!("/api/shoppingLists/items/{item_id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errors"][0], "Item not found in any ShoppingList");

    let (status, _) = send(
        &app,
        Request::delete(format!("/api/items/{item_id}")).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn update_list_fields_and_entries() {
    let app = test_app();
    let item_id = create_item(&app, "Apples").await;
    let list_id = create_list(&app, "Fruit").await;

    // Items in the payload require the list to have entries
    let (status, body) = send(
        &app,
        json_req(
            "PUT",
            &format!("/api/shoppingLists/{list_id}"),
            &json!({ "items": [ { "id": item_id, "quantity": 3 } ] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errors"][0], "Update canceled! Updating list has no items");

    send(
        &app,
        json_req(
            "PUT",
            &format!("/api/shoppingLists/{list_id}/items/{item_id}"),
            &json!({ "quantity": 1 }),
        ),
    )
    .await;

    let (status, body) = send(
        &app,
        json_req(
            "PUT",
            &format!("/api/shoppingLists/{list_id}"),
            &json!({
                "name": "Fruit basket",
                "items": [ { "id": item_id, "quantity": 3, "isPurchased": true } ]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Fruit basket");

    let (_, body) = send(&app, get(&format!("/api/shoppingLists/{list_id}"))).await;
    let entries = body["shoppingListItems"].as_array().unwrap();
    assert_eq!(entries[0]["quantity"], 3);
    assert_eq!(entries[0]["isPurchased"], true);
}

#[tokio::test]
async fn favorites_flow() {
    let app = test_app();
    let list_id = create_list(&app, "Party").await;
    create_list(&app, "Mundane").await;

    let (status, body) = send(
        &app,
        json_req(
            "PUT",
            &format!("/api/shoppingLists/{list_id}/favorites"),
            &json!({ "isFavorite": true }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isFavorite"], true);

    let (status, body) = send(&app, get("/api/shoppingLists/search/favorites")).await;
    assert_eq!(status, StatusCode::OK);
    let favorites = body.as_array().unwrap();
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0]["name"], "Party");
    assert!(favorites[0]["shoppingListItems"].is_array());

    // Relations can be switched off
    let (_, body) =
        send(&app, get("/api/shoppingLists/search/favorites?withRelations=false")).await;
    assert!(body[0].get("shoppingListItems").is_none());
}

#[tokio::test]
async fn search_by_name_or_description() {
    let app = test_app();
    send(
        &app,
        json_req(
            "POST",
            "/api/shoppingLists",
            &json!({ "name": "Groceries", "description": "weekly run" }),
        ),
    )
    .await;
    create_list(&app, "Hardware").await;

    let (status, body) = send(&app, get("/api/shoppingLists/search?name=Groc")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = send(&app, get("/api/shoppingLists/search?description=weekly")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["name"], "Groceries");

    let (status, body) = send(&app, get("/api/shoppingLists/search?name=zzz")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errors"][0], "ShoppingList not found");
}

#[tokio::test]
async fn list_lookup_validates_ids() {
    let app = test_app();

    let (status, body) = send(&app, get("/api/shoppingLists/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["errors"][0],
        "Invalid shoppingListId format. please provide a valid UUID"
    );

    let (status, body) =
        send(&app, get("/api/shoppingLists/123e4567-e89b-12d3-a456-426614174000")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errors"][0], "ShoppingList not found");
}

#[tokio::test]
async fn toggle_and_quantity_require_the_entry_itself() {
    let app = test_app();
    let present = create_item(&app, "Tea").await;
    let absent = create_item(&app, "Coffee").await;
    let list_id = create_list(&app, "Pantry").await;
    send(
        &app,
        json_req(
            "PUT",
            &format!("/api/shoppingLists/{list_id}/items/{present}"),
            &json!({ "quantity": 1 }),
        ),
    )
    .await;

    // The list has entries, just not for this item
    let (status, body) = send(
        &app,
        json_req("PATCH", &format!("/api/shoppingLists/toggle/{list_id}/{absent}"), &json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errors"][0], "Item not found in the ShoppingList");

    let (status, body) = send(
        &app,
        json_req(
            "PATCH",
            &format!("/api/shoppingLists/updateQuantity/{list_id}/{absent}"),
            &json!({ "quantity": 2 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errors"][0], "Item not found in the ShoppingList");
}

#[tokio::test]
async fn list_update_rejects_items_attached_to_no_list() {
    let app = test_app();
    let attached = create_item(&app, "Rice").await;
    let loose = create_item(&app, "Salt").await;
    let list_id = create_list(&app, "Staples").await;
    send(
        &app,
        json_req(
            "PUT",
            &format!("/api/shoppingLists/{list_id}/items/{attached}"),
            &json!({ "quantity": 1 }),
        ),
    )
    .await;

    let (status, body) = send(
        &app,
        json_req(
            "PUT",
            &format!("/api/shoppingLists/{list_id}"),
            &json!({ "items": [ { "id": loose, "quantity": 2 } ] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body["errors"][0],
        "Update canceled! updating item not found in the shoppingList"
    );
}

#[tokio::test]
async fn attaching_requires_existing_list_and_item() {
    let app = test_app();
    let item_id = create_item(&app, "Jam").await;

    let (status, body) = send(
        &app,
        json_req(
            "PUT",
            &format!("/api/shoppingLists/123e4567-e89b-12d3-a456-426614174000/items/{item_id}"),
            &json!({ "quantity": 1 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errors"][0], "ShoppingList not found");

    let list_id = create_list(&app, "Breakfast").await;
    let (status, body) = send(
        &app,
        json_req(
            "PUT",
            &format!("/api/shoppingLists/{list_id}/items/123e4567-e89b-12d3-a456-426614174001"),
            &json!({ "quantity": 1 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errors"][0], "Item not found");
}

#[tokio::test]
async fn attach_reports_invalid_id_before_body_errors() {
    let app = test_app();
    // Both the ids and the body are bad; the list id wins
    let (status, body) = send(
        &app,
        json_req("PUT", "/api/shoppingLists/not-a-uuid/items/also-bad", &json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["errors"][0],
        "Invalid shoppingListId format. please provide a valid UUID"
    );
}

#[tokio::test]
async fn malformed_json_body_maps_to_structured_400() {
    let app = test_app();
    let req = Request::post("/api/shoppingLists")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"][0].is_string());
}
