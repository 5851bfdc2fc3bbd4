use axum::{
    extract::State,
    routing::{get, post},
    Json,
};
use quartermaster_core::NewItem;

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    schemas::{NewItemSchema, ValidatedJson},
    serialized::{Item, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/items",
    tag = "items",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Item>)
    )
)]
pub(crate) async fn list_items(
    _session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<Item>>> {
    let items = context.app.loot.list_items().await?;

    Ok(Json(items.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/items",
    tag = "items",
    request_body = NewItemSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Item)
    )
)]
pub(crate) async fn create_item(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewItemSchema>,
) -> ServerResult<Json<Item>> {
    session.require_admin()?;

    let item = context
        .app
        .loot
        .create_item(NewItem {
            name: body.name,
            is_spell: body.is_spell,
        })
        .await?;

    Ok(Json(item.to_serialized()))
}

pub fn router() -> Router {
    Router::new().route("/", get(list_items).post(create_item))
}
