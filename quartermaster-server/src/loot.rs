use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post, put},
    Json,
};
use quartermaster_core::{NewLootRequest, PrimaryKey};

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    schemas::{FinishQuery, GrantQuery, NewLootRequestSchema, QuantitySchema, ValidatedJson},
    serialized::{Loot, LootRequest, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/loot",
    tag = "loot",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Loot>)
    )
)]
pub(crate) async fn list_loots(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<Loot>>> {
    let loots = context.app.loot.loots(session.guild().id).await?;

    Ok(Json(loots.to_serialized()))
}

#[utoipa::path(
    put,
    path = "/v1/loot/quantity",
    tag = "loot",
    request_body = QuantitySchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200)
    )
)]
pub(crate) async fn set_quantity(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<QuantitySchema>,
) -> ServerResult<()> {
    session.require_admin()?;

    context
        .app
        .loot
        .set_quantity(session.guild(), body.item_id, body.raid_night, body.quantity)
        .await?;

    Ok(())
}

#[utoipa::path(
    get,
    path = "/v1/loot/requests",
    tag = "loot",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<LootRequest>)
    )
)]
pub(crate) async fn active_requests(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<LootRequest>>> {
    let requests = context.app.loot.request_views(session.guild().id).await?;

    Ok(Json(requests.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/loot/requests/archived",
    tag = "loot",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<LootRequest>)
    )
)]
pub(crate) async fn archived_requests(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<LootRequest>>> {
    let requests = context.app.loot.archived_views(session.guild().id).await?;

    Ok(Json(requests.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/loot/requests",
    tag = "loot",
    request_body = NewLootRequestSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200)
    )
)]
pub(crate) async fn create_request(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewLootRequestSchema>,
) -> ServerResult<()> {
    context
        .app
        .loot
        .create_request(
            session.guild(),
            session.player(),
            NewLootRequest {
                player_id: session.player().id,
                item_id: body.item_id,
                alt_name: body.alt_name,
                class_override: body.class_override,
                spell_name: body.spell_name,
                quantity: body.quantity,
                current_item: body.current_item,
                raid_night: body.raid_night,
            },
        )
        .await?;

    Ok(())
}

#[utoipa::path(
    delete,
    path = "/v1/loot/requests/{id}",
    tag = "loot",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200)
    )
)]
pub(crate) async fn delete_request(
    session: Session,
    State(context): State<ServerContext>,
    Path(request_id): Path<PrimaryKey>,
) -> ServerResult<()> {
    context
        .app
        .loot
        .delete_request(session.player(), request_id)
        .await?;

    Ok(())
}

#[utoipa::path(
    post,
    path = "/v1/loot/requests/{id}/grant",
    tag = "loot",
    params(
        ("grant" = bool, Query, description = "Whether the request is granted")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200)
    )
)]
pub(crate) async fn grant_request(
    session: Session,
    State(context): State<ServerContext>,
    Path(request_id): Path<PrimaryKey>,
    Query(query): Query<GrantQuery>,
) -> ServerResult<()> {
    session.require_admin()?;

    context
        .app
        .loot
        .grant_request(session.guild(), request_id, query.grant)
        .await?;

    Ok(())
}

#[utoipa::path(
    post,
    path = "/v1/loot/requests/finish",
    tag = "loot",
    params(
        ("raidNight" = bool, Query, description = "Which request pool to finish")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<LootRequest>)
    )
)]
pub(crate) async fn finish_requests(
    session: Session,
    State(context): State<ServerContext>,
    Query(query): Query<FinishQuery>,
) -> ServerResult<Json<Vec<LootRequest>>> {
    session.require_admin()?;

    let archived = context
        .app
        .loot
        .finish_requests(session.guild(), query.raid_night)
        .await?;

    Ok(Json(archived.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_loots))
        .route("/quantity", put(set_quantity))
        .route("/requests", get(active_requests).post(create_request))
        .route("/requests/archived", get(archived_requests))
        .route("/requests/:id", delete(delete_request))
        .route("/requests/:id/grant", post(grant_request))
        .route("/requests/finish", post(finish_requests))
}
