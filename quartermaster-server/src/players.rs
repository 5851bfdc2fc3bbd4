use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json,
};
use quartermaster_core::PrimaryKey;
use serde::Deserialize;

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    schemas::{LinkAltSchema, ValidatedJson},
    serialized::{Player, ToSerialized},
    Router,
};

#[derive(Debug, Deserialize)]
pub(crate) struct FlagQuery {
    pub enable: bool,
}

#[utoipa::path(
    get,
    path = "/v1/players",
    tag = "players",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Player>)
    )
)]
pub(crate) async fn roster(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<Player>>> {
    let players = context.app.guilds.roster(session.guild().id).await?;

    Ok(Json(players.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/players/alts",
    tag = "players",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Player>)
    )
)]
pub(crate) async fn linked_alts(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<Player>>> {
    let alts = context.app.guilds.linked_alts(session.player()).await?;

    Ok(Json(alts.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/players/alts",
    tag = "players",
    request_body = LinkAltSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Player)
    )
)]
pub(crate) async fn link_alt(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<LinkAltSchema>,
) -> ServerResult<Json<Player>> {
    let alt = context
        .app
        .guilds
        .link_alt(session.player(), &body.name)
        .await?;

    Ok(Json(alt.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/players/alts/{id}",
    tag = "players",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200)
    )
)]
pub(crate) async fn unlink_alt(
    session: Session,
    State(context): State<ServerContext>,
    Path(alt_id): Path<PrimaryKey>,
) -> ServerResult<()> {
    context
        .app
        .guilds
        .unlink_alt(session.player(), alt_id)
        .await?;

    Ok(())
}

#[utoipa::path(
    post,
    path = "/v1/players/{id}/hide",
    tag = "players",
    params(
        ("enable" = bool, Query, description = "Whether the player should be hidden")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200)
    )
)]
pub(crate) async fn set_hidden(
    session: Session,
    State(context): State<ServerContext>,
    Path(player_id): Path<PrimaryKey>,
    Query(query): Query<FlagQuery>,
) -> ServerResult<()> {
    session.require_admin()?;

    context
        .app
        .guilds
        .set_hidden(session.guild(), player_id, query.enable)
        .await?;

    Ok(())
}

#[utoipa::path(
    post,
    path = "/v1/players/{id}/admin",
    tag = "players",
    params(
        ("enable" = bool, Query, description = "Whether the player should have admin rights")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200)
    )
)]
pub(crate) async fn set_admin(
    session: Session,
    State(context): State<ServerContext>,
    Path(player_id): Path<PrimaryKey>,
    Query(query): Query<FlagQuery>,
) -> ServerResult<()> {
    session.require_admin()?;

    context
        .app
        .guilds
        .set_admin(session.guild(), player_id, query.enable)
        .await?;

    Ok(())
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(roster))
        .route("/alts", get(linked_alts).post(link_alt))
        .route("/alts/:id", axum::routing::delete(unlink_alt))
        .route("/:id/hide", post(set_hidden))
        .route("/:id/admin", post(set_admin))
}
