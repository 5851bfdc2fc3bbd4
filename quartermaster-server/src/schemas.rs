use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewGuildSchema {
    #[validate(length(min = 2, max = 128))]
    pub name: String,
    #[validate(length(min = 2, max = 64))]
    pub server: String,
    #[validate(length(min = 2, max = 64))]
    pub leader_name: String,
    #[validate(length(max = 32))]
    pub leader_class: Option<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateGuildSchema {
    #[validate(length(max = 1024))]
    pub motd: Option<String>,
    #[validate(url)]
    pub raid_webhook: Option<String>,
    #[validate(url)]
    pub rot_webhook: Option<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TransferLeadershipSchema {
    #[validate(length(min = 2, max = 64))]
    pub successor: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LinkAltSchema {
    #[validate(length(min = 2, max = 64))]
    pub name: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewItemSchema {
    #[validate(length(min = 2, max = 255))]
    pub name: String,
    #[serde(default)]
    pub is_spell: bool,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QuantitySchema {
    pub item_id: i32,
    pub raid_night: bool,
    #[validate(range(min = 0))]
    pub quantity: i32,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewLootRequestSchema {
    pub item_id: i32,
    #[validate(length(min = 2, max = 64))]
    pub alt_name: Option<String>,
    #[validate(length(max = 32))]
    pub class_override: Option<String>,
    #[validate(length(max = 255))]
    pub spell_name: Option<String>,
    #[validate(range(min = 1))]
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    #[validate(length(max = 255))]
    pub current_item: Option<String>,
    pub raid_night: bool,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct LockQuery {
    pub enable: bool,
}

#[derive(Debug, Deserialize)]
pub struct GrantQuery {
    pub grant: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishQuery {
    pub raid_night: bool,
}

/// The uploader's UTC offset in minutes, as reported by their browser
#[derive(Debug, Deserialize)]
pub struct OffsetQuery {
    #[serde(default)]
    pub offset: i64,
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|_| (StatusCode::BAD_REQUEST, "JSON parse failed"))?;

        extracted_json
            .0
            .validate()
            .map_err(|_| (StatusCode::BAD_REQUEST, "Request body is invalid"))?;

        Ok(Self(extracted_json.0))
    }
}
