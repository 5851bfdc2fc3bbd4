use std::sync::Arc;

use axum::extract::FromRef;
use quartermaster_core::Quartermaster;

use crate::sse::SseBroadcaster;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub app: Arc<Quartermaster>,
    pub sse: Arc<SseBroadcaster>,
}
