//! HTTP handlers for all routes.

pub mod audit;
pub mod chat;
pub mod metrics;

use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;

use crate::auth::Principal;
use crate::state::AppState;

pub type BearerHeader = Option<TypedHeader<Authorization<Bearer>>>;

fn principal(state: &AppState, bearer: BearerHeader) -> Option<Principal> {
    let TypedHeader(auth) = bearer?;
    let principal = state.tokens.resolve(auth.token());
    if principal.is_none() {
        tracing::debug!("Unknown bearer token, continuing anonymously");
    }
    principal
}
