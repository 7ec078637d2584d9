//! Request identity.
//!
//! Authentication policy lives in front of this service (SSO proxy or the
//! like); the API trusts the forwarded `X-Shipit-Email` header and
//! finds-or-creates the matching user record. New users start as deployers;
//! role changes are an admin/store concern.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use shipit_core::user::{Role, User};

use crate::error::ApiError;
use crate::state::AppState;

pub const EMAIL_HEADER: &str = "x-shipit-email";
pub const NAME_HEADER: &str = "x-shipit-name";

/// The user a request acts as.
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let email = parts
            .headers
            .get(EMAIL_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                ApiError::Unauthorized(format!("missing {EMAIL_HEADER} header"))
            })?;

        let name = parts
            .headers
            .get(NAME_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or(email));

        let user = state
            .stores
            .users
            .find_or_create_by_email(email, name, Role::Deployer)
            .await?;
        Ok(CurrentUser(user))
    }
}
