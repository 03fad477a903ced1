//! Identifies the user making a request.
//!
//! Logging in happens upstream of this service. The authenticating proxy
//! forwards the user's id in the [USER_ID_HEADER] header.

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{Error, database_id::UserId};

/// The header carrying the authenticated user's id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Middleware function that reads the user ID from the [USER_ID_HEADER] header.
/// The user ID is placed into the request and the request executed normally if the header holds a
/// positive integer, otherwise a 401 response is returned.
///
/// **Note**: Route handlers can use the function argument `Extension(user_id): Extension<UserId>` to receive the user ID.
pub async fn user_guard(mut request: Request, next: Next) -> Response {
    let user_id = match user_id_from_request(&request) {
        Some(user_id) => user_id,
        None => {
            tracing::debug!(
                "Rejected request to {} without a valid user id",
                request.uri().path()
            );
            return Error::Unauthorized.into_response();
        }
    };

    request.extensions_mut().insert(user_id);
    next.run(request).await
}

fn user_id_from_request(request: &Request) -> Option<UserId> {
    request
        .headers()
        .get(USER_ID_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<UserId>()
        .ok()
        .filter(|user_id| *user_id > 0)
}
