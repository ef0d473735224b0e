//! Cookie-based visitor identity.
//!
//! Every visitor carries a `user_id` cookie, assigned on first contact and
//! never changed, and a `session_id` cookie naming the active conversation.
//! [`identify`] resolves both before the handler runs and puts a
//! [`Visitor`] into the request extensions.

use axum::extract::{Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use qanun_session::{OwnerId, SessionId};
use tracing::{debug, error};
use uuid::Uuid;

use crate::server::{ApiError, AppState};

pub const USER_COOKIE: &str = "user_id";
pub const SESSION_COOKIE: &str = "session_id";

/// Who is asking, and in which conversation.
#[derive(Clone, Debug)]
pub struct Visitor {
    pub user_id: OwnerId,
    pub session_id: SessionId,
}

/// Set by a handler on its response to switch the visitor to another session.
#[derive(Clone, Debug)]
pub struct SwitchSession(pub SessionId);

/// Value of the cookie `name`, if present and non-empty.
pub fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

fn set_cookie(response: &mut Response, name: &str, value: &str) {
    match HeaderValue::from_str(&format!("{name}={value}; Path=/; SameSite=Lax")) {
        Ok(header) => {
            response.headers_mut().append(SET_COOKIE, header);
        }
        Err(e) => error!(cookie = name, error = %e, "cannot encode cookie"),
    }
}

/// Resolve the visitor, run the handler, then write the identity cookies.
///
/// `session_id` is written on every response; `user_id` only when it was
/// just assigned.
pub async fn identify(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let headers = request.headers();
    let known_user = cookie(headers, USER_COOKIE).filter(|id| Uuid::parse_str(id).is_ok());
    let new_user = known_user.is_none();
    let user_id = known_user.map(str::to_string).unwrap_or_else(|| Uuid::new_v4().to_string());
    let requested = cookie(headers, SESSION_COOKIE).map(str::to_string);

    let session_id = match state.conversations.resolve_session(requested.as_deref(), &user_id).await {
        Ok((session_id, created)) => {
            if created {
                debug!(session_id = %session_id, new_user, "session started");
            }
            session_id
        }
        Err(e) => {
            error!(error = %e, "failed to resolve session");
            return ApiError::Internal.into_response();
        }
    };

    request.extensions_mut().insert(Visitor { user_id: user_id.clone(), session_id: session_id.clone() });
    let mut response = next.run(request).await;

    let active = match response.extensions_mut().remove::<SwitchSession>() {
        Some(SwitchSession(id)) => id,
        None => session_id,
    };
    set_cookie(&mut response, SESSION_COOKIE, &active);
    if new_user {
        set_cookie(&mut response, USER_COOKIE, &user_id);
    }
    response
}
