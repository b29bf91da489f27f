use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::gateway::Credential;
use crate::state::AppState;

/// Header carrying the user id verified by the edge gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller. Token verification happens upstream; the bearer
/// token is kept so it can be forwarded to collaborators.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub credential: Credential,
}

/// Returns 401 unless both a bearer token and a user id are present.
impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::Unauthorized)?;
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(AppError::Unauthorized)?;

        Ok(Caller {
            user_id: user_id.to_string(),
            credential: Credential::new(token),
        })
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/feed");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(
            bearer_token(&parts(&[("authorization", "Bearer abc")])),
            Some("abc")
        );
        assert_eq!(
            bearer_token(&parts(&[("authorization", "bearer  abc ")])),
            Some("abc")
        );
        assert_eq!(bearer_token(&parts(&[("authorization", "Basic abc")])), None);
        assert_eq!(bearer_token(&parts(&[("authorization", "Bearer ")])), None);
        assert_eq!(bearer_token(&parts(&[])), None);
    }
}
