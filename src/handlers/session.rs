//! handlers/session.rs
//! Identidad del llamador. La sesión la resuelve la capa de auth de arriba,
//! que deja el id de usuario en la cabecera `X-User-Id`.

use std::future::{ready, Ready};

use actix_web::{dev::Payload, FromRequest, HttpRequest};

use crate::errors::AppError;

pub const USER_ID_HEADER: &str = "X-User-Id";

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let user_id = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        ready(match user_id {
            Some(id) => Ok(AuthenticatedUser {
                user_id: id.to_string(),
            }),
            None => Err(AppError::AuthRequired),
        })
    }
}
