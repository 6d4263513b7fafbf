use crate::auth::jwt::{TokenType, verify_token};
use crate::auth::session::Session;
use crate::config::Config;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use serde_json::json;
use tracing::debug;

fn unauthorized(req: ServiceRequest, body: serde_json::Value) -> ServiceResponse<BoxBody> {
    let resp = HttpResponse::Unauthorized().json(body);
    req.into_response(resp.map_into_boxed_body())
}

pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?
        .clone();

    let header_value = match req.headers().get("Authorization") {
        Some(h) => h.to_str().map_err(|_| {
            actix_web::error::ErrorUnauthorized(
                json!({"error": "Invalid Authorization header encoding"}),
            )
        })?,
        None => {
            return Ok(unauthorized(
                req,
                json!({"error": "Missing Authorization header"}),
            ));
        }
    };

    let token = match header_value.strip_prefix("Bearer ") {
        Some(t) => t.to_string(),
        None => {
            return Ok(unauthorized(
                req,
                json!({"error": "Authorization header must start with Bearer"}),
            ));
        }
    };

    let claims = match verify_token(&token, &config.jwt_secret) {
        Ok(c) => c,
        Err(e) => {
            return Ok(unauthorized(
                req,
                json!({"error": "Invalid or expired token", "details": e}),
            ));
        }
    };

    if claims.token_type != TokenType::Access {
        return Ok(unauthorized(
            req,
            json!({"error": "Refresh tokens cannot access the API"}),
        ));
    }

    let session = match Session::from_claims(claims) {
        Some(s) => s,
        None => return Ok(unauthorized(req, json!({"error": "Invalid role"}))),
    };

    debug!(user_id = session.user_id(), username = session.username(), "Authenticated request");
    req.extensions_mut().insert(session);

    next.call(req).await
}
