//! Echo endpoint - the demo surface route-level limits are attached to.

use actix_web::{HttpResponse, web};
use serde_json::Value;

use tollgate_shared::ApiResponse;

/// Echo the JSON body back.
///
/// POST /api/echo
pub async fn echo(body: web::Json<Value>) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(body.into_inner()))
}
