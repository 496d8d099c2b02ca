use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;

/// Body of every successful reply. Record endpoints fill `data`; deletes and
/// logout only carry a `message`.
#[derive(Debug, Serialize)]
struct Envelope<'a, T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

/// Handler reply rendered as `{"success": true, ...}`
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    status: StatusCode,
    data: Option<T>,
    message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    /// 200 with `data`
    pub fn success(data: T) -> Self {
        Self {
            status: StatusCode::OK,
            data: Some(data),
            message: None,
        }
    }

    /// 201 with `data`
    pub fn created(data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::success(data)
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let envelope = Envelope {
            success: true,
            data: self.data.as_ref(),
            message: self.message.as_deref(),
        };

        match serde_json::to_vec(&envelope) {
            Ok(body) => (
                self.status,
                [(header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Failed to serialize response data: {}", e);
                ApiError::internal_server_error("Failed to serialize response data").into_response()
            }
        }
    }
}

/// 200 with only a `message`, e.g. after a delete
pub fn message(text: &str) -> ApiResponse<Value> {
    ApiResponse {
        status: StatusCode::OK,
        data: None,
        message: Some(text.to_string()),
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::json;

    async fn body_of(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn created_wraps_data() {
        let response = ApiResponse::created(json!({"id": 1})).into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        let body = body_of(response).await;
        assert_eq!(body, json!({"success": true, "data": {"id": 1}}));
    }

    #[tokio::test]
    async fn message_replies_have_no_data() {
        let reply = message("Client deleted successfully");
        assert_eq!(reply.status(), StatusCode::OK);
        let body = body_of(reply.into_response()).await;
        assert_eq!(body, json!({"success": true, "message": "Client deleted successfully"}));
    }

    #[tokio::test]
    async fn empty_lists_still_carry_data() {
        let body = body_of(ApiResponse::success(Vec::<u8>::new()).into_response()).await;
        assert_eq!(body["data"], json!([]));
    }
}
