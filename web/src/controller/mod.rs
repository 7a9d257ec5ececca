use serde::Serialize;
pub(crate) mod credential_controller;
pub(crate) mod event_controller;
pub(crate) mod health_check_controller;
pub(crate) mod scan_controller;
pub(crate) mod session_controller;

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(status_code: u16, data: T) -> Self {
        Self {
            status_code,
            data: Some(data),
        }
    }

    pub fn no_content(status_code: u16) -> ApiResponse<()> {
        ApiResponse {
            status_code,
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_serialize_api_response_with_some() {
        let response = ApiResponse::new(StatusCode::OK.into(), json!({"success": true}));
        let serialized = serde_json::to_value(&response).unwrap();

        assert_eq!(
            serialized,
            json!({"data": {"success": true}, "status_code": 200})
        );
    }

    #[tokio::test]
    async fn test_serialize_api_response_without_data() {
        let response = ApiResponse::<()>::no_content(StatusCode::NO_CONTENT.into());
        let serialized = serde_json::to_value(&response).unwrap();

        assert_eq!(serialized, json!({"status_code": 204}));
    }
}
