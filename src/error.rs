use thiserror::Error;
use actix_web::{ResponseError, HttpResponse, http::StatusCode};
use serde_json::json;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] WebSocketError),

    #[error("TLS error: {0}")]
    TlsError(#[from] TlsError),

    #[error("Lifecycle error: {0}")]
    LifecycleError(#[from] LifecycleError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

// Implement conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = self.to_string();
        let response = json!({
            "error": {
                "status": status.as_u16(),
                "message": message
            }
        });
        HttpResponse::build(status).json(response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::WebSocketError(WebSocketError::UpgradeFailed(_)) => StatusCode::BAD_REQUEST,
            AppError::WebSocketError(WebSocketError::InvalidFormat(_)) => StatusCode::BAD_REQUEST,
            AppError::LifecycleError(LifecycleError::InvalidState { .. }) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Error, Debug)]
pub enum WebSocketError {
    #[error("Upgrade failed: {0}")]
    UpgradeFailed(String),

    #[error("Message sending failed: {0}")]
    SendError(String),

    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    #[error("Write timed out after {0:?}")]
    WriteTimeout(std::time::Duration),

    #[error("Distribution channel closed")]
    ChannelClosed,
}

#[derive(Error, Debug)]
pub enum TlsError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No certificates found in {0}")]
    EmptyCertificateChain(String),

    #[error("No private key found in {0}")]
    MissingPrivateKey(String),

    #[error("Unsupported minimum TLS version: {0}")]
    UnsupportedVersion(String),

    #[error("Invalid certificate pair: {0}")]
    InvalidCertificate(#[from] rustls::Error),
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: crate::server::LifecycleState,
    },

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Graceful shutdown failed: {0}")]
    Shutdown(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use crate::server::LifecycleState;

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::InternalError(_)));

        let config_err = config::ConfigError::NotFound(String::from("key not found"));
        let app_err: AppError = config_err.into();
        assert!(matches!(app_err, AppError::ConfigError(_)));

        let tls_err = TlsError::MissingPrivateKey("certs/key.pem".to_string());
        let app_err: AppError = tls_err.into();
        assert!(matches!(app_err, AppError::TlsError(TlsError::MissingPrivateKey(_))));
    }

    #[test]
    fn test_error_status_codes() {
        let err = AppError::WebSocketError(WebSocketError::UpgradeFailed("no upgrade header".to_string()));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = AppError::LifecycleError(LifecycleError::InvalidState {
            action: "start",
            state: LifecycleState::Running,
        });
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let err = AppError::ConfigError("bad".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_display() {
        let err = AppError::WebSocketError(WebSocketError::ChannelClosed);
        assert_eq!(err.to_string(), "WebSocket error: Distribution channel closed");

        let err = AppError::LifecycleError(LifecycleError::InvalidState {
            action: "stop",
            state: LifecycleState::Stopped,
        });
        assert_eq!(err.to_string(), "Lifecycle error: Cannot stop while stopped");

        let err = AppError::TlsError(TlsError::EmptyCertificateChain("cert.pem".to_string()));
        assert_eq!(err.to_string(), "TLS error: No certificates found in cert.pem");
    }
}
