use thiserror::Error;

/// Errors raised while assembling the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}

/// A failed notification delivery. Logged by the dispatcher, never retried.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("endpoint rejected notification: status {status}, body {body:?}")]
    Rejected { status: u16, body: String },

    #[error("failed to encode notification: {0}")]
    Encode(String),
}

impl From<serde_json::Error> for DeliveryError {
    fn from(e: serde_json::Error) -> Self {
        DeliveryError::Encode(e.to_string())
    }
}

/// Convenience type alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = EngineError::InvalidConfig("dispatcher capacity must be > 0".into());
        assert!(e.to_string().contains("capacity"));

        let e = DeliveryError::Rejected {
            status: 503,
            body: "busy".into(),
        };
        assert!(e.to_string().contains("503"));
        assert!(e.to_string().contains("busy"));
    }

    #[test]
    fn json_error_conversion() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: DeliveryError = json_err.into();
        assert!(matches!(err, DeliveryError::Encode(_)));
    }
}
