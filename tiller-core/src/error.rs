use thiserror::Error;

/// Unified error type for Tiller.
///
/// The admin API maps every variant to the same flat `{"error": ...}`
/// envelope, so the `Display` text is what operators see.
#[derive(Error, Debug)]
pub enum TillerError {
    #[error("{0}")]
    Validation(String),

    #[error("no service found")]
    NoService,

    #[error("no server found")]
    NoServer,

    #[error("{0}")]
    Decode(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Balancer error: {0}")]
    Balancer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, TillerError>;

impl TillerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        TillerError::Validation(msg.into())
    }

    /// The decode error surfaced for any malformed request body.
    pub fn bad_body() -> Self {
        TillerError::Decode("Bad JSON syntax received in body".into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TillerError::NoService | TillerError::NoServer | TillerError::NotFound(_)
        )
    }

    /// JSON error body.
    pub fn to_json_body(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_messages_are_stable() {
        assert_eq!(TillerError::NoService.to_string(), "no service found");
        assert_eq!(TillerError::NoServer.to_string(), "no server found");
    }

    #[test]
    fn json_body_carries_message() {
        let body = TillerError::validation("invalid port").to_json_body();
        assert_eq!(body["error"], "invalid port");
    }

    #[test]
    fn not_found_classification() {
        assert!(TillerError::NoService.is_not_found());
        assert!(TillerError::NotFound("vip".into()).is_not_found());
        assert!(!TillerError::bad_body().is_not_found());
    }
}
