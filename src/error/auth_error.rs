use thiserror::Error;

/// Security strategy errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token endpoint could not be reached.
    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The token endpoint answered but did not grant a token.
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// The revocation endpoint rejected the request.
    #[error("token revocation failed: {0}")]
    TokenRevocation(String),

    /// Credentials could not be applied to the outgoing request.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
}
