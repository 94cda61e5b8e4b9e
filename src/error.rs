use thiserror::Error;

/// Failures of the account and authorization flows.
///
/// Every variant is recovered at the request boundary and turned into a
/// flash message; none of them end the process.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login failed")]
    LoginFailed,
    #[error("account already exists")]
    AccountExists,
    #[error("password must be at least {min} characters long", min = crate::auth::credentials::MIN_PASSWORD_LEN)]
    InvalidPassword,
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error("invalid service configuration: {0}")]
    InvalidServiceConfig(String),
    #[error("provider returned {code}")]
    Provider {
        code: String,
        description: Option<String>,
    },
    #[error("no authorization in progress")]
    MissingState,
    #[error("state mismatch")]
    StateMismatch,
    #[error("callback carried no authorization code")]
    MissingCode,
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("token exchange failed: {0}")]
    Exchange(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl AuthError {
    /// Text shown to the user in a flash message.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::LoginFailed => "Invalid credentials".to_string(),
            AuthError::AccountExists => "That email address is already in use".to_string(),
            AuthError::InvalidPassword | AuthError::PasswordMismatch => {
                capitalize(&self.to_string())
            }
            AuthError::InvalidServiceConfig(name) => {
                format!("Service '{}' is not available", name)
            }
            AuthError::Provider { code, description } => match description {
                Some(d) => format!("The provider refused authorization: {} ({})", code, d),
                None => format!("The provider refused authorization: {}", code),
            },
            AuthError::MissingState | AuthError::StateMismatch => {
                "Authorization request expired or was tampered with, please try again".to_string()
            }
            AuthError::MissingCode => "The provider did not return an authorization code".to_string(),
            AuthError::NotAuthenticated => "You must be logged in".to_string(),
            AuthError::Exchange(_) => "Could not obtain a token from the provider".to_string(),
            AuthError::Storage(_) => "An internal error occurred".to_string(),
        }
    }

    /// Whether the detail should go to the log rather than the user.
    pub fn is_internal(&self) -> bool {
        matches!(self, AuthError::Exchange(_) | AuthError::Storage(_))
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
