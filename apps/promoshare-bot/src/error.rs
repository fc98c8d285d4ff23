use thiserror::Error;

/// Failure taxonomy for everything user- or admin-facing. Handlers turn
/// each variant into a readable chat message; nothing here should ever
/// escape a dispatcher endpoint as a crash.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("external API failure: {0}")]
    External(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        ServiceError::Storage(e.into())
    }
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ServiceError::Validation(msg.into())
    }

    /// The line shown in chat. Storage failures get a generic apology
    /// instead of leaking SQL details.
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::NotFound(what) => format!("❌ {} not found.", capitalize(what)),
            ServiceError::Validation(msg) => msg.clone(),
            ServiceError::External(_) | ServiceError::Storage(_) => {
                "❌ Something went wrong, please try again later.".to_string()
            }
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_stay_generic_in_chat() {
        let err = ServiceError::Storage(anyhow::anyhow!("UNIQUE constraint failed: users.x"));
        assert!(!err.user_message().contains("UNIQUE"));
    }

    #[test]
    fn not_found_names_the_subject() {
        assert_eq!(
            ServiceError::NotFound("offer").user_message(),
            "❌ Offer not found."
        );
    }
}
