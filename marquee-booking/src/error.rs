use marquee_core::{BookingStatus, RepositoryError, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{message}")]
    Validation { message: String, fields: Vec<String> },

    #[error("{}", describe_missing(.entity, .reference, .expected))]
    NotFound {
        entity: &'static str,
        reference: String,
        expected: Option<BookingStatus>,
    },

    #[error("Verification code does not match")]
    InvalidCode,

    #[error("Invalid ticket payload: {0}")]
    InvalidFormat(String),

    #[error("Seats already taken: {}", .0.join(", "))]
    SeatConflict(Vec<String>),

    #[error("Cannot move {reference} from {from} to {to}")]
    InvalidTransition {
        reference: String,
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

fn describe_missing(entity: &str, reference: &str, expected: &Option<BookingStatus>) -> String {
    match expected {
        Some(status) => format!("No {} {} awaiting {} found", entity, reference, status),
        None => format!("{} not found: {}", capitalize(entity), reference),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl BookingError {
    pub fn missing_fields(fields: Vec<&str>) -> Self {
        Self::Validation {
            message: format!("Missing required fields: {}", fields.join(", ")),
            fields: fields.into_iter().map(String::from).collect(),
        }
    }

    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            fields: vec![field.to_string()],
        }
    }

    pub fn not_found(entity: &'static str, reference: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            reference: reference.into(),
            expected: None,
        }
    }

    pub fn not_in_state(entity: &'static str, reference: impl Into<String>, expected: BookingStatus) -> Self {
        Self::NotFound {
            entity,
            reference: reference.into(),
            expected: Some(expected),
        }
    }
}
