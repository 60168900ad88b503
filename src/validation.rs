//! Submit-time validation errors shared by the song and event forms.

/// A user error that blocks submission. The form stays open.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("A name is required")]
    EmptyName,
    #[error("The clip must end after it starts")]
    ZeroWidthClip,
    #[error("No clip has been selected")]
    MissingSelection,
    #[error("An audio file is required for a new song")]
    MissingAudio,
    #[error("Invalid time {0:?}, expected HH:MM")]
    InvalidTime(String),
    #[error("A day is required")]
    MissingDay,
    #[error("A song must be selected")]
    MissingSong,
}

/// Trim a user-entered name, rejecting blank input.
pub fn require_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_names_are_rejected() {
        assert_eq!(require_name(""), Err(ValidationError::EmptyName));
        assert_eq!(require_name("   \t"), Err(ValidationError::EmptyName));
    }

    #[test]
    fn names_are_trimmed() {
        assert_eq!(require_name("  Morning bell ").unwrap(), "Morning bell");
    }
}
