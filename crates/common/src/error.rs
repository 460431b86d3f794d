// Tagged domain-error union for the artifact core.
//
// Transport adapters (REST handlers, MCP tool dispatch) render these
// into their own wire shapes; the core never builds ad hoc error maps.

use thiserror::Error;

use crate::edit::EditError;
use crate::types::{CONTENT_MAX_CHARS, TITLE_MAX_CHARS};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    /// Unknown id, an artifact owned by someone else, or an evicted /
    /// never-existing version. Deliberately indistinguishable.
    #[error("artifact or version not found")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Edit(#[from] EditError),
    /// Lost a version-checked compare-and-swap against the store.
    #[error("artifact was modified concurrently; retry the edit")]
    EditConflict,
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

pub fn validate_title(title: &str) -> Result<(), DomainError> {
    let chars = title.chars().count();
    if chars == 0 {
        return Err(DomainError::validation("title must not be empty"));
    }
    if chars > TITLE_MAX_CHARS {
        return Err(DomainError::validation(format!(
            "title must not exceed {TITLE_MAX_CHARS} characters"
        )));
    }
    Ok(())
}

pub fn validate_content(content: &str) -> Result<(), DomainError> {
    let chars = content.chars().count();
    if chars == 0 {
        return Err(DomainError::validation("content must not be empty"));
    }
    if chars > CONTENT_MAX_CHARS {
        return Err(DomainError::validation(format!(
            "content must not exceed {CONTENT_MAX_CHARS} characters"
        )));
    }
    Ok(())
}
