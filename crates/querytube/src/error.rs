use thiserror::Error;

/// Errors surfaced at the search boundary.
///
/// Internal plumbing (file IO, ONNX runtime, downloads) uses `anyhow`; those
/// failures are folded into one of these kinds before reaching a caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    /// Dataset unreadable, model unloadable, or no record embeddable.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// Blank or whitespace-only query text.
    #[error("query is empty")]
    EmptyQuery,

    /// The embedding function failed or returned a malformed vector.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),
}

impl SearchError {
    /// Message safe to show to an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            SearchError::EmptyQuery => "Please enter a valid search query.",
            SearchError::EmbeddingUnavailable(_) => "Search unavailable, please try again.",
            SearchError::Initialization(_) => "Search is not ready yet.",
        }
    }

    pub(crate) fn initialization(err: impl std::fmt::Display) -> Self {
        SearchError::Initialization(err.to_string())
    }

    pub(crate) fn embedding(err: impl std::fmt::Display) -> Self {
        SearchError::EmbeddingUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages_hide_internal_detail() {
        let err = SearchError::EmbeddingUnavailable("onnx session poisoned".into());
        assert!(!err.user_message().contains("onnx"));
        assert!(err.to_string().contains("onnx session poisoned"));
    }

    #[test]
    fn test_empty_query_prompts_for_text() {
        assert!(SearchError::EmptyQuery.user_message().contains("enter"));
    }
}
