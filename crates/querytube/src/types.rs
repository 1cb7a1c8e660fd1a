use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One video from the scraped channel catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub published_date: Option<NaiveDate>,
}

impl VideoRecord {
    pub fn new(
        video_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            video_id: video_id.into(),
            title: title.into(),
            description: description.into(),
            published_date: None,
        }
    }

    pub fn with_published_date(mut self, date: NaiveDate) -> Self {
        self.published_date = Some(date);
        self
    }

    /// Text handed to the embedding model for this record.
    /// Falls back to the title when the description is blank.
    pub fn embedding_text(&self) -> &str {
        if self.description.trim().is_empty() {
            &self.title
        } else {
            &self.description
        }
    }
}

/// A catalog record paired with its dot-product score for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredVideo {
    pub record: VideoRecord,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_text_prefers_description() {
        let record = VideoRecord::new("a", "Black Holes", "black holes and gravity");
        assert_eq!(record.embedding_text(), "black holes and gravity");
    }

    #[test]
    fn test_embedding_text_falls_back_to_title() {
        let record = VideoRecord::new("a", "Black Holes", "   ");
        assert_eq!(record.embedding_text(), "Black Holes");
    }
}
