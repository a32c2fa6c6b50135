use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SCORE_FLOOR: f32 = 0.5;
pub const DEFAULT_LIMIT: usize = 5;
pub const MAX_LIMIT: usize = 100;

/// Returned when the vector index produced nothing to aggregate.
pub const NO_RESULTS_MESSAGE: &str = "No matching articles found.";
/// Returned when evidence existed but assembled into empty text.
pub const NO_RELEVANT_RESULTS_MESSAGE: &str = "No relevant results found.";

/// Inclusive creation-time window, already converted to UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A validated `search_articles` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleQuery {
    pub text: String,
    pub score_floor: f32,
    pub limit: usize,
    pub time_range: Option<TimeRange>,
}

impl ArticleQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            score_floor: DEFAULT_SCORE_FLOOR,
            limit: DEFAULT_LIMIT,
            time_range: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.min(MAX_LIMIT);
        self
    }

    pub fn with_score_floor(mut self, score_floor: f32) -> Self {
        self.score_floor = score_floor;
        self
    }

    pub fn with_time_range(mut self, time_range: Option<TimeRange>) -> Self {
        self.time_range = time_range;
        self
    }
}

/// One ranked result from a vector similarity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub score: f32,
    pub document_id: String,
    pub text: String,
}

impl Hit {
    pub fn new(score: f32, document_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            score,
            document_id: document_id.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentEvidence {
    pub document_id: String,
    pub best_score: f32,
    /// Passage texts in hit arrival order. Duplicates are kept.
    pub passages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplement {
    pub document_id: String,
    pub summary: String,
}

/// What the policy engine hands back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContextBundle {
    FullDocument {
        document_id: String,
        text: String,
        supplement: Option<Supplement>,
    },
    Passages {
        text: String,
        document_count: usize,
    },
    NoResults,
    NoRelevantResults,
}

impl ContextBundle {
    pub fn render(&self) -> String {
        match self {
            ContextBundle::FullDocument {
                text, supplement, ..
            } => match supplement {
                Some(supplement) => format!(
                    "{text}\n\n[Supplementary context (ID:{})]\n{}\n",
                    supplement.document_id, supplement.summary
                ),
                None => text.clone(),
            },
            ContextBundle::Passages { text, .. } => text.clone(),
            ContextBundle::NoResults => NO_RESULTS_MESSAGE.to_string(),
            ContextBundle::NoRelevantResults => NO_RELEVANT_RESULTS_MESSAGE.to_string(),
        }
    }

    pub fn is_empty_result(&self) -> bool {
        matches!(
            self,
            ContextBundle::NoResults | ContextBundle::NoRelevantResults
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: Option<String>,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub platform_name: String,
    pub created_at: DateTime<Utc>,
    pub last_active_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenefitRecord {
    pub id: i64,
    pub user_id: i64,
    pub subject_id: i64,
    pub subject_free_days: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped_to_hard_cap() {
        let query = ArticleQuery::new("chip exports").with_limit(500);
        assert_eq!(query.limit, MAX_LIMIT);
    }

    #[test]
    fn full_document_renders_supplement_after_primary_text() {
        let bundle = ContextBundle::FullDocument {
            document_id: "a1".to_string(),
            text: "primary body".to_string(),
            supplement: Some(Supplement {
                document_id: "a2".to_string(),
                summary: "second summary".to_string(),
            }),
        };

        let rendered = bundle.render();
        assert!(rendered.starts_with("primary body"));
        assert!(rendered.contains("(ID:a2)"));
        assert!(rendered.ends_with("second summary\n"));
    }

    #[test]
    fn sentinels_render_fixed_messages() {
        assert_eq!(ContextBundle::NoResults.render(), NO_RESULTS_MESSAGE);
        assert_eq!(
            ContextBundle::NoRelevantResults.render(),
            NO_RELEVANT_RESULTS_MESSAGE
        );
    }
}
