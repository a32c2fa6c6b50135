//! Decides what shape of evidence a query returns.
//!
//! Two strategies share the [`RetrievalPolicy`] seam:
//!
//! * [`ThresholdPolicy`] returns the full text of the top document when its
//!   best score is strictly above `full_document`. When the runner-up is
//!   strictly above `supplementary`, its summary is appended. A failed or empty
//!   fetch falls back to the passage bundle.
//! * [`ScoreFloorPolicy`] drops hits below the caller's floor and always
//!   returns the passage bundle.

use crate::aggregator::{aggregate, EvidenceSet};
use crate::cancel::until_cancelled;
use crate::traits::DocumentFetcher;
use crate::{ArticleQuery, ContextBundle, Hit, RetrievalError, Supplement};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_FULL_DOCUMENT_THRESHOLD: f32 = 0.82;
pub const DEFAULT_SUPPLEMENTARY_THRESHOLD: f32 = 0.75;

const DOCUMENT_BOUNDARY: &str = "\n---\n";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyThresholds {
    pub full_document: f32,
    pub supplementary: f32,
}

impl Default for PolicyThresholds {
    fn default() -> Self {
        Self {
            full_document: DEFAULT_FULL_DOCUMENT_THRESHOLD,
            supplementary: DEFAULT_SUPPLEMENTARY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyKind {
    #[default]
    Threshold,
    ScoreFloor,
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "threshold" => Ok(PolicyKind::Threshold),
            "score-floor" | "score_floor" => Ok(PolicyKind::ScoreFloor),
            other => Err(format!(
                "unknown policy '{other}', expected 'threshold' or 'score-floor'"
            )),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::Threshold => f.write_str("threshold"),
            PolicyKind::ScoreFloor => f.write_str("score-floor"),
        }
    }
}

#[async_trait]
pub trait RetrievalPolicy: Send + Sync {
    fn kind(&self) -> PolicyKind;

    /// Only cancellation is an error here. Fetch failures fall back.
    async fn assemble(
        &self,
        hits: &[Hit],
        query: &ArticleQuery,
        fetcher: &dyn DocumentFetcher,
        cancel: &CancellationToken,
    ) -> Result<ContextBundle, RetrievalError>;
}

pub fn build_policy(kind: PolicyKind, thresholds: PolicyThresholds) -> Box<dyn RetrievalPolicy> {
    match kind {
        PolicyKind::Threshold => Box::new(ThresholdPolicy::new(thresholds)),
        PolicyKind::ScoreFloor => Box::new(ScoreFloorPolicy),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdPolicy {
    thresholds: PolicyThresholds,
}

impl ThresholdPolicy {
    pub fn new(thresholds: PolicyThresholds) -> Self {
        Self { thresholds }
    }

    async fn supplement(
        &self,
        evidence: &EvidenceSet,
        fetcher: &dyn DocumentFetcher,
        cancel: &CancellationToken,
    ) -> Result<Option<Supplement>, RetrievalError> {
        let Some(runner_up) = evidence.runner_up() else {
            return Ok(None);
        };
        if runner_up.best_score <= self.thresholds.supplementary {
            return Ok(None);
        }

        match until_cancelled(cancel, fetcher.fetch_summary(&runner_up.document_id)).await {
            Ok(Some(summary)) if !summary.trim().is_empty() => Ok(Some(Supplement {
                document_id: runner_up.document_id.clone(),
                summary,
            })),
            Ok(_) => Ok(None),
            Err(RetrievalError::Cancelled) => Err(RetrievalError::Cancelled),
            Err(error) => {
                debug!(document_id = %runner_up.document_id, %error, "supplementary summary skipped");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl RetrievalPolicy for ThresholdPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Threshold
    }

    async fn assemble(
        &self,
        hits: &[Hit],
        _query: &ArticleQuery,
        fetcher: &dyn DocumentFetcher,
        cancel: &CancellationToken,
    ) -> Result<ContextBundle, RetrievalError> {
        let evidence = aggregate(hits);
        let Some(top) = evidence.top() else {
            return Ok(ContextBundle::NoResults);
        };

        if top.best_score > self.thresholds.full_document {
            match until_cancelled(cancel, fetcher.fetch_full_text(&top.document_id)).await {
                Ok(Some(text)) if !text.trim().is_empty() => {
                    let supplement = self.supplement(&evidence, fetcher, cancel).await?;
                    info!(
                        document_id = %top.document_id,
                        score = top.best_score,
                        supplemented = supplement.is_some(),
                        "returning full document"
                    );
                    return Ok(ContextBundle::FullDocument {
                        document_id: top.document_id.clone(),
                        text,
                        supplement,
                    });
                }
                Ok(_) => {
                    debug!(document_id = %top.document_id, "full text empty, bundling passages");
                }
                Err(RetrievalError::Cancelled) => return Err(RetrievalError::Cancelled),
                Err(error) => {
                    warn!(document_id = %top.document_id, %error, "full text fetch failed, bundling passages");
                }
            }
        }

        Ok(bundle_passages(&evidence))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreFloorPolicy;

#[async_trait]
impl RetrievalPolicy for ScoreFloorPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::ScoreFloor
    }

    async fn assemble(
        &self,
        hits: &[Hit],
        query: &ArticleQuery,
        _fetcher: &dyn DocumentFetcher,
        _cancel: &CancellationToken,
    ) -> Result<ContextBundle, RetrievalError> {
        let evidence = aggregate(hits.iter().filter(|hit| hit.score >= query.score_floor));
        if evidence.is_empty() {
            return Ok(ContextBundle::NoResults);
        }

        debug!(
            documents = evidence.len(),
            floor = query.score_floor,
            "bundling passages above score floor"
        );
        Ok(bundle_passages(&evidence))
    }
}

/// Concatenates passages document by document, in ranked order, keeping each
/// document's passages in arrival order. Never touches the fetcher.
pub fn bundle_passages(evidence: &EvidenceSet) -> ContextBundle {
    let mut text = String::new();
    let mut document_count = 0;

    for document in evidence.ranked() {
        let mut emitted = false;
        for passage in &document.passages {
            if passage.trim().is_empty() {
                continue;
            }
            text.push_str("...");
            text.push_str(passage);
            text.push_str("...\n");
            emitted = true;
        }

        if emitted {
            text.push_str(DOCUMENT_BOUNDARY);
            document_count += 1;
        }
    }

    if text.is_empty() {
        ContextBundle::NoRelevantResults
    } else {
        ContextBundle::Passages {
            text,
            document_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeFetcher {
        full_texts: HashMap<String, String>,
        summaries: HashMap<String, String>,
        fail_full_text: bool,
        fail_summary: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn with_full_text(mut self, id: &str, text: &str) -> Self {
            self.full_texts.insert(id.to_string(), text.to_string());
            self
        }

        fn with_summary(mut self, id: &str, text: &str) -> Self {
            self.summaries.insert(id.to_string(), text.to_string());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl DocumentFetcher for FakeFetcher {
        async fn fetch_full_text(&self, document_id: &str) -> Result<Option<String>, RetrievalError> {
            self.calls
                .lock()
                .expect("calls lock")
                .push(format!("full:{document_id}"));
            if self.fail_full_text {
                return Err(RetrievalError::DocumentFetch("connection reset".to_string()));
            }
            Ok(self.full_texts.get(document_id).cloned())
        }

        async fn fetch_summary(&self, document_id: &str) -> Result<Option<String>, RetrievalError> {
            self.calls
                .lock()
                .expect("calls lock")
                .push(format!("summary:{document_id}"));
            if self.fail_summary {
                return Err(RetrievalError::DocumentFetch("timeout".to_string()));
            }
            Ok(self.summaries.get(document_id).cloned())
        }
    }

    fn query() -> ArticleQuery {
        ArticleQuery::new("semiconductor export controls")
    }

    async fn run(
        policy: &dyn RetrievalPolicy,
        hits: &[Hit],
        fetcher: &FakeFetcher,
    ) -> ContextBundle {
        policy
            .assemble(hits, &query(), fetcher, &CancellationToken::new())
            .await
            .expect("assemble should not fail")
    }

    #[tokio::test]
    async fn empty_hits_return_no_results_without_fetching() {
        let fetcher = FakeFetcher::default();
        let bundle = run(&ThresholdPolicy::default(), &[], &fetcher).await;
        assert_eq!(bundle, ContextBundle::NoResults);
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn confident_top_hit_returns_full_text() {
        let fetcher = FakeFetcher::default().with_full_text("a", "full article body");
        let hits = vec![Hit::new(0.91, "a", "chunk a"), Hit::new(0.60, "b", "chunk b")];

        let bundle = run(&ThresholdPolicy::default(), &hits, &fetcher).await;
        assert_eq!(bundle.render(), "full article body");
        assert_eq!(fetcher.calls(), vec!["full:a"]);
    }

    #[tokio::test]
    async fn score_equal_to_threshold_does_not_fetch() {
        let fetcher = FakeFetcher::default().with_full_text("a", "full article body");
        let hits = vec![Hit::new(0.82, "a", "chunk a")];

        let bundle = run(&ThresholdPolicy::default(), &hits, &fetcher).await;
        assert_eq!(bundle.render(), "...chunk a...\n\n---\n");
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn strong_runner_up_adds_supplementary_summary() {
        let fetcher = FakeFetcher::default()
            .with_full_text("a", "full article body")
            .with_summary("b", "b in brief");
        let hits = vec![Hit::new(0.90, "a", "chunk a"), Hit::new(0.80, "b", "chunk b")];

        let bundle = run(&ThresholdPolicy::default(), &hits, &fetcher).await;
        match &bundle {
            ContextBundle::FullDocument {
                text, supplement, ..
            } => {
                assert_eq!(text, "full article body");
                assert_eq!(
                    supplement.as_ref().map(|s| s.summary.as_str()),
                    Some("b in brief")
                );
            }
            other => panic!("expected full document, got {other:?}"),
        }
        assert!(bundle.render().starts_with("full article body"));
        assert_eq!(fetcher.calls(), vec!["full:a", "summary:b"]);
    }

    #[tokio::test]
    async fn runner_up_at_secondary_threshold_is_not_fetched() {
        let fetcher = FakeFetcher::default()
            .with_full_text("a", "full article body")
            .with_summary("b", "b in brief");
        let hits = vec![Hit::new(0.90, "a", "chunk a"), Hit::new(0.75, "b", "chunk b")];

        let bundle = run(&ThresholdPolicy::default(), &hits, &fetcher).await;
        assert_eq!(bundle.render(), "full article body");
        assert_eq!(fetcher.calls(), vec!["full:a"]);
    }

    #[tokio::test]
    async fn failing_summary_is_silently_omitted() {
        let fetcher = FakeFetcher {
            fail_summary: true,
            ..FakeFetcher::default().with_full_text("a", "full article body")
        };
        let hits = vec![Hit::new(0.90, "a", "chunk a"), Hit::new(0.80, "b", "chunk b")];

        let bundle = run(&ThresholdPolicy::default(), &hits, &fetcher).await;
        assert_eq!(bundle.render(), "full article body");
    }

    #[tokio::test]
    async fn failing_full_text_falls_back_to_payload_passages() {
        let fetcher = FakeFetcher {
            fail_full_text: true,
            ..FakeFetcher::default()
        };
        let hits = vec![
            Hit::new(0.95, "a", "a first"),
            Hit::new(0.70, "b", "b only"),
            Hit::new(0.85, "a", "a second"),
        ];

        let bundle = run(&ThresholdPolicy::default(), &hits, &fetcher).await;
        assert_eq!(
            bundle.render(),
            "...a first...\n...a second...\n\n---\n...b only...\n\n---\n"
        );
        assert_eq!(fetcher.calls(), vec!["full:a"]);
    }

    #[tokio::test]
    async fn empty_full_text_falls_back_to_passages() {
        let fetcher = FakeFetcher::default().with_full_text("a", "   ");
        let hits = vec![Hit::new(0.95, "a", "a first")];

        let bundle = run(&ThresholdPolicy::default(), &hits, &fetcher).await;
        assert!(matches!(bundle, ContextBundle::Passages { document_count: 1, .. }));
    }

    #[tokio::test]
    async fn bundle_keeps_arrival_order_inside_a_document() {
        let fetcher = FakeFetcher::default();
        let hits = vec![
            Hit::new(0.40, "a", "third-ranked passage first"),
            Hit::new(0.70, "a", "best passage second"),
            Hit::new(0.50, "a", "middle passage third"),
        ];

        let bundle = run(&ThresholdPolicy::default(), &hits, &fetcher).await;
        assert_eq!(
            bundle.render(),
            "...third-ranked passage first...\n...best passage second...\n...middle passage third...\n\n---\n"
        );
    }

    #[tokio::test]
    async fn blank_passages_only_yield_no_relevant_results() {
        let fetcher = FakeFetcher::default();
        let hits = vec![Hit::new(0.40, "a", ""), Hit::new(0.30, "b", "  ")];

        let bundle = run(&ThresholdPolicy::default(), &hits, &fetcher).await;
        assert_eq!(bundle, ContextBundle::NoRelevantResults);
    }

    #[tokio::test]
    async fn score_floor_drops_low_hits_and_never_fetches() {
        let fetcher = FakeFetcher::default().with_full_text("a", "full article body");
        let hits = vec![
            Hit::new(0.95, "a", "a strong"),
            Hit::new(0.45, "a", "a weak"),
            Hit::new(0.30, "b", "b weak"),
            Hit::new(0.50, "c", "c at floor"),
        ];

        let bundle = run(&ScoreFloorPolicy, &hits, &fetcher).await;
        assert_eq!(
            bundle.render(),
            "...a strong...\n\n---\n...c at floor...\n\n---\n"
        );
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn score_floor_with_nothing_above_returns_no_results() {
        let fetcher = FakeFetcher::default();
        let hits = vec![Hit::new(0.2, "a", "weak")];

        let bundle = run(&ScoreFloorPolicy, &hits, &fetcher).await;
        assert_eq!(bundle, ContextBundle::NoResults);
    }

    #[tokio::test]
    async fn cancelled_request_skips_full_document_branch() {
        let fetcher = FakeFetcher::default().with_full_text("a", "full article body");
        let hits = vec![Hit::new(0.95, "a", "a first")];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = ThresholdPolicy::default()
            .assemble(&hits, &query(), &fetcher, &cancel)
            .await;
        assert!(matches!(result, Err(RetrievalError::Cancelled)));
        assert!(fetcher.calls().is_empty());
    }

    #[test]
    fn policy_kind_parses_both_spellings() {
        assert_eq!("threshold".parse::<PolicyKind>(), Ok(PolicyKind::Threshold));
        assert_eq!("score-floor".parse::<PolicyKind>(), Ok(PolicyKind::ScoreFloor));
        assert_eq!("Score_Floor".parse::<PolicyKind>(), Ok(PolicyKind::ScoreFloor));
        assert!("hybrid".parse::<PolicyKind>().is_err());
        assert_eq!(build_policy(PolicyKind::ScoreFloor, PolicyThresholds::default()).kind(), PolicyKind::ScoreFloor);
    }

    struct CancelDuringSummary {
        cancel: CancellationToken,
    }

    #[async_trait]
    impl DocumentFetcher for CancelDuringSummary {
        async fn fetch_full_text(&self, _document_id: &str) -> Result<Option<String>, RetrievalError> {
            Ok(Some("full article body".to_string()))
        }

        async fn fetch_summary(&self, _document_id: &str) -> Result<Option<String>, RetrievalError> {
            self.cancel.cancel();
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn cancellation_during_summary_fetch_aborts_the_request() {
        let cancel = CancellationToken::new();
        let fetcher = CancelDuringSummary {
            cancel: cancel.clone(),
        };
        let hits = vec![Hit::new(0.90, "a", "chunk a"), Hit::new(0.80, "b", "chunk b")];

        let result = ThresholdPolicy::default()
            .assemble(&hits, &query(), &fetcher, &cancel)
            .await;
        assert!(matches!(result, Err(RetrievalError::Cancelled)));
    }

    #[tokio::test]
    async fn missing_or_blank_summary_leaves_only_the_full_text() {
        let hits = vec![Hit::new(0.90, "a", "chunk a"), Hit::new(0.80, "b", "chunk b")];

        let not_found = FakeFetcher::default().with_full_text("a", "full article body");
        let bundle = run(&ThresholdPolicy::default(), &hits, &not_found).await;
        assert_eq!(bundle.render(), "full article body");
        assert_eq!(not_found.calls(), vec!["full:a", "summary:b"]);

        let blank = FakeFetcher::default()
            .with_full_text("a", "full article body")
            .with_summary("b", "  \n ");
        let bundle = run(&ThresholdPolicy::default(), &hits, &blank).await;
        assert!(matches!(
            bundle,
            ContextBundle::FullDocument {
                supplement: None,
                ..
            }
        ));
        assert_eq!(bundle.render(), "full article body");
    }
}
