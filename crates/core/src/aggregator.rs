use crate::{DocumentEvidence, Hit};
use std::collections::HashMap;

/// Per-document evidence for one query, ranked by best score.
#[derive(Debug, Clone, Default)]
pub struct EvidenceSet {
    ranked: Vec<DocumentEvidence>,
    positions: HashMap<String, usize>,
}

impl EvidenceSet {
    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    /// Best score descending, ties in first-arrival order.
    pub fn ranked(&self) -> &[DocumentEvidence] {
        &self.ranked
    }

    pub fn get(&self, document_id: &str) -> Option<&DocumentEvidence> {
        self.positions
            .get(document_id)
            .and_then(|position| self.ranked.get(*position))
    }

    pub fn top(&self) -> Option<&DocumentEvidence> {
        self.ranked.first()
    }

    pub fn runner_up(&self) -> Option<&DocumentEvidence> {
        self.ranked.get(1)
    }
}

/// Groups hits by document id, keeping the max score and every passage.
/// Hits without a document id are dropped.
pub fn aggregate<'a, I>(hits: I) -> EvidenceSet
where
    I: IntoIterator<Item = &'a Hit>,
{
    let mut ranked: Vec<DocumentEvidence> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for hit in hits {
        if hit.document_id.is_empty() {
            continue;
        }

        match positions.get(&hit.document_id) {
            Some(&position) => {
                let entry = &mut ranked[position];
                if hit.score > entry.best_score {
                    entry.best_score = hit.score;
                }
                entry.passages.push(hit.text.clone());
            }
            None => {
                positions.insert(hit.document_id.clone(), ranked.len());
                ranked.push(DocumentEvidence {
                    document_id: hit.document_id.clone(),
                    best_score: hit.score,
                    passages: vec![hit.text.clone()],
                });
            }
        }
    }

    // `sort_by` is stable, so equal scores stay in arrival order.
    ranked.sort_by(|left, right| right.best_score.total_cmp(&left.best_score));

    let positions = ranked
        .iter()
        .enumerate()
        .map(|(position, evidence)| (evidence.document_id.clone(), position))
        .collect();

    EvidenceSet { ranked, positions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sample_hits() -> Vec<Hit> {
        vec![
            Hit::new(0.61, "a", "a-1"),
            Hit::new(0.90, "b", "b-1"),
            Hit::new(0.40, "", "orphan"),
            Hit::new(0.77, "a", "a-2"),
            Hit::new(0.55, "c", "c-1"),
            Hit::new(0.30, "b", "b-2"),
            Hit::new(0.77, "a", "a-2"),
        ]
    }

    #[test]
    fn ranked_list_is_sorted_and_unique() {
        let evidence = aggregate(&sample_hits());
        let scores: Vec<f32> = evidence.ranked().iter().map(|e| e.best_score).collect();
        assert!(scores.windows(2).all(|pair| pair[0] >= pair[1]));

        let ids: HashSet<&str> = evidence
            .ranked()
            .iter()
            .map(|e| e.document_id.as_str())
            .collect();
        assert_eq!(ids.len(), evidence.len());
        assert_eq!(evidence.len(), 3);
    }

    #[test]
    fn best_score_is_maximum_not_average() {
        let evidence = aggregate(&sample_hits());
        assert_eq!(evidence.get("a").map(|e| e.best_score), Some(0.77));
        assert_eq!(evidence.get("b").map(|e| e.best_score), Some(0.90));
    }

    #[test]
    fn hits_without_document_id_are_discarded() {
        let evidence = aggregate(&sample_hits());
        assert!(evidence.get("").is_none());
        assert!(evidence
            .ranked()
            .iter()
            .all(|e| !e.passages.iter().any(|p| p == "orphan")));
    }

    #[test]
    fn passages_keep_arrival_order_and_duplicates() {
        let evidence = aggregate(&sample_hits());
        let a = evidence.get("a").expect("a aggregated");
        assert_eq!(a.passages, vec!["a-1", "a-2", "a-2"]);

        let b = evidence.get("b").expect("b aggregated");
        assert_eq!(b.passages, vec!["b-1", "b-2"]);
    }

    #[test]
    fn every_identified_hit_lands_in_exactly_one_document() {
        let hits = sample_hits();
        let evidence = aggregate(&hits);
        let total: usize = evidence.ranked().iter().map(|e| e.passages.len()).sum();
        let identified = hits.iter().filter(|h| !h.document_id.is_empty()).count();
        assert_eq!(total, identified);
    }

    #[test]
    fn equal_scores_keep_first_arrival_order() {
        let hits = vec![
            Hit::new(0.7, "late", "x"),
            Hit::new(0.7, "early", "y"),
            Hit::new(0.9, "top", "z"),
        ];
        let evidence = aggregate(&hits);
        let order: Vec<&str> = evidence
            .ranked()
            .iter()
            .map(|e| e.document_id.as_str())
            .collect();
        assert_eq!(order, vec!["top", "late", "early"]);
    }

    #[test]
    fn empty_input_yields_empty_set() {
        let evidence = aggregate(&Vec::<Hit>::new());
        assert!(evidence.is_empty());
        assert!(evidence.top().is_none());
    }
}
