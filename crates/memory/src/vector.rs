//! Vector similarity and ranking utilities.
//!
//! Pure-Rust implementations of:
//! - Cosine similarity
//! - Stable top-k ranking over knowledge records

use relaydesk_core::knowledge::{KnowledgeRecord, ScoredRecord};

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty, or if a non-finite
/// component makes the result undefined.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    let sim = dot / denom;
    if !sim.is_finite() {
        return 0.0;
    }
    sim as f32
}

/// Rank records by cosine similarity to `query`, keeping the best `k`.
///
/// `records` must be in insertion order: the sort is stable, so equal
/// scores keep that order and repeated searches return identical rankings.
pub fn rank_by_similarity<'a, I>(records: I, query: &[f32], k: usize) -> Vec<ScoredRecord>
where
    I: IntoIterator<Item = &'a KnowledgeRecord>,
{
    if k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<(f32, &KnowledgeRecord)> = records
        .into_iter()
        .map(|record| (cosine_similarity(&record.vector, query), record))
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.truncate(k);
    scored
        .into_iter()
        .map(|(score, record)| ScoredRecord {
            record: record.clone(),
            score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use relaydesk_core::{OwnerId, SourceType};

    fn record(id: &str, vector: Vec<f32>) -> KnowledgeRecord {
        KnowledgeRecord {
            id: id.into(),
            vector,
            text: format!("Content for {id}"),
            owner_id: OwnerId::from("acme"),
            source_type: SourceType::Text,
            file_name: "notes.txt".into(),
            chunk_index: 0,
            total_chunks: 1,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn cosine_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0, 0.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn cosine_known_value() {
        // [1,1] · [1,0] = 1, |[1,1]| = sqrt(2), |[1,0]| = 1
        let sim = cosine_similarity(&[1.0, 1.0], &[1.0, 0.0]);
        assert!((sim - 0.7071).abs() < 0.001);
    }

    #[test]
    fn ranks_by_descending_similarity() {
        let query = vec![1.0, 0.0, 0.0];
        let records = vec![
            record("a", vec![0.0, 1.0, 0.0]), // orthogonal = 0
            record("b", vec![1.0, 0.0, 0.0]), // identical = 1
            record("c", vec![0.5, 0.5, 0.0]), // partial = ~0.707
        ];

        let results = rank_by_similarity(&records, &query, 10);
        let ids: Vec<_> = results.iter().map(|r| r.record.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let query = vec![1.0, 0.0];
        let records: Vec<_> = ["first", "second", "third"]
            .iter()
            .map(|id| record(id, vec![2.0, 0.0]))
            .collect();

        for _ in 0..5 {
            let results = rank_by_similarity(&records, &query, 2);
            let ids: Vec<_> = results.iter().map(|r| r.record.id.as_str()).collect();
            assert_eq!(ids, vec!["first", "second"]);
        }
    }

    #[test]
    fn non_finite_components_rank_as_unrelated() {
        assert_eq!(cosine_similarity(&[f32::NAN, 1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[f32::INFINITY, 1.0], &[1.0, 0.0]), 0.0);

        let query = vec![1.0, 0.0];
        let records = vec![
            record("nan", vec![f32::NAN, 0.0]),
            record("match", vec![1.0, 0.0]),
            record("inf", vec![f32::INFINITY, f32::NEG_INFINITY]),
            record("partial", vec![1.0, 1.0]),
        ];

        let ids: Vec<_> = rank_by_similarity(&records, &query, 10)
            .iter()
            .map(|r| r.record.id.clone())
            .collect();
        assert_eq!(ids, vec!["match", "partial", "nan", "inf"]);
    }

    #[test]
    fn respects_k() {
        let query = vec![1.0, 0.0];
        let records: Vec<_> = (0..10)
            .map(|i| record(&format!("e{i}"), vec![1.0, i as f32 * 0.1]))
            .collect();

        assert_eq!(rank_by_similarity(&records, &query, 3).len(), 3);
        assert!(rank_by_similarity(&records, &query, 0).is_empty());
    }
}
