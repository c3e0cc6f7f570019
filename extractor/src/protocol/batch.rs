//! Request batching for identifier-list operations.
//!
//! The MarcOut endpoint rejects identifier lists longer than 100 entries, so
//! every identifier-driven operation walks its input in fixed-size batches.
//! Batch boundaries are also failure boundaries: a failed request costs one
//! batch, never the whole change set.

/// Maximum number of identifiers the endpoint accepts in a single request.
pub const MAX_IDS_PER_REQUEST: usize = 100;

/// Splits identifiers into request-sized batches, preserving order.
pub fn batches<T>(ids: &[T]) -> impl Iterator<Item = &[T]> {
    ids.chunks(MAX_IDS_PER_REQUEST)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| i.to_string()).collect()
    }

    #[test]
    fn empty_input_produces_no_batches() {
        assert_eq!(batches::<String>(&[]).count(), 0);
    }

    #[test]
    fn batch_count_is_input_size_divided_rounding_up() {
        for (n, expected) in [(1, 1), (100, 1), (101, 2), (250, 3), (300, 3)] {
            let ids = ids(n);
            assert_eq!(batches(&ids).count(), expected, "for {n} ids");
        }
    }

    #[test]
    fn every_id_appears_exactly_once_in_order() {
        let ids = ids(237);
        let rejoined: Vec<String> = batches(&ids).flatten().cloned().collect();
        assert_eq!(rejoined, ids);
        assert!(batches(&ids).all(|batch| batch.len() <= MAX_IDS_PER_REQUEST));
    }
}
