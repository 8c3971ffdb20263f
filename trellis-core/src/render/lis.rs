//! Longest increasing subsequence.
//!
//! Keyed reconciliation uses this to find the largest set of reused
//! children whose relative order is unchanged; only the rest are moved.

/// Indices into `seq` of one longest strictly increasing subsequence.
///
/// Runs in O(n log n).
///
/// ```
/// use trellis_core::render::longest_increasing_subsequence;
///
/// let picked = longest_increasing_subsequence(&[2, 0, 1, 3]);
/// assert_eq!(picked, vec![1, 2, 3]);
/// ```
pub fn longest_increasing_subsequence(seq: &[usize]) -> Vec<usize> {
    // tails[k] is the index of the smallest tail of any increasing run of
    // length k + 1 seen so far.
    let mut tails: Vec<usize> = Vec::with_capacity(seq.len());
    let mut prev: Vec<Option<usize>> = vec![None; seq.len()];

    for (i, &value) in seq.iter().enumerate() {
        let pos = tails.partition_point(|&t| seq[t] < value);
        if pos > 0 {
            prev[i] = Some(tails[pos - 1]);
        }
        if pos == tails.len() {
            tails.push(i);
        } else {
            tails[pos] = i;
        }
    }

    let mut result = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        result.push(i);
        cursor = prev[i];
    }
    result.reverse();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&[], 0)]
    #[case(&[4], 1)]
    #[case(&[0, 1, 2, 3], 4)]
    #[case(&[3, 2, 1, 0], 1)]
    #[case(&[2, 0, 1], 2)]
    #[case(&[1, 2, 0], 2)]
    #[case(&[5, 1, 6, 2, 7, 3, 8], 4)]
    fn length(#[case] seq: &[usize], #[case] expected: usize) {
        assert_eq!(longest_increasing_subsequence(seq).len(), expected);
    }

    #[test]
    fn result_is_increasing_in_index_and_value() {
        let seq = [9, 3, 7, 4, 8, 1, 5, 6];
        let picked = longest_increasing_subsequence(&seq);

        assert_eq!(picked.len(), 4);
        for pair in picked.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(seq[pair[0]] < seq[pair[1]]);
        }
    }
}
