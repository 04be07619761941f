use crate::types::{NodeScore, MAX_NODE_SCORE};

/// Rescale raw scores into `[0, MAX_NODE_SCORE]` by min-max normalization.
///
/// When every score is equal the minimum is lowered by one, so all nodes end
/// at `MAX_NODE_SCORE`. Arithmetic truncates. An empty list is left as is.
pub fn normalize_scores(scores: &mut [NodeScore]) {
    let Some(first) = scores.first() else {
        return;
    };

    let (lowest, highest) = scores.iter().fold((first.score, first.score), |(lo, hi), s| {
        (lo.min(s.score), hi.max(s.score))
    });

    let highest = highest as i128;
    let mut lowest = lowest as i128;
    if highest == lowest {
        lowest -= 1;
    }
    let range = highest - lowest;

    for node_score in scores.iter_mut() {
        let scaled = (node_score.score as i128 - lowest) * MAX_NODE_SCORE as i128 / range;
        node_score.score = scaled as i64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(raw: &[i64]) -> Vec<NodeScore> {
        raw.iter()
            .enumerate()
            .map(|(i, s)| NodeScore::new(format!("gpu-{}", i), *s))
            .collect()
    }

    fn normalized(raw: &[i64]) -> Vec<i64> {
        let mut list = scores(raw);
        normalize_scores(&mut list);
        list.into_iter().map(|s| s.score).collect()
    }

    #[test]
    fn test_linear_spread() {
        assert_eq!(normalized(&[10, 20, 30]), vec![0, 50, 100]);
    }

    #[test]
    fn test_uniform_shift_is_invisible() {
        assert_eq!(normalized(&[110, 120, 130]), normalized(&[10, 20, 30]));
    }

    #[test]
    fn test_all_tied_land_on_max() {
        assert_eq!(normalized(&[5, 5, 5]), vec![100, 100, 100]);
        assert_eq!(normalized(&[0]), vec![100]);
        assert_eq!(normalized(&[i64::MIN, i64::MIN]), vec![100, 100]);
    }

    #[test]
    fn test_truncating_division() {
        // (1 - 0) * 100 / 3 = 33.3 -> 33
        assert_eq!(normalized(&[0, 1, 3]), vec![0, 33, 100]);
    }

    #[test]
    fn test_order_and_names_preserved() {
        let mut list = scores(&[30, 10, 20]);
        normalize_scores(&mut list);
        let names: Vec<&str> = list.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["gpu-0", "gpu-1", "gpu-2"]);
        assert_eq!(list[0].score, 100);
        assert_eq!(list[1].score, 0);
        assert_eq!(list[2].score, 50);
    }

    #[test]
    fn test_extreme_values_do_not_overflow() {
        assert_eq!(normalized(&[0, i64::MAX]), vec![0, 100]);
        assert_eq!(normalized(&[i64::MIN, i64::MAX]), vec![0, 100]);
    }

    #[test]
    fn test_empty_list() {
        assert!(normalized(&[]).is_empty());
    }
}
