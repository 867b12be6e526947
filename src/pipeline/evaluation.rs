// Evaluation aggregator — pass/fail verdicts and best-iteration selection
//
// Pure functions over Scores. Nothing here keeps state.

use std::cmp::Ordering;

use super::types::Scores;

/// Faithfulness and readability must both reach this to pass.
pub const PRIMARY_THRESHOLD: u8 = 7;
/// Conciseness and aesthetics must both reach this for an overall pass.
pub const SECONDARY_THRESHOLD: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub primary_pass: bool,
    pub overall_pass: bool,
}

/// `overall_pass` is only ever computed on top of `primary_pass`.
pub fn verdict(scores: &Scores) -> Verdict {
    let primary_pass =
        scores.faithfulness >= PRIMARY_THRESHOLD && scores.readability >= PRIMARY_THRESHOLD;
    let overall_pass = primary_pass
        && scores.conciseness >= SECONDARY_THRESHOLD
        && scores.aesthetics >= SECONDARY_THRESHOLD;
    Verdict {
        primary_pass,
        overall_pass,
    }
}

/// Order two iterations best-first.
///
/// Primary pass first, then faithfulness + readability, then conciseness +
/// aesthetics (both descending), then the earlier iteration.
pub fn compare_iterations(a: (u32, &Scores), b: (u32, &Scores)) -> Ordering {
    let (ia, sa) = a;
    let (ib, sb) = b;
    verdict(sb)
        .primary_pass
        .cmp(&verdict(sa).primary_pass)
        .then_with(|| sb.primary_sum().cmp(&sa.primary_sum()))
        .then_with(|| sb.secondary_sum().cmp(&sa.secondary_sum()))
        .then_with(|| ia.cmp(&ib))
}

/// Best iteration under [`compare_iterations`], or None when empty.
pub fn select_best<'a, I>(iterations: I) -> Option<u32>
where
    I: IntoIterator<Item = (u32, &'a Scores)>,
{
    iterations
        .into_iter()
        .min_by(|a, b| compare_iterations(*a, *b))
        .map(|(iteration, _)| iteration)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_scores() -> impl Iterator<Item = Scores> {
        (0..=10u8).flat_map(|f| {
            (0..=10u8).flat_map(move |r| {
                (0..=10u8).flat_map(move |c| (0..=10u8).map(move |a| Scores::new(f, r, c, a)))
            })
        })
    }

    #[test]
    fn test_clean_pass_scenario() {
        let v = verdict(&Scores::new(8, 9, 6, 7));
        assert!(v.primary_pass);
        assert!(v.overall_pass);
    }

    #[test]
    fn test_primary_failure_scenario() {
        let v = verdict(&Scores::new(5, 8, 9, 9));
        assert!(!v.primary_pass);
        assert!(!v.overall_pass);
    }

    #[test]
    fn test_secondary_only_miss() {
        let v = verdict(&Scores::new(9, 9, 4, 8));
        assert!(v.primary_pass);
        assert!(!v.overall_pass);
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        assert!(verdict(&Scores::new(7, 7, 5, 5)).overall_pass);
        assert!(!verdict(&Scores::new(6, 7, 5, 5)).primary_pass);
        assert!(!verdict(&Scores::new(7, 6, 5, 5)).primary_pass);
    }

    #[test]
    fn test_overall_never_without_primary() {
        for scores in all_scores() {
            let v = verdict(&scores);
            assert!(!v.overall_pass || v.primary_pass, "{:?}", scores);
        }
    }

    #[test]
    fn test_verdict_is_idempotent() {
        for scores in all_scores() {
            assert_eq!(verdict(&scores), verdict(&scores));
        }
    }

    #[test]
    fn test_select_best_prefers_primary_pass() {
        let failing_high = Scores::new(6, 10, 10, 10);
        let passing_low = Scores::new(7, 7, 1, 1);
        let best = select_best([(1, &failing_high), (2, &passing_low)]);
        assert_eq!(best, Some(2));
    }

    #[test]
    fn test_select_best_by_primary_sum_when_all_fail() {
        let a = Scores::new(5, 6, 9, 9);
        let b = Scores::new(6, 6, 1, 1);
        let c = Scores::new(4, 4, 10, 10);
        assert_eq!(select_best([(1, &a), (2, &b), (3, &c)]), Some(2));
    }

    #[test]
    fn test_select_best_secondary_then_earliest() {
        let a = Scores::new(6, 6, 3, 3);
        let b = Scores::new(6, 6, 5, 5);
        let c = Scores::new(6, 6, 5, 5);
        assert_eq!(select_best([(1, &a), (2, &b), (3, &c)]), Some(2));
        assert_eq!(select_best([(3, &c), (2, &b)]), Some(2));
    }

    #[test]
    fn test_select_best_empty() {
        assert_eq!(select_best(std::iter::empty()), None);
    }
}
