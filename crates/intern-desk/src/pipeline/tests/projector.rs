use super::common::*;
use crate::pipeline::domain::{ApplicantId, MatchResult, SelectionPolicy};
use crate::pipeline::projector::{project, rank_roster, shortlist_len, RankingSource};

fn ids(entries: &[crate::pipeline::RankedApplicant]) -> Vec<&str> {
    entries.iter().map(|entry| entry.id.0.as_str()).collect()
}

#[test]
fn top_percent_uses_ceiling_and_stays_in_bounds() {
    let post = post(Some(3));
    for n in 1..=40usize {
        for percent in [1u8, 10, 20, 30, 50, 75, 99, 100] {
            let len = shortlist_len(SelectionPolicy::TopPercent(percent), n, &post);
            let expected = (usize::from(percent) * n).div_ceil(100);
            assert_eq!(len, expected, "n={n} p={percent}");
            assert!((1..=n).contains(&len), "n={n} p={percent}");
        }
    }
}

#[test]
fn empty_ranking_yields_empty_shortlist_for_every_policy() {
    let post = post(Some(3));
    assert_eq!(shortlist_len(SelectionPolicy::TopPercent(100), 0, &post), 0);
    assert_eq!(shortlist_len(SelectionPolicy::ByPositions, 0, &post), 0);
}

#[test]
fn by_positions_is_capped_by_ranking_length() {
    assert_eq!(shortlist_len(SelectionPolicy::ByPositions, 4, &post(Some(2))), 2);
    assert_eq!(shortlist_len(SelectionPolicy::ByPositions, 4, &post(Some(9))), 4);
    assert_eq!(shortlist_len(SelectionPolicy::ByPositions, 4, &post(Some(0))), 0);
    assert_eq!(shortlist_len(SelectionPolicy::ByPositions, 4, &post(None)), 0);
}

#[test]
fn half_of_four_keeps_first_two() {
    let result = MatchResult {
        policy: SelectionPolicy::TopPercent(50),
        ranked: ranking_of(&tied_roster()),
    };

    let shortlist = project(&result, SelectionPolicy::TopPercent(50), &post(Some(1)), &[]);

    assert_eq!(shortlist.source(), RankingSource::Remote);
    assert_eq!(ids(shortlist.entries()), vec!["a", "b"]);
    assert_eq!(shortlist.boundary().and_then(|entry| entry.score), Some(80.0));
}

#[test]
fn equal_scores_keep_remote_order_under_positions() {
    let result = MatchResult {
        policy: SelectionPolicy::ByPositions,
        ranked: vec![ranked("a", Some(90.0)), ranked("b", Some(90.0))],
    };

    let shortlist = project(&result, SelectionPolicy::ByPositions, &post(Some(1)), &[]);

    assert_eq!(ids(shortlist.entries()), vec!["a"]);
    assert_eq!(shortlist.ranked().len(), 2);
}

#[test]
fn empty_remote_ranking_falls_back_to_sorted_roster() {
    let roster = vec![
        applicant("low", Some(40.0)),
        applicant("unscored", None),
        applicant("high", Some(95.0)),
        applicant("mid-1", Some(60.0)),
        applicant("mid-2", Some(60.0)),
    ];
    let result = MatchResult {
        policy: SelectionPolicy::TopPercent(60),
        ranked: Vec::new(),
    };

    let shortlist = project(&result, SelectionPolicy::TopPercent(60), &post(Some(2)), &roster);

    assert_eq!(shortlist.source(), RankingSource::RosterFallback);
    assert_eq!(
        ids(shortlist.ranked()),
        vec!["high", "mid-1", "mid-2", "low", "unscored"]
    );
    assert_eq!(ids(shortlist.entries()), vec!["high", "mid-1", "mid-2"]);
}

#[test]
fn rank_roster_puts_unscored_last_and_is_stable() {
    let roster = vec![
        applicant("x", None),
        applicant("y", Some(10.0)),
        applicant("z", None),
        applicant("w", Some(10.0)),
    ];

    let ranked = rank_roster(&roster);

    let order: Vec<ApplicantId> = ranked.into_iter().map(|entry| entry.id).collect();
    assert_eq!(
        order,
        vec![
            ApplicantId::from("y"),
            ApplicantId::from("w"),
            ApplicantId::from("x"),
            ApplicantId::from("z"),
        ]
    );
}

#[test]
fn empty_roster_and_ranking_produce_nothing() {
    let result = MatchResult {
        policy: SelectionPolicy::default(),
        ranked: Vec::new(),
    };
    let shortlist = project(&result, SelectionPolicy::default(), &post(Some(2)), &[]);
    assert!(shortlist.is_empty());
    assert!(shortlist.boundary().is_none());
}
