use std::cmp::Ordering;

use serde::Serialize;

use super::domain::{Applicant, MatchResult, Post, RankedApplicant, SelectionPolicy};

/// Where the ranking behind a shortlist came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingSource {
    Remote,
    RosterFallback,
}

/// Bounded prefix of a ranking. Derived on demand and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Shortlist {
    policy: SelectionPolicy,
    source: RankingSource,
    ranked: Vec<RankedApplicant>,
    len: usize,
}

impl Shortlist {
    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    pub fn source(&self) -> RankingSource {
        self.source
    }

    pub fn entries(&self) -> &[RankedApplicant] {
        &self.ranked[..self.len]
    }

    /// Full ranking the shortlist was cut from, including entries past the cutoff.
    pub fn ranked(&self) -> &[RankedApplicant] {
        &self.ranked
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn boundary(&self) -> Option<&RankedApplicant> {
        self.entries().last()
    }
}

/// Number of entries a policy admits from a ranking of length `ranked_len`.
pub fn shortlist_len(policy: SelectionPolicy, ranked_len: usize, post: &Post) -> usize {
    if ranked_len == 0 {
        return 0;
    }

    match policy {
        SelectionPolicy::ByPositions => (post.declared_positions() as usize).min(ranked_len),
        SelectionPolicy::TopPercent(percent) => {
            let percent = usize::from(percent.clamp(1, 100));
            // ceil(p/100 * n) without floating point
            (percent * ranked_len).div_ceil(100).clamp(1, ranked_len)
        }
    }
}

/// Descending score, unscored applicants last, input order kept for equal scores.
pub fn rank_roster(roster: &[Applicant]) -> Vec<RankedApplicant> {
    let mut ranked: Vec<RankedApplicant> = roster.iter().map(RankedApplicant::from).collect();
    ranked.sort_by(|left, right| compare_scores(left.score, right.score));
    ranked
}

fn compare_scores(left: Option<f64>, right: Option<f64>) -> Ordering {
    match (left, right) {
        (Some(left), Some(right)) => right.partial_cmp(&left).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Turns a match result into a shortlist under `policy`.
///
/// An empty remote ranking falls back to the locally ranked roster so the operator always
/// has something to work with. The remote order is otherwise taken as-is; ties inside it are
/// not re-evaluated.
pub fn project(
    result: &MatchResult,
    policy: SelectionPolicy,
    post: &Post,
    roster: &[Applicant],
) -> Shortlist {
    let (ranked, source) = if result.ranked.is_empty() {
        (rank_roster(roster), RankingSource::RosterFallback)
    } else {
        (result.ranked.clone(), RankingSource::Remote)
    };

    let len = shortlist_len(policy, ranked.len(), post);
    Shortlist {
        policy,
        source,
        ranked,
        len,
    }
}
