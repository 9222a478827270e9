use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::InvalidInput;

/// Identifier wrapper for applicants on a post roster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicantId(pub String);

impl fmt::Display for ApplicantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ApplicantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifier wrapper for internship posts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PostId(pub String);

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PostId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Resolution state of a single applicant. `Selected` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicantStatus {
    #[default]
    #[serde(rename = "applied", alias = "unset")]
    Unset,
    #[serde(rename = "selected")]
    Selected,
    #[serde(rename = "rejected")]
    Rejected,
}

impl ApplicantStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicantStatus::Unset => "applied",
            ApplicantStatus::Selected => "selected",
            ApplicantStatus::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, ApplicantStatus::Selected | ApplicantStatus::Rejected)
    }
}

impl fmt::Display for ApplicantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Roster entry as returned by the placement service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Applicant {
    pub id: ApplicantId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifications: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub status: ApplicantStatus,
    /// Concurrency token echoed back on select/reject; a stale value fails the write.
    #[serde(default)]
    pub version: u64,
}

/// Internship post. `positions_filled` always comes from the latest payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stipend: Option<String>,
    #[serde(default)]
    pub positions: Option<u32>,
    #[serde(default)]
    pub positions_filled: u32,
    #[serde(default)]
    pub applied: u32,
    #[serde(default)]
    pub skills_required: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_preference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
}

impl Post {
    pub fn declared_positions(&self) -> u32 {
        self.positions.unwrap_or(0)
    }

    pub fn open_positions(&self) -> u32 {
        self.declared_positions().saturating_sub(self.positions_filled)
    }
}

/// One entry of a ranked match response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedApplicant {
    pub id: ApplicantId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub status: ApplicantStatus,
}

impl From<&Applicant> for RankedApplicant {
    fn from(applicant: &Applicant) -> Self {
        Self {
            id: applicant.id.clone(),
            name: applicant.name.clone(),
            email: applicant.email.clone(),
            skills: applicant.skills.clone(),
            score: applicant.score,
            status: applicant.status,
        }
    }
}

/// Shortlist sizing rule chosen by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SelectionPolicy {
    TopPercent(u8),
    ByPositions,
}

impl SelectionPolicy {
    pub fn top_percent(percent: u8) -> Result<Self, InvalidInput> {
        if (1..=100).contains(&percent) {
            Ok(Self::TopPercent(percent))
        } else {
            Err(InvalidInput::Policy {
                value: format!("{percent}%"),
            })
        }
    }

    pub fn label(self) -> String {
        match self {
            SelectionPolicy::TopPercent(percent) => format!("{percent}%"),
            SelectionPolicy::ByPositions => "positions".to_string(),
        }
    }
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self::TopPercent(20)
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for SelectionPolicy {
    type Err = InvalidInput;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value = raw.trim().to_ascii_lowercase();
        match value.as_str() {
            "positions" | "by-positions" | "by_positions" => return Ok(Self::ByPositions),
            _ => {}
        }

        let digits = value
            .strip_suffix('%')
            .or_else(|| value.strip_prefix("top-"))
            .unwrap_or(&value);
        digits
            .trim()
            .parse::<u8>()
            .ok()
            .and_then(|percent| Self::top_percent(percent).ok())
            .ok_or(InvalidInput::Policy {
                value: raw.to_string(),
            })
    }
}

impl TryFrom<String> for SelectionPolicy {
    type Error = InvalidInput;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SelectionPolicy> for String {
    fn from(policy: SelectionPolicy) -> Self {
        policy.label()
    }
}

/// Ranked result of one remote match run. Never merged with an earlier run.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub policy: SelectionPolicy,
    pub ranked: Vec<RankedApplicant>,
}

/// Scheduled interview. The list per post is append-only and always re-fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    pub meeting_id: String,
    pub post_id: PostId,
    pub applicant_id: ApplicantId,
    #[serde(rename = "datetime")]
    pub scheduled_for: String,
    pub join_url: String,
    #[serde(default)]
    pub note: Option<String>,
}

impl Meeting {
    pub fn scheduled_at(&self) -> Option<chrono::NaiveDateTime> {
        super::interview::parse_datetime(&self.scheduled_for).ok()
    }
}

/// Department-level record for a selected or rejected candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: ApplicantId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub post_id: Option<PostId>,
    #[serde(default)]
    pub selected_at: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub status: ApplicantStatus,
}

/// Message composed by the placement service for a single recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub applicant_id: Option<ApplicantId>,
}
