use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::domain::{ApplicantId, PostId};
use super::error::{InvalidInput, PipelineError};
use super::notification::{DeliveryReport, NotificationDispatcher};
use super::projector::Shortlist;
use crate::remote::{PlacementGateway, TieBreakRequest};

/// Applicants sharing the score of the shortlist's last entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TieGroup {
    pub score: f64,
    pub members: Vec<ApplicantId>,
}

impl TieGroup {
    pub fn contains(&self, applicant_id: &ApplicantId) -> bool {
        self.members.contains(applicant_id)
    }

    /// A group of one is not a tie, but links can still be issued for it.
    pub fn is_contested(&self) -> bool {
        self.members.len() > 1
    }
}

/// Group and links produced by one `create_tie_break` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TieBreakRound {
    pub group: TieGroup,
    pub links: BTreeMap<ApplicantId, String>,
}

/// Collects every ranked applicant whose score equals the boundary score, inside or past the cutoff.
pub fn tie_group(shortlist: &Shortlist) -> Result<TieGroup, InvalidInput> {
    let boundary = shortlist.boundary().ok_or(InvalidInput::EmptyShortlist)?;
    let score = boundary
        .score
        .ok_or_else(|| InvalidInput::UnscoredBoundary {
            applicant_id: boundary.id.clone(),
        })?;

    let members = shortlist
        .ranked()
        .iter()
        .filter(|entry| entry.score == Some(score))
        .map(|entry| entry.id.clone())
        .collect();

    Ok(TieGroup { score, members })
}

fn validate_link(raw: &str) -> Result<String, InvalidInput> {
    let trimmed = raw.trim();
    let host = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"));
    match host {
        Some(rest) if !rest.is_empty() && !rest.contains(char::is_whitespace) => {
            Ok(trimmed.to_string())
        }
        _ => Err(InvalidInput::Link {
            value: raw.to_string(),
        }),
    }
}

/// Issues and tracks secondary test links for the current match run.
pub struct TieBreakCoordinator<G: ?Sized> {
    gateway: Arc<G>,
    post_id: PostId,
    round: Option<TieBreakRound>,
}

impl<G> TieBreakCoordinator<G>
where
    G: PlacementGateway + ?Sized,
{
    pub fn new(gateway: Arc<G>, post_id: PostId) -> Self {
        Self {
            gateway,
            post_id,
            round: None,
        }
    }

    pub fn round(&self) -> Option<&TieBreakRound> {
        self.round.as_ref()
    }

    pub fn links(&self) -> Option<&BTreeMap<ApplicantId, String>> {
        self.round.as_ref().map(|round| &round.links)
    }

    /// Drops links tied to a match run that no longer exists.
    pub fn discard(&mut self) {
        if self.round.take().is_some() {
            info!(post_id = %self.post_id, "tie-break links discarded");
        }
    }

    /// Requests links for every tie group member. A previous round is replaced, never merged.
    pub async fn create_tie_break(
        &mut self,
        shortlist: &Shortlist,
        custom_link: Option<&str>,
    ) -> Result<&TieBreakRound, PipelineError> {
        let group = tie_group(shortlist)?;
        let custom_link = custom_link
            .filter(|link| !link.trim().is_empty())
            .map(validate_link)
            .transpose()?;

        let request = TieBreakRequest {
            custom_link: custom_link.clone(),
            applicant_ids: group.members.clone(),
            score: group.score,
        };
        let response = self
            .gateway
            .create_tie_break(&self.post_id, request)
            .await
            .inspect_err(|err| {
                warn!(post_id = %self.post_id, error = %err, "tie-break creation failed")
            })?;

        let links: BTreeMap<ApplicantId, String> = match custom_link {
            Some(link) => group
                .members
                .iter()
                .map(|member| (member.clone(), link.clone()))
                .collect(),
            None => response
                .links
                .into_iter()
                .filter(|(applicant_id, _)| group.contains(applicant_id))
                .collect(),
        };

        info!(
            post_id = %self.post_id,
            score = group.score,
            members = group.members.len(),
            links = links.len(),
            "tie-break created"
        );
        Ok(self.round.insert(TieBreakRound { group, links }))
    }

    /// Sends one message per issued link through the dispatcher.
    pub async fn send_tie_break_emails(
        &self,
        dispatcher: &NotificationDispatcher<G>,
    ) -> Result<DeliveryReport, PipelineError> {
        let links = match self.links() {
            Some(links) if !links.is_empty() => links,
            _ => return Err(PipelineError::EmptyTieBreak),
        };

        dispatcher.dispatch_tie_break(links).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_must_be_http_urls() {
        assert_eq!(
            validate_link(" https://tests.example.com/round-2 "),
            Ok("https://tests.example.com/round-2".to_string())
        );
        assert!(matches!(
            validate_link("ftp://tests.example.com"),
            Err(InvalidInput::Link { .. })
        ));
        assert!(matches!(
            validate_link("https://"),
            Err(InvalidInput::Link { .. })
        ));
    }
}
