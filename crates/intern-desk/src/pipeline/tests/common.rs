use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::pipeline::domain::{
    Applicant, ApplicantId, ApplicantStatus, CandidateRecord, Meeting, OutboundMessage, Post,
    PostId, RankedApplicant,
};
use crate::pipeline::PipelineController;
use crate::remote::{
    AutoSelectResponse, DepartmentAnalytics, DepartmentNotice, GatewayError, MatchRequest,
    MatchResponse, NotificationQuery, PlacementGateway, RestoreResponse, ScheduleRequest,
    ScheduleResponse, TieBreakRequest, TieBreakResponse, TieBreakSendRequest,
    TieBreakSendResponse, TopEmailsResponse, TransitionRequest, TransitionResponse,
};
use crate::session::Session;

pub(super) const POST: &str = "p1";
pub(super) const DEPARTMENT: &str = "it_software";

pub(super) fn session() -> Session {
    Session::new(DEPARTMENT, "token-abc", "IT HR Manager")
}

pub(super) fn post_id() -> PostId {
    PostId::from(POST)
}

pub(super) fn post(positions: Option<u32>) -> Post {
    Post {
        id: post_id(),
        title: "React Internship".to_string(),
        description: "Frontend work on the placement portal".to_string(),
        stipend: Some("15000".to_string()),
        positions,
        positions_filled: 0,
        applied: 4,
        skills_required: vec!["react".to_string(), "css".to_string()],
        location_preference: Some("Pune".to_string()),
        sector: Some("IT".to_string()),
    }
}

pub(super) fn applicant(id: &str, score: Option<f64>) -> Applicant {
    Applicant {
        id: ApplicantId::from(id),
        name: format!("Candidate {}", id.to_uppercase()),
        email: format!("{id}@example.com"),
        skills: vec!["react".to_string()],
        qualifications: None,
        location: None,
        score,
        status: ApplicantStatus::Unset,
        version: 1,
    }
}

pub(super) fn ranked(id: &str, score: Option<f64>) -> RankedApplicant {
    RankedApplicant::from(&applicant(id, score))
}

/// `[A:90, B:80, C:80, D:70]`
pub(super) fn tied_roster() -> Vec<Applicant> {
    vec![
        applicant("a", Some(90.0)),
        applicant("b", Some(80.0)),
        applicant("c", Some(80.0)),
        applicant("d", Some(70.0)),
    ]
}

pub(super) fn ranking_of(roster: &[Applicant]) -> Vec<RankedApplicant> {
    roster.iter().map(RankedApplicant::from).collect()
}

#[derive(Default)]
pub(super) struct GatewayState {
    pub posts: HashMap<PostId, Post>,
    pub rosters: HashMap<PostId, Vec<Applicant>>,
    pub rankings: HashMap<PostId, Vec<RankedApplicant>>,
    pub meetings: HashMap<PostId, Vec<Meeting>>,
    pub transitions: Vec<(&'static str, TransitionRequest)>,
    pub tie_breaks: Vec<TieBreakRequest>,
    pub tie_break_sends: Vec<TieBreakSendRequest>,
    pub notification_queries: Vec<NotificationQuery>,
    pub schedules: Vec<ScheduleRequest>,
    pub issued_links: BTreeMap<ApplicantId, String>,
    pub fail_next: Option<GatewayError>,
    pub fail_roster: bool,
}

#[derive(Default, Clone)]
pub(super) struct MemoryGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl MemoryGateway {
    pub(super) fn seeded(post: Post, roster: Vec<Applicant>, ranking: Vec<RankedApplicant>) -> Self {
        let gateway = Self::default();
        {
            let mut state = gateway.state.lock().expect("gateway mutex poisoned");
            state.rosters.insert(post.id.clone(), roster);
            state.rankings.insert(post.id.clone(), ranking);
            state.posts.insert(post.id.clone(), post);
        }
        gateway
    }

    pub(super) fn with_state<T>(&self, f: impl FnOnce(&mut GatewayState) -> T) -> T {
        let mut state = self.state.lock().expect("gateway mutex poisoned");
        f(&mut state)
    }

    pub(super) fn fail_next(&self, error: GatewayError) {
        self.with_state(|state| state.fail_next = Some(error));
    }

    /// Simulates another operator resolving an applicant behind our back.
    pub(super) fn resolve_externally(&self, applicant_id: &str, status: ApplicantStatus) {
        self.with_state(|state| {
            for roster in state.rosters.values_mut() {
                for entry in roster.iter_mut() {
                    if entry.id.0 == applicant_id {
                        entry.status = status;
                        entry.version += 1;
                    }
                }
            }
        });
    }

    fn check(&self) -> Result<(), GatewayError> {
        match self.with_state(|state| state.fail_next.take()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn transition(
        &self,
        action: &'static str,
        post_id: &PostId,
        request: TransitionRequest,
        status: ApplicantStatus,
    ) -> Result<TransitionResponse, GatewayError> {
        self.check()?;
        self.with_state(|state| -> Result<TransitionResponse, GatewayError> {
            state.transitions.push((action, request.clone()));
            let roster = state
                .rosters
                .get_mut(post_id)
                .ok_or_else(|| GatewayError::NotFound("Post not found".to_string()))?;
            let entry = roster
                .iter_mut()
                .find(|entry| entry.id == request.applicant_id)
                .ok_or_else(|| GatewayError::NotFound("Applicant not found".to_string()))?;
            if entry.status.is_terminal() {
                return Err(GatewayError::Conflict(format!(
                    "Applicant already {}",
                    entry.status
                )));
            }
            if entry.version != request.expected_version {
                return Err(GatewayError::Conflict("stale applicant version".to_string()));
            }

            entry.status = status;
            entry.version += 1;
            let candidate = entry.clone();
            if status == ApplicantStatus::Selected {
                if let Some(post) = state.posts.get_mut(post_id) {
                    post.positions_filled += 1;
                }
            }

            let email = (status == ApplicantStatus::Rejected).then(|| OutboundMessage {
                to: candidate.email.clone(),
                subject: "Application update".to_string(),
                body: format!("Dear {}, thank you for applying.", candidate.name),
                applicant_id: Some(candidate.id.clone()),
            });
            Ok(TransitionResponse {
                message: Some(format!("Candidate {}", status)),
                candidate,
                email,
            })
        })
    }
}

#[async_trait]
impl PlacementGateway for MemoryGateway {
    async fn list_posts(&self, _department_id: &str) -> Result<Vec<Post>, GatewayError> {
        self.check()?;
        Ok(self.with_state(|state| {
            let mut posts: Vec<Post> = state.posts.values().cloned().collect();
            posts.sort_by(|left, right| left.id.cmp(&right.id));
            posts
        }))
    }

    async fn past_posts(&self, _department_id: &str) -> Result<Vec<Post>, GatewayError> {
        self.check()?;
        Ok(Vec::new())
    }

    async fn restore_post(
        &self,
        _department_id: &str,
        post_id: &PostId,
    ) -> Result<RestoreResponse, GatewayError> {
        self.check()?;
        Err(GatewayError::NotFound(format!("Past post {post_id} not found")))
    }

    async fn fetch_post(&self, post_id: &PostId) -> Result<Post, GatewayError> {
        self.check()?;
        self.with_state(|state| state.posts.get(post_id).cloned())
            .ok_or_else(|| GatewayError::NotFound("Post not found".to_string()))
    }

    async fn fetch_roster(
        &self,
        _department_id: &str,
        post_id: &PostId,
    ) -> Result<Vec<Applicant>, GatewayError> {
        self.check()?;
        self.with_state(|state| {
            if state.fail_roster {
                return Err(GatewayError::Transport("connection reset".to_string()));
            }
            Ok(state.rosters.get(post_id).cloned().unwrap_or_default())
        })
    }

    async fn run_match(
        &self,
        post_id: &PostId,
        _request: MatchRequest,
    ) -> Result<MatchResponse, GatewayError> {
        self.check()?;
        let matched_top =
            self.with_state(|state| state.rankings.get(post_id).cloned().unwrap_or_default());
        Ok(MatchResponse {
            ranked: !matched_top.is_empty(),
            matched_top,
        })
    }

    async fn select(
        &self,
        post_id: &PostId,
        request: TransitionRequest,
    ) -> Result<TransitionResponse, GatewayError> {
        self.transition("select", post_id, request, ApplicantStatus::Selected)
    }

    async fn reject(
        &self,
        post_id: &PostId,
        request: TransitionRequest,
    ) -> Result<TransitionResponse, GatewayError> {
        self.transition("reject", post_id, request, ApplicantStatus::Rejected)
    }

    async fn auto_select(&self, post_id: &PostId) -> Result<AutoSelectResponse, GatewayError> {
        self.check()?;
        self.with_state(|state| -> Result<AutoSelectResponse, GatewayError> {
            let open = state
                .posts
                .get(post_id)
                .map(Post::open_positions)
                .ok_or_else(|| GatewayError::NotFound("Post not found".to_string()))?;
            let roster = state.rosters.entry(post_id.clone()).or_default();
            let mut order: Vec<usize> = (0..roster.len())
                .filter(|index| roster[*index].status == ApplicantStatus::Unset)
                .collect();
            order.sort_by(|left, right| {
                let left = roster[*left].score.unwrap_or(f64::MIN);
                let right = roster[*right].score.unwrap_or(f64::MIN);
                right.total_cmp(&left)
            });

            let mut selected = Vec::new();
            for index in order.into_iter().take(open as usize) {
                let entry = &mut roster[index];
                entry.status = ApplicantStatus::Selected;
                entry.version += 1;
                selected.push(CandidateRecord {
                    id: entry.id.clone(),
                    name: entry.name.clone(),
                    email: entry.email.clone(),
                    post_id: Some(post_id.clone()),
                    selected_at: Some("2025-10-01T10:00:00".to_string()),
                    score: entry.score,
                    status: ApplicantStatus::Selected,
                });
            }
            if let Some(post) = state.posts.get_mut(post_id) {
                post.positions_filled += selected.len() as u32;
            }

            Ok(AutoSelectResponse {
                selected_count: selected.len(),
                message: Some(format!("{} candidates auto-selected", selected.len())),
                selected_candidates: selected,
            })
        })
    }

    async fn create_tie_break(
        &self,
        post_id: &PostId,
        request: TieBreakRequest,
    ) -> Result<TieBreakResponse, GatewayError> {
        self.check()?;
        self.with_state(|state| {
            state.tie_breaks.push(request.clone());
            let mut links: BTreeMap<ApplicantId, String> = request
                .applicant_ids
                .iter()
                .map(|id| {
                    let link = request
                        .custom_link
                        .clone()
                        .unwrap_or_else(|| format!("https://tests.example.com/{post_id}/{id}"));
                    (id.clone(), link)
                })
                .collect();
            links.extend(state.issued_links.clone());
            Ok(TieBreakResponse {
                created: links.len(),
                score: Some(request.score),
                links,
            })
        })
    }

    async fn send_tie_break(
        &self,
        _post_id: &PostId,
        request: TieBreakSendRequest,
    ) -> Result<TieBreakSendResponse, GatewayError> {
        self.check()?;
        self.with_state(|state| {
            let emails = request
                .links
                .iter()
                .map(|(id, link)| OutboundMessage {
                    to: format!("{id}@example.com"),
                    subject: "Tie-break test".to_string(),
                    body: format!("Please complete the test at {link}"),
                    applicant_id: Some(id.clone()),
                })
                .collect::<Vec<_>>();
            state.tie_break_sends.push(request);
            Ok(TieBreakSendResponse {
                sent_count: emails.len(),
                emails,
            })
        })
    }

    async fn send_top_emails(
        &self,
        post_id: &PostId,
        query: NotificationQuery,
    ) -> Result<TopEmailsResponse, GatewayError> {
        self.check()?;
        self.with_state(|state| {
            state.notification_queries.push(query);
            let ranking = state.rankings.get(post_id).cloned().unwrap_or_default();
            let count = match query.method {
                "positions" => query.value as usize,
                _ => (query.value as usize * ranking.len()).div_ceil(100),
            };
            let emails: Vec<OutboundMessage> = ranking
                .iter()
                .take(count)
                .map(|entry| OutboundMessage {
                    to: entry.email.clone(),
                    subject: "Shortlisted".to_string(),
                    body: format!("Dear {}, you are shortlisted.", entry.name),
                    applicant_id: Some(entry.id.clone()),
                })
                .collect();
            Ok(TopEmailsResponse {
                sent_count: Some(emails.len()),
                emails,
            })
        })
    }

    async fn schedule(
        &self,
        post_id: &PostId,
        request: ScheduleRequest,
    ) -> Result<ScheduleResponse, GatewayError> {
        self.check()?;
        self.with_state(|state| {
            state.schedules.push(request.clone());
            let meetings = state.meetings.entry(post_id.clone()).or_default();
            let meeting_id = format!("m-{}", meetings.len() + 1);
            let join_url = format!("https://meet.example.com/{meeting_id}");
            meetings.push(Meeting {
                meeting_id: meeting_id.clone(),
                post_id: post_id.clone(),
                applicant_id: request.applicant_id,
                scheduled_for: request.datetime_iso,
                join_url: join_url.clone(),
                note: request.note,
            });
            Ok(ScheduleResponse {
                join_url,
                meeting_id: Some(meeting_id),
            })
        })
    }

    async fn meetings(&self, post_id: &PostId) -> Result<Vec<Meeting>, GatewayError> {
        self.check()?;
        Ok(self.with_state(|state| state.meetings.get(post_id).cloned().unwrap_or_default()))
    }

    async fn selected(&self, _department_id: &str) -> Result<Vec<CandidateRecord>, GatewayError> {
        self.check()?;
        Ok(Vec::new())
    }

    async fn rejected(&self, _department_id: &str) -> Result<Vec<CandidateRecord>, GatewayError> {
        self.check()?;
        Ok(Vec::new())
    }

    async fn export_selected(&self, _department_id: &str) -> Result<Vec<u8>, GatewayError> {
        self.check()?;
        Ok(b"id,name,email,post_id,selected_at\n".to_vec())
    }

    async fn analytics(&self, _department_id: &str) -> Result<DepartmentAnalytics, GatewayError> {
        self.check()?;
        Ok(DepartmentAnalytics::default())
    }

    async fn notifications(
        &self,
        _department_id: &str,
    ) -> Result<Vec<DepartmentNotice>, GatewayError> {
        self.check()?;
        Ok(Vec::new())
    }
}

/// Gateway seeded with the tied roster and a remote ranking in the same order.
pub(super) fn tied_gateway(positions: Option<u32>) -> MemoryGateway {
    let roster = tied_roster();
    let ranking = ranking_of(&roster);
    MemoryGateway::seeded(post(positions), roster, ranking)
}

pub(super) fn controller(gateway: &MemoryGateway) -> PipelineController<MemoryGateway> {
    PipelineController::new(session(), Arc::new(gateway.clone()), post_id())
}

pub(super) async fn shortlisted_controller(
    gateway: &MemoryGateway,
    policy: crate::pipeline::SelectionPolicy,
) -> PipelineController<MemoryGateway> {
    let mut controller = controller(gateway);
    controller.load().await.expect("roster loads");
    controller.run_match(Some(policy)).await.expect("match runs");
    controller
}
