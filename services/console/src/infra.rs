use async_trait::async_trait;
use intern_desk::pipeline::{
    Applicant, ApplicantId, ApplicantStatus, CandidateRecord, Meeting, OutboundMessage, Post,
    PostId, RankedApplicant, SelectionPolicy,
};
use intern_desk::remote::{
    AutoSelectResponse, DepartmentAnalytics, DepartmentNotice, GatewayError, MatchRequest,
    MatchResponse, NotificationQuery, PlacementGateway, RestoreResponse, ScheduleRequest,
    ScheduleResponse, TieBreakRequest, TieBreakResponse, TieBreakSendRequest,
    TieBreakSendResponse, TopEmailsResponse, TransitionRequest, TransitionResponse,
};
use intern_desk::session::Session;
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

pub(crate) const SANDBOX_DEPARTMENT: &str = "it_software";
pub(crate) const SANDBOX_TIMESTAMP: &str = "2025-10-01T10:00:00";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn sandbox_session() -> Session {
    Session::new(SANDBOX_DEPARTMENT, "sandbox-token", "IT HR Manager")
}

pub(crate) fn parse_policy(raw: &str) -> Result<SelectionPolicy, String> {
    raw.parse::<SelectionPolicy>()
        .map_err(|err| format!("failed to parse '{raw}' as a selection policy ({err})"))
}

#[derive(Default)]
struct SandboxState {
    posts: Vec<Post>,
    past_posts: Vec<Post>,
    rosters: HashMap<PostId, Vec<Applicant>>,
    meetings: HashMap<PostId, Vec<Meeting>>,
    decided: Vec<(PostId, ApplicantId)>,
}

impl SandboxState {
    fn post_mut(&mut self, post_id: &PostId) -> Result<&mut Post, GatewayError> {
        self.posts
            .iter_mut()
            .find(|post| &post.id == post_id)
            .ok_or_else(|| GatewayError::NotFound("Post not found".to_string()))
    }

    fn records(&self, status: ApplicantStatus) -> Vec<CandidateRecord> {
        self.decided
            .iter()
            .filter_map(|(post_id, applicant_id)| {
                let entry = self
                    .rosters
                    .get(post_id)?
                    .iter()
                    .find(|entry| &entry.id == applicant_id && entry.status == status)?;
                Some(CandidateRecord {
                    id: entry.id.clone(),
                    name: entry.name.clone(),
                    email: entry.email.clone(),
                    post_id: Some(post_id.clone()),
                    selected_at: Some(SANDBOX_TIMESTAMP.to_string()),
                    score: entry.score,
                    status,
                })
            })
            .collect()
    }

    /// Scored applicants first, highest score first; ties keep roster order.
    fn ranking(&self, post_id: &PostId) -> Vec<RankedApplicant> {
        let mut ranked: Vec<RankedApplicant> = self
            .rosters
            .get(post_id)
            .map(|roster| roster.iter().map(RankedApplicant::from).collect())
            .unwrap_or_default();
        ranked.sort_by(|left, right| {
            let left = left.score.unwrap_or(f64::MIN);
            let right = right.score.unwrap_or(f64::MIN);
            right.total_cmp(&left)
        });
        ranked
    }
}

/// Offline stand-in for the placement service. Scores are fixed at seed time and the
/// select/reject rules (terminal statuses, version tokens) match the remote service.
#[derive(Clone)]
pub(crate) struct SandboxPlacementGateway {
    state: Arc<Mutex<SandboxState>>,
}

impl Default for SandboxPlacementGateway {
    fn default() -> Self {
        Self::seeded()
    }
}

impl SandboxPlacementGateway {
    pub(crate) fn seeded() -> Self {
        let react = sandbox_post("p1", "React Internship", Some(2), &["react", "css"]);
        let data = sandbox_post("p2", "Data Analytics Internship", None, &["python", "sql"]);
        let mut archived = sandbox_post("p0", "QA Automation Internship", Some(1), &["selenium"]);
        archived.positions_filled = 1;

        let mut rosters = HashMap::new();
        rosters.insert(
            react.id.clone(),
            vec![
                sandbox_applicant("p1-1", "Isha Rao", Some(91.5), &["react", "css"]),
                sandbox_applicant("p1-2", "Ravi Kumar", Some(84.0), &["react"]),
                sandbox_applicant("p1-3", "Meera Nair", Some(84.0), &["react", "figma"]),
                sandbox_applicant("p1-4", "Arjun Shah", Some(72.5), &["css"]),
                sandbox_applicant("p1-5", "Kavya Iyer", None, &["html"]),
            ],
        );
        rosters.insert(
            data.id.clone(),
            vec![
                sandbox_applicant("p2-1", "Neha Gupta", Some(88.0), &["python", "sql"]),
                sandbox_applicant("p2-2", "Rohan Das", Some(65.0), &["excel"]),
            ],
        );

        let mut react = react;
        react.applied = 5;
        let mut data = data;
        data.applied = 2;

        Self {
            state: Arc::new(Mutex::new(SandboxState {
                posts: vec![react, data],
                past_posts: vec![archived],
                rosters,
                ..SandboxState::default()
            })),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut SandboxState) -> T) -> T {
        let mut guard = self.state.lock().expect("sandbox mutex poisoned");
        f(&mut guard)
    }

    fn transition(
        &self,
        post_id: &PostId,
        request: TransitionRequest,
        status: ApplicantStatus,
    ) -> Result<TransitionResponse, GatewayError> {
        self.with_state(|state| -> Result<TransitionResponse, GatewayError> {
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
                return Err(GatewayError::Conflict(
                    "Applicant was modified by another operator".to_string(),
                ));
            }

            entry.status = status;
            entry.version += 1;
            let candidate = entry.clone();
            state.decided.push((post_id.clone(), candidate.id.clone()));

            let post = state.post_mut(post_id)?;
            if status == ApplicantStatus::Selected {
                post.positions_filled += 1;
            }
            let email = (status == ApplicantStatus::Rejected).then(|| OutboundMessage {
                to: candidate.email.clone(),
                subject: format!("Update on your application for {}", post.title),
                body: format!(
                    "Dear {},\n\nThank you for applying to {}. We will not be moving forward with your application this time.",
                    candidate.name, post.title
                ),
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

fn sandbox_post(id: &str, title: &str, positions: Option<u32>, skills: &[&str]) -> Post {
    Post {
        id: PostId::from(id),
        title: title.to_string(),
        description: format!("{title} with the IT software department"),
        stipend: Some("15000".to_string()),
        positions,
        positions_filled: 0,
        applied: 0,
        skills_required: skills.iter().map(|skill| skill.to_string()).collect(),
        location_preference: Some("Pune".to_string()),
        sector: Some("IT".to_string()),
    }
}

fn sandbox_applicant(id: &str, name: &str, score: Option<f64>, skills: &[&str]) -> Applicant {
    let handle = name.to_lowercase().replace(' ', ".");
    Applicant {
        id: ApplicantId::from(id),
        name: name.to_string(),
        email: format!("{handle}@example.com"),
        skills: skills.iter().map(|skill| skill.to_string()).collect(),
        qualifications: Some("B.Tech".to_string()),
        location: Some("Pune".to_string()),
        score,
        status: ApplicantStatus::Unset,
        version: 1,
    }
}

#[async_trait]
impl PlacementGateway for SandboxPlacementGateway {
    async fn list_posts(&self, _department_id: &str) -> Result<Vec<Post>, GatewayError> {
        Ok(self.with_state(|state| state.posts.clone()))
    }

    async fn past_posts(&self, _department_id: &str) -> Result<Vec<Post>, GatewayError> {
        Ok(self.with_state(|state| state.past_posts.clone()))
    }

    async fn restore_post(
        &self,
        _department_id: &str,
        post_id: &PostId,
    ) -> Result<RestoreResponse, GatewayError> {
        self.with_state(|state| {
            let index = state
                .past_posts
                .iter()
                .position(|post| &post.id == post_id)
                .ok_or_else(|| GatewayError::NotFound(format!("Past post {post_id} not found")))?;
            let mut post = state.past_posts.remove(index);
            post.positions_filled = 0;
            state.rosters.entry(post.id.clone()).or_default();
            state.posts.push(post.clone());
            Ok(RestoreResponse {
                message: Some(format!("{} restored", post.title)),
                post,
            })
        })
    }

    async fn fetch_post(&self, post_id: &PostId) -> Result<Post, GatewayError> {
        self.with_state(|state| state.post_mut(post_id).map(|post| post.clone()))
    }

    async fn fetch_roster(
        &self,
        _department_id: &str,
        post_id: &PostId,
    ) -> Result<Vec<Applicant>, GatewayError> {
        self.with_state(|state| {
            state
                .rosters
                .get(post_id)
                .cloned()
                .ok_or_else(|| GatewayError::NotFound("Post not found".to_string()))
        })
    }

    async fn run_match(
        &self,
        post_id: &PostId,
        _request: MatchRequest,
    ) -> Result<MatchResponse, GatewayError> {
        self.with_state(|state| {
            state.post_mut(post_id)?;
            let matched_top = state.ranking(post_id);
            Ok(MatchResponse {
                ranked: true,
                matched_top,
            })
        })
    }

    async fn select(
        &self,
        post_id: &PostId,
        request: TransitionRequest,
    ) -> Result<TransitionResponse, GatewayError> {
        self.transition(post_id, request, ApplicantStatus::Selected)
    }

    async fn reject(
        &self,
        post_id: &PostId,
        request: TransitionRequest,
    ) -> Result<TransitionResponse, GatewayError> {
        self.transition(post_id, request, ApplicantStatus::Rejected)
    }

    async fn auto_select(&self, post_id: &PostId) -> Result<AutoSelectResponse, GatewayError> {
        self.with_state(|state| {
            let open = state.post_mut(post_id)?.open_positions() as usize;
            let chosen: Vec<ApplicantId> = state
                .ranking(post_id)
                .into_iter()
                .filter(|entry| entry.status == ApplicantStatus::Unset && entry.score.is_some())
                .take(open)
                .map(|entry| entry.id)
                .collect();

            let roster = state.rosters.entry(post_id.clone()).or_default();
            for entry in roster.iter_mut().filter(|entry| chosen.contains(&entry.id)) {
                entry.status = ApplicantStatus::Selected;
                entry.version += 1;
            }
            for id in &chosen {
                state.decided.push((post_id.clone(), id.clone()));
            }
            state.post_mut(post_id)?.positions_filled += chosen.len() as u32;

            let selected_candidates: Vec<CandidateRecord> = state
                .records(ApplicantStatus::Selected)
                .into_iter()
                .filter(|record| chosen.contains(&record.id))
                .collect();
            Ok(AutoSelectResponse {
                selected_count: selected_candidates.len(),
                message: Some(format!(
                    "{} candidates auto-selected",
                    selected_candidates.len()
                )),
                selected_candidates,
            })
        })
    }

    async fn create_tie_break(
        &self,
        post_id: &PostId,
        request: TieBreakRequest,
    ) -> Result<TieBreakResponse, GatewayError> {
        self.with_state(|state| {
            state.post_mut(post_id)?;
            let links: BTreeMap<ApplicantId, String> = request
                .applicant_ids
                .iter()
                .map(|id| {
                    let link = request.custom_link.clone().unwrap_or_else(|| {
                        format!("https://assessments.example.com/{post_id}/{id}")
                    });
                    (id.clone(), link)
                })
                .collect();
            Ok(TieBreakResponse {
                created: links.len(),
                score: Some(request.score),
                links,
            })
        })
    }

    async fn send_tie_break(
        &self,
        post_id: &PostId,
        request: TieBreakSendRequest,
    ) -> Result<TieBreakSendResponse, GatewayError> {
        self.with_state(|state| {
            let title = state.post_mut(post_id)?.title.clone();
            let roster = state.rosters.get(post_id).cloned().unwrap_or_default();
            let emails: Vec<OutboundMessage> = request
                .links
                .iter()
                .filter_map(|(id, link)| {
                    let entry = roster.iter().find(|entry| &entry.id == id)?;
                    Some(OutboundMessage {
                        to: entry.email.clone(),
                        subject: format!("Tie-break assessment for {title}"),
                        body: format!(
                            "Dear {},\n\nPlease complete the short assessment at {link} to help us finalise the shortlist.",
                            entry.name
                        ),
                        applicant_id: Some(entry.id.clone()),
                    })
                })
                .collect();
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
        self.with_state(|state| {
            let title = state.post_mut(post_id)?.title.clone();
            let ranking = state.ranking(post_id);
            let count = match query.method {
                "positions" => query.value as usize,
                _ => (query.value as usize * ranking.len()).div_ceil(100),
            };
            let emails: Vec<OutboundMessage> = ranking
                .into_iter()
                .take(count)
                .map(|entry| OutboundMessage {
                    to: entry.email,
                    subject: format!("You have been shortlisted for {title}"),
                    body: format!(
                        "Dear {},\n\nYou have been shortlisted for {title}. We will share interview details soon.",
                        entry.name
                    ),
                    applicant_id: Some(entry.id),
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
        self.with_state(|state| {
            state.post_mut(post_id)?;
            let known = state
                .rosters
                .get(post_id)
                .is_some_and(|roster| roster.iter().any(|entry| entry.id == request.applicant_id));
            if !known {
                return Err(GatewayError::NotFound("Applicant not found".to_string()));
            }

            let meetings = state.meetings.entry(post_id.clone()).or_default();
            let meeting_id = format!("{post_id}-m{}", meetings.len() + 1);
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
        Ok(self.with_state(|state| state.meetings.get(post_id).cloned().unwrap_or_default()))
    }

    async fn selected(&self, _department_id: &str) -> Result<Vec<CandidateRecord>, GatewayError> {
        Ok(self.with_state(|state| state.records(ApplicantStatus::Selected)))
    }

    async fn rejected(&self, _department_id: &str) -> Result<Vec<CandidateRecord>, GatewayError> {
        Ok(self.with_state(|state| state.records(ApplicantStatus::Rejected)))
    }

    async fn export_selected(&self, _department_id: &str) -> Result<Vec<u8>, GatewayError> {
        let records = self.with_state(|state| state.records(ApplicantStatus::Selected));
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(["id", "name", "email", "post_id", "selected_at"])
            .map_err(|err| GatewayError::Decode(err.to_string()))?;
        for record in &records {
            let post_id = record.post_id.as_ref().map(|id| id.0.as_str()).unwrap_or("");
            let selected_at = record.selected_at.as_deref().unwrap_or("");
            writer
                .write_record([
                    record.id.0.as_str(),
                    record.name.as_str(),
                    record.email.as_str(),
                    post_id,
                    selected_at,
                ])
                .map_err(|err| GatewayError::Decode(err.to_string()))?;
        }
        writer
            .into_inner()
            .map_err(|err| GatewayError::Decode(err.to_string()))
    }

    async fn analytics(&self, _department_id: &str) -> Result<DepartmentAnalytics, GatewayError> {
        Ok(self.with_state(|state| DepartmentAnalytics {
            active_internships: state.posts.len(),
            past_internships: state.past_posts.len(),
            selected_candidates: state.records(ApplicantStatus::Selected).len(),
            rejected_candidates: state.records(ApplicantStatus::Rejected).len(),
        }))
    }

    async fn notifications(
        &self,
        _department_id: &str,
    ) -> Result<Vec<DepartmentNotice>, GatewayError> {
        Ok(self.with_state(|state| {
            state
                .posts
                .iter()
                .filter(|post| post.positions.is_some() && post.open_positions() == 0)
                .map(|post| DepartmentNotice {
                    id: format!("filled-{}", post.id),
                    message: format!("All positions for {} are filled", post.title),
                })
                .collect()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p1() -> PostId {
        PostId::from("p1")
    }

    #[tokio::test]
    async fn second_selection_is_a_conflict() {
        let gateway = SandboxPlacementGateway::seeded();
        let request = TransitionRequest {
            applicant_id: ApplicantId::from("p1-1"),
            expected_version: 1,
        };

        let first = gateway
            .select(&p1(), request.clone())
            .await
            .expect("first select");
        assert_eq!(first.candidate.status, ApplicantStatus::Selected);
        assert_eq!(first.candidate.version, 2);

        let second = gateway.select(&p1(), request).await;
        assert!(matches!(second, Err(GatewayError::Conflict(_))));
        let post = gateway.fetch_post(&p1()).await.expect("post");
        assert_eq!(post.positions_filled, 1);
    }

    #[tokio::test]
    async fn stale_version_is_a_conflict() {
        let gateway = SandboxPlacementGateway::seeded();
        let result = gateway
            .reject(
                &p1(),
                TransitionRequest {
                    applicant_id: ApplicantId::from("p1-4"),
                    expected_version: 7,
                },
            )
            .await;
        assert!(matches!(result, Err(GatewayError::Conflict(_))));
    }

    #[tokio::test]
    async fn ranking_puts_unscored_applicants_last() {
        let gateway = SandboxPlacementGateway::seeded();
        let response = gateway
            .run_match(
                &p1(),
                MatchRequest {
                    mode: SelectionPolicy::default(),
                },
            )
            .await
            .expect("match");

        let ids: Vec<&str> = response
            .matched_top
            .iter()
            .map(|entry| entry.id.0.as_str())
            .collect();
        assert_eq!(ids, ["p1-1", "p1-2", "p1-3", "p1-4", "p1-5"]);
    }

    #[tokio::test]
    async fn export_lists_selected_candidates() {
        let gateway = SandboxPlacementGateway::seeded();
        gateway.auto_select(&p1()).await.expect("auto select");

        let bytes = gateway
            .export_selected(SANDBOX_DEPARTMENT)
            .await
            .expect("export");
        let text = String::from_utf8(bytes).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("p1-1,Isha Rao"));

        let notices = gateway
            .notifications(SANDBOX_DEPARTMENT)
            .await
            .expect("notices");
        assert_eq!(notices.len(), 1);
    }

    #[test]
    fn policy_argument_rejects_garbage() {
        assert_eq!(parse_policy("30%"), Ok(SelectionPolicy::TopPercent(30)));
        assert!(parse_policy("several").is_err());
    }
}
