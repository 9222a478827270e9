use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use intern_desk::department::DepartmentDirectory;
use intern_desk::pipeline::{
    ApplicantId, ApplicantStatus, PipelineController, PipelineError, PipelineState, PostId,
    SelectionPolicy,
};
use intern_desk::remote::{
    GatewayError, HttpPlacementGateway, NotificationQuery, PlacementGateway, TransitionRequest,
};
use intern_desk::session::Session;
use serde_json::{json, Value};

const TOKEN: &str = "stub-token";

mod stub {
    use super::*;

    #[derive(Default)]
    pub struct StubState {
        pub statuses: HashMap<String, &'static str>,
        pub versions: HashMap<String, u64>,
        pub filled: u32,
        pub queries: Vec<HashMap<String, String>>,
        pub meetings: Vec<Value>,
    }

    pub type Shared = Arc<Mutex<StubState>>;

    const APPLICANTS: [(&str, f64); 4] = [("a", 90.0), ("b", 80.0), ("c", 80.0), ("d", 70.0)];

    fn authorised(headers: &HeaderMap) -> bool {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == format!("Bearer {TOKEN}"))
    }

    fn unauthorised() -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Not authenticated" })),
        )
            .into_response()
    }

    fn applicant_json(state: &StubState, id: &str, score: f64) -> Value {
        json!({
            "id": id,
            "name": format!("Candidate {}", id.to_uppercase()),
            "email": format!("{id}@example.com"),
            "skills": ["react"],
            "score": score,
            "status": state.statuses.get(id).copied().unwrap_or("applied"),
            "version": state.versions.get(id).copied().unwrap_or(1),
        })
    }

    async fn fetch_post(
        State(state): State<Shared>,
        headers: HeaderMap,
        Path(post_id): Path<String>,
    ) -> Response {
        if !authorised(&headers) {
            return unauthorised();
        }
        if post_id != "p1" {
            return (StatusCode::NOT_FOUND, Json(json!({ "detail": "Post not found" })))
                .into_response();
        }
        let filled = state.lock().expect("stub mutex").filled;
        Json(json!({
            "id": "p1",
            "title": "React Internship",
            "positions": 1,
            "positions_filled": filled,
            "applied": 4,
        }))
        .into_response()
    }

    async fn roster(State(state): State<Shared>, headers: HeaderMap) -> Response {
        if !authorised(&headers) {
            return unauthorised();
        }
        let guard = state.lock().expect("stub mutex");
        let roster: Vec<Value> = APPLICANTS
            .iter()
            .map(|(id, score)| applicant_json(&guard, id, *score))
            .collect();
        Json(roster).into_response()
    }

    async fn run_match(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
        assert!(body.get("mode").is_some(), "match body carries the mode");
        let guard = state.lock().expect("stub mutex");
        let ranked: Vec<Value> = APPLICANTS
            .iter()
            .map(|(id, score)| applicant_json(&guard, id, *score))
            .collect();
        Json(json!({ "ranked": true, "matched_top": ranked })).into_response()
    }

    async fn select(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
        let id = body["applicant_id"].as_str().unwrap_or_default().to_string();
        let expected = body["expected_version"].as_u64().unwrap_or_default();
        let mut guard = state.lock().expect("stub mutex");
        if guard.statuses.contains_key(&id) {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "detail": "Applicant already selected" })),
            )
                .into_response();
        }
        let version = guard.versions.get(&id).copied().unwrap_or(1);
        if version != expected {
            return (
                StatusCode::PRECONDITION_FAILED,
                Json(json!({ "detail": "Applicant was modified" })),
            )
                .into_response();
        }
        guard.statuses.insert(id.clone(), "selected");
        guard.versions.insert(id.clone(), version + 1);
        guard.filled += 1;
        let candidate = applicant_json(&guard, &id, 0.0);
        Json(json!({ "message": "Candidate selected", "candidate": candidate })).into_response()
    }

    async fn tie_break(Json(body): Json<Value>) -> Response {
        let ids = body["applicant_ids"].as_array().cloned().unwrap_or_default();
        let links: BTreeMap<String, String> = ids
            .iter()
            .filter_map(Value::as_str)
            .map(|id| (id.to_string(), format!("https://tests.example.com/{id}")))
            .collect();
        Json(json!({ "created": links.len(), "score": body["score"], "links": links }))
            .into_response()
    }

    async fn tie_break_send(Json(body): Json<Value>) -> Response {
        let links = body["links"].as_object().cloned().unwrap_or_default();
        let emails: Vec<Value> = links
            .iter()
            .map(|(id, link)| {
                json!({
                    "to": format!("{id}@example.com"),
                    "subject": "Tie-break test",
                    "body": format!("Please attempt {}", link.as_str().unwrap_or_default()),
                    "applicant_id": id,
                })
            })
            .collect();
        Json(json!({ "sent_count": emails.len(), "emails": emails })).into_response()
    }

    async fn send_top_emails(
        State(state): State<Shared>,
        Query(query): Query<HashMap<String, String>>,
    ) -> Response {
        state.lock().expect("stub mutex").queries.push(query);
        Json(json!({
            "sent_count": 1,
            "emails": [{ "to": "a@example.com", "subject": "Shortlisted", "body": "Congrats" }],
        }))
        .into_response()
    }

    async fn schedule(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
        let mut guard = state.lock().expect("stub mutex");
        let meeting_id = format!("m-{}", guard.meetings.len() + 1);
        let join_url = format!("https://meet.example.com/{meeting_id}");
        guard.meetings.push(json!({
            "meeting_id": meeting_id,
            "post_id": "p1",
            "applicant_id": body["applicant_id"],
            "datetime": body["datetime_iso"],
            "join_url": join_url,
            "note": body.get("note"),
        }));
        Json(json!({ "message": "Interview scheduled", "meeting_id": meeting_id, "join_url": join_url }))
            .into_response()
    }

    async fn meetings(State(state): State<Shared>) -> Response {
        Json(state.lock().expect("stub mutex").meetings.clone()).into_response()
    }

    async fn export() -> Response {
        (
            [(header::CONTENT_TYPE, "text/csv")],
            "id,name,email,post_id,selected_at\na,Candidate A,a@example.com,p1,2025-10-01T10:00:00\n",
        )
            .into_response()
    }

    pub fn router(state: Shared) -> Router {
        Router::new()
            .route("/posts/:post_id", get(fetch_post))
            .route("/departments/it/posts/p1/applicants", get(roster))
            .route("/posts/p1/match", post(run_match))
            .route("/posts/p1/select", post(select))
            .route("/posts/p1/tiebreak", post(tie_break))
            .route("/posts/p1/tiebreak/send", post(tie_break_send))
            .route("/posts/p1/send_top_emails", post(send_top_emails))
            .route("/posts/p1/schedule", post(schedule))
            .route("/posts/p1/meetings", get(meetings))
            .route("/departments/it/selected/export", get(export))
            .with_state(state)
    }

    pub async fn spawn() -> (String, Shared) {
        let state = Shared::default();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub listener");
        let addr = listener.local_addr().expect("stub address");
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("stub server runs");
        });
        (format!("http://{addr}"), state)
    }
}

fn gateway(base_url: &str, token: &str) -> HttpPlacementGateway {
    HttpPlacementGateway::with_client(
        base_url,
        Session::new("it", token, "IT HR Manager"),
        reqwest::Client::new(),
    )
}

#[tokio::test]
async fn pipeline_runs_end_to_end_over_http() {
    let (base_url, _state) = stub::spawn().await;
    let gateway = Arc::new(gateway(&base_url, TOKEN));
    let mut controller = PipelineController::new(
        gateway.session().clone(),
        gateway.clone(),
        PostId::from("p1"),
    );

    controller.load().await.expect("load");
    let shortlist = controller
        .run_match(Some(SelectionPolicy::TopPercent(50)))
        .await
        .expect("match");
    assert_eq!(shortlist.len(), 2);

    let round = controller.create_tie_break(None).await.expect("tie-break");
    let members: Vec<&str> = round.group.members.iter().map(|id| id.0.as_str()).collect();
    assert_eq!(members, vec!["b", "c"]);

    let report = controller
        .send_tie_break_emails()
        .await
        .expect("tie-break emails");
    assert_eq!(report.delivered, 2);
    assert_eq!(controller.state(), PipelineState::Notified);

    let outcome = controller
        .select(&ApplicantId::from("b"))
        .await
        .expect("select b");
    assert_eq!(outcome.applicant.status, ApplicantStatus::Selected);
    assert_eq!(controller.post().map(|post| post.positions_filled), Some(1));

    let again = controller.select(&ApplicantId::from("b")).await;
    assert!(matches!(again, Err(PipelineError::Conflict(_))));

    let meeting = controller
        .schedule(&ApplicantId::from("b"), "2025-10-02 15:00", Some("Panel"))
        .await
        .expect("schedule");
    assert_eq!(meeting.meeting_id, "m-1");
    assert_eq!(meeting.scheduled_for, "2025-10-02T15:00:00");
}

#[tokio::test]
async fn remote_duplicate_select_is_classified_as_conflict() {
    let (base_url, _state) = stub::spawn().await;
    let gateway = gateway(&base_url, TOKEN);
    let post_id = PostId::from("p1");
    let request = TransitionRequest {
        applicant_id: ApplicantId::from("a"),
        expected_version: 1,
    };

    gateway
        .select(&post_id, request.clone())
        .await
        .expect("first select");
    let second = gateway.select(&post_id, request).await;

    assert_eq!(
        second,
        Err(GatewayError::Conflict("Applicant already selected".to_string()))
    );
}

#[tokio::test]
async fn stale_version_is_a_conflict() {
    let (base_url, _state) = stub::spawn().await;
    let gateway = gateway(&base_url, TOKEN);

    let result = gateway
        .select(
            &PostId::from("p1"),
            TransitionRequest {
                applicant_id: ApplicantId::from("c"),
                expected_version: 7,
            },
        )
        .await;

    assert_eq!(
        result,
        Err(GatewayError::Conflict("Applicant was modified".to_string()))
    );
}

#[tokio::test]
async fn missing_credentials_are_a_remote_rejection() {
    let (base_url, _state) = stub::spawn().await;
    let gateway = gateway(&base_url, "wrong-token");

    let result = gateway.fetch_post(&PostId::from("p1")).await;

    assert_eq!(
        result,
        Err(GatewayError::Rejected {
            status: 401,
            detail: "Not authenticated".to_string(),
        })
    );
}

#[tokio::test]
async fn unknown_post_is_not_found() {
    let (base_url, _state) = stub::spawn().await;
    let gateway = gateway(&base_url, TOKEN);

    let result = gateway.fetch_post(&PostId::from("p404")).await;

    assert_eq!(result, Err(GatewayError::NotFound("Post not found".to_string())));
}

#[tokio::test]
async fn notification_method_travels_as_query_parameters() {
    let (base_url, state) = stub::spawn().await;
    let gateway = gateway(&base_url, TOKEN);

    let response = gateway
        .send_top_emails(
            &PostId::from("p1"),
            NotificationQuery {
                method: "top_percent",
                value: 30,
            },
        )
        .await
        .expect("emails sent");

    assert_eq!(response.sent_count, Some(1));
    let queries = state.lock().expect("stub mutex").queries.clone();
    assert_eq!(queries[0].get("method").map(String::as_str), Some("top_percent"));
    assert_eq!(queries[0].get("value").map(String::as_str), Some("30"));
}

#[tokio::test]
async fn selected_export_is_parsed_into_rows() {
    let (base_url, _state) = stub::spawn().await;
    let gateway = Arc::new(gateway(&base_url, TOKEN));
    let directory = DepartmentDirectory::new(gateway.session().clone(), gateway.clone());

    let export = directory.export_selected().await.expect("export");

    assert_eq!(export.rows.len(), 1);
    assert_eq!(export.rows[0].email, "a@example.com");
    assert!(export.bytes.starts_with(b"id,name,email"));
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("ephemeral address");
    drop(listener);
    let gateway = gateway(&format!("http://{addr}"), TOKEN);

    let result = gateway.fetch_post(&PostId::from("p1")).await;

    assert!(matches!(result, Err(GatewayError::Transport(_))));
}
