use crate::infra::parse_policy;
use clap::Args;
use intern_desk::config::AppConfig;
use intern_desk::department::DepartmentDirectory;
use intern_desk::error::AppError;
use intern_desk::pipeline::{
    tie_group, ApplicantId, CandidateRecord, DeliveryReport, Meeting, MessageTemplate,
    PipelineController, Post, PostId, PreviewBundle, SelectionPolicy, Shortlist, TieBreakRound,
    TransitionOutcome,
};
use intern_desk::remote::{HttpPlacementGateway, PlacementGateway};
use intern_desk::session::Session;
use intern_desk::telemetry;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct MatchArgs {
    /// Post to run the match for
    #[arg(long)]
    pub(crate) post: String,
    /// Shortlist policy: a percentage such as 20% or "positions"
    #[arg(long, default_value = "20%", value_parser = parse_policy)]
    pub(crate) policy: SelectionPolicy,
}

#[derive(Args, Debug)]
pub(crate) struct TieBreakArgs {
    #[arg(long)]
    pub(crate) post: String,
    #[arg(long, default_value = "20%", value_parser = parse_policy)]
    pub(crate) policy: SelectionPolicy,
    /// One assessment link shared by every tied applicant
    #[arg(long)]
    pub(crate) custom_link: Option<String>,
    /// Send the tie-break emails right after the links are issued
    #[arg(long)]
    pub(crate) send: bool,
}

#[derive(Args, Debug)]
pub(crate) struct NotifyArgs {
    #[arg(long)]
    pub(crate) post: String,
    #[arg(long, default_value = "20%", value_parser = parse_policy)]
    pub(crate) policy: SelectionPolicy,
    /// Subject override; supports {name}, {email}, {score} and {post_title}
    #[arg(long)]
    pub(crate) subject: Option<String>,
    /// Body override; same placeholders as the subject
    #[arg(long)]
    pub(crate) body: Option<String>,
    /// Ask the service to send the shortlist emails (preview only otherwise)
    #[arg(long)]
    pub(crate) dispatch: bool,
}

#[derive(Args, Debug)]
pub(crate) struct DecisionArgs {
    #[arg(long)]
    pub(crate) post: String,
    #[arg(long)]
    pub(crate) applicant: String,
}

#[derive(Args, Debug)]
pub(crate) struct ScheduleArgs {
    #[arg(long)]
    pub(crate) post: String,
    #[arg(long)]
    pub(crate) applicant: String,
    /// Interview time, e.g. 2025-10-03T14:00 or an RFC 3339 timestamp
    #[arg(long)]
    pub(crate) at: String,
    #[arg(long)]
    pub(crate) note: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct PostArgs {
    #[arg(long)]
    pub(crate) post: String,
}

#[derive(Args, Debug)]
pub(crate) struct ExportArgs {
    /// Destination for the selected-candidates CSV
    #[arg(long, default_value = "selected_candidates.csv")]
    pub(crate) out: PathBuf,
}

/// Session and gateway for one CLI invocation against the configured service.
struct Remote {
    session: Session,
    gateway: Arc<HttpPlacementGateway>,
}

impl Remote {
    fn connect() -> Result<Self, AppError> {
        let config = AppConfig::load()?;
        telemetry::init(&config.telemetry)?;
        let session = config.remote.session()?;
        let gateway = Arc::new(HttpPlacementGateway::new(&config.remote, session.clone())?);
        Ok(Self { session, gateway })
    }

    async fn controller(
        &self,
        post: &str,
    ) -> Result<PipelineController<HttpPlacementGateway>, AppError> {
        load_controller(self.session.clone(), self.gateway.clone(), post).await
    }

    fn directory(&self) -> DepartmentDirectory<HttpPlacementGateway> {
        DepartmentDirectory::new(self.session.clone(), self.gateway.clone())
    }
}

pub(crate) async fn run_posts() -> Result<(), AppError> {
    let remote = Remote::connect()?;
    let posts = remote.directory().posts().await?;
    print_posts(&posts);
    Ok(())
}

pub(crate) async fn run_match(args: MatchArgs) -> Result<(), AppError> {
    let remote = Remote::connect()?;
    let mut controller = remote.controller(&args.post).await?;
    let shortlist = controller.run_match(Some(args.policy)).await?;
    print_shortlist(shortlist);
    Ok(())
}

pub(crate) async fn run_tie_break(args: TieBreakArgs) -> Result<(), AppError> {
    let remote = Remote::connect()?;
    let mut controller = remote.controller(&args.post).await?;
    controller.run_match(Some(args.policy)).await?;
    let round = controller
        .create_tie_break(args.custom_link.as_deref())
        .await?;
    print_tie_break(round);

    if args.send {
        let report = controller.send_tie_break_emails().await?;
        print_delivery(&report);
    }
    Ok(())
}

pub(crate) async fn run_notify(args: NotifyArgs) -> Result<(), AppError> {
    let remote = Remote::connect()?;
    let mut controller = remote.controller(&args.post).await?;
    controller.run_match(Some(args.policy)).await?;

    let defaults = MessageTemplate::default();
    let template = MessageTemplate {
        subject: args.subject.unwrap_or(defaults.subject),
        body: args.body.unwrap_or(defaults.body),
    };
    let bundle = controller.preview_notifications(&template)?;
    print_preview(&bundle);

    if args.dispatch {
        let report = controller.dispatch_notifications(&bundle).await?;
        print_delivery(&report);
    } else {
        println!("\nPreview only; pass --dispatch to send.");
    }
    Ok(())
}

pub(crate) async fn run_select(args: DecisionArgs) -> Result<(), AppError> {
    let remote = Remote::connect()?;
    let mut controller = remote.controller(&args.post).await?;
    let outcome = controller
        .select(&ApplicantId(args.applicant))
        .await?;
    print_outcome(&outcome);
    if let Some(post) = controller.post() {
        println!(
            "  Positions filled: {}/{}",
            post.positions_filled,
            post.declared_positions()
        );
    }
    Ok(())
}

pub(crate) async fn run_reject(args: DecisionArgs) -> Result<(), AppError> {
    let remote = Remote::connect()?;
    let mut controller = remote.controller(&args.post).await?;
    let outcome = controller
        .reject(&ApplicantId(args.applicant))
        .await?;
    print_outcome(&outcome);
    Ok(())
}

pub(crate) async fn run_schedule(args: ScheduleArgs) -> Result<(), AppError> {
    let remote = Remote::connect()?;
    let mut controller = remote.controller(&args.post).await?;
    let meeting = controller
        .schedule(
            &ApplicantId(args.applicant),
            &args.at,
            args.note.as_deref(),
        )
        .await?;
    println!("Interview scheduled");
    print_meetings(std::slice::from_ref(&meeting));
    Ok(())
}

pub(crate) async fn run_meetings(args: PostArgs) -> Result<(), AppError> {
    let remote = Remote::connect()?;
    let mut controller = PipelineController::new(
        remote.session.clone(),
        remote.gateway.clone(),
        PostId(args.post),
    );
    let meetings = controller.list_meetings().await?;
    print_meetings(meetings);
    Ok(())
}

pub(crate) async fn run_selected() -> Result<(), AppError> {
    let remote = Remote::connect()?;
    let records = remote.directory().selected().await?;
    print_candidates("Selected candidates", &records);
    Ok(())
}

pub(crate) async fn run_rejected() -> Result<(), AppError> {
    let remote = Remote::connect()?;
    let records = remote.directory().rejected().await?;
    print_candidates("Rejected candidates", &records);
    Ok(())
}

pub(crate) async fn run_export(args: ExportArgs) -> Result<(), AppError> {
    let remote = Remote::connect()?;
    let export = remote.directory().export_selected().await?;
    export.save_to(&args.out)?;
    println!(
        "Wrote {} selected candidates to {}",
        export.rows.len(),
        args.out.display()
    );
    Ok(())
}

pub(crate) fn print_posts(posts: &[Post]) {
    if posts.is_empty() {
        println!("No active posts");
        return;
    }
    println!("Active posts");
    for post in posts {
        let positions = post
            .positions
            .map(|positions| positions.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "- {} [{}]: {} applied | {}/{} positions filled",
            post.title, post.id, post.applied, post.positions_filled, positions
        );
    }
}

pub(crate) fn print_shortlist(shortlist: &Shortlist) {
    println!(
        "Shortlist ({} policy, {} of {} ranked)",
        shortlist.policy(),
        shortlist.len(),
        shortlist.ranked().len()
    );
    for (index, entry) in shortlist.ranked().iter().enumerate() {
        let marker = if index < shortlist.len() { "*" } else { " " };
        let score = entry
            .score
            .map(|score| format!("{score:.1}"))
            .unwrap_or_else(|| "unscored".to_string());
        println!(
            "  {marker} {:>2}. {} <{}> score {} ({})",
            index + 1,
            entry.name,
            entry.email,
            score,
            entry.status
        );
    }

    match tie_group(shortlist) {
        Ok(group) if group.is_contested() => println!(
            "  Tie at the cutoff: {} applicants share {:.1}",
            group.members.len(),
            group.score
        ),
        Ok(_) => {}
        Err(err) => println!("  No tie-break possible: {err}"),
    }
}

pub(crate) fn print_tie_break(round: &TieBreakRound) {
    println!(
        "Tie-break links for score {:.1} ({} applicants)",
        round.group.score,
        round.group.members.len()
    );
    for (applicant, link) in &round.links {
        println!("  - {applicant}: {link}");
    }
}

pub(crate) fn print_preview(bundle: &PreviewBundle) {
    let query = bundle.method.query();
    println!(
        "Notification preview for {} ({}={}, {} recipients)",
        bundle.post_id,
        query.method,
        query.value,
        bundle.messages.len()
    );
    for message in &bundle.messages {
        println!("\nTo: {}\nSubject: {}\n{}", message.to, message.subject, message.body);
    }
}

pub(crate) fn print_delivery(report: &DeliveryReport) {
    println!("\n{:?} delivery: {} sent", report.kind, report.delivered);
    for message in &report.deliveries {
        println!("  - {} ({})", message.to, message.subject);
    }
}

pub(crate) fn print_outcome(outcome: &TransitionOutcome) {
    println!(
        "{} <{}> is now {}",
        outcome.applicant.name, outcome.applicant.email, outcome.applicant.status
    );
    if let Some(message) = &outcome.message {
        println!("  Service: {message}");
    }
    if let Some(notice) = &outcome.notice {
        println!("  Notice to {}: {}", notice.to, notice.subject);
    }
}

pub(crate) fn print_meetings(meetings: &[Meeting]) {
    if meetings.is_empty() {
        println!("No interviews scheduled");
        return;
    }
    for meeting in meetings {
        let when = meeting
            .scheduled_at()
            .map(|at| at.format("%a %d %b %Y %H:%M").to_string())
            .unwrap_or_else(|| meeting.scheduled_for.clone());
        println!(
            "- {} with {} at {} -> {}",
            meeting.meeting_id, meeting.applicant_id, when, meeting.join_url
        );
        if let Some(note) = &meeting.note {
            println!("  Note: {note}");
        }
    }
}

pub(crate) fn print_candidates(title: &str, records: &[CandidateRecord]) {
    println!("{title} ({})", records.len());
    for record in records {
        let post = record
            .post_id
            .as_ref()
            .map(|id| id.0.as_str())
            .unwrap_or("-");
        println!("- {} <{}> post {}", record.name, record.email, post);
    }
}

/// Controller for `post` with its roster already loaded.
pub(crate) async fn load_controller<G>(
    session: Session,
    gateway: Arc<G>,
    post: &str,
) -> Result<PipelineController<G>, AppError>
where
    G: PlacementGateway + ?Sized,
{
    let mut controller = PipelineController::new(session, gateway, PostId::from(post));
    controller.load().await?;
    Ok(controller)
}
