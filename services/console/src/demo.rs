use crate::infra::{parse_policy, sandbox_session, SandboxPlacementGateway};
use crate::operator::{
    load_controller, print_candidates, print_delivery, print_meetings, print_outcome,
    print_posts, print_preview, print_shortlist, print_tie_break,
};
use chrono::{Duration, Local, NaiveTime};
use clap::Args;
use intern_desk::department::DepartmentDirectory;
use intern_desk::error::AppError;
use intern_desk::pipeline::{
    render, ApplicantId, DocumentFormat, MessageTemplate, PipelineError, SelectionPolicy,
};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Sandbox post to walk through
    #[arg(long, default_value = "p1")]
    pub(crate) post: String,
    /// Shortlist policy for the demo match
    #[arg(long, default_value = "positions", value_parser = parse_policy)]
    pub(crate) policy: SelectionPolicy,
    /// Shared tie-break link instead of per-applicant sandbox links
    #[arg(long)]
    pub(crate) custom_link: Option<String>,
    /// Print the rejection notice as HTML instead of plain text
    #[arg(long)]
    pub(crate) html: bool,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            post: "p1".to_string(),
            policy: SelectionPolicy::ByPositions,
            custom_link: None,
            html: false,
        }
    }
}

/// What the demo run changed, for callers that want more than the printed walkthrough.
#[derive(Debug, Default)]
pub(crate) struct DemoSummary {
    pub(crate) shortlisted: usize,
    pub(crate) tie_break_links: usize,
    pub(crate) notified: usize,
    pub(crate) selected: usize,
    pub(crate) rejected: usize,
    pub(crate) meetings: usize,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let gateway = Arc::new(SandboxPlacementGateway::seeded());
    let summary = run_pipeline_demo(gateway, args).await?;
    println!(
        "\nDemo complete: {} shortlisted, {} tie-break links, {} notified, {} selected, {} rejected, {} interviews",
        summary.shortlisted,
        summary.tie_break_links,
        summary.notified,
        summary.selected,
        summary.rejected,
        summary.meetings
    );
    Ok(())
}

pub(crate) async fn run_pipeline_demo(
    gateway: Arc<SandboxPlacementGateway>,
    args: DemoArgs,
) -> Result<DemoSummary, AppError> {
    let DemoArgs {
        post,
        policy,
        custom_link,
        html,
    } = args;
    let session = sandbox_session();
    let directory = DepartmentDirectory::new(session.clone(), gateway.clone());
    let mut summary = DemoSummary::default();

    println!("Internship placement demo (sandbox department {})", session.department_id());
    print_posts(&directory.posts().await?);

    let mut controller = load_controller(session, gateway, &post).await?;
    println!("\nMatching {post}");
    let shortlist = controller.run_match(Some(policy)).await?;
    summary.shortlisted = shortlist.len();
    print_shortlist(shortlist);

    println!();
    match controller.create_tie_break(custom_link.as_deref()).await {
        Ok(round) => {
            summary.tie_break_links = round.links.len();
            print_tie_break(round);
            let report = controller.send_tie_break_emails().await?;
            print_delivery(&report);
        }
        Err(PipelineError::InvalidInput(err)) => println!("Tie-break skipped: {err}"),
        Err(err) => return Err(err.into()),
    }

    println!();
    let bundle = controller.preview_notifications(&MessageTemplate::default())?;
    print_preview(&bundle);
    let report = controller.dispatch_notifications(&bundle).await?;
    summary.notified = report.delivered;
    print_delivery(&report);

    let ranked: Vec<ApplicantId> = controller
        .shortlist()
        .map(|shortlist| shortlist.ranked().iter().map(|entry| entry.id.clone()).collect())
        .unwrap_or_default();

    println!("\nDecisions");
    if let Some(first) = ranked.first() {
        let outcome = controller.select(first).await?;
        print_outcome(&outcome);

        if let Err(err) = controller.select(first).await {
            println!("  Selecting {first} again: {err}");
        }
    }
    if let Some(last) = ranked.last() {
        let outcome = controller.reject(last).await?;
        print_outcome(&outcome);
        if let Some(notice) = &outcome.notice {
            let format = if html {
                DocumentFormat::Html
            } else {
                DocumentFormat::PlainText
            };
            let document = render(notice, format);
            println!("\n{}", document.content);
        }
    }

    let auto = controller.auto_select().await?;
    println!(
        "Auto-select filled {} remaining positions{}",
        auto.selected_count,
        auto.message
            .map(|message| format!(" ({message})"))
            .unwrap_or_default()
    );

    println!("\nInterviews");
    let tomorrow = Local::now().date_naive() + Duration::days(1);
    let at = tomorrow
        .and_time(NaiveTime::from_hms_opt(10, 30, 0).unwrap_or_default())
        .format("%Y-%m-%d %H:%M")
        .to_string();
    if let Some(first) = ranked.first() {
        controller
            .schedule(first, &at, Some("Final round with the team lead"))
            .await?;
    }
    let meetings = controller.list_meetings().await?;
    summary.meetings = meetings.len();
    print_meetings(meetings);

    println!();
    let selected = directory.selected().await?;
    let rejected = directory.rejected().await?;
    summary.selected = selected.len();
    summary.rejected = rejected.len();
    print_candidates("Selected candidates", &selected);
    print_candidates("Rejected candidates", &rejected);

    let analytics = directory.analytics().await?;
    println!(
        "\nDepartment: {} active / {} past internships | {} selected | {} rejected",
        analytics.active_internships,
        analytics.past_internships,
        analytics.selected_candidates,
        analytics.rejected_candidates
    );
    for notice in directory.notifications().await? {
        println!("- {}", notice.message);
    }

    Ok(summary)
}
