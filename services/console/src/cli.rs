use crate::demo::{run_demo, DemoArgs};
use crate::operator::{
    self, DecisionArgs, ExportArgs, MatchArgs, NotifyArgs, PostArgs, ScheduleArgs, TieBreakArgs,
};
use crate::server;
use clap::{Args, Parser, Subcommand};
use intern_desk::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Intern Desk",
    about = "Run the internship placement pipeline from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// List the department's active posts
    Posts,
    /// Run a match for a post and print the shortlist
    Match(MatchArgs),
    /// Issue tie-break links for applicants tied at the shortlist cutoff
    TieBreak(TieBreakArgs),
    /// Preview, and optionally send, shortlist notifications
    Notify(NotifyArgs),
    /// Mark an applicant as selected
    Select(DecisionArgs),
    /// Mark an applicant as rejected
    Reject(DecisionArgs),
    /// Schedule an interview for an applicant
    Schedule(ScheduleArgs),
    /// List interviews scheduled for a post
    Meetings(PostArgs),
    /// List selected candidates across the department
    Selected,
    /// List rejected candidates across the department
    Rejected,
    /// Download the selected-candidates CSV
    Export(ExportArgs),
    /// Walk through the whole pipeline against the offline sandbox
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Load this post before accepting requests
    #[arg(long)]
    pub(crate) post: Option<String>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Posts => operator::run_posts().await,
        Command::Match(args) => operator::run_match(args).await,
        Command::TieBreak(args) => operator::run_tie_break(args).await,
        Command::Notify(args) => operator::run_notify(args).await,
        Command::Select(args) => operator::run_select(args).await,
        Command::Reject(args) => operator::run_reject(args).await,
        Command::Schedule(args) => operator::run_schedule(args).await,
        Command::Meetings(args) => operator::run_meetings(args).await,
        Command::Selected => operator::run_selected().await,
        Command::Rejected => operator::run_rejected().await,
        Command::Export(args) => operator::run_export(args).await,
        Command::Demo(args) => run_demo(args).await,
    }
}
