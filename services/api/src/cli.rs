use crate::demo::{run_deadline, run_demo, DeadlineArgs, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use helpdesk::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "IT Helpdesk",
    about = "Run the IT helpdesk service or explore its deadline rules from the command line",
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
    /// Compute the deadline a new request would receive
    Deadline(DeadlineArgs),
    /// Walk a request through its lifecycle against in-memory stores
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
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Deadline(args) => run_deadline(args),
        Command::Demo(args) => run_demo(args).await,
    }
}
