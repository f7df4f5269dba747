use crate::infra::fixture_pipeline;
use crate::report::{print_assessment, stream_assessment};
use crate::server;
use clap::{Args, Parser, Subcommand};
use underwrite_ai::config::AppConfig;
use underwrite_ai::error::AppError;
use underwrite_ai::telemetry;
use underwrite_ai::workflows::underwriting::AssessmentRequest;

#[derive(Parser, Debug)]
#[command(
    name = "Underwrite AI",
    about = "Assess property underwriting risk from the command line or over HTTP",
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
    /// Run a single assessment against the bundled fixture data
    Assess(AssessArgs),
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

#[derive(Args, Debug)]
pub(crate) struct AssessArgs {
    /// Street address of the property
    #[arg(long)]
    pub(crate) address: String,
    /// UK postcode of the property
    #[arg(long)]
    pub(crate) postcode: String,
    /// Emit raw NDJSON progress events instead of a summary
    #[arg(long)]
    pub(crate) stream: bool,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Assess(args) => run_assessment(args).await,
    }
}

async fn run_assessment(args: AssessArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let pipeline = fixture_pipeline(&config);
    let request = AssessmentRequest::new(args.address, args.postcode);

    if args.stream {
        stream_assessment(&pipeline, request).await
    } else {
        print_assessment(&pipeline, request).await
    }
}
