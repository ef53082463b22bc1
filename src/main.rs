use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use imgen::{
    logger::{self, LogLevel, LoggerConfig},
    save_image, AspectRatio, ClientConfig, ErrorKind, FetchFailure, GenerationError,
    ImageGenClient, ImageGenerationRequest, ModelCapability, ModelId, NetworkFailure,
    RequestState, SizeAdvisory, TriggerOutcome,
};

const SPINNER: [char; 4] = ['|', '/', '-', '\\'];

/// Exit status when the user declines to continue past a size advisory.
const EXIT_CANCELLED: u8 = 2;

/// How a run ended when nothing went wrong.
#[derive(Debug)]
enum RunOutcome {
    Saved(PathBuf),
    Cancelled(SizeAdvisory),
}

#[derive(Parser, Debug)]
#[command(name = "imgen", version, about = "Generate an image from a text prompt")]
struct Args {
    /// What to draw
    #[arg(required_unless_present = "list_models")]
    prompt: Option<String>,

    #[arg(short, long, default_value = "flux")]
    model: ModelId,

    /// Aspect ratio: 1:1, 3:4, 4:3, 9:16 or 16:9
    #[arg(short, long, default_value = "1:1")]
    ratio: AspectRatio,

    /// Style hint, dropped if the model does not accept it
    #[arg(short, long)]
    style: Option<String>,

    /// Where to save the image; .jpg/.jpeg saves JPEG, anything else PNG
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Continue without asking when the model ignores the ratio
    #[arg(short, long)]
    yes: bool,

    #[arg(long)]
    list_models: bool,

    #[arg(long, default_value = "info")]
    log_level: LogLevel,

    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv_loaded = dotenv::dotenv().is_ok();
    let args = Args::parse();

    let logger_config = LoggerConfig::new()
        .with_level(args.log_level)
        .with_json_output(args.json_logs);
    if let Err(e) = logger::init_with_config(logger_config) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }
    if !dotenv_loaded {
        log::debug!("No .env file found, using process environment");
    }

    if args.list_models {
        print_models();
        return ExitCode::SUCCESS;
    }

    let result = run(args).await;
    report(&result);
    ExitCode::from(exit_status(&result))
}

fn report(result: &Result<RunOutcome, GenerationError>) {
    match result {
        Ok(RunOutcome::Saved(path)) => println!("{}", path.display()),
        Ok(RunOutcome::Cancelled(advisory)) => eprintln!("{}", describe_cancel(advisory)),
        Err(e) => eprintln!("{}", describe_failure(e)),
    }
}

fn exit_status(result: &Result<RunOutcome, GenerationError>) -> u8 {
    match result {
        Ok(RunOutcome::Saved(_)) => 0,
        Ok(RunOutcome::Cancelled(_)) => EXIT_CANCELLED,
        Err(_) => 1,
    }
}

fn describe_cancel(advisory: &SizeAdvisory) -> String {
    format!("Cancelled, nothing was sent. {}", advisory)
}

async fn run(args: Args) -> Result<RunOutcome, GenerationError> {
    let config = ClientConfig::from_env();
    logger::log_startup_info("imgen", env!("CARGO_PKG_VERSION"), &config);

    let client = ImageGenClient::new(config)?;
    let mut session = client.session();

    let mut request = ImageGenerationRequest::new(args.prompt.unwrap_or_default())
        .with_model(args.model)
        .with_ratio(args.ratio);
    if let Some(style) = args.style {
        request = request.with_style(style);
    }

    let assume_yes = args.yes;
    match session.trigger(request, |advisory| assume_yes || confirm(advisory)) {
        TriggerOutcome::Dispatched => {}
        TriggerOutcome::Rejected(err) => return Err(err),
        TriggerOutcome::Aborted(advisory) => return Ok(RunOutcome::Cancelled(advisory)),
        TriggerOutcome::Ignored => {
            return Err(GenerationError::Internal("A request is already running".into()))
        }
    }

    let location = wait_with_spinner(&mut session).await?;
    eprintln!("Generated: {}", location);

    let fetched = client.fetcher().fetch(&location).await?;
    let (width, height) = fetched.dimensions();
    eprintln!("Downloaded {}x{} image", width, height);

    let output = args.output.unwrap_or_else(|| default_output_path(args.model));
    save_image(&fetched.image, output).map(RunOutcome::Saved)
}

/// Repaints a spinner while the request runs on its background task. The
/// result is only ever read here, on the interactive side.
async fn wait_with_spinner(
    session: &mut imgen::Session,
) -> Result<imgen::ImageLocation, GenerationError> {
    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    let mut frame = 0usize;

    while session.state() == RequestState::InFlight {
        ticker.tick().await;
        if session.poll().is_some() {
            break;
        }
        eprint!("\r{} generating...", SPINNER[frame % SPINNER.len()]);
        let _ = io::stderr().flush();
        frame += 1;
    }
    eprint!("\r");

    match session.last_result() {
        Some(result) => result.clone(),
        None => Err(GenerationError::Internal("No result was delivered".into())),
    }
}

fn confirm(advisory: &SizeAdvisory) -> bool {
    eprint!("{}. Continue? [y/N] ", advisory);
    let _ = io::stderr().flush();
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn default_output_path(model: ModelId) -> PathBuf {
    PathBuf::from(format!(
        "generated_{}_{}.png",
        model.as_str().replace('-', "_"),
        chrono::Utc::now().timestamp()
    ))
}

fn describe_failure(err: &GenerationError) -> String {
    let headline = match err.kind() {
        ErrorKind::Validation => "Check your input",
        ErrorKind::Network(NetworkFailure::Timeout) => "The generation service took too long",
        ErrorKind::Network(NetworkFailure::Connect) => "Could not connect to the generation service",
        ErrorKind::Remote => "The generation service rejected the request",
        ErrorKind::MalformedResponse => "The generation service returned no usable image",
        ErrorKind::Fetch(FetchFailure::Timeout) => {
            "The image was generated but downloading it timed out"
        }
        ErrorKind::Fetch(_) => "The image was generated but could not be downloaded",
        ErrorKind::Decode => "The downloaded file is not a readable image",
        ErrorKind::Save => "The image could not be saved",
        ErrorKind::Config => "Configuration problem",
        ErrorKind::Internal => "Unexpected failure",
    };
    format!("{}: {}", headline, err)
}

fn print_models() {
    println!(
        "{:<14} {:<6} {:<8} {:<36} {}",
        "MODEL", "SIZE", "API KEY", "STYLES", "DESCRIPTION"
    );
    for capability in ImageGenClient::supported_models() {
        println!("{}", model_row(capability));
    }
}

fn model_row(capability: &ModelCapability) -> String {
    format!(
        "{:<14} {:<6} {:<8} {:<36} {}",
        capability.model.as_str(),
        if capability.supports_size { "yes" } else { "no" },
        if capability.requires_api_key { "yes" } else { "no" },
        capability.styles.join(", "),
        capability.description
    )
}
