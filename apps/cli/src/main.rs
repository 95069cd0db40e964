use std::{
    path::PathBuf,
    process::ExitCode,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use vodchat_core::{
    CancellationToken, ChannelResolver, ChatFileCreator, CreationRequest, EventBus,
    ProgressEvent, Settings, SubscriptionSpec, TwitchApi, TwitchChannelResolver,
    ValidationError, VideoContext, config::get_settings_path, events::EnrichedEvent,
    format_timestamp,
};

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let whole = d.as_secs();
        format!("{}m {}s", whole / 60, whole % 60)
    }
}

#[derive(Parser)]
#[command(name = "vodchat")]
#[command(about = "Turn Twitch VOD chat logs into chat replay files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a .cht chat file from a chat log or a VOD ID
    Create(CreateArgs),

    /// Look up the numeric ID of a channel
    ResolveChannel {
        /// Channel login name
        name: String,

        /// Twitch Client ID (overrides settings and TWITCH_CLIENT_ID)
        #[arg(long)]
        client_id: Option<String>,
    },

    /// Show or change stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Store the Twitch Client ID
    SetClientId { client_id: String },
    /// Print the settings in effect
    Show,
}

#[derive(Args)]
struct CreateArgs {
    /// Directory the chat file is written to
    #[arg(short, long)]
    output: PathBuf,

    /// Existing chat log (JSON) to convert
    #[arg(long, conflicts_with = "vod_id", required_unless_present = "vod_id")]
    chat_log: Option<PathBuf>,

    /// Download the chat log of this VOD first
    #[arg(long)]
    vod_id: Option<String>,

    /// Start of the chat to keep (e.g. "1h2m3s")
    #[arg(long, value_parser = humantime::parse_duration)]
    begin: Option<Duration>,

    /// End of the chat to keep
    #[arg(long, value_parser = humantime::parse_duration)]
    end: Option<Duration>,

    /// Video the chat file belongs to; names the output file
    #[arg(long, requires = "video_end")]
    video: Option<PathBuf>,

    /// Length of the video; the default window when --begin/--end are absent
    #[arg(long, value_parser = humantime::parse_duration, requires = "video")]
    video_end: Option<Duration>,

    /// Twitch Client ID (overrides settings and TWITCH_CLIENT_ID)
    #[arg(long)]
    client_id: Option<String>,

    /// Print events as JSON lines instead of a progress bar
    #[arg(long)]
    json: bool,
}

impl CreateArgs {
    fn request(&self) -> CreationRequest {
        let mut request = match (&self.chat_log, &self.vod_id) {
            (_, Some(vod_id)) => CreationRequest::from_vod_id(&self.output, vod_id.clone()),
            (Some(chat_log), None) => CreationRequest::from_log_file(&self.output, chat_log),
            (None, None) => CreationRequest::from_log_file(&self.output, PathBuf::new()),
        };
        if self.begin.is_some() || self.end.is_some() {
            request = request.with_window(self.begin, self.end);
        }
        if let (Some(file_path), Some(end_time)) = (&self.video, self.video_end) {
            request = request.with_video(VideoContext {
                file_path: file_path.clone(),
                end_time,
            });
        }
        request
    }
}

fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn render(event: &EnrichedEvent, pb: &ProgressBar, started: Instant) {
    match &event.event {
        ProgressEvent::Started { message } => pb.set_message(message.clone()),
        ProgressEvent::Progress { message, percent } => {
            pb.set_position(u64::from(*percent));
            pb.set_message(message.clone());
        }
        ProgressEvent::Completed {
            message,
            output_path,
        } => {
            pb.finish_and_clear();
            println!(
                "{} {} {}",
                style("✓").green().bold(),
                message,
                style(format!("[{}]", format_duration(started.elapsed()))).dim()
            );
            println!(
                "\n{} {}\n",
                style("Saved:").dim(),
                style(output_path.display()).cyan()
            );
        }
        ProgressEvent::Failed { message } => {
            pb.abandon();
            eprintln!("{} {}", style("Error:").red().bold(), message);
        }
    }
}

async fn create(args: CreateArgs) -> Result<ExitCode> {
    let settings = Settings::load()?.with_client_id_override(args.client_id.clone());
    let request = args.request();

    if !args.json
        && let Some(window) = request.effective_window()
    {
        println!(
            "{} {} – {}",
            style("Window:").dim(),
            format_timestamp(window.begin),
            format_timestamp(window.end)
        );
    }

    let bus = EventBus::new();
    let (subscription, mut rx) = bus.subscribe_channel(SubscriptionSpec::all("cli.progress"))?;
    let creator = ChatFileCreator::for_twitch(bus, &settings);

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let json = args.json;
    let renderer = tokio::spawn(async move {
        let started = Instant::now();
        let pb = if json {
            ProgressBar::hidden()
        } else {
            create_progress_bar()
        };
        while let Some(event) = rx.recv().await {
            if json {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!("failed to serialize event: {e}"),
                }
            } else {
                render(&event, &pb, started);
            }
        }
    });

    let outcome = creator.request_creation(request, cancel).wait().await;
    // Closing the channel lets the renderer drain and exit.
    drop(subscription);
    renderer.await.context("progress renderer crashed")?;

    Ok(match outcome {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!("creation failed: {e:?}");
            ExitCode::FAILURE
        }
    })
}

async fn resolve_channel(name: &str, client_id: Option<String>) -> Result<ExitCode> {
    let settings = Settings::load()?.with_client_id_override(client_id);
    let Some(client_id) = settings.client_id() else {
        eprintln!(
            "{} {}",
            style("Error:").red().bold(),
            ValidationError::MissingClientId
        );
        return Ok(ExitCode::FAILURE);
    };

    let api = TwitchApi::with_base_url(client_id, settings.api_base_url());
    let resolver = TwitchChannelResolver::new(api);
    match resolver.resolve_id(name).await {
        Ok(id) => {
            println!("{id}");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn config(action: ConfigAction) -> Result<ExitCode> {
    let path = get_settings_path()?;
    match action {
        ConfigAction::SetClientId { client_id } => {
            let mut settings = Settings::load_from(&path)?;
            settings.client_id = Some(client_id.trim().to_string());
            settings.save_to(&path)?;
            println!(
                "{} Client ID saved to {}",
                style("✓").green().bold(),
                style(path.display()).cyan()
            );
        }
        ConfigAction::Show => {
            let settings = Settings::load()?;
            println!("{} {}", style("Settings:").dim(), path.display());
            println!(
                "{} {}",
                style("Client ID:").dim(),
                settings.client_id().unwrap_or("(not set)")
            );
            println!("{} {}", style("API:").dim(), settings.api_base_url());
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Create(args) => create(args).await,
        Command::ResolveChannel { name, client_id } => resolve_channel(&name, client_id).await,
        Command::Config { action } => config(action),
    }
}
