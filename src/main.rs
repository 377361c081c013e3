//! CLI entry point for `mailrelay`.

use std::path::{Path, PathBuf};

use clap::{Args, CommandFactory, Parser, Subcommand};

use mailrelay::chat::SlackClient;
use mailrelay::config::{self, Config, Credentials, RunOptions};
use mailrelay::ledger::SqliteLedger;
use mailrelay::mailbox::{criteria_for, FetchCriteria, ImapMailbox, WatchMode};
use mailrelay::parser::mime::parse_message;
use mailrelay::pipeline::heuristics::PatternHeuristics;
use mailrelay::pipeline::Normalizer;
use mailrelay::relay::{self, Relay};

#[derive(Parser)]
#[command(
    name = "mailrelay",
    version,
    about = "Relay new mail from an IMAP folder to a Slack channel"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Relay everything received in the recent time window
    MonitorFolder(WatchArgs),
    /// Relay unread mail ("Sent Items" is watched by date)
    MonitorInbox(WatchArgs),
    /// Save raw messages from a folder as <n>.msg files
    SaveFixtures {
        /// Mailbox folder to read
        #[arg(long)]
        folder: String,
        /// Directory to write into
        #[arg(short, long)]
        output: PathBuf,
        /// Search for this text instead of the time window
        #[arg(long, value_name = "TEXT")]
        text: Option<String>,
    },
    /// Print the notification a message file would produce, without sending
    Preview {
        /// A raw .eml / .msg file
        file: PathBuf,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

#[derive(Args)]
struct WatchArgs {
    /// Mailbox folder to poll
    #[arg(long)]
    folder: String,
    /// Destination Slack channel
    #[arg(long)]
    channel: String,
    /// Debug/backfill: search for TEXT and resend even if already delivered
    #[arg(long, value_name = "TEXT", conflicts_with = "search")]
    text: Option<String>,
    /// Search for TEXT instead of the default criterion
    #[arg(long, value_name = "TEXT")]
    search: Option<String>,
    /// Deliver again even if the ledger already holds the message
    #[arg(long)]
    resend: bool,
}

impl WatchArgs {
    fn run_options(&self) -> RunOptions {
        let mut options = RunOptions::new(&self.folder, &self.channel);
        if let Some(text) = &self.text {
            options = options.with_debug_text(text);
        }
        if let Some(search) = &self.search {
            options.search_text = Some(search.clone());
        }
        options.skip_dedup |= self.resend;
        options
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // A missing .env is fine; the variables may come from the environment.
    let _ = dotenvy::dotenv();

    let config = config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::MonitorFolder(args) => cmd_monitor(WatchMode::Folder, &args, &config),
        Commands::MonitorInbox(args) => cmd_monitor(WatchMode::Inbox, &args, &config),
        Commands::SaveFixtures {
            folder,
            output,
            text,
        } => cmd_save_fixtures(&folder, &output, text, &config),
        Commands::Preview { file } => cmd_preview(&file, &config),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::data_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailrelay.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Poll one folder and deliver what is new.
fn cmd_monitor(mode: WatchMode, args: &WatchArgs, config: &Config) -> anyhow::Result<()> {
    let credentials = Credentials::from_env()?;
    let options = args.run_options();

    let normalizer = Normalizer::new(PatternHeuristics::init()?, config.format.max_words);
    let mailbox = ImapMailbox::new(&credentials, config.mailbox.port);
    let chat = SlackClient::new(&config::chat_api_base(config), &credentials.slack_token)?;
    let ledger = SqliteLedger::open(&config::ledger_path(config))?;

    let criteria = criteria_for(
        mode,
        &options,
        &chrono::Local::now(),
        config.mailbox.window_hours,
    );

    let mut relay = Relay::new(mailbox, chat, ledger, normalizer, config.chat.thread_mode);
    relay.run(&options, &criteria)?;
    Ok(())
}

/// Dump raw messages for use as test fixtures.
fn cmd_save_fixtures(
    folder: &str,
    output: &Path,
    text: Option<String>,
    config: &Config,
) -> anyhow::Result<()> {
    let credentials = Credentials::from_env()?;
    let mut mailbox = ImapMailbox::new(&credentials, config.mailbox.port);

    let criteria = match text {
        Some(text) => FetchCriteria::Text(text),
        None => FetchCriteria::since_window(&chrono::Local::now(), config.mailbox.window_hours),
    };

    let written = relay::save_fixtures(&mut mailbox, folder, &criteria, output)?;
    println!("  Saved {} message(s) to {}", written.len(), output.display());
    Ok(())
}

/// Normalize a local message file and print the result.
fn cmd_preview(path: &Path, config: &Config) -> anyhow::Result<()> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    let raw = std::fs::read(path)?;
    let message = parse_message(&raw)?;

    let normalizer = Normalizer::new(PatternHeuristics::init()?, config.format.max_words);
    println!("{}", normalizer.normalize(&message)?);
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailrelay", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
