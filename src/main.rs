use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use homework_helper::config::{Config, API_KEY_ENV, ORIGIN_ENV};
use homework_helper::tui::{self, EventHandler};
use homework_helper::{handler, logging, ui};
use homework_helper::{render_markdown, App, Endpoint, GeminiClient, SolverSession};

#[derive(Parser)]
#[command(name = "homework-helper")]
#[command(version, about = "Homework solver and study chat powered by Gemini")]
struct Cli {
    /// Origin the app is served from; requests go through its /api/generate proxy
    #[arg(long, env = ORIGIN_ENV)]
    origin: Option<String>,

    /// Override the direct Gemini endpoint used without an origin
    #[arg(long)]
    api_url: Option<String>,

    /// Gemini API key for direct requests
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve one question and print the answer
    Solve {
        /// The homework question
        #[arg(short, long, default_value = "")]
        question: String,
        #[arg(short, long)]
        subject: Option<String>,
        #[arg(short, long)]
        level: Option<String>,
        #[arg(long)]
        language: Option<String>,
        /// Extra context for the tutor
        #[arg(short, long, default_value = "")]
        notes: String,
        /// Image of the problem
        #[arg(short, long)]
        image: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = Config::load().unwrap_or_else(|_| Config::new()).apply_env();
    if cli.origin.is_some() {
        config.origin = cli.origin.clone();
    }
    if cli.api_url.is_some() {
        config.api_url = cli.api_url.clone();
    }
    if cli.api_key.is_some() {
        config.gemini_api_key = cli.api_key.clone();
    }

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    let result = match cli.command {
        None => run_tui(config).await,
        Some(Commands::Solve {
            question,
            subject,
            level,
            language,
            notes,
            image,
        }) => {
            let mut session = SolverSession::new();
            session.question = question;
            session.subject = subject.or(config.subject.clone()).unwrap_or_default();
            session.level = level.or(config.level.clone()).unwrap_or_default();
            session.language = language
                .or(config.language.clone())
                .unwrap_or_else(|| "English".to_string());
            session.notes = notes;
            solve_once(config, session, image).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Exiting with error");
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    logging::init(&Config::config_dir()?.join("homework-helper.log"), verbose)
}

async fn run_tui(config: Config) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();
    let mut app = App::new(config);

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;

            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event).await?,
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    info!("Homework helper closed");
    result
}

async fn solve_once(config: Config, mut session: SolverSession, image: Option<PathBuf>) -> Result<()> {
    if let Some(path) = image {
        session.attach_image(&path).await?;
    }

    let client = GeminiClient::new(Endpoint::resolve(&config));
    let request = session.prepare(client.endpoint())?;
    let text = client.generate(&request.to_payload()).await?;

    println!("{}", render_markdown(&text).plain);
    Ok(())
}
