use anyhow::{Context, Result};
use clap::{Args, Parser};
use futures::StreamExt;
use std::io::Write;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tracing::{error, info};

use career_planner::advisor::{Advisor, ChatSettings};
use career_planner::chat::ChatHistory;
use career_planner::completion::OpenAiClient;
use career_planner::constants;
use career_planner::profile::{self, Gender, Grade, Profile};
use career_planner::web_server::{self, WebConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the career planner web UI.
    Serve {
        #[arg(long, default_value_t = Ipv4Addr::UNSPECIFIED, help = "Address to bind the web server to.")]
        host: Ipv4Addr,
        #[arg(long, default_value_t = 7860, help = "Port for the web server.")]
        port: u16,
        #[arg(long, default_value = "templates", help = "Directory holding index.html.")]
        templates: PathBuf,
        #[arg(long, default_value = "static", help = "Directory served under /static.")]
        static_dir: PathBuf,
        #[arg(long, default_value_t = constants::LOADING_DELAY.as_millis() as u64, help = "How long the loading screen stays up, in milliseconds.")]
        loading_delay_ms: u64,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Talk to the advisor from the terminal.
    Chat {
        #[arg(long, help = "Grade, e.g. \"11th\" or \"9th and below\".")]
        grade: Option<String>,
        #[arg(long, default_value = "")]
        school: String,
        #[arg(long, default_value = "")]
        province: String,
        #[arg(long, help = "Female, Male or Other.")]
        gender: Option<String>,
        #[arg(long = "interest", help = "Subject of interest; repeat for several.")]
        interests: Vec<String>,
        #[command(flatten)]
        model: ModelArgs,
    },
}

#[derive(Args, Debug)]
struct ModelArgs {
    #[arg(long, env = "ADVISOR_MODEL", default_value_t = constants::MODEL_NAME.clone())]
    model: String,
    #[arg(long, env = "OPENAI_BASE_URL", default_value_t = constants::OPENAI_BASE_URL.clone())]
    base_url: String,
    #[arg(long, default_value_t = constants::DEFAULT_MAX_TOKENS)]
    max_tokens: u32,
    #[arg(long, default_value_t = constants::DEFAULT_TEMPERATURE)]
    temperature: f32,
    #[arg(long, default_value_t = constants::DEFAULT_TOP_P)]
    top_p: f32,
    #[arg(long, help = "Replace the built-in advisor instructions.")]
    system_prompt: Option<String>,
}

impl ModelArgs {
    fn into_advisor(self) -> Advisor {
        let backend = Arc::new(OpenAiClient::new(self.base_url, constants::API_KEY.as_str()));
        let settings = ChatSettings {
            model: self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            ..ChatSettings::default()
        };
        let advisor = Advisor::new(backend, settings);
        match self.system_prompt {
            Some(prompt) => advisor.with_system_prompt(prompt),
            None => advisor,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (API_KEY and friends)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG (e.g. RUST_LOG=info,career_planner=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    info!("Career planner starting with command: {:?}", cli.command);

    match cli.command {
        Commands::Serve { host, port, templates, static_dir, loading_delay_ms, model } => {
            let advisor = Arc::new(model.into_advisor());
            let config = WebConfig {
                host: host.octets(),
                port,
                templates_dir: templates,
                static_dir,
                loading_delay: Duration::from_millis(loading_delay_ms),
            };

            // Serve until the server task exits or ctrl-c arrives, whichever is first.
            let mut web_server_handle = tokio::spawn(async move {
                if let Err(e) = web_server::start_web_server(config, advisor).await {
                    error!("Web server failed: {:?}", e);
                }
            });

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);

            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, initiating shutdown...");
                }
                res = &mut web_server_handle => {
                    match res {
                        Ok(_) => info!("Web server task completed unexpectedly."),
                        Err(e) if e.is_panic() => error!("Web server task panicked: {:?}", e),
                        Err(e) => error!("Web server task failed: {:?}", e),
                    }
                }
            }

            // Open sockets go down with the server task.
            if !web_server_handle.is_finished() {
                info!("Aborting web server task...");
                web_server_handle.abort();
            }
            info!("Shutdown complete.");
        }
        Commands::Chat { grade, school, province, gender, interests, model } => {
            // Unknown grade or gender labels are left unset, like a skipped form field.
            let profile = Profile {
                grade: grade.as_deref().and_then(Grade::from_label),
                school,
                province,
                gender: gender.as_deref().and_then(Gender::from_label),
                interests,
            };
            run_terminal_chat(model.into_advisor(), &profile)
                .await
                .context("Chat session failed")?;
            info!("Chat session finished.");
        }
    }

    Ok(())
}

async fn run_terminal_chat(advisor: Advisor, profile: &Profile) -> Result<()> {
    let started = profile::start(profile);
    let mut history: ChatHistory = started.history;
    println!("{}\n", started.welcome);

    // One line per message; EOF ends the conversation.
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        // A failed reply ends the chat.
        let mut printed = 0;
        let updates = advisor.send(text, &mut history);
        tokio::pin!(updates);
        while let Some(update) = updates.next().await {
            let update = update?;
            let Some(turn) = update.transcript.last() else {
                continue;
            };
            // snapshots only ever grow, so print the new tail
            if let Some(tail) = turn.assistant.get(printed..) {
                print!("{}", tail);
                printed = turn.assistant.len();
            }
            std::io::stdout().flush()?;
        }
        println!("\n");
    }
    Ok(())
}
