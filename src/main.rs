use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chat_media_archiver::api::HttpApi;
use chat_media_archiver::archive::{write_manifest, Archiver};
use chat_media_archiver::auth::authenticate;
use chat_media_archiver::config::{Config, CONFIG_FILE_NAME, CONFIG_PRIVATE_FILE_NAME};
use chat_media_archiver::download::HttpFetcher;
use chat_media_archiver::prompt::{Prompter, ScriptedPrompter, TerminalPrompter};
use chat_media_archiver::selection::select_conversations;
use clap::Parser;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, env = "ARCHIVER_CONFIG", default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    #[arg(long, env = "ARCHIVER_PRIVATE_CONFIG", default_value = CONFIG_PRIVATE_FILE_NAME)]
    private_config: PathBuf,

    #[arg(long, env = "ARCHIVER_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    #[arg(long, env = "ARCHIVER_PROCESS_VIDEO")]
    process_video: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let mut config = Config::load(&args.config, Some(args.private_config.as_path()))
        .with_context(|| format!("load {}", args.config.display()))?;
    if let Some(output_dir) = args.output_dir {
        config.output_dir = output_dir;
    }
    if args.process_video {
        config.process_video = true;
    }

    let client = reqwest::Client::builder()
        .user_agent(concat!("chat-media-archiver/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("build http client")?;
    let mut prompter: Box<dyn Prompter> = if std::io::stdin().is_terminal() {
        Box::new(TerminalPrompter)
    } else {
        Box::new(ScriptedPrompter::stdio())
    };

    let session = match authenticate(&client, &config, prompter.as_mut()).await {
        Ok(session) => session,
        Err(e) if e.is_auth() => {
            eprintln!("{e}");
            return Ok(());
        }
        Err(e) => return Err(e).context("authenticate"),
    };
    if let Some(user_id) = session.user_id {
        info!(user_id, "authenticated");
    }

    let api = HttpApi::new(
        client.clone(),
        &config.api_base_url,
        session.access_token,
        &config.api_version,
    );

    let selection = select_conversations(&api, &config, prompter.as_mut())
        .await
        .context("enumerate conversations")?;
    if !selection.complete {
        warn!("conversation list ended unexpectedly, nothing will be processed");
        return Ok(());
    }
    let peer_ids: Vec<String> = selection
        .selected
        .iter()
        .map(|c| c.peer_id.to_string())
        .collect();
    info!("peer ids: {} [{}]", peer_ids.len(), peer_ids.join(", "));

    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("create {}", config.output_dir.display()))?;
    let fetcher = HttpFetcher::new(client);
    let mut report = Archiver::new(&api, &fetcher, &config)
        .run(&selection.selected)
        .await
        .context("archive conversations")?;

    if config.write_manifest {
        let path = write_manifest(&config.output_dir, &mut report).context("write manifest")?;
        info!(path = %path.display(), "manifest written");
    }

    println!(
        "OK conversations={} messages={} files={} duration_s={:.2}",
        report.conversations.len(),
        report.messages_processed(),
        report.files_written(),
        report.duration_s
    );

    Ok(())
}
