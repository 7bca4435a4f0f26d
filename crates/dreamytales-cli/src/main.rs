//! dreamytales CLI — bedtime story server and remote control.
//!
//! ```text
//! dreamytales serve [--port 3001] [--host 127.0.0.1] [--data-dir DIR] [--music-url URL]
//! dreamytales tell --theme Bravery --scene Forest --character Bear [--server ...]
//! dreamytales list / play <id> / toggle / next / prev / mode / music / status
//! dreamytales filter [theme]
//! dreamytales profile show | set --name Mia --age 5 --gender Girl | clear
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dreamytales_lib::dreamytales_core::narration::format_clock;
use dreamytales_lib::dreamytales_core::types::{PlayerConfig, SpeechConfig, WriterConfig};
use dreamytales_lib::assets::AssetStore;
use dreamytales_lib::player::Player;
use dreamytales_lib::profile::{self, ProfileStore};
use dreamytales_lib::server::{self, AppState};
use dreamytales_lib::speech::SpeechClient;
use dreamytales_lib::studio::Studio;
use dreamytales_lib::writer::StoryWriter;

const DEFAULT_SERVER: &str = "http://localhost:3001";

/// dreamytales — personalised bedtime stories, narrated
#[derive(Parser)]
#[command(name = "dreamytales", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the story server
    Serve {
        /// Listen port
        #[arg(long, default_value = "3001")]
        port: u16,
        /// Listen host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Where the profile is kept
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Background music to loop under narration
        #[arg(long)]
        music_url: Option<String>,
        /// Start with background music off
        #[arg(long)]
        no_music: bool,
        #[command(flatten)]
        azure: AzureArgs,
    },
    /// Generate and play a new story
    Tell {
        #[command(flatten)]
        story: TellArgs,
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// List stories under the active filter
    List {
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Play a story, or toggle it if it is already current
    Play {
        id: String,
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Toggle play/pause
    Toggle {
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Next story
    Next {
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Previous story
    Prev {
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Cycle play mode (sequential → loop one → shuffle)
    Mode {
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Toggle background music
    Music {
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Show only stories with this theme; no theme clears the filter
    Filter {
        theme: Option<String>,
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Get player status
    Status {
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Manage the saved child profile
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
        #[arg(long, global = true, default_value = DEFAULT_SERVER)]
        server: String,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    Show,
    Set {
        #[arg(long)]
        name: String,
        #[arg(long)]
        age: u32,
        #[arg(long, value_parser = ["Boy", "Girl"])]
        gender: String,
    },
    Clear,
}

#[derive(Args)]
struct AzureArgs {
    #[arg(long, env = "AZURE_OPENAI_ENDPOINT")]
    openai_endpoint: Option<String>,
    #[arg(long, env = "AZURE_OPENAI_API_KEY", hide_env_values = true)]
    openai_key: Option<String>,
    #[arg(long, env = "AZURE_OPENAI_TEXT_DEPLOYMENT")]
    openai_deployment: Option<String>,
    #[arg(long, env = "AZURE_OPENAI_API_VERSION", default_value = "2024-05-01-preview")]
    openai_api_version: String,
    #[arg(long, env = "AZURE_SPEECH_KEY", hide_env_values = true)]
    speech_key: Option<String>,
    #[arg(long, env = "AZURE_SPEECH_REGION", default_value = "japaneast")]
    speech_region: String,
    /// Neural voice used for narration
    #[arg(long, default_value = "zh-CN-XiaoxiaoNeural")]
    speech_voice: String,
    /// Vendor request timeout in seconds
    #[arg(long, default_value = "120")]
    timeout: u64,
}

#[derive(Args)]
struct TellArgs {
    /// Child's name (defaults to the saved profile)
    #[arg(long)]
    name: Option<String>,
    /// Child's age (defaults to the saved profile)
    #[arg(long)]
    age: Option<u32>,
    /// The child's animal friend
    #[arg(long)]
    character: String,
    /// More companions
    #[arg(long, value_delimiter = ',')]
    friends: Vec<String>,
    #[arg(long)]
    scene: String,
    #[arg(long)]
    theme: String,
    #[arg(long, value_parser = ["Chinese", "English"], default_value = "Chinese")]
    language: String,
    #[arg(long, value_parser = ["alloy", "echo", "fable", "onyx", "nova", "shimmer"], default_value = "nova")]
    voice: String,
    /// Extra instructions for the writer
    #[arg(long)]
    prompt: Option<String>,
    /// Continue the story with this id
    #[arg(long)]
    sequel_of: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dreamytales_lib=debug,dreamytales=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            port,
            host,
            data_dir,
            music_url,
            no_music,
            azure,
        } => serve(host, port, data_dir, music_url, no_music, azure).await,

        Command::Tell { story, server } => tell(&server, story).await,
        Command::List { server } => list(&server).await,
        Command::Play { id, server } => post_simple(&server, &format!("player/select/{id}")).await,
        Command::Toggle { server } => post_simple(&server, "player/toggle").await,
        Command::Next { server } => post_simple(&server, "player/next").await,
        Command::Prev { server } => post_simple(&server, "player/prev").await,
        Command::Mode { server } => post_simple(&server, "player/mode").await,
        Command::Music { server } => post_simple(&server, "player/music").await,

        Command::Filter { theme, server } => {
            let body = send(
                reqwest::Client::new()
                    .put(format!("{server}/player/filter"))
                    .json(&json!({ "theme": theme })),
            )
            .await?;
            println!("{body}");
            Ok(())
        }

        Command::Status { server } => {
            let status = send(reqwest::Client::new().get(format!("{server}/player/status"))).await?;
            println!("{}", describe_status(&status));
            Ok(())
        }

        Command::Profile { action, server } => profile_command(&server, action).await,
    }
}

async fn serve(
    host: String,
    port: u16,
    data_dir: Option<PathBuf>,
    music_url: Option<String>,
    no_music: bool,
    azure: AzureArgs,
) -> Result<()> {
    let writer = StoryWriter::new(WriterConfig {
        endpoint: azure.openai_endpoint,
        api_key: azure.openai_key,
        deployment: azure.openai_deployment,
        api_version: azure.openai_api_version,
        timeout_secs: azure.timeout,
    })?;
    let speech = SpeechClient::new(SpeechConfig {
        key: azure.speech_key,
        region: azure.speech_region,
        voice: azure.speech_voice,
        timeout_secs: azure.timeout,
        ..SpeechConfig::default()
    })?;

    let mut player_config = PlayerConfig {
        background_enabled: !no_music,
        ..PlayerConfig::default()
    };
    if music_url.is_some() {
        player_config.background_music_url = music_url;
    }
    let bed_url = player_config.background_music_url.clone();

    let assets = AssetStore::new();
    let player = Player::spawn(player_config, assets.clone()).context("failed to start playback")?;
    if let Some(url) = bed_url {
        tokio::spawn(fetch_background_music(url, player.clone()));
    }

    let data_dir = data_dir.unwrap_or_else(profile::default_dir);
    let state = AppState {
        studio: Studio::new(writer, speech, assets, player),
        profiles: ProfileStore::new(&data_dir),
    };
    let app = server::router(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("dreamytales listening on {addr} (profile in {})", data_dir.display());

    axum::serve(listener, app).await.context("server error")
}

/// Download the music bed once. Failure only costs the music.
async fn fetch_background_music(url: String, player: Player) {
    let result = async {
        let resp = reqwest::get(&url).await?.error_for_status()?;
        resp.bytes().await
    }
    .await;

    match result {
        Ok(bytes) => {
            info!("background music: {} bytes from {url}", bytes.len());
            if player.load_bed(Arc::from(&bytes[..])).is_err() {
                warn!("background music: player is gone");
            }
        }
        Err(e) => warn!("background music unavailable: {e}"),
    }
}

// ─── Remote commands ──────────────────────────────────────────────────────

async fn tell(server: &str, args: TellArgs) -> Result<()> {
    let client = reqwest::Client::new();

    let (name, age) = match (args.name, args.age) {
        (Some(name), Some(age)) => (name, age),
        (name, age) => {
            let saved = send(client.get(format!("{server}/profile"))).await?;
            let name = name.or_else(|| saved["name"].as_str().map(str::to_string));
            let age = age.or_else(|| saved["age"].as_u64().and_then(|a| u32::try_from(a).ok()));
            match (name, age) {
                (Some(name), Some(age)) => (name, age),
                _ => bail!("no saved profile; pass --name and --age"),
            }
        }
    };

    let mut settings = json!({
        "childName": name,
        "age": age,
        "mainCharacter": args.character,
        "secondaryCharacters": args.friends,
        "scene": args.scene,
        "theme": args.theme,
        "language": args.language,
        "selectedVoice": args.voice,
    });
    if let Some(prompt) = args.prompt {
        settings["customPrompt"] = Value::String(prompt);
    }

    eprintln!("Writing and narrating, this can take a minute...");
    let story = send(
        client
            .post(format!("{server}/stories"))
            .json(&json!({ "settings": settings, "sequelOf": args.sequel_of })),
    )
    .await?;

    println!(
        "{}  {}  {}",
        story["id"].as_str().unwrap_or_default(),
        format_clock(story["duration"].as_f64().unwrap_or_default()),
        story["title"].as_str().unwrap_or_default()
    );
    Ok(())
}

async fn list(server: &str) -> Result<()> {
    let list = send(reqwest::Client::new().get(format!("{server}/stories"))).await?;
    if let Some(theme) = list["filter"].as_str() {
        println!("(filter: {theme})");
    }
    let stories = list["stories"].as_array().map(Vec::as_slice).unwrap_or_default();
    if stories.is_empty() {
        println!("No stories yet.");
    }
    for story in stories {
        println!(
            "{}  {:>5}  [{}] {}",
            story["id"].as_str().unwrap_or_default(),
            format_clock(story["duration"].as_f64().unwrap_or_default()),
            story["settings"]["theme"].as_str().unwrap_or_default(),
            story["title"].as_str().unwrap_or_default()
        );
    }
    Ok(())
}

async fn profile_command(server: &str, action: ProfileAction) -> Result<()> {
    let client = reqwest::Client::new();
    let url = format!("{server}/profile");
    let body = match action {
        ProfileAction::Show => send(client.get(&url)).await?,
        ProfileAction::Set { name, age, gender } => {
            send(client.put(&url).json(&json!({ "name": name, "age": age, "gender": gender })))
                .await?
        }
        ProfileAction::Clear => send(client.delete(&url)).await?,
    };
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn post_simple(server: &str, endpoint: &str) -> Result<()> {
    let body = send(reqwest::Client::new().post(format!("{server}/{endpoint}"))).await?;
    println!("{body}");
    Ok(())
}

/// Send a request and return its JSON body, turning `{ "error": ... }`
/// answers into errors.
async fn send(req: reqwest::RequestBuilder) -> Result<Value> {
    let resp = req.send().await.context("request failed")?;
    let status = resp.status();
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    if !status.is_success() {
        let message = body["error"].as_str().unwrap_or("no details");
        bail!("server answered {status}: {message}");
    }
    Ok(body)
}

fn describe_status(status: &Value) -> String {
    let mode = status["mode"].as_str().unwrap_or("Sequential");
    let music = if status["backgroundMusic"].as_bool().unwrap_or(false) {
        "on"
    } else {
        "off"
    };
    let mut out = match status["current"].as_object() {
        Some(current) => format!(
            "{} {}  {} / {}",
            status["state"].as_str().unwrap_or("idle"),
            current["title"].as_str().unwrap_or_default(),
            format_clock(status["elapsed"].as_f64().unwrap_or_default()),
            format_clock(current["duration"].as_f64().unwrap_or_default()),
        ),
        None => "nothing selected".to_string(),
    };
    out.push_str(&format!("\nmode: {mode}  music: {music}"));
    if let Some(theme) = status["filter"].as_str() {
        out.push_str(&format!("  filter: {theme}"));
    }
    if let Some(err) = status["lastError"].as_str() {
        out.push_str(&format!("\nlast error: {err}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn tell_splits_friends() {
        let cli = Cli::try_parse_from([
            "dreamytales",
            "tell",
            "--character",
            "Bear",
            "--friends",
            "Owl,Fox",
            "--scene",
            "Forest",
            "--theme",
            "Bravery",
        ])
        .unwrap();
        match cli.command {
            Command::Tell { story, server } => {
                assert_eq!(story.friends, vec!["Owl", "Fox"]);
                assert_eq!(story.language, "Chinese");
                assert_eq!(server, DEFAULT_SERVER);
            }
            _ => panic!("expected tell"),
        }
    }

    #[test]
    fn status_line_shows_clock() {
        let status = json!({
            "current": { "id": "a", "title": "Moon", "mainCharacter": "Bear", "duration": 125.0 },
            "state": "playing",
            "elapsed": 61.0,
            "mode": "Shuffle",
            "backgroundMusic": true,
            "filter": null,
            "lastError": null
        });
        assert_eq!(
            describe_status(&status),
            "playing Moon  1:01 / 2:05\nmode: Shuffle  music: on"
        );
    }
}
