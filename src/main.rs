use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use clap::{Parser, Subcommand};
use http::{
    Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use tokio::net::TcpListener;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use anyhow::{Context, anyhow};

use waav_narrator::{
    ServerConfig,
    core::{
        controller::{ControllerOutcome, EngineRegistry, TtsController, VecSectionSource},
        playback::{FileSink, PlaybackEngine, SharedSettings, settings::SettingsSnapshot},
        scheduler::AudioScheduler,
        text::{Mark, Utterance},
        tts::{ProviderProfile, SynthesisClient, create_synthesis_client},
    },
    routes,
    state::AppState,
};

/// WaaV Narrator - remote text-to-speech playback and provider proxy
#[derive(Parser, Debug)]
#[command(name = "waav-narrator")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run (defaults to `serve`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the TTS proxy server
    Serve,

    /// Speak text through the playback pipeline, writing audio files
    Speak {
        /// Text to speak
        #[arg(short = 't', long = "text", conflicts_with = "file")]
        text: Option<String>,

        /// File to read; blank lines separate utterances
        #[arg(short = 'f', long = "file")]
        file: Option<PathBuf>,

        /// Treat input as SSML with <mark> elements
        #[arg(long)]
        ssml: bool,

        /// Directory receiving the numbered audio files
        #[arg(short = 'o', long = "out", default_value = "narration")]
        out: PathBuf,

        /// Provider profile id (defaults to the active provider)
        #[arg(short = 'p', long = "provider")]
        provider: Option<String>,

        /// Playback rate
        #[arg(short = 'r', long = "rate")]
        rate: Option<f32>,

        /// Voice overriding the profile default
        #[arg(short = 'v', long = "voice")]
        voice: Option<String>,
    },

    /// List the voices of a provider
    Voices {
        #[arg(short = 'p', long = "provider")]
        provider: Option<String>,

        /// Only voices speaking this language
        #[arg(short = 'l', long = "lang")]
        lang: Option<String>,
    },

    /// Probe a provider
    Health {
        #[arg(short = 'p', long = "provider")]
        provider: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration from file or environment
    let config = if let Some(config_path) = &cli.config {
        info!(path = %config_path.display(), "Loading configuration");
        ServerConfig::from_file(config_path)?
    } else {
        ServerConfig::from_env()?
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Speak {
            text,
            file,
            ssml,
            out,
            provider,
            rate,
            voice,
        } => {
            let input = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, None) => anyhow::bail!("Either --text or --file is required"),
            };
            speak(config, input, ssml, out, provider, rate, voice).await
        }
        Commands::Voices { provider, lang } => {
            let (profile, client) = provider_client(&config, provider.as_deref())?;
            let voices = client.list_voices(&profile, lang.as_deref()).await?;
            for voice in voices {
                println!(
                    "{}\t{}\t{}",
                    voice.id,
                    voice.name,
                    voice.lang.as_deref().unwrap_or("-")
                );
            }
            Ok(())
        }
        Commands::Health { provider } => {
            let (profile, client) = provider_client(&config, provider.as_deref())?;
            let report = client.health(&profile).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn provider_client(
    config: &ServerConfig,
    provider: Option<&str>,
) -> anyhow::Result<(ProviderProfile, Arc<dyn SynthesisClient>)> {
    let profile = config.provider_registry().resolve(provider)?.clone();
    let client = create_synthesis_client(profile.provider_type, config.voice_cache_ttl())?;
    Ok((profile, client))
}

/// Splits `input` into utterances at blank lines.
fn utterances(input: &str, ssml: bool, lang: &str) -> Vec<Utterance> {
    input
        .split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(|block| {
            if ssml {
                Utterance::from_ssml(block, lang)
            } else {
                Utterance::from_plain_text(block, lang)
            }
        })
        .filter(|utterance| !utterance.is_empty())
        .collect()
}

async fn speak(
    config: ServerConfig,
    input: String,
    ssml: bool,
    out: PathBuf,
    provider: Option<String>,
    rate: Option<f32>,
    voice: Option<String>,
) -> anyhow::Result<()> {
    let (profile, client) = provider_client(&config, provider.as_deref())?;
    tokio::fs::create_dir_all(&out)
        .await
        .with_context(|| format!("Failed to create {}", out.display()))?;

    let settings = Arc::new(SharedSettings::new(SettingsSnapshot {
        provider: Some(profile),
        rate: rate.unwrap_or(config.playback.rate),
        voice,
    }));
    let sink = Arc::new(FileSink::new(&out));
    let scheduler = Arc::new(AudioScheduler::new(client, config.scheduler_config()));
    let engine = PlaybackEngine::new(
        scheduler,
        sink.clone(),
        settings.clone(),
        config.runtime_capabilities(),
    )
    .with_dispatcher(Arc::new(|mark: &Mark| {
        info!(mark = %mark.name, offset = mark.offset, "Speaking");
    }));

    let registry = EngineRegistry::new().with_engine(Arc::new(engine));
    let controller = TtsController::new(registry, settings);
    let source = VecSectionSource::new(utterances(&input, ssml, "en"));
    info!(utterances = source.len(), out = %out.display(), "Starting narration");

    let outcome = tokio::select! {
        result = controller.play(&source) => result?,
        _ = tokio::signal::ctrl_c() => {
            controller.stop();
            ControllerOutcome::Halted(controller.state())
        }
    };

    info!(?outcome, files = sink.written().len(), "Narration finished");
    for path in sink.written() {
        println!("{}", path.display());
    }
    Ok(())
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let address = config.address();
    let rate_limit_rps = config.rate_limit_requests_per_second;
    let rate_limit_burst = config.rate_limit_burst_size;
    let cors_origins = config.cors_allowed_origins.clone();
    info!(
        providers = config.providers.len(),
        active = config.active_provider.as_deref().unwrap_or("-"),
        "Starting server on {address}"
    );

    // Create application state
    let app_state = AppState::new(config)?;

    // Configure rate limiting (disabled when rate >= 100000 for performance testing)
    let governor_layer = if rate_limit_rps < 100000 {
        let governor_config = GovernorConfigBuilder::default()
            .per_second(rate_limit_rps as u64)
            .burst_size(rate_limit_burst)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow!("Failed to build rate limiter config"))?;
        Some(GovernorLayer::new(governor_config))
    } else {
        info!("Rate limiting disabled (rate >= 100000/s)");
        None
    };

    // Configure CORS
    let cors_layer = if let Some(ref origins) = cors_origins {
        if origins == "*" {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([AUTHORIZATION, CONTENT_TYPE])
                .allow_credentials(false)
        } else {
            // Parse comma-separated origins
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([AUTHORIZATION, CONTENT_TYPE])
                .allow_credentials(true)
        }
    } else {
        info!(
            "CORS not configured, defaulting to same-origin only. \
             Set CORS_ALLOWED_ORIGINS to enable cross-origin access."
        );
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([AUTHORIZATION, CONTENT_TYPE])
            .allow_credentials(false)
    };

    // Security headers
    let security_headers = tower::ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_CONTENT_TYPE_OPTIONS,
            http::HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_FRAME_OPTIONS,
            http::HeaderValue::from_static("DENY"),
        ));

    let app = routes::create_app(app_state)
        .layer(cors_layer)
        .layer(tower::util::option_layer(governor_layer))
        .layer(security_headers);

    // Parse socket address
    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    info!("Server listening on http://{}", socket_addr);

    let listener = TcpListener::bind(&socket_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
