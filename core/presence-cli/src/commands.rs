use presence_core::{
    ConfigError, Connector, FileSettings, IpcConnector, Link, MetadataProvider, NoMedia,
    PlatformTransport, PresenceError, Reporter, Session, Settings, SettingsProvider, Transport,
};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::now_playing::NowPlayingFile;

const FIRST_TICK: Duration = Duration::from_secs(1);
const TICK_INTERVAL: Duration = Duration::from_secs(2);
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Presence(#[from] PresenceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to install signal handler: {0}")]
    Signal(#[source] io::Error),

    #[error("Failed to encode settings: {0}")]
    Encode(#[from] serde_json::Error),
}

pub fn run(
    settings_path: Option<PathBuf>,
    metadata_file: Option<PathBuf>,
    client_id: Option<String>,
) -> Result<(), CliError> {
    let settings = with_client_id(settings_source(settings_path).load_settings(), client_id);
    if !settings.enabled {
        tracing::info!("Presence is disabled in settings; exiting");
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    register_shutdown(&shutdown)?;

    let metadata: Box<dyn MetadataProvider> = match metadata_file {
        Some(path) => {
            tracing::info!(path = %path.display(), "Reading now-playing metadata");
            Box::new(NowPlayingFile::new(path))
        }
        None => Box::new(NoMedia),
    };

    let mut session = Session::with_platform_transport(settings, metadata);
    session.request_update();
    session.start()?;

    let mut next_tick = Instant::now() + FIRST_TICK;
    while !shutdown.load(Ordering::Relaxed) {
        if Instant::now() >= next_tick {
            session.request_update();
            next_tick += TICK_INTERVAL;
        }
        thread::sleep(SHUTDOWN_POLL);
    }

    tracing::info!(state = %session.state(), "Shutting down presence session");
    session.stop()?;
    Ok(())
}

pub fn clear(client_id: Option<String>) -> Result<(), CliError> {
    let settings = with_client_id(FileSettings::default_location().load_settings(), client_id);

    let mut connector = IpcConnector::new(PlatformTransport::default(), Reporter::tracing());
    let mut link = connector.connect(settings.app_id)?;
    let cleared = link.clear_activity();
    link.close();
    cleared?;

    println!("Presence cleared");
    Ok(())
}

pub fn endpoints() {
    for endpoint in PlatformTransport::default().candidates() {
        let status = if endpoint.address.exists() {
            "present"
        } else {
            "-"
        };
        println!("{:>2}  {:<8}  {}", endpoint.index, status, endpoint);
    }
}

#[derive(Serialize)]
struct ResolvedConfig<'a> {
    path: Option<String>,
    #[serde(flatten)]
    settings: &'a Settings,
}

pub fn config(settings_path: Option<PathBuf>) -> Result<(), CliError> {
    let source = settings_source(settings_path);
    let settings = source.try_load()?;
    let resolved = ResolvedConfig {
        path: source.path().map(|path| path.display().to_string()),
        settings: &settings,
    };
    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(())
}

fn settings_source(path: Option<PathBuf>) -> FileSettings {
    path.map(FileSettings::new)
        .unwrap_or_else(FileSettings::default_location)
}

fn with_client_id(mut settings: Settings, client_id: Option<String>) -> Settings {
    if let Some(raw) = client_id {
        settings.app_id = Settings::parse_app_id(&raw);
    }
    settings
}

fn register_shutdown(flag: &Arc<AtomicBool>) -> Result<(), CliError> {
    use signal_hook::consts::signal::{SIGINT, SIGTERM};
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(flag)).map_err(CliError::Signal)?;
    }
    Ok(())
}
