use std::{error::Error, path::PathBuf, process, sync::Arc, time::Duration};

use clap::{command, Parser, Subcommand, ValueHint};
use log::{debug, error, info, warn, LevelFilter};

use playdeck::{
    authorize::Authorization,
    config::Config,
    credential::FileStore,
    engine::Attached,
    gate::Gate,
    http,
    intermediary::HttpIntermediary,
    library::Library,
    player::PlayerState,
    remote::{Controller, State, Timings},
    session::Session,
    tokens::TokenManager,
    webapi::{HttpWebApi, WebApi},
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Configuration file read when none is given.
const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, PartialEq, Eq, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    ///
    /// [default: config.toml, when present]
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Credentials file
    ///
    /// Keep this file private: it grants access to your account.
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    credentials_file: Option<PathBuf>,

    /// Application client id registered with the provider
    #[arg(long, env = "PLAYDECK_CLIENT_ID")]
    client_id: Option<String>,

    /// Device to control
    ///
    /// [default: the active device, or else the first available one]
    #[arg(short, long, env = "PLAYDECK_DEVICE")]
    device: Option<String>,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
enum Command {
    /// Print the URL to authorize playdeck in a browser
    Authorize,

    /// Log in with the code and state from the authorization redirect
    Login {
        #[arg(long)]
        code: String,

        #[arg(long)]
        state: String,
    },

    /// Forget the stored credential
    Logout,

    /// Show the account and what is playing
    Status,

    /// List available devices
    Devices,

    /// Resume playback, or play a track, album, playlist or artist
    Play { uri: Option<String> },

    Pause,

    /// Pause when playing, resume otherwise
    Toggle,

    Next,

    Previous,

    /// Seek to a position in seconds
    Seek { seconds: u32 },

    /// Set the volume in percent
    Volume {
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        percent: u8,
    },

    /// Search the catalogue
    Search {
        query: String,

        /// Search artists instead of tracks
        #[arg(long, default_value_t = false)]
        artists: bool,
    },

    /// List your playlists
    Playlists {
        #[arg(long, default_value_t = 50)]
        limit: u8,
    },
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(args: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if args.quiet || args.verbose > 0 {
        let level = match args.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

/// Reads the configuration and applies command line overrides.
///
/// # Errors
///
/// Returns an error when an explicitly given configuration file cannot be
/// read, or when any configuration file is invalid.
fn load_config(args: &Args) -> Result<Config, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None if std::path::Path::new(DEFAULT_CONFIG_FILE).exists() => {
            Config::from_file(DEFAULT_CONFIG_FILE)?
        }
        None => {
            debug!("no {DEFAULT_CONFIG_FILE}, using defaults");
            Config::default()
        }
    };

    if let Some(credentials_file) = &args.credentials_file {
        config.credentials_file.clone_from(credentials_file);
    }
    if let Some(client_id) = &args.client_id {
        config.client_id.clone_from(client_id);
    }
    if args.device.is_some() {
        config.device_id.clone_from(&args.device);
    }

    Ok(config)
}

/// The authenticated provider stack.
struct Stack {
    gate: Arc<Gate>,
    library: Library,
}

impl Stack {
    fn new(config: &Config) -> Result<Self, Box<dyn Error>> {
        let client = Arc::new(http::Client::new(config)?);
        let store = Arc::new(FileStore::new(&config.credentials_file));
        let intermediary = Arc::new(HttpIntermediary::new(config, Arc::clone(&client))?);
        let tokens = Arc::new(TokenManager::new(store, intermediary));
        let api = Arc::new(HttpWebApi::new(config, client));
        let gate = Arc::new(Gate::new(tokens, api, Arc::new(Session::new())));
        let library = Library::new(Arc::clone(&gate));

        Ok(Self { gate, library })
    }

    /// Connects the session by reading the profile.
    async fn connect(&self) -> Result<(), Box<dyn Error>> {
        if !self.gate.tokens().has_token() {
            return Err("not logged in: run `authorize` and `login` first".into());
        }

        let user = self.library.profile().await?;
        info!(
            "logged in as {}",
            user.display_name.as_deref().unwrap_or(&user.id)
        );
        if user.product.as_deref().is_some_and(|product| product != "premium") {
            warn!("playback control requires a premium subscription");
        }

        Ok(())
    }

    /// Picks the configured device, else the active one, else the first
    /// controllable one.
    async fn pick_device(&self, config: &Config) -> Result<String, Box<dyn Error>> {
        if let Some(device_id) = &config.device_id {
            return Ok(device_id.clone());
        }

        let devices = self
            .gate
            .call(|api, token| async move { api.devices(&token).await })
            .await?
            .devices;
        let usable = || devices.iter().filter(|device| !device.is_restricted);

        usable()
            .find(|device| device.is_active)
            .or_else(|| usable().next())
            .and_then(|device| {
                info!("using device {}", device.name);
                device.id.clone()
            })
            .ok_or_else(|| "no device available: open a player on any device first".into())
    }

    /// Attaches a controller to `device_id` and waits for it to become
    /// active.
    async fn attach(
        &self,
        device_id: String,
        config: &Config,
    ) -> Result<Controller, Box<dyn Error>> {
        let (engine, mut events) = Attached::new(device_id);
        let controller = Controller::new(
            Arc::clone(&self.gate),
            Box::new(engine),
            Timings::from(config),
        );

        controller.start().await?;
        while let Ok(event) = events.try_recv() {
            controller.dispatch(event).await;
        }

        match controller.state() {
            State::Active => Ok(controller),
            state => {
                let reason = controller
                    .last_error()
                    .map_or_else(|| state.to_string(), |e| e.to_string());
                Err(format!("device not active: {reason}").into())
            }
        }
    }
}

fn print_player(player: &PlayerState) {
    match &player.current_track {
        Some(track) => {
            let status = if player.is_playing { "playing" } else { "paused" };
            println!(
                "{status}: {track} [{}/{}s]",
                player.position.as_secs(),
                player.duration().as_secs()
            );
        }
        None => println!("nothing playing"),
    }
}

/// Runs one command.
///
/// # Errors
///
/// This function returns an error when the command fails. This could be due
/// to a missing credential or an unrecoverable network error.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args)?;

    match args.command {
        Command::Authorize => {
            let authorization = Authorization::new(&config)?;
            authorization.save(&config.authorization_state_file())?;
            println!("Open this URL in your browser:\n\n{}\n", authorization.url);
            println!(
                "Then run `login --code <code> --state <state>` with the values from the redirect."
            );
            return Ok(());
        }
        Command::Login {
            ref code,
            ref state,
        } => {
            Authorization::verify_saved(&config.authorization_state_file(), state)?;
            let stack = Stack::new(&config)?;
            stack.gate.tokens().begin_session(code).await?;
            return stack.connect().await;
        }
        Command::Logout => {
            let stack = Stack::new(&config)?;
            stack.gate.tokens().end_session()?;
            return Ok(());
        }
        _ => {}
    }

    let stack = Stack::new(&config)?;
    stack.connect().await?;

    match args.command {
        Command::Status => {
            let state = stack
                .gate
                .call(|api, token| async move { api.playback_state(&token).await })
                .await?;
            if let Some(device) = state.as_ref().and_then(|state| state.device.as_ref()) {
                println!("device: {}", device.name);
            }
            print_player(&state.map(PlayerState::from).unwrap_or_default());
        }

        Command::Devices => {
            let devices = stack
                .gate
                .call(|api, token| async move { api.devices(&token).await })
                .await?;
            for device in devices.devices {
                let marker = if device.is_active { '*' } else { ' ' };
                println!(
                    "{marker} {} ({}) {}",
                    device.name,
                    device.kind,
                    device.id.as_deref().unwrap_or("restricted")
                );
            }
        }

        Command::Search {
            ref query,
            artists: false,
        } => {
            for track in stack.library.search_tracks(query).await? {
                println!("{} - {}  {}", track.artist_names(), track.name, track.uri);
            }
        }

        Command::Search {
            ref query,
            artists: true,
        } => {
            for artist in stack.library.search_artists(query).await? {
                println!("{}  {}", artist.name, artist.uri);
            }
        }

        Command::Playlists { limit } => {
            for playlist in stack.library.playlists(limit).await? {
                let tracks = playlist.tracks.map_or(0, |tracks| tracks.total);
                println!("{} ({tracks} tracks)  {}", playlist.name, playlist.uri);
            }
        }

        ref command => {
            let device_id = stack.pick_device(&config).await?;
            let controller = stack.attach(device_id, &config).await?;

            match command {
                Command::Play { uri: Some(uri) } => controller.play_context(uri).await?,
                Command::Play { uri: None } => controller.play().await?,
                Command::Pause => controller.pause().await?,
                Command::Toggle => controller.toggle_play().await?,
                Command::Next => controller.skip_next().await?,
                Command::Previous => controller.skip_previous().await?,
                Command::Seek { seconds } => {
                    controller
                        .seek(Duration::from_secs(u64::from(*seconds)))
                        .await?;
                }
                Command::Volume { percent } => controller.set_volume(*percent).await?,
                _ => unreachable!("handled above"),
            }

            print_player(&controller.player_state());
            controller.disconnect();
        }
    }

    Ok(())
}

/// Main entry point of the application.
///
/// This function initializes the logger facade, parses the command line
/// arguments, and runs the command until it completes or is interrupted.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();
    info!("starting {name}/{version}; {BUILD_PROFILE}");

    let result = tokio::select! {
        // Prioritize shutdown signals.
        biased;

        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            Ok(())
        }

        result = run(args) => result,
    };

    if let Err(e) = result {
        error!("{e}");
        process::exit(1);
    }
}
