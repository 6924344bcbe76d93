//! `dashboard-session`: drive the session engine from a terminal.
//!
//! Every invocation is one page load. Cookies and `localStorage` persist in
//! `~/.dashboard-session/` between invocations the way a browser profile
//! persists between reloads; the query-parameter channel is passed in with
//! `--query` and the resulting query string is printed back.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashboard_session::codec::{self, Transport};
use dashboard_session::integrations::SupabaseGateway;
use dashboard_session::store::{FileCookieJar, QueryParams, SimulatedBrowser};
use dashboard_session::{
    logging, BrowserChannels, PageState, RerenderRequests, SessionConfig, SessionServices,
    SignupForm, SignupOutcome, StoreKind, TokenPair,
};

/// Upper bound on renders spent waiting for an asynchronous store.
const MAX_RENDERS: usize = 8;

/// Session persistence for re-rendered dashboards
#[derive(Parser, Debug)]
#[command(name = "dashboard-session")]
#[command(about = "Log in, restore and inspect persisted dashboard sessions", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.dashboard-session/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured session store (cookie, query, local_storage, none)
    #[arg(short, long, global = true)]
    store: Option<StoreKind>,

    /// Query string of the simulated page URL, e.g. "s=YWJj..."
    #[arg(short, long, global = true, default_value = "")]
    query: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in and persist the session
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },

    /// Create an account
    Signup {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,

        /// Password confirmation (defaults to --password)
        #[arg(long)]
        confirm: Option<String>,
    },

    /// Sign out and clear the stored session
    Logout,

    /// Restore the stored session and report the outcome
    Status,

    /// Encode a token pair for a channel
    Encode {
        access_token: String,
        refresh_token: String,

        #[arg(short, long, value_enum, default_value_t = TransportArg::Json)]
        transport: TransportArg,
    },

    /// Decode a stored payload
    Decode {
        payload: String,

        #[arg(short, long, value_enum, default_value_t = TransportArg::Json)]
        transport: TransportArg,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TransportArg {
    Json,
    Url,
}

impl From<TransportArg> for Transport {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Json => Transport::Json,
            TransportArg::Url => Transport::UrlSafe,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = SessionConfig::load_or_default(cli.config.as_deref())?;
    if let Some(store) = cli.store {
        config.store = store;
    }
    logging::init(&config.log_level);

    match cli.command {
        Commands::Encode {
            access_token,
            refresh_token,
            transport,
        } => {
            let tokens = TokenPair::new(access_token, refresh_token);
            println!("{}", codec::encode(&tokens, transport.into())?);
            Ok(())
        }
        Commands::Decode { payload, transport } => {
            let tokens = codec::decode(&payload, transport.into())
                .context("Payload is not a valid session")?;
            println!("access_token:  {}", tokens.access_token());
            println!("refresh_token: {}", tokens.refresh_token());
            println!("fingerprint:   {}", tokens.fingerprint());
            Ok(())
        }
        command => run_page_load(&config, &cli.query, command).await,
    }
}

/// One simulated page load: restore, then run `command`.
async fn run_page_load(config: &SessionConfig, query: &str, command: Commands) -> Result<()> {
    let state_dir = SessionConfig::app_dir().context("Could not determine home directory")?;
    let storage_path = state_dir.join("local_storage.json");

    let browser = Arc::new(SimulatedBrowser::with_local_storage(load_local_storage(
        &storage_path,
    )?));
    let channels = BrowserChannels {
        cookies: Arc::new(FileCookieJar::new(state_dir.join("cookies.json"))),
        query: QueryParams::parse(query),
        scripts: browser.clone(),
    };

    let supabase = config.supabase.clone().context(
        "Supabase is not configured: set SUPABASE_URL and SUPABASE_KEY or add [supabase] to the config",
    )?;
    let gateway = Arc::new(SupabaseGateway::new(supabase)?);
    let rerender = Arc::new(RerenderRequests::new());
    let services = SessionServices::from_config(config, &channels, gateway, rerender.clone());

    let mut page = PageState::new();
    for _ in 0..MAX_RENDERS {
        services.begin_render(&mut page).check_stored_session().await;
        browser.next_render();
        if !rerender.take() {
            break;
        }
    }

    let mut session = services.begin_render(&mut page);
    match command {
        Commands::Login { email, password } => {
            let record = session.login(&email, &password).await?;
            println!("Logged in as {}", record.email);
        }
        Commands::Signup {
            email,
            password,
            confirm,
        } => {
            let confirm = confirm.unwrap_or_else(|| password.clone());
            let form = SignupForm::new(email, password, confirm);
            match session.signup_with_form(&form).await? {
                SignupOutcome::SignedIn(record) => {
                    if session.take_just_signed_up() {
                        println!("Welcome, {}! Your account is ready.", record.email);
                    }
                }
                SignupOutcome::VerificationPending { email } => {
                    println!("Account created. Check {email} for a confirmation link, then log in.");
                }
            }
        }
        Commands::Logout => {
            session.logout().await;
            println!("Logged out");
        }
        Commands::Status => {
            println!("store:    {}", services.store().kind());
            println!("restore:  {}", session.status().label());
            match session.current_session() {
                Some(record) => {
                    println!("user:     {} ({})", record.email, record.user_id);
                    println!("token:    {}", record.tokens.fingerprint());
                }
                None => println!("user:     (not signed in)"),
            }
        }
        Commands::Encode { .. } | Commands::Decode { .. } => {}
    }

    // Flush scripts emitted by the final render.
    browser.next_render();
    save_local_storage(&storage_path, &browser.local_storage())?;
    if config.store == StoreKind::Query {
        println!("query:    ?{}", channels.query.to_query_string());
    }
    Ok(())
}

fn load_local_storage(path: &Path) -> Result<HashMap<String, String>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents)
            .with_context(|| format!("Corrupt local storage file {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

fn save_local_storage(path: &Path, items: &HashMap<String, String>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(items)?)
        .with_context(|| format!("Failed to write {}", path.display()))
}
