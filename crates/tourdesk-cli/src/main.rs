//! tourdesk - command-line access to the tourism vendor dashboard.
//!
//! Signs vendors and admins in, keeps the session alive, and fetches
//! dashboard data with the session's bearer token.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{Local, TimeZone};
use tourdesk_core::{
    ApiClient, AuthError, CacheManager, Config, FileTokenStore, KeyringTokenStore, Role,
    SessionEvent, SessionManager, SessionOptions, TokenBackend, TokenStore,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "\
Usage: tourdesk <command>

Commands:
  login [--remember]     Sign in (email/password from TOURDESK_EMAIL/TOURDESK_PASSWORD or prompt)
  logout                 Sign out and clear cached data
  status                 Show the signed-in account and session expiry
  refresh                Renew the session token
  get <path> [--cached]  Fetch an API path with the session token";

/// Paths under this prefix need an admin account
const ADMIN_PATH_PREFIX: &str = "/api/admin";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Login { remember_me: bool },
    Logout,
    Status,
    Refresh,
    Get { path: String, cached: bool },
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let Some(name) = args.first() else {
            bail!("No command given\n\n{}", USAGE);
        };
        let rest = &args[1..];
        let flag = |flag: &str| rest.iter().any(|a| a == flag);

        let command = match name.as_str() {
            "login" => Command::Login {
                remember_me: flag("--remember"),
            },
            "logout" => Command::Logout,
            "status" => Command::Status,
            "refresh" => Command::Refresh,
            "get" => match rest.iter().find(|a| !a.starts_with("--")) {
                Some(path) => Command::Get {
                    path: path.clone(),
                    cached: flag("--cached"),
                },
                None => bail!("get needs an API path, e.g. /api/bookings"),
            },
            other => bail!("Unknown command: {}\n\n{}", other, USAGE),
        };
        Ok(command)
    }
}

struct Context {
    config: Config,
    api: ApiClient,
    cache: Arc<CacheManager>,
    session: SessionManager,
}

impl Context {
    fn open() -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };

        let cache_dir = config.cache_dir().unwrap_or_else(|_| PathBuf::from("./cache"));
        debug!(?cache_dir, backend = ?config.token_backend, "Cache directory configured");

        let store: Arc<dyn TokenStore> = match config.token_backend {
            TokenBackend::File => Arc::new(FileTokenStore::new(&cache_dir)),
            TokenBackend::Keyring => Arc::new(KeyringTokenStore::new()),
        };

        let api = ApiClient::new(&config.api_base_url(), config.request_timeout())?;
        let responses_dir = config
            .responses_dir()
            .unwrap_or_else(|_| PathBuf::from("./cache/responses"));
        let cache = Arc::new(CacheManager::new(responses_dir)?);

        let session = SessionManager::start(
            store,
            Arc::new(api.clone()),
            SessionOptions::default().with_cache(cache.clone()),
        );

        Ok(Self {
            config,
            api,
            cache,
            session,
        })
    }
}

/// Print session notices as they happen. Login failures are reported by the
/// `login` command itself.
fn spawn_notices(session: &SessionManager) {
    let mut events = session.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if event == SessionEvent::SessionExpired {
                eprintln!("Session expired. Please log in again.");
            }
        }
    });
}

fn prompt_line(label: &str) -> Result<String> {
    eprint!("{}", label);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn login(ctx: &mut Context, remember_me: bool) -> Result<()> {
    let email = std::env::var("TOURDESK_EMAIL")
        .ok()
        .or_else(|| ctx.config.last_email.clone());
    let email = match email {
        Some(email) if !email.is_empty() => email,
        _ => prompt_line("Email: ")?,
    };
    let password = match std::env::var("TOURDESK_PASSWORD") {
        Ok(password) if !password.is_empty() => password,
        _ => rpassword::prompt_password(format!("Password for {}: ", email))?,
    };

    match ctx.session.login(&email, &password, remember_me).await {
        Ok(user) => {
            ctx.config.last_email = Some(email);
            if let Err(e) = ctx.config.save() {
                warn!(error = %e, "Failed to save config");
            }
            println!(
                "Signed in as {} ({}, {})",
                user.full_name,
                user.display_name(),
                user.role
            );
            Ok(())
        }
        Err(e) => bail!("Login failed: {}", e.user_message()),
    }
}

fn status(ctx: &Context) {
    let Some(user) = ctx.session.current_user() else {
        println!("Not logged in");
        return;
    };

    println!("{} <{}>", user.full_name, user.email);
    println!("  Account:  {} (#{})", user.username, user.id);
    if let Some(ref business) = user.business_name {
        let kind = user.business_type.as_deref().unwrap_or("business");
        println!("  Business: {} [{}]", business, kind);
    }
    println!("  Role:     {}", user.role);
    if let Some(expires_at) = ctx.session.expires_at() {
        if let Some(when) = Local.timestamp_millis_opt(expires_at).single() {
            println!("  Expires:  {}", when.format("%b %d, %Y %H:%M"));
        }
    }
}

async fn get(ctx: &Context, path: &str, cached: bool) -> Result<()> {
    if path.starts_with(ADMIN_PATH_PREFIX) {
        ctx.session.require_role(Role::Admin)?;
    }

    let key = CacheManager::key_for_path(path);
    if cached {
        match ctx.cache.load::<serde_json::Value>(&key)? {
            Some(entry) => {
                eprintln!("(cached {})", entry.age_display());
                println!("{}", serde_json::to_string_pretty(&entry.data)?);
                return Ok(());
            }
            None => debug!(key = %key, "Nothing cached, fetching"),
        }
    }

    let token = ctx.session.bearer_token().ok_or(AuthError::NotAuthenticated)?;
    let value: serde_json::Value = ctx.api.with_token(token).get(path).await?;
    if let Err(e) = ctx.cache.save(&key, &value) {
        warn!(error = %e, "Failed to cache response");
    }
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    let mut ctx = Context::open()?;
    spawn_notices(&ctx.session);

    let result = match command {
        Command::Login { remember_me } => login(&mut ctx, remember_me).await,
        Command::Logout => {
            ctx.session.logout().await;
            println!("Logged out");
            Ok(())
        }
        Command::Status => {
            status(&ctx);
            Ok(())
        }
        Command::Refresh => {
            if ctx.session.refresh_session().await {
                println!("Session renewed");
                Ok(())
            } else {
                Err(anyhow::anyhow!("Could not renew the session. Please log in again."))
            }
        }
        Command::Get { ref path, cached } => get(&ctx, path, cached).await,
    };

    ctx.session.shutdown();
    info!(command = ?command, ok = result.is_ok(), "tourdesk finished");
    result
}
