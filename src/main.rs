//!
//! timeclock binary
//! ----------------
//! Small command-line front end over the client library: signs in, shows the
//! session, lists users and stats, and clocks in or out. The session is kept in
//! a JSON file between runs, so `login` followed by `status` behaves like a page
//! reload.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use timeclock::api::ApiGateway;
use timeclock::attendance::AttendanceClient;
use timeclock::config::AppConfig;
use timeclock::identity::{RouteGuard, RouteTable, SessionManager};
use timeclock::storage::FileStore;

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} <command> [args]\n\nCommands:\n  status                     show the restored session and where `/` leads\n  login <email> <password>   sign in and persist the session\n  logout                     clear the persisted session\n  users                      list users (GET /users)\n  stats                      dashboard stats and own hours\n  clock-in                   start today's working time\n  clock-out                  end today's working time\n\nEnvironment:\n  TIMECLOCK_CONFIG              JSON config file (optional)\n  TIMECLOCK_API_URL             API base URL (default http://localhost:4000/api)\n  TIMECLOCK_FALLBACK            strict | permissive\n  TIMECLOCK_PROBE               probe the backend before permissive requests\n  TIMECLOCK_REQUEST_TIMEOUT_MS  per-request timeout\n  TIMECLOCK_REFRESH_GRACE_SECS  refresh this long before expiry\n  TIMECLOCK_SESSION_FILE        session file (default .timeclock/session.json)\n  RUST_LOG                      log filter (default info)"
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("log filter")?;
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let mut args: Vec<String> = env::args().collect();
    let program = args.remove(0);
    let Some(command) = args.first().cloned() else {
        print_usage(&program);
        std::process::exit(2);
    };

    let config_path = env::var("TIMECLOCK_CONFIG").ok().map(PathBuf::from);
    let cfg = AppConfig::load(config_path.as_deref())?;
    let session_file = cfg
        .session_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(".timeclock").join("session.json"));
    info!(
        target: "timeclock",
        "timeclock starting: api='{}', fallback={:?}, session_file='{}'",
        cfg.api_base_url,
        cfg.fallback,
        session_file.display()
    );

    let gateway = Arc::new(ApiGateway::from_config(&cfg)?);
    let store = Arc::new(FileStore::open(&session_file)?);
    let session = SessionManager::from_config(&cfg, gateway.clone(), store);
    session.boot().await;

    let outcome = run(&command, &args[1..], &session, gateway).await;
    session.shutdown();
    outcome
}

async fn run(command: &str, rest: &[String], session: &SessionManager, gateway: Arc<ApiGateway>) -> Result<()> {
    match command {
        "status" => {
            let snap = session.snapshot();
            println!("{}", serde_json::to_string_pretty(&snap)?);
            let guard = RouteGuard::new(session.clone());
            let decision = guard.navigate(&RouteTable::standard(), "/").await;
            let landing = decision.redirect_path().unwrap_or_else(|| "/".to_string());
            println!("{} ({}) -> {}", session.display_name(), session.role_display(), landing);
            Ok(())
        }
        "login" => {
            let [email, password] = rest else {
                return Err(anyhow!("login requires <email> <password>"));
            };
            let user = session.login(email, password).await?;
            println!("signed in as {} ({})", user.name, user.role.display_name());
            Ok(())
        }
        "logout" => {
            session.logout();
            println!("signed out");
            Ok(())
        }
        "users" => {
            require_session(session)?;
            let resp = gateway.get_users(&[]).await?;
            println!("{}", serde_json::to_string_pretty(resp.json())?);
            if resp.is_fallback() {
                eprintln!("(fallback data: backend unavailable)");
            }
            Ok(())
        }
        "stats" => {
            require_session(session)?;
            let resp = gateway.dashboard_stats().await?;
            println!("{}", serde_json::to_string_pretty(resp.json())?);
            let attendance = AttendanceClient::new(gateway, session.clone());
            attendance.refresh_working_times().await;
            println!(
                "week: {:.1}h  month: {:.1}h  recent days: {}",
                attendance.weekly_hours(),
                attendance.monthly_hours(),
                attendance.recent_logs().len()
            );
            Ok(())
        }
        "clock-in" | "clock-out" => {
            require_session(session)?;
            let attendance = AttendanceClient::new(gateway, session.clone());
            attendance.load_users().await?;
            attendance.refresh_working_times().await;
            let resp = if command == "clock-in" {
                attendance.clock_in(true).await?
            } else {
                attendance.clock_out().await?
            };
            println!("{} recorded ({:?})", command, resp.source);
            if let Some(log) = attendance.todays_log() {
                println!("{}", serde_json::to_string_pretty(&log)?);
            }
            Ok(())
        }
        other => Err(anyhow!("unknown command '{}'", other)),
    }
}

fn require_session(session: &SessionManager) -> Result<()> {
    if session.snapshot().is_authenticated {
        Ok(())
    } else {
        Err(anyhow!("not signed in; run `login <email> <password>` first"))
    }
}
