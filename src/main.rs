//! sudagureum - persistent IRC gateway with a WebSocket control surface.

mod archive;
mod auth;
mod config;
mod db;
mod error;
mod http;
mod irc;
mod net;
mod orchestrator;
mod telemetry;
mod ws;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sqlx::Row;
use tracing::{error, info};

use crate::archive::Archive;
use crate::auth::AuthAdapter;
use crate::config::{Configure, GatewayConfig};
use crate::http::HttpServer;
use crate::irc::IrcClientPool;
use crate::orchestrator::{User, UserEntry, UserServerInfo};
use crate::telemetry::LogFormat;
use crate::ws::MethodTable;

#[derive(Debug, Parser)]
#[command(name = "sudagureum", version, about = "Persistent IRC gateway with a WebSocket control surface")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "config.conf")]
    config: PathBuf,

    /// Fork into the background after startup (unix only).
    #[cfg(not(windows))]
    #[arg(short, long)]
    daemon: bool,

    /// Log output format.
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: CliLogFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliLogFormat {
    Pretty,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(value: CliLogFormat) -> Self {
        match value {
            CliLogFormat::Pretty => LogFormat::Pretty,
            CliLogFormat::Json => LogFormat::Json,
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.log_format.into());

    #[cfg(not(windows))]
    if cli.daemon {
        daemonize::Daemonize::new().start()?;
    }

    let configure = Configure::load(&cli.config)?;
    let gateway_config = GatewayConfig::from_configure(&configure)?;

    info!(data_path = %gateway_config.data_path.display(), "starting sudagureum");

    let archive_pool = db::open_pool(&gateway_config.archive_db_path()).await?;
    let archive = Arc::new(Archive::new(archive_pool));
    archive.ensure_schema().await?;

    let user_pool = db::open_pool(&gateway_config.user_db_path()).await?;
    let auth = Arc::new(AuthAdapter::new(user_pool.clone()));
    auth.ensure_schema().await?;

    let irc_close_timeout = Duration::from_secs(gateway_config.irc_close_timeout_sec);
    let irc_pool = IrcClientPool::new();
    irc_pool.spawn_shutdown_handler();

    let entries = load_user_entries(&user_pool).await?;
    info!(users = entries.len(), "loaded configured users");
    for entry in entries {
        User::spawn(entry, irc_pool.clone(), archive.clone(), irc_close_timeout).await;
    }

    let methods = MethodTable::new();
    let routes: HashMap<&'static str, http::RouteHandler> = HashMap::new();
    let port = gateway_config.http_server_port;
    let http_server = HttpServer::bind(port, &gateway_config, routes, methods).await?;

    info!(port, "http/websocket server ready");
    http_server.serve().await;

    Ok(())
}

/// Load every user's server list from `User.db`'s `User`/`UserServer` tables.
async fn load_user_entries(pool: &sqlx::SqlitePool) -> anyhow::Result<Vec<UserEntry>> {
    let users = sqlx::query("SELECT userIdx, userId FROM User").fetch_all(pool).await?;

    let mut entries = Vec::with_capacity(users.len());
    for user in users {
        let user_idx: i64 = user.get("userIdx");
        let user_id: String = user.get("userId");

        let servers = sqlx::query("SELECT serverName, host, port FROM UserServer WHERE userIdx = ?")
            .bind(user_idx)
            .fetch_all(pool)
            .await?;

        let servers = servers
            .into_iter()
            .map(|row| {
                let port: i64 = row.get("port");
                UserServerInfo {
                    name: row.get("serverName"),
                    host: row.get("host"),
                    port: port as u16,
                    encoding: "UTF-8".to_string(),
                    nicknames: vec![user_id.clone()],
                    ssl: false,
                    channels: Vec::new(),
                }
            })
            .collect();

        entries.push(UserEntry { user_id, servers });
    }

    if entries.is_empty() {
        error!("no users configured in User.db; the gateway will accept connections but relay nothing");
    }

    Ok(entries)
}
