use clap::Parser;
use sqlpad_engine::config::EngineConfig;
use sqlpad_engine::engine::Engine;
use sqlpad_executor::CommitRule;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    name = "sqlpad",
    version,
    about = "Web form for running SQL against MySQL or SQLite",
    disable_help_subcommand = true
)]
struct Cli {
    /// Serve HTTP at HOST:PORT
    #[arg(short = 'S', value_name = "HOST:PORT", env = "SQLPAD_LISTEN")]
    serve: Option<String>,

    /// Directory holding an index.html that replaces the built-in page
    #[arg(short = 't', long = "docroot", value_name = "DIR", env = "SQLPAD_DOCROOT")]
    docroot: Option<PathBuf>,

    /// SQLite database file (created if missing)
    #[arg(long, value_name = "PATH", env = "SQLPAD_SQLITE_PATH")]
    sqlite_path: Option<PathBuf>,

    #[arg(long, env = "SQLPAD_MYSQL_HOST")]
    mysql_host: Option<String>,

    #[arg(long, env = "SQLPAD_MYSQL_PORT")]
    mysql_port: Option<u16>,

    #[arg(long, env = "SQLPAD_MYSQL_USER")]
    mysql_user: Option<String>,

    #[arg(long, env = "SQLPAD_MYSQL_PASSWORD", hide_env_values = true)]
    mysql_password: Option<String>,

    /// MySQL database, created on startup if it does not exist
    #[arg(long, env = "SQLPAD_MYSQL_DATABASE")]
    mysql_database: Option<String>,

    /// How to decide between commit and rollback: `keyword` or `substring`
    #[arg(long, value_name = "RULE", env = "SQLPAD_COMMIT_RULE")]
    commit_rule: Option<CommitRule>,

    /// Pending requests queued per database before new ones wait
    #[arg(long, value_name = "N", env = "SQLPAD_QUEUE_CAPACITY")]
    queue_capacity: Option<usize>,
}

fn parse_host_port(s: &str) -> Result<(String, u16), String> {
    if let Some(rest) = s.strip_prefix('[') {
        // bracketed IPv6: [host]:port
        if let Some(end) = rest.find(']') {
            let host = &rest[..end];
            let remain = &rest[end + 1..];
            let port = remain
                .strip_prefix(':')
                .ok_or("missing port after IPv6 host")?;
            let port: u16 = port.parse().map_err(|_| "invalid port".to_string())?;
            return Ok((host.to_string(), port));
        }
        return Err("invalid bracketed IPv6 address".to_string());
    }
    let mut parts = s.rsplitn(2, ':');
    let port_str = parts.next().ok_or("missing port")?;
    let host = parts.next().ok_or("missing host")?;
    let port: u16 = port_str.parse().map_err(|_| "invalid port".to_string())?;
    Ok((host.to_string(), port))
}

fn build_config(cli: Cli) -> Result<EngineConfig, String> {
    let mut config = EngineConfig::default();
    if let Some(addr) = cli.serve.as_deref() {
        let (host, port) = parse_host_port(addr)
            .map_err(|e| format!("-S expects HOST:PORT (e.g. 127.0.0.1:3000), error: {e}"))?;
        config.host = host;
        config.port = port;
    }
    if let Some(docroot) = cli.docroot {
        config = config.set_document_root(docroot);
    }
    if let Some(path) = cli.sqlite_path {
        config.sqlite.path = path;
    }
    if let Some(host) = cli.mysql_host {
        config.mysql.host = host;
    }
    if let Some(port) = cli.mysql_port {
        config.mysql.port = port;
    }
    if let Some(user) = cli.mysql_user {
        config.mysql.username = user;
    }
    if cli.mysql_password.is_some() {
        config.mysql.password = cli.mysql_password;
    }
    if let Some(database) = cli.mysql_database {
        config.mysql.database = database;
    }
    if let Some(rule) = cli.commit_rule {
        config.commit_rule = rule;
    }
    if let Some(capacity) = cli.queue_capacity {
        config.queue_capacity = capacity;
    }
    Ok(config)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlpad=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match build_config(Cli::parse()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };
    tracing::info!(
        addr = %config.addr(),
        sqlite = %config.sqlite.path.display(),
        mysql_host = %config.mysql.host,
        mysql_database = %config.mysql.database,
        commit_rule = %config.commit_rule,
        "starting sqlpad"
    );

    let mut engine = Engine::new_with_config(config);
    if let Err(err) = engine.run().await {
        tracing::error!(error = %err, "sqlpad stopped");
        std::process::exit(1);
    }
}
