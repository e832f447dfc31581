use clap::Parser;
use sqlask_engine::config::{
    AppConfig, ConnectionParams, DEFAULT_ENDPOINT, DEFAULT_MODEL, GenerationConfig,
};
use sqlask_engine::engine::Engine;

#[derive(Debug, Parser)]
#[command(
    name = "sqlask",
    version,
    about = "Ask questions about the players table in plain English",
    disable_help_subcommand = true
)]
struct Cli {
    /// Start the HTTP server at HOST:PORT
    #[arg(short = 'S', env = "SQLASK_LISTEN", value_name = "HOST:PORT", default_value = "127.0.0.1:3000")]
    serve: String,

    /// API key for the generative model
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model identifier used for both generation calls
    #[arg(long, env = "SQLASK_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Base URL of the generative language API
    #[arg(long, env = "SQLASK_GEMINI_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    gemini_endpoint: String,

    #[arg(long, env = "SQLASK_DB_HOST", default_value = "localhost")]
    db_host: String,

    #[arg(long, env = "SQLASK_DB_PORT", default_value_t = 5432)]
    db_port: u16,

    #[arg(long, env = "SQLASK_DB_USER", default_value = "root")]
    db_user: String,

    #[arg(long, env = "SQLASK_DB_PASSWORD", default_value = "root", hide_env_values = true)]
    db_password: String,

    #[arg(long, env = "SQLASK_DB_NAME", default_value = "ny_taxi")]
    db_name: String,
}

/// Split a listen address. IPv6 hosts must be bracketed: `[::1]:3000`.
fn parse_host_port(s: &str) -> Result<(String, u16), String> {
    let (host, port) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("no port in {:?}", s))?;
    let host = match host.strip_prefix('[') {
        Some(inner) => inner
            .strip_suffix(']')
            .ok_or_else(|| format!("unclosed bracket in {:?}", host))?,
        None if host.contains(':') => {
            return Err(format!("IPv6 host {:?} needs brackets", host));
        }
        None => host,
    };
    if host.is_empty() {
        return Err("empty host".to_string());
    }
    let port = port
        .parse::<u16>()
        .map_err(|e| format!("port {:?}: {}", port, e))?;
    Ok((host.to_string(), port))
}

impl Cli {
    fn into_config(self) -> Result<AppConfig, String> {
        let (host, port) = parse_host_port(&self.serve)?;
        Ok(AppConfig::default()
            .set_listen(host, port)
            .set_generation(GenerationConfig {
                api_key: self.api_key.filter(|k| !k.is_empty()),
                model: self.model,
                endpoint: self.gemini_endpoint,
            })
            .set_database(ConnectionParams {
                host: self.db_host,
                port: self.db_port,
                user: self.db_user,
                password: self.db_password,
                database: self.db_name,
            }))
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("-S expects HOST:PORT (e.g. 127.0.0.1:3000), error: {}", e);
            std::process::exit(2);
        }
    };
    log::debug!("{:?}", config);

    let result = match Engine::new(config) {
        Ok(engine) => engine.run().await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
