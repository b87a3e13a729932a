use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use url::Url;

const KEY_ENV: &str = "LAUNCHER_ADMIN_KEY";

#[derive(Parser)]
#[command(name = "materialsuite-ctl")]
#[command(about = "Inspect a running materialsuite-launcher through its admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8911")]
    url: Url,

    /// Admin API key (falls back to $LAUNCHER_ADMIN_KEY)
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show launcher status and worker readiness
    Status,
    /// List every worker slot with pid, state and counters
    Workers,
}

impl Commands {
    fn path(&self) -> &'static str {
        match self {
            Commands::Status => "admin/status",
            Commands::Workers => "admin/workers",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let key = match cli.key {
        Some(key) => key,
        None => std::env::var(KEY_ENV).map_err(|_| format!("no admin key: pass --key or set {KEY_ENV}"))?,
    };

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {key}"))?);

    let endpoint = cli.url.join(cli.command.path())?;
    let res = reqwest::Client::new()
        .get(endpoint)
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        let text = res.text().await.unwrap_or_default();
        return Err(format!("admin API returned {status}: {text}").into());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
