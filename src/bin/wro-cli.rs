use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use wro_dispatch::config::{Field, FieldValue};
use wro_dispatch::http::{API_RELOAD_CACHE, API_RELOAD_MODEL};

#[derive(Parser)]
#[command(name = "wro-cli")]
#[command(about = "Management CLI for wro-dispatch", long_about = None)]
struct Cli {
    /// Base URL of the dispatcher, including the context path.
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Base URL of the admin API.
    #[arg(short, long, default_value = "http://localhost:8081")]
    admin_url: String,

    #[arg(short, long, env = "WRO_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    /// Registered configuration name.
    #[arg(short, long, default_value = "wro-ROOT")]
    name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the delegate to drop its cached artifacts (debug mode only)
    ReloadCache,
    /// Ask the delegate to re-read its model (debug mode only)
    ReloadModel,
    /// Check admin API status
    Status,
    /// Show the registered configuration
    Show,
    /// Change one runtime field
    Set {
        /// debug, header, cache_update_period, model_update_period or management_enabled
        field: String,
        /// New value; periods are in seconds, an empty header clears the template
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let base = cli.url.trim_end_matches('/');
    let admin = cli.admin_url.trim_end_matches('/');

    match cli.command {
        Commands::ReloadCache => {
            let res = client.get(format!("{base}/{API_RELOAD_CACHE}")).send().await?;
            print_control(res);
        }
        Commands::ReloadModel => {
            let res = client.get(format!("{base}/{API_RELOAD_MODEL}")).send().await?;
            print_control(res);
        }
        Commands::Status => {
            let res = client.get(format!("{admin}/admin/status"))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Show => {
            let res = client.get(format!("{admin}/admin/configs/{}", cli.name))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Set { field, value } => {
            let field: Field = field.parse()?;
            let value = FieldValue::parse(field, &value)?;
            let res = client.put(format!("{admin}/admin/configs/{}/{field}", cli.name))
                .headers(headers)
                .json(&value.to_json())
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

fn print_control(res: reqwest::Response) {
    if res.status().is_success() {
        println!("OK");
    } else {
        // Outside debug mode the call is handled as an ordinary resource request.
        eprintln!("Error: dispatcher returned status {} (is debug mode on?)", res.status());
    }
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
