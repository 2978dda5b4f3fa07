use clap::{Parser, Subcommand};
use reqwest::header::AUTHORIZATION;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "idp-gateway-cli")]
#[command(about = "Command-line client for the IdP gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and print the issued tokens
    Login {
        identity: String,
        /// Read from IDP_GATEWAY_SECRET when omitted
        #[arg(long, env = "IDP_GATEWAY_SECRET")]
        secret: String,
    },
    /// Exchange a refresh token for new tokens
    Refresh { refresh_token: String },
    /// Show the claims of an access token
    Whoami { access_token: String },
    /// Check gateway and IdP health
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let res = match cli.command {
        Commands::Login { identity, secret } => {
            client
                .post(format!("{}/auth/login", cli.url))
                .json(&json!({ "identity": identity, "secret": secret }))
                .send()
                .await?
        }
        Commands::Refresh { refresh_token } => {
            client
                .post(format!("{}/auth/refresh", cli.url))
                .json(&json!({ "refresh_token": refresh_token }))
                .send()
                .await?
        }
        Commands::Whoami { access_token } => {
            client
                .get(format!("{}/auth/me", cli.url))
                .header(AUTHORIZATION, format!("Bearer {access_token}"))
                .send()
                .await?
        }
        Commands::Health => client.get(format!("{}/health", cli.url)).send().await?,
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let retry_after = res
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let text = res.text().await?;

    let rendered = match serde_json::from_str::<Value>(&text) {
        Ok(json) => serde_json::to_string_pretty(&json)?,
        Err(_) => text,
    };

    if status.is_success() {
        println!("{rendered}");
    } else {
        eprintln!("Error: gateway returned status {status}");
        if let Some(secs) = retry_after {
            eprintln!("Retry after: {secs}s");
        }
        eprintln!("{rendered}");
        std::process::exit(1);
    }
    Ok(())
}
