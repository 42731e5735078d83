use std::time::Instant;

use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{Map, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use state_sync::protocol::{Envelope, Message as SyncMessage};

#[derive(Parser)]
#[command(name = "sync-cli")]
#[command(about = "Management CLI for the state sync server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    /// WebSocket upgrade path
    #[arg(short, long, default_value = "/state-sync")]
    path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Server state and connection count
    Status,
    /// List open connections (admin API)
    Connections,
    /// Guard counters (admin API)
    Guard,
    /// Round-trip a PING over WebSocket
    Ping,
    /// Send a STATE_UPDATE and print the reply
    Send {
        /// JSON object used as the payload
        payload: String,
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

    match cli.command {
        Commands::Status => {
            let res = client.get(format!("{}/status", cli.url)).send().await?;
            print_response(res).await?;
        }
        Commands::Connections => {
            let res = client
                .get(format!("{}/admin/connections", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Guard => {
            let res = client
                .get(format!("{}/admin/guard", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Ping => {
            let request = Envelope::new(SyncMessage::Ping(Map::new()));
            let started = Instant::now();
            let reply = round_trip(&ws_url(&cli.url, &cli.path), request).await?;
            println!(
                "{} in {} ms",
                reply["type"].as_str().unwrap_or("?"),
                started.elapsed().as_millis()
            );
        }
        Commands::Send { payload } => {
            let state: Map<String, Value> = serde_json::from_str(&payload)?;
            let request = Envelope::state_update(state);
            let reply = round_trip(&ws_url(&cli.url, &cli.path), request).await?;
            println!("{}", serde_json::to_string_pretty(&reply)?);
        }
    }

    Ok(())
}

fn ws_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}{}", base, path)
}

/// Send one envelope and wait for the first text reply.
async fn round_trip(url: &str, request: Envelope) -> Result<Value, Box<dyn std::error::Error>> {
    let (mut ws, _) = connect_async(url).await?;
    ws.send(Message::text(request.to_json()?)).await?;

    while let Some(frame) = ws.next().await {
        match frame? {
            Message::Text(text) => {
                let reply: Value = serde_json::from_str(text.as_str())?;
                let _ = ws.close(None).await;
                return Ok(reply);
            }
            Message::Close(frame) => {
                let reason = frame
                    .map(|f| format!("{} {}", u16::from(f.code), f.reason.as_str()))
                    .unwrap_or_default();
                return Err(format!("connection closed by server {}", reason).into());
            }
            _ => continue,
        }
    }

    Err("connection ended without a reply".into())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
