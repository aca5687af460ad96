use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;
use voice_session::native::{CpalMicrophone, CpalPlayback};
use voice_session::{
    Capabilities, Config, Notification, SessionClient, SessionState, Speaker,
    WebSocketTransportFactory,
};

/// Talk to a voice bot from the terminal.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Backend base url, overrides VOICE_SESSION_BASE_URL
    #[arg(long)]
    base_url: Option<String>,

    #[arg(long)]
    input_device: Option<String>,

    #[arg(long)]
    output_device: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv_override().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("voice_session=info")))
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let cli = Cli::parse();

    let mut builder = Config::builder();
    if let Some(base_url) = cli.base_url.as_deref() {
        builder = builder.with_base_url(base_url);
    }
    let config = builder.build();

    let microphone = CpalMicrophone::new(config.sample_rate()).with_device(cli.input_device);
    let playback = CpalPlayback::open(cli.output_device, config.sample_rate())
        .context("Failed to open audio output")?;
    let capabilities = Capabilities::new(
        Arc::new(microphone),
        Arc::new(WebSocketTransportFactory),
        Box::new(playback),
    );

    let (client, mut notifications) = SessionClient::new(config, capabilities);

    let printer = tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            match notification {
                Notification::StatusChanged { state, message } => println!("[{}] {}", state, message),
                Notification::ConversationEntry { speaker, text } => {
                    let who = match speaker {
                        Speaker::User => "you",
                        Speaker::Bot => "bot",
                        Speaker::System => "system",
                    };
                    println!("{}: {}", who, text);
                }
                Notification::ActivityChanged { active } => {
                    tracing::debug!("activity: {}", active);
                }
            }
        }
    });

    client.connect().await.context("Failed to start voice session")?;
    println!("Press Ctrl-C to hang up.");

    let mut state = client.state_changes();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = state.wait_for(|state| *state == SessionState::Error) => {}
    }

    client.disconnect().await;
    drop(client);
    printer.await?;
    Ok(())
}
