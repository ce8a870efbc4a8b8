use std::path::PathBuf;
use std::sync::Arc;
use telephony_sdk::config::Config;
use telephony_sdk::infrastructure::metrics::describe_metrics;
use telephony_sdk::infrastructure::session::{StaticOwnershipProofIssuer, StaticUserSession};
use telephony_sdk::{TelephonyClientBuilder, TelephonyEvent, TelephonyEventBroadcaster};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: telephony-sdk [--config <path>] [--print-config]";

struct Args {
    config: Option<PathBuf>,
    print_config: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        config: None,
        print_config: false,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config needs a path\n{}", USAGE))?;
                args.config = Some(PathBuf::from(path));
            }
            "--print-config" => args.print_config = true,
            other => anyhow::bail!("unknown argument {}\n{}", other, USAGE),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args()?;
    if args.print_config {
        print!("{}", Config::sample_toml()?);
        return Ok(());
    }

    let config = Config::load(args.config.as_deref())?;

    // RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    describe_metrics();

    info!("Starting telephony event monitor");
    info!("GraphQL endpoint: {}", config.api.api_url);

    let session_config = config.session.clone().ok_or_else(|| {
        anyhow::anyhow!("no [session] configured; set session.access_token, subject and identity_id")
    })?;
    let session = Arc::new(StaticUserSession::from_config(&session_config));
    let proof_issuer = Arc::new(StaticOwnershipProofIssuer::new(
        session_config.ownership_proof.clone(),
    ));

    let client = TelephonyClientBuilder::new()
        .config(config)
        .user_session(session)
        .ownership_proof_issuer(proof_issuer)
        .build()
        .await?;

    let broadcaster = Arc::new(TelephonyEventBroadcaster::default());
    let mut events = broadcaster.subscribe();

    client
        .subscribe_to_messages(broadcaster.clone(), None)
        .await?;
    client
        .calling()
        .subscribe_to_call_records(broadcaster.clone(), None)
        .await?;
    client
        .calling()
        .subscribe_to_voicemails(broadcaster.clone(), None)
        .await?;
    info!("Subscribed to messages, call records and voicemail");

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(TelephonyEvent::MessageReceived { message, .. }) => info!(
                    "Message {} {:?} {} -> {}: {}",
                    message.id, message.direction, message.remote, message.local, message.body
                ),
                Ok(TelephonyEvent::CallRecordReceived { call_record, .. }) => info!(
                    "Call {} {:?} {:?} with {} ({}s)",
                    call_record.id,
                    call_record.direction,
                    call_record.state,
                    call_record.remote_phone_number,
                    call_record.duration_seconds
                ),
                Ok(TelephonyEvent::VoicemailUpdated { voicemail, .. }) => info!(
                    "Voicemail {} from {} ({}s)",
                    voicemail.id, voicemail.remote_phone_number, voicemail.duration_seconds
                ),
                Ok(TelephonyEvent::ConnectionChanged { state, .. }) => {
                    warn!("Realtime connection {}", state)
                }
                Err(RecvError::Lagged(missed)) => warn!("Event monitor lagged, {} events missed", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    client.unsubscribe_from_phone_messages(None);
    client.calling().unsubscribe_from_call_records(None);
    client.calling().unsubscribe_from_voicemails(None);
    printer.abort();
    if let Err(e) = printer.await {
        if !e.is_cancelled() {
            error!("Event monitor task failed: {}", e);
        }
    }

    Ok(())
}
