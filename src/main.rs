use dialtone::config::Config;
use dialtone::domain::call::{CallEventKind, CallState};
use dialtone::infrastructure::modem::{EmulatorChannel, ModemAdapter};
use dialtone::Telephony;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEMO_NUMBER: &str = "5555552368";
const MODEM_WAIT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional config file as the only argument
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Dialtone");
    info!("Configuration loaded: {:?}", config);

    let emulator = Arc::new(EmulatorChannel::new(config.emulator.clone()));
    let modem = Arc::new(ModemAdapter::new(emulator, config.modem.clone()));
    let telephony = Telephony::new(modem, config.telephony.clone());
    telephony.start();

    demo_call_lifecycle(&telephony).await?;

    telephony.shutdown();
    Ok(())
}

/// Dial, wait for the remote party to ring, then hang up
async fn demo_call_lifecycle(telephony: &Arc<Telephony>) -> anyhow::Result<()> {
    info!("=== Call Lifecycle Demo ===");

    let call = telephony.dial(DEMO_NUMBER).await?;
    info!("Call {} to {} is {}", call.id(), call.number(), call.state());

    call.on(CallEventKind::Disconnecting, |event| {
        info!("Received 'disconnecting' call event for {}", event.call.number());
    });
    call.on(CallEventKind::Disconnected, |event| {
        info!(
            "Received 'disconnected' call event for {} ({})",
            event.call.number(),
            event
                .reason
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default()
        );
    });

    let mut states = call.state_changes();
    let progressed = tokio::time::timeout(
        MODEM_WAIT,
        states.wait_for(|state| *state != CallState::Dialing),
    )
    .await
    .ok()
    .and_then(Result::ok)
    .map(|state| *state);
    match progressed {
        Some(state) => info!("Call state: {}", state),
        None => warn!("No progress reported by the modem, hanging up while dialing"),
    }

    let list = telephony.modem().raw_call_list().await?;
    info!("Call list is now: {:?}", list);

    telephony.hang_up(&call).await?;
    let reason = tokio::time::timeout(MODEM_WAIT, call.ended()).await?;
    info!("Call ended: {}", reason);
    info!(
        "Active call: {:?}, live calls: {}",
        telephony.active().map(|c| c.id()),
        telephony.calls().len()
    );
    info!("Final call record: {}", serde_json::to_string(&call.snapshot())?);

    info!("=== Call Lifecycle Demo Complete ===");
    Ok(())
}
