use std::env;
use std::sync::Arc;

use ducobox::{spawn_polling, ConfigParameter, Coordinator, MessageLogMode, BOX_NODE_ID};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ducobox::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let host = args
        .get(1)
        .expect("usage: monitor <host> [--log <file>]");
    let log_file = args
        .iter()
        .position(|a| a == "--log")
        .and_then(|i| args.get(i + 1));

    let mut builder = Coordinator::builder(host.as_str())
        .on_event(|event| {
            println!("{event:?}");
        })
        .on_snapshot(|snap| {
            println!(
                "state: {} | mode: {} | flow: {}% | rh: {}",
                snap.state.as_deref().unwrap_or("-"),
                snap.mode.as_deref().unwrap_or("-"),
                snap.flow_lvl_tgt.map_or("-".to_string(), |f| f.to_string()),
                snap.rh.map_or("-".to_string(), |rh| format!("{rh:.1}%")),
            );
            if let Some(energy) = &snap.energy_info {
                println!(
                    "  outdoor: {:?}\u{00b0}C | supply: {:?}\u{00b0}C | filter: {:?} days",
                    energy.temp_oda, energy.temp_sup, energy.filter_remaining_time,
                );
            }
            for node in &snap.nodes {
                println!(
                    "  [{}] {} ({}) co2: {:?} rh: {:?}",
                    node.node_id, node.location, node.devtype, node.co2, node.rh,
                );
            }
        });

    if let Some(path) = log_file {
        builder = builder.message_log(MessageLogMode::Diffed, path.as_str());
    }

    println!("Connecting to {host}...");
    let coordinator = Arc::new(builder.connect().await?);
    let info = coordinator.device_info();
    println!(
        "Connected to {} ({}, serial {}). Polling for updates...",
        info.model, info.api_version, info.serial_number
    );
    println!("Presets: {}", coordinator.ventilation_state_options().join(", "));
    if coordinator.api().capabilities().node_config
        && let Some(config) = coordinator.node_config(BOX_NODE_ID).await?
        && let Some(comfort) = config.display(ConfigParameter::ComfortTemperature)
    {
        println!(
            "Comfort temperature: {:.1}\u{00b0}C ({:.1}-{:.1})",
            comfort.val, comfort.min, comfort.max
        );
    }

    let cancel = CancellationToken::new();
    let poller = spawn_polling(coordinator.clone(), cancel.clone());

    tokio::signal::ctrl_c().await?;
    println!("Stopping...");
    cancel.cancel();
    let _ = poller.await;
    Ok(())
}
