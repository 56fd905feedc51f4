//! Attach to an already running `node --inspect` process
//!
//! ```text
//! node --inspect=127.0.0.1:9229 app.js
//! cargo run -p bridge --example attach -- ws://127.0.0.1:9229/<uuid>
//! ```

use bridge::{Bridge, BridgeConfig, BridgeEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let endpoint = std::env::args()
        .nth(1)
        .ok_or("usage: attach <ws://inspector-endpoint>")?;

    let bridge = Bridge::new(BridgeConfig::default());

    let mut event_rx = bridge.event_bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            match event {
                BridgeEvent::UncaughtException { description, trace } => {
                    println!("{}", BridgeEvent::uncaught_report(&description, &trace));
                }
                other => println!("Event: {:?}", other),
            }
        }
    });

    let report = bridge.attach(&endpoint).await?;
    println!("Setup: {:?}", report);

    Ok(())
}
