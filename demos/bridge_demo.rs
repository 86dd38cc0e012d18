//! Player bridge demo
//!
//! Drives the relay through the same `play`/`stop`/`checkAvailability`/
//! `getStats` contract a native player uses.
//!
//! ```text
//! cargo run --example bridge_demo -- rtsp://192.168.0.10/front rtsp://192.168.0.10/rear
//! ```

use rtsphls::{PlayCallbacks, PlayOptions, RtspHls, RtspHlsPlayer};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let front = args
        .next()
        .unwrap_or_else(|| "rtsp://192.168.0.10:554/front".to_string());
    let rear = args.next().unwrap_or_default();

    let relay = RtspHls::init()?;
    let player = RtspHlsPlayer::new(Arc::new(relay.plugin()));

    if !player.check_availability().await {
        println!("❌ FFmpeg is not available on this machine");
        return Ok(());
    }

    let callbacks = PlayCallbacks::new()
        .on_status(|update| println!("📊 Status: {:?}", update))
        .on_error(|error| println!("❌ Error [{}]: {}", error.code, error.message))
        .on_action(|action| println!("👆 Action: {} on {:?}", action.action, action.camera));

    let options = PlayOptions::front(front)
        .with_rear(rear)
        .with_title("Bridge demo");
    let session = player.play(options, callbacks).await;
    println!("▶️ Playing {:?}", session.request().title);

    tokio::time::sleep(Duration::from_secs(10)).await;
    if let Some(stats) = player.get_stats().await {
        println!("📈 Stats: {}", serde_json::to_string_pretty(&stats)?);
    }

    if player.switch_camera("rear").await.is_ok() {
        println!("🔄 Switched to rear camera");
        tokio::time::sleep(Duration::from_secs(5)).await;
    }

    let stopped = player.stop().await;
    println!("🛑 Stop: {:?}", stopped);
    session.finished().await;
    Ok(())
}
