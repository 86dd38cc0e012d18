//! Relay server demo
//!
//! Serves HLS over HTTP and accepts bridge requests over a WebSocket control
//! channel. With `RTSP_FRONT` (and optionally `RTSP_REAR`) set, a session is
//! started right away.
//!
//! ```text
//! RTSP_FRONT=rtsp://192.168.0.10/front cargo run --example relay_server
//! ```

use anyhow::Context;
use rtsphls::{ControlServer, GlobalConfig, LoggingConfig, RtspHls};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rtsphls::init_logging(&LoggingConfig::with_debug(false))?;

    let http_addr: SocketAddr = "0.0.0.0:8080".parse()?;
    let control_addr: SocketAddr = "0.0.0.0:9000".parse()?;

    let mut config = GlobalConfig::server();
    config.http_base_url =
        std::env::var("RELAY_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());
    let relay = RtspHls::init_with(config)?;
    relay.relay().start_monitoring();

    if let Some(mut warnings) = relay.relay().take_resource_warnings() {
        tokio::spawn(async move {
            while let Some(warning) = warnings.recv().await {
                println!("⚠️ {:?}: {}", warning, warning.recommended_action());
            }
        });
    }

    let control = ControlServer::new(control_addr, Arc::new(relay.plugin()));
    let control_task = {
        let control = control.clone();
        tokio::spawn(async move {
            if let Err(e) = control.start().await {
                eprintln!("❌ Control channel stopped: {}", e);
            }
        })
    };
    println!("🎛️ Control channel on ws://{}", control_addr);

    if let Ok(front) = std::env::var("RTSP_FRONT") {
        let rear = std::env::var("RTSP_REAR").unwrap_or_default();
        let session = relay
            .session()
            .front_url(&front)
            .rear_url(&rear)
            .title("Demo camera")
            .start()
            .await
            .context("starting demo session")?;
        println!("📺 Playlist: {}", session.hls_url());
    }

    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("binding {}", http_addr))?;
    println!("🌐 HLS on http://{}", http_addr);

    axum::serve(listener, relay.router())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    println!("🛑 Shutting down");
    control.stop().await?;
    control_task.abort();
    relay.shutdown().await;
    Ok(())
}
