use okx_connector::core::config::ExchangeConfig;
use okx_connector::core::types::{ConnectionEvent, RoutingKey};
use okx_connector::exchanges::okx::{OkxBuilder, OkxTicker};
use std::env;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let inst_id = env::args().nth(1).unwrap_or_else(|| "BTC-USDT".to_string());

    // Credentials are optional; public endpoints work without them
    let config = ExchangeConfig::from_env("OKX").unwrap_or_else(|_| ExchangeConfig::read_only());
    let builder = OkxBuilder::new().with_config(config);

    let rest = builder.build_rest()?;
    let response = rest.get_ticker(&inst_id).await?;
    for ticker in response.data_as::<OkxTicker>()? {
        tracing::info!(inst_id = %ticker.inst_id, last = %ticker.last, bid = %ticker.bid_px, ask = %ticker.ask_px, "REST ticker");
    }

    let ws = builder.build_public_ws()?;
    ws.register_handler(RoutingKey::channel("tickers"), |push| {
        tracing::info!(inst_id = ?push.inst_id, data = %push.data, "ticker push");
        Ok(())
    });
    ws.subscribe_ticker(&inst_id, None).await?;

    let mut events = ws.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let ConnectionEvent::Terminated { reason } = &event {
                tracing::error!(%reason, "stream terminated");
            } else {
                tracing::debug!(?event, "connection event");
            }
        }
    });

    ws.connect().await?;
    tracing::info!("streaming {} tickers, press Ctrl-C to stop", inst_id);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        () = tokio::time::sleep(Duration::from_secs(300)) => {}
    }

    ws.disconnect().await?;
    Ok(())
}
