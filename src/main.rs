use anyhow::Context;
use std::sync::Arc;
use windmill::domain::units;
use windmill::{AuctionClient, Config, RpcGateway, RpcSessionProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = Config::from_env().context("configuration error")?;
    if config.is_read_only() {
        tracing::warn!("no contract address configured; mutating operations are disabled");
    }

    let rpc_url = config.rpc_url();
    let gateway = Arc::new(RpcGateway::new(
        rpc_url.clone(),
        config.contract_address.clone(),
    ));
    let provider = Arc::new(RpcSessionProvider::new(rpc_url));
    let client = AuctionClient::new(&config, gateway.clone(), provider);

    let address = client.connect().await.context("failed to connect")?;
    gateway.set_caller(Some(address));

    // Observe the book until interrupted.
    let mut snapshots = client.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                client.disconnect().await;
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                tracing::info!(
                    orders = snapshot.orders.len(),
                    trades = snapshot.trades.len(),
                    "book updated"
                );
                for cached in &snapshot.orders {
                    tracing::debug!(
                        order = %cached.order.id,
                        side = %cached.order.side(),
                        amount = cached.order.amount,
                        price = %units::format_ether(cached.current_price),
                        maker = %cached.order.creator.short(),
                        "order"
                    );
                }
            }
        }
    }

    Ok(())
}
