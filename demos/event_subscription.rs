use std::time::Duration;

use swim_membership::{
    api::{config::SwimConfig, swim::SwimCluster},
    Event, Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    let key = [42u8; 32];

    // Creates two members of the same encrypted cluster
    let node1 = SwimCluster::try_new(
        "127.0.0.1:8080",
        SwimConfig::builder().with_secret_key(key).build(),
    )
    .await?;
    let node2 = SwimCluster::try_new(
        "127.0.0.1:8081",
        SwimConfig::builder()
            .with_known_peers(["127.0.0.1:8080"])
            .with_secret_key(key)
            .build(),
    )
    .await?;

    // Subscribe before starting so no event is missed
    let mut rx1 = node1.subscribe();

    node1.run().await;
    let handles = node2.run().await;

    // Stop the second member after a while to watch it being suspected and declared dead
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        handles.iter().for_each(|handle| handle.abort());
    });

    // Handle events accordingly
    while let Ok(event) = rx1.recv().await {
        match event {
            Event::NodeJoined(e) => tracing::info!("[{}] joined {:#?}", node1.addr(), e),
            Event::NodeSuspected(e) => tracing::info!("[{}] suspected {:#?}", node1.addr(), e),
            Event::NodeRecovered(e) => tracing::info!("[{}] recovered {:#?}", node1.addr(), e),
            Event::NodeDeceased(e) => {
                tracing::info!("[{}] deceased {:#?}", node1.addr(), e);
                break;
            }
            Event::NodeLeft(e) => tracing::info!("[{}] left {:#?}", node1.addr(), e),
            Event::NodeRemoved(e) => tracing::info!("[{}] removed {:#?}", node1.addr(), e),
            Event::InboundSync { from, members } => {
                tracing::debug!("[{}] {} members from {}", node1.addr(), members.len(), from)
            }
            Event::Interrupt => break,
        }
    }

    Ok(())
}
