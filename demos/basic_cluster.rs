use std::time::Duration;

use swim_membership::{
    api::{config::SwimConfig, swim::SwimCluster},
    Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Creates three members of the same cluster
    let node1 = SwimCluster::try_new("127.0.0.1:8080", SwimConfig::new()).await?;
    let node2 = SwimCluster::try_new(
        "127.0.0.1:8081",
        SwimConfig::builder()
            .with_known_peers(["127.0.0.1:8080"])
            .build(),
    )
    .await?;
    let node3 = SwimCluster::try_new(
        "127.0.0.1:8082",
        SwimConfig::builder()
            .with_known_peers(["127.0.0.1:8080", "127.0.0.1:8081"])
            .with_node_name("worker")
            .build(),
    )
    .await?;

    // Run the protocol in the background
    node1.run().await;
    node2.run().await;
    node3.run().await;

    tokio::time::sleep(Duration::from_secs(5)).await;
    for member in node1.members() {
        tracing::info!(
            "[{}] {} at {} is {:?}",
            node1.addr(),
            member.name,
            member.addr(),
            member.state()
        );
    }

    // Ask the third member to leave, every member sees it go
    node1.leave("worker").await?;

    // Simulate a long running process or service
    tokio::time::sleep(Duration::from_secs(12)).await;

    Ok(())
}
