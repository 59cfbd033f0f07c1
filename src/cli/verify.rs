use super::config::{default_config_path, TrustChainConfig};
use std::path::PathBuf;
use trustchain::invites::RandomCodeGenerator;
use trustchain::persistence::{SqliteStateStore, StateStore};
use trustchain::TrustNetwork;

/// Verify stored state integrity
///
/// Loads the configured database and re-checks every invariant:
/// - The trust graph is a forest rooted at seed members
/// - Invite codes are unique and redeemed at most once
/// - One vote per member, every vote for a real candidate
/// - The audit receipt chain is unbroken
pub async fn execute(config_path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let config = TrustChainConfig::load(&config_path)?;

    println!("🔍 Verifying TrustChain state...");
    println!();

    let Some(storage_path) = &config.storage.path else {
        return Err("No [storage] path configured; nothing to verify".into());
    };
    println!("  Database: {}", storage_path.display());

    let store = SqliteStateStore::open(storage_path).await?;
    let Some(snapshot) = store.load().await? else {
        println!("  State: empty (not yet bootstrapped)");
        return Ok(());
    };

    let network = TrustNetwork::restore(
        snapshot,
        config.network.standard_quota,
        Box::new(RandomCodeGenerator),
    )?;
    network.verify().await?;

    let stats = network.stats().await;
    println!("  Members: {}", stats.members);
    println!("  Invite codes issued: {}", stats.codes_issued);
    println!("  Votes cast: {}", stats.votes_cast);
    println!();
    println!("✅ All checks passed");
    Ok(())
}
