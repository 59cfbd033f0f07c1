use trustchain::ballot::format_audit_log;
use trustchain::registry::{Member, MemberId};
use trustchain::{NetworkConfig, PollConfig, TrustNetwork};

/// Walk through admission and voting on an in-memory network
///
/// Uses the built-in seeds and poll. Nothing is written to disk.
pub async fn execute() -> Result<(), Box<dyn std::error::Error>> {
    let network = TrustNetwork::with_defaults(
        &NetworkConfig::default(),
        PollConfig::default().into_poll(),
    )?;

    println!("🌱 Seed members");
    print_members(&network.list_members().await);

    println!();
    println!("🎟  Omar redeems SEED-A1");
    let omar = network.redeem_invite("SEED-A1", "Omar").await?;
    println!("   Admitted as {} (invited by seed-1)", omar.id);
    for code in network.list_owned_codes(&omar.id).await? {
        println!("   New code: {}", code.code);
    }

    println!();
    println!("🎟  Replaying SEED-A1");
    match network.redeem_invite("SEED-A1", "Impostor").await {
        Ok(_) => return Err("used code was accepted twice".into()),
        Err(e) => println!("   Refused: {}", e),
    }

    let layla_code = network
        .list_owned_codes(&omar.id)
        .await?
        .into_iter()
        .next()
        .ok_or("new member received no codes")?;
    let layla = network.redeem_invite(&layla_code.code, "Layla").await?;
    println!();
    println!("🔗 Lineage of {}", layla.id);
    let chain: Vec<String> = network
        .lineage(&layla.id)
        .await?
        .iter()
        .map(MemberId::to_string)
        .collect();
    println!("   {}", chain.join(" -> "));

    println!();
    println!("🗳  {}", network.poll().await.title);
    network.cast_vote(&omar.id, 1).await?;
    network.cast_vote(&layla.id, 2).await?;
    if let Err(e) = network.cast_vote(&omar.id, 2).await {
        println!("   Second ballot from {} refused: {}", omar.id, e);
    }
    for tally in network.results().await {
        println!("   {}: {}", tally.candidate_name, tally.votes);
    }

    println!();
    println!("{}", format_audit_log(&network.list_audit_log().await));

    network.verify().await?;
    println!();
    println!("✅ Trust graph and audit chain verified");
    Ok(())
}

fn print_members(members: &[Member]) {
    for member in members {
        println!(
            "   {} {} (quota {})",
            member.id, member.name, member.remaining_invite_quota
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_demo_execute() {
        assert!(execute().await.is_ok());
    }
}
