//! In-process demo of the collage commit protocol

use collage_coordinator::{Coordinator, CoordinatorConfig, Source};
use collage_engine::{MockClient, MockEngine};
use collage_participant::{Oracle, Participant, ParticipantConfig, StaticOracle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    println!("=== Collage two-phase commit demo ===\n");

    let root = tempfile::tempdir()?;
    let engine = Arc::new(MockEngine::new());
    tracing::info!("Demo data under {}", root.path().display());

    let server_dir = root.path().join("server");
    let coordinator = Coordinator::start(
        CoordinatorConfig::new(&server_dir).with_vote_timeout(Duration::from_secs(2)),
        Arc::new(MockClient::new("Server", engine.clone())),
    )
    .await?;

    let alice_dir = root.path().join("alice");
    let bob_dir = root.path().join("bob");
    seed(&alice_dir, &["beach.jpg", "sunset.jpg"])?;
    seed(&bob_dir, &["dog.jpg", "cat.jpg"])?;

    let alice = start_participant(&engine, "alice", &alice_dir, Arc::new(StaticOracle::accept())).await?;
    // Bob never lets his cat appear in a collage
    let bob_oracle = |_: &[u8], filenames: &[String]| !filenames.iter().any(|f| f == "cat.jpg");
    let bob = start_participant(&engine, "bob", &bob_dir, Arc::new(bob_oracle)).await?;

    println!("--- Proposal 1: everyone agrees ---");
    let outcome = coordinator
        .propose(
            "holiday.jpg",
            b"holiday collage".to_vec(),
            &[Source::new("alice", "beach.jpg"), Source::new("bob", "dog.jpg")],
        )
        .await?;
    println!("ref {} -> {}", outcome.ref_num, outcome.decision);
    settle().await;
    println!("collage written: {}", server_dir.join("holiday.jpg").exists());
    println!("alice still has beach.jpg: {}", alice_dir.join("beach.jpg").exists());
    println!("bob still has dog.jpg: {}\n", bob_dir.join("dog.jpg").exists());

    println!("--- Proposal 2: bob refuses ---");
    let outcome = coordinator
        .propose(
            "pets.jpg",
            b"pets collage".to_vec(),
            &[Source::new("alice", "sunset.jpg"), Source::new("bob", "cat.jpg")],
        )
        .await?;
    println!("ref {} -> {}", outcome.ref_num, outcome.decision);
    settle().await;
    println!("collage written: {}", server_dir.join("pets.jpg").exists());
    println!("alice holds sunset.jpg: {:?}", alice.holder("sunset.jpg"));
    println!("bob holds cat.jpg: {:?}\n", bob.holder("cat.jpg"));

    println!("--- Restart: coordinator recovers its decisions ---");
    coordinator.shutdown();
    drop(coordinator);
    let coordinator = Coordinator::start(
        CoordinatorConfig::new(&server_dir),
        Arc::new(MockClient::new("Server", engine.clone())),
    )
    .await?;
    for (ref_num, decision) in coordinator.decisions() {
        println!("ref {} -> {}", ref_num, decision);
    }
    println!("next ref: {}", coordinator.next_ref_num());

    alice.shutdown();
    bob.shutdown();
    coordinator.shutdown();

    println!("\n=== Demo complete ===");
    Ok(())
}

async fn start_participant(
    engine: &Arc<MockEngine>,
    name: &str,
    dir: &Path,
    oracle: Arc<dyn Oracle>,
) -> Result<Arc<Participant>> {
    let client = Arc::new(MockClient::new(name, engine.clone()));
    Ok(Participant::start(ParticipantConfig::new(dir), client, oracle).await?)
}

fn seed(dir: &Path, files: &[&str]) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    for file in files {
        std::fs::write(dir.join(file), file.as_bytes())?;
    }
    Ok(())
}

/// Give participants a moment to apply the broadcast outcome
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
