//! Coordinator behaviour against scripted participants

use collage_common::{Decision, RefNum, Vote};
use collage_coordinator::{Coordinator, CoordinatorConfig, CoordinatorError, Source};
use collage_engine::{Envelope, Inbox, MockClient, MockEngine};
use collage_protocol::{CoordinatorMessage, ParticipantMessage};
use collage_wal::{AppendFaults, DecisionRecord, DurableLog, RetryPolicy};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn config(dir: &Path) -> CoordinatorConfig {
    CoordinatorConfig::new(dir).with_vote_timeout(Duration::from_millis(300))
}

async fn start(engine: &Arc<MockEngine>, dir: &Path) -> Arc<Coordinator> {
    let client = Arc::new(MockClient::new("Server", engine.clone()));
    Coordinator::start(config(dir), client).await.unwrap()
}

/// Participant that answers every PREPARE with a fixed vote and forwards what it saw
fn scripted(
    engine: &Arc<MockEngine>,
    name: &str,
    vote: Option<Vote>,
) -> tokio::sync::mpsc::UnboundedReceiver<CoordinatorMessage> {
    let client = MockClient::new(name, engine.clone());
    let mut inbox = client.inbox();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(envelope) = inbox.recv().await {
            let message = CoordinatorMessage::decode(&envelope.body).unwrap();
            if let (CoordinatorMessage::Prepare { ref_num, .. }, Some(vote)) = (&message, vote) {
                let reply = ParticipantMessage::Response {
                    ref_num: *ref_num,
                    vote,
                };
                client.send_message("Server", reply.encode()).unwrap();
            }
            if tx.send(message).is_err() {
                break;
            }
        }
    });

    rx
}

async fn next(rx: &mut tokio::sync::mpsc::UnboundedReceiver<CoordinatorMessage>) -> CoordinatorMessage {
    timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

async fn ask(client: &MockClient, inbox: &mut Inbox, ref_num: RefNum) -> CoordinatorMessage {
    client
        .send_message("Server", ParticipantMessage::Ask { ref_num }.encode())
        .unwrap();
    let envelope: Envelope = timeout(WAIT, inbox.recv()).await.unwrap().unwrap();
    CoordinatorMessage::decode(&envelope.body).unwrap()
}

#[tokio::test]
async fn test_unanimous_yes_commits() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(MockEngine::new());
    let mut a = scripted(&engine, "a", Some(Vote::Yes));
    let mut b = scripted(&engine, "b", Some(Vote::Yes));
    let coordinator = start(&engine, dir.path()).await;

    let sources = [
        Source::new("a", "1.jpg"),
        Source::new("b", "2.jpg"),
        Source::new("a", "3.jpg"),
    ];
    let outcome = coordinator
        .propose("collage.jpg", b"pixels".to_vec(), &sources)
        .await
        .unwrap();

    assert_eq!(outcome.ref_num, RefNum::ZERO);
    assert_eq!(outcome.decision, Decision::Commit);
    assert_eq!(
        std::fs::read(dir.path().join("collage.jpg")).unwrap(),
        b"pixels"
    );
    assert_eq!(coordinator.decision(RefNum::ZERO), Some(Decision::Commit));
    assert!(coordinator.in_flight().is_empty());

    match next(&mut a).await {
        CoordinatorMessage::Prepare {
            filenames,
            artifact,
            ..
        } => {
            assert_eq!(filenames, vec!["1.jpg", "3.jpg"]);
            assert_eq!(artifact, b"pixels");
        }
        other => panic!("expected PREPARE, got {:?}", other),
    }
    assert_eq!(
        next(&mut a).await,
        CoordinatorMessage::Commit {
            ref_num: RefNum::ZERO
        }
    );
    assert!(matches!(next(&mut b).await, CoordinatorMessage::Prepare { .. }));
    assert!(matches!(next(&mut b).await, CoordinatorMessage::Commit { .. }));
}

#[tokio::test]
async fn test_single_no_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(MockEngine::new());
    let mut a = scripted(&engine, "a", Some(Vote::Yes));
    let mut b = scripted(&engine, "b", Some(Vote::No));
    let coordinator = start(&engine, dir.path()).await;

    let outcome = coordinator
        .propose(
            "collage.jpg",
            b"pixels".to_vec(),
            &[Source::new("a", "1.jpg"), Source::new("b", "2.jpg")],
        )
        .await
        .unwrap();

    assert_eq!(outcome.decision, Decision::Abort);
    assert!(!dir.path().join("collage.jpg").exists());

    next(&mut a).await;
    next(&mut b).await;
    assert!(matches!(next(&mut a).await, CoordinatorMessage::Abort { .. }));
    assert!(matches!(next(&mut b).await, CoordinatorMessage::Abort { .. }));
}

#[tokio::test]
async fn test_unlogged_decision_is_not_applied_or_broadcast() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(MockEngine::new());
    let mut a = scripted(&engine, "a", Some(Vote::Yes));
    let faults = AppendFaults::new();
    let client = Arc::new(MockClient::new("Server", engine.clone()));
    let coordinator = Coordinator::start(
        config(dir.path())
            .with_log_retry(RetryPolicy::new(3, Duration::ZERO))
            .with_log_faults(faults.clone()),
        client,
    )
    .await
    .unwrap();

    faults.fail_next(3);
    let result = coordinator
        .propose("collage.jpg", b"pixels".to_vec(), &[Source::new("a", "1.jpg")])
        .await;

    match result {
        Err(CoordinatorError::LogWrite { ref_num, .. }) => assert_eq!(ref_num, RefNum::ZERO),
        other => panic!("expected a log write failure, got {:?}", other),
    }
    assert_eq!(faults.remaining(), 0);
    assert_eq!(coordinator.decision(RefNum::ZERO), None);
    assert!(coordinator.in_flight().is_empty());
    assert!(!dir.path().join("collage.jpg").exists());
    assert_eq!(std::fs::metadata(dir.path().join("log.txt")).unwrap().len(), 0);

    // Only the PREPARE went out
    assert!(matches!(next(&mut a).await, CoordinatorMessage::Prepare { .. }));
    assert!(timeout(Duration::from_millis(200), a.recv()).await.is_err());

    // The log recovers once the fault clears
    let outcome = coordinator
        .propose("collage.jpg", b"pixels".to_vec(), &[Source::new("a", "1.jpg")])
        .await
        .unwrap();
    assert_eq!(outcome.ref_num, RefNum::new(1));
    assert_eq!(outcome.decision, Decision::Commit);
}

#[tokio::test]
async fn test_silent_participant_times_out_and_late_vote_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(MockEngine::new());
    let _a = scripted(&engine, "a", Some(Vote::Yes));
    let mut silent = scripted(&engine, "silent", None);
    let coordinator = start(&engine, dir.path()).await;

    let outcome = coordinator
        .propose(
            "collage.jpg",
            b"pixels".to_vec(),
            &[Source::new("a", "1.jpg"), Source::new("silent", "2.jpg")],
        )
        .await
        .unwrap();
    assert_eq!(outcome.decision, Decision::Abort);

    assert!(matches!(next(&mut silent).await, CoordinatorMessage::Prepare { .. }));
    assert!(matches!(next(&mut silent).await, CoordinatorMessage::Abort { .. }));

    // A YES arriving after the decision changes nothing
    coordinator.handle_vote("silent", outcome.ref_num, Vote::Yes);
    assert_eq!(coordinator.decision(outcome.ref_num), Some(Decision::Abort));
    assert!(coordinator.in_flight().is_empty());
}

#[tokio::test]
async fn test_ask_answers_from_decision_table() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(MockEngine::new());
    let _a = scripted(&engine, "a", Some(Vote::Yes));
    let coordinator = start(&engine, dir.path()).await;

    coordinator
        .propose("c.jpg", vec![1], &[Source::new("a", "1.jpg")])
        .await
        .unwrap();

    let asker = MockClient::new("asker", engine.clone());
    let mut inbox = asker.inbox();
    assert_eq!(
        ask(&asker, &mut inbox, RefNum::ZERO).await,
        CoordinatorMessage::Commit {
            ref_num: RefNum::ZERO
        }
    );
    assert_eq!(
        ask(&asker, &mut inbox, RefNum::new(42)).await,
        CoordinatorMessage::Abort {
            ref_num: RefNum::new(42)
        }
    );
}

#[tokio::test]
async fn test_ask_during_vote_collection_is_in_progress() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(MockEngine::new());
    let mut silent = scripted(&engine, "silent", None);
    let coordinator = start(&engine, dir.path()).await;

    let proposing = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            coordinator
                .propose("c.jpg", vec![1], &[Source::new("silent", "1.jpg")])
                .await
        })
    };
    let ref_num = next(&mut silent).await.ref_num();

    let asker = MockClient::new("asker", engine.clone());
    let mut inbox = asker.inbox();
    assert_eq!(
        ask(&asker, &mut inbox, ref_num).await,
        CoordinatorMessage::InProgress { ref_num }
    );

    let outcome = proposing.await.unwrap().unwrap();
    assert_eq!(outcome.decision, Decision::Abort);
}

#[tokio::test]
async fn test_ref_nums_unique_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(MockEngine::new());
    let _a = scripted(&engine, "a", Some(Vote::Yes));

    let coordinator = start(&engine, dir.path()).await;
    let mut seen = Vec::new();
    for i in 0..3 {
        let outcome = coordinator
            .propose(&format!("c{}.jpg", i), vec![i], &[Source::new("a", "1.jpg")])
            .await
            .unwrap();
        seen.push(outcome.ref_num);
    }
    coordinator.shutdown();
    drop(coordinator);

    let restarted = start(&engine, dir.path()).await;
    assert_eq!(restarted.decisions().len(), 3);
    assert_eq!(restarted.next_ref_num(), RefNum::new(3));

    let outcome = restarted
        .propose("c3.jpg", vec![3], &[Source::new("a", "1.jpg")])
        .await
        .unwrap();
    assert!(seen.iter().all(|r| *r < outcome.ref_num));
}

#[tokio::test]
async fn test_recovery_restores_missing_collage() {
    // Crash after logging COMMIT but before the collage reached disk
    let dir = tempfile::tempdir().unwrap();
    {
        let mut log = DurableLog::open(dir.path().join("log.txt")).unwrap();
        log.append(&DecisionRecord::commit(RefNum::new(0), "kept.jpg", b"old".to_vec()).encode())
            .unwrap();
        log.append(&DecisionRecord::abort(RefNum::new(1)).encode())
            .unwrap();
        log.append(&DecisionRecord::commit(RefNum::new(2), "lost.jpg", b"new".to_vec()).encode())
            .unwrap();
    }
    std::fs::write(dir.path().join("kept.jpg"), b"on disk").unwrap();

    let engine = Arc::new(MockEngine::new());
    let coordinator = start(&engine, dir.path()).await;

    assert_eq!(std::fs::read(dir.path().join("lost.jpg")).unwrap(), b"new");
    assert_eq!(std::fs::read(dir.path().join("kept.jpg")).unwrap(), b"on disk");
    assert_eq!(coordinator.next_ref_num(), RefNum::new(3));

    // A participant that missed the broadcast learns the outcome by asking
    let asker = MockClient::new("p", engine.clone());
    let mut inbox = asker.inbox();
    assert_eq!(
        ask(&asker, &mut inbox, RefNum::new(2)).await,
        CoordinatorMessage::Commit {
            ref_num: RefNum::new(2)
        }
    );
}

#[tokio::test]
async fn test_recovery_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(MockEngine::new());
    let _a = scripted(&engine, "a", Some(Vote::Yes));
    let _b = scripted(&engine, "b", Some(Vote::No));

    let coordinator = start(&engine, dir.path()).await;
    coordinator
        .propose("x.jpg", vec![1], &[Source::new("a", "1.jpg")])
        .await
        .unwrap();
    coordinator
        .propose("y.jpg", vec![2], &[Source::new("b", "1.jpg")])
        .await
        .unwrap();
    coordinator.shutdown();
    drop(coordinator);

    let first = start(&engine, dir.path()).await;
    let once = first.decisions();
    first.shutdown();
    drop(first);

    let second = start(&engine, dir.path()).await;
    assert_eq!(second.decisions(), once);
    assert_eq!(
        once,
        vec![
            (RefNum::new(0), Decision::Commit),
            (RefNum::new(1), Decision::Abort)
        ]
    );
}

#[tokio::test]
async fn test_torn_log_tail_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("log.txt");
    {
        let mut log = DurableLog::open(&log_path).unwrap();
        log.append(&DecisionRecord::abort(RefNum::new(0)).encode())
            .unwrap();
        let torn = DecisionRecord::commit(RefNum::new(1), "c.jpg", vec![9; 32]).encode();
        log.append(&torn[..torn.len() / 2]).unwrap();
    }

    let engine = Arc::new(MockEngine::new());
    let coordinator = start(&engine, dir.path()).await;

    assert_eq!(coordinator.decisions(), vec![(RefNum::new(0), Decision::Abort)]);
    assert_eq!(coordinator.next_ref_num(), RefNum::new(1));
    assert_eq!(
        std::fs::metadata(&log_path).unwrap().len(),
        DecisionRecord::abort(RefNum::new(0)).encode().len() as u64
    );
}
