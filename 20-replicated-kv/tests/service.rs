//! End-to-end behaviour of the server against an in-memory log.
//!
//! The log's knobs (stepping down, holding commits, overwriting entries) stand
//! in for what a real cluster does to a leader.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use replicated_kv::{
    Command, KvError, KvServer, PutAppendOp, ServerConfig, consensus::ConsensusLog, memlog::MemLog,
};

const SHORT_TIMEOUT: Duration = Duration::from_millis(200);

fn config() -> ServerConfig {
    ServerConfig::new(1).with_agreement_timeout(SHORT_TIMEOUT)
}

fn start_leader() -> (Arc<MemLog>, Arc<KvServer>) {
    let (log, commits) = MemLog::new();
    let log = Arc::new(log);
    let server = KvServer::start(config(), log.clone(), commits);
    (log, Arc::new(server))
}

fn start_follower(config: ServerConfig) -> (Arc<MemLog>, Arc<KvServer>) {
    let (log, commits) = MemLog::follower();
    let log = Arc::new(log);
    let server = KvServer::start(config, log.clone(), commits);
    (log, Arc::new(server))
}

/// Polls `condition` until it holds or two seconds pass.
async fn wait_until(what: &str, condition: impl Fn() -> bool) -> Result<()> {
    let start = std::time::Instant::now();
    while !condition() {
        if start.elapsed() > Duration::from_secs(2) {
            bail!("timeout waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Ok(())
}

fn encode(command: &Command) -> Vec<u8> {
    command.encode().expect("command encodes")
}

#[tokio::test]
async fn put_append_then_get_on_leader() -> Result<()> {
    let (_log, server) = start_leader();

    server.put_append("x", "a", PutAppendOp::Put).await?;
    server.put_append("x", "b", PutAppendOp::Append).await?;
    assert_eq!(server.get("x").await?, "ab");
    assert_eq!(server.last_applied(), 3);

    Ok(())
}

#[tokio::test]
async fn append_to_missing_key_behaves_like_put() -> Result<()> {
    let (_log, server) = start_leader();

    server.put_append("k", "v", PutAppendOp::Append).await?;
    assert_eq!(server.get("k").await?, "v");

    Ok(())
}

#[tokio::test]
async fn get_of_missing_key_is_empty() -> Result<()> {
    let (_log, server) = start_leader();
    assert_eq!(server.get("nothing").await?, "");
    Ok(())
}

#[tokio::test]
async fn follower_answers_wrong_leader_without_side_effects() -> Result<()> {
    let (log, server) = start_follower(config());

    let err = server.put_append("k", "v", PutAppendOp::Put).await.unwrap_err();
    assert!(matches!(err, KvError::WrongLeader));
    assert!(matches!(server.get("k").await, Err(KvError::WrongLeader)));

    assert_eq!(log.last_index(), 0);
    assert!(server.snapshot().is_empty());
    assert_eq!(server.registry_len(), 0);

    Ok(())
}

#[tokio::test]
async fn registry_empties_after_many_concurrent_writes() -> Result<()> {
    let (_log, server) = start_leader();

    let mut tasks = Vec::new();
    for i in 0..100 {
        let server = Arc::clone(&server);
        tasks.push(tokio::spawn(async move {
            server
                .put_append(&format!("key-{i}"), &format!("value-{i}"), PutAppendOp::Put)
                .await
        }));
    }
    for task in tasks {
        task.await??;
    }

    assert_eq!(server.registry_len(), 0);
    let snapshot = server.snapshot();
    assert_eq!(snapshot.len(), 100);
    assert_eq!(snapshot.get("key-42").map(String::as_str), Some("value-42"));

    Ok(())
}

#[tokio::test]
async fn concurrent_appends_each_land_once() -> Result<()> {
    let (_log, server) = start_leader();

    let mut tasks = Vec::new();
    for c in 'a'..='t' {
        let server = Arc::clone(&server);
        tasks.push(tokio::spawn(async move {
            server.put_append("log", &c.to_string(), PutAppendOp::Append).await
        }));
    }
    for task in tasks {
        task.await??;
    }

    let value = server.get("log").await?;
    assert_eq!(value.len(), 20);
    for c in 'a'..='t' {
        assert_eq!(value.matches(c).count(), 1, "{c} should appear once in {value}");
    }

    Ok(())
}

#[tokio::test]
async fn timed_out_command_is_applied_once_when_it_commits_later() -> Result<()> {
    let (log, server) = start_leader();
    log.hold_commits();

    let err = server
        .put_append("k", "v", PutAppendOp::Append)
        .await
        .unwrap_err();
    assert!(matches!(err, KvError::Timeout { index: 1 }));
    assert!(err.is_retryable());
    assert!(server.snapshot().is_empty());

    log.release_commits();
    wait_until("late commit to apply", || server.last_applied() == 1).await?;
    assert_eq!(server.get("k").await?, "v");

    Ok(())
}

#[tokio::test]
async fn losing_leadership_while_waiting_times_out() -> Result<()> {
    let (log, server) = start_leader();
    log.hold_commits();

    let waiter = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.put_append("k", "v", PutAppendOp::Put).await })
    };
    wait_until("submission", || log.last_index() == 1).await?;
    log.set_leader(false);

    assert!(matches!(waiter.await?, Err(KvError::Timeout { .. })));
    assert!(matches!(server.get("k").await, Err(KvError::WrongLeader)));
    assert_eq!(server.registry_len(), 0);

    Ok(())
}

#[tokio::test]
async fn overwritten_entry_reports_wrong_leader() -> Result<()> {
    let (log, server) = start_leader();
    log.hold_commits();

    let waiter = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.put_append("k", "mine", PutAppendOp::Put).await })
    };
    wait_until("submission", || log.last_index() == 1).await?;
    assert!(log.replace_uncommitted(1, encode(&Command::put("k", "theirs"))));
    log.release_commits();

    assert!(matches!(waiter.await?, Err(KvError::WrongLeader)));
    assert_eq!(server.snapshot().get("k").map(String::as_str), Some("theirs"));

    Ok(())
}

#[tokio::test]
async fn follower_applies_replicated_entries_in_commit_order() -> Result<()> {
    let (log, server) = start_follower(config());

    log.append_replicated(encode(&Command::put("x", "1")));
    log.append_replicated(encode(&Command::append("x", "2")));
    log.append_replicated(encode(&Command::put("y", "a")));
    log.append_replicated(encode(&Command::append("x", "3")));
    log.append_replicated(encode(&Command::get("x")));

    wait_until("replicated entries", || server.last_applied() == 5).await?;
    let snapshot = server.snapshot();
    assert_eq!(snapshot.get("x").map(String::as_str), Some("123"));
    assert_eq!(snapshot.get("y").map(String::as_str), Some("a"));

    Ok(())
}

#[tokio::test]
async fn unclaimed_commits_stay_within_retention() -> Result<()> {
    let (log, server) = start_follower(config().with_registry_retention(8));

    for i in 0..50 {
        log.append_replicated(encode(&Command::put(format!("k{i}"), "v")));
    }

    wait_until("replicated entries", || server.last_applied() == 50).await?;
    assert_eq!(server.registry_len(), 8);

    Ok(())
}

#[tokio::test]
async fn undecodable_entry_is_skipped() -> Result<()> {
    let (log, server) = start_leader();

    log.append_replicated(vec![0xde, 0xad, 0xbe, 0xef]);
    server.put_append("k", "v", PutAppendOp::Put).await?;

    assert_eq!(server.last_applied(), 2);
    assert_eq!(server.get("k").await?, "v");

    Ok(())
}

#[tokio::test]
async fn kill_is_idempotent_and_stops_service() -> Result<()> {
    let (log, server) = start_leader();
    server.put_append("k", "v", PutAppendOp::Put).await?;

    server.kill();
    server.kill();

    assert!(server.is_killed());
    assert!(!log.state().1);
    assert!(matches!(server.get("k").await, Err(KvError::WrongLeader)));

    let status = server.status();
    assert!(!status.is_leader);
    assert_eq!(status.last_applied, 1);
    assert_eq!(status.keys, 1);

    Ok(())
}
