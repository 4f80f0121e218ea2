//! Several sessions of one account working against the same server.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use mailkeeper_core::{
    CreateOptions, Engine, ErrorKind, FolderUpdate, ImapProperties, ManualClock, SearchQuery,
    SessionContext,
};
use mailkeeper_imap::{AclEntry, Error as ImapError, Flag, Flags, Rights};

#[test_log::test(tokio::test)]
async fn test_colliding_delete_rejected_at_once() -> Result<()> {
    let server = common::server();
    let uids = server.add_messages("Work", 10);
    let engine = common::engine(ImapProperties::default());
    let mut first = common::session(&engine, &server);
    let mut second = engine.open_session(common::context("s-2"), server.connect());
    let gate = server.pause("UID MOVE");

    let (first_result, second_result) = tokio::join!(
        first.delete_messages("Work", &uids, false),
        async {
            gate.entered().await;
            let result = second.delete_messages("Work", &uids, false).await;
            gate.release();
            result
        }
    );

    first_result?;
    assert_eq!(second_result.unwrap_err().kind(), ErrorKind::ConcurrentUse);
    assert_eq!(server.call_count("UID MOVE"), 1);
    assert_eq!(server.message_count("Trash"), 10);
    assert_eq!(engine.coordinator().active_operations(), 0);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_clear_and_expunge_rejected_while_delete_runs() -> Result<()> {
    let server = common::server();
    let uids = server.add_messages("Work", 5);
    let engine = common::engine(ImapProperties::default());
    let mut first = common::session(&engine, &server);
    let mut second = engine.open_session(common::context("s-2"), server.connect());
    let gate = server.pause("UID MOVE");

    let (deleted, (cleared, expunged)) = tokio::join!(
        first.delete_messages("Work", &uids[..2], false),
        async {
            gate.entered().await;
            let cleared = second.clear_folder("Work", true).await;
            let expunged = second.expunge_folder("Work", true).await;
            gate.release();
            (cleared, expunged)
        }
    );

    deleted?;
    assert_eq!(cleared.unwrap_err().kind(), ErrorKind::ConcurrentUse);
    assert_eq!(expunged.unwrap_err().kind(), ErrorKind::ConcurrentUse);
    assert_eq!(server.message_count("Trash"), 2);
    assert_eq!(server.message_count("Work"), 3);
    assert_eq!(engine.coordinator().active_operations(), 0);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_other_operation_types_run_alongside() -> Result<()> {
    let server = common::server();
    let uids = server.add_messages("Work", 4);
    let engine = common::engine(ImapProperties::default());
    let mut first = common::session(&engine, &server);
    let mut second = engine.open_session(common::context("s-2"), server.connect());
    let gate = server.pause("UID MOVE");
    let seen = Flags::from_vec(vec![Flag::Seen]);

    let (deleted, flagged) = tokio::join!(
        first.delete_messages("Work", &uids[..2], false),
        async {
            gate.entered().await;
            let result = second.update_flags("Work", &uids[2..], &seen, true).await;
            gate.release();
            result
        }
    );

    deleted?;
    flagged?;
    assert_eq!(server.message_count("Trash"), 2);
    assert!(server.messages("Work").iter().all(|m| m.flags.is_seen()));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_other_account_never_collides() -> Result<()> {
    let server = common::server();
    let uids = server.add_messages("Work", 2);
    let other_server = common::server();
    let other_uids = other_server.add_messages("Work", 2);
    let engine = common::engine(ImapProperties::default());
    let mut first = common::session(&engine, &server);
    let mut other = engine.open_session(SessionContext::new("acc-2", "s-1", "alice"), other_server.connect());
    let gate = server.pause("UID MOVE");

    let (first_result, other_result) = tokio::join!(
        first.delete_messages("Work", &uids, false),
        async {
            gate.entered().await;
            let result = other.delete_messages("Work", &other_uids, false).await;
            gate.release();
            result
        }
    );

    first_result?;
    other_result?;
    assert_eq!(other_server.message_count("Trash"), 2);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_structural_change_waits_for_folder_lock() -> Result<()> {
    let server = common::server();
    server.add_mailbox("Projects");
    let engine = common::engine(ImapProperties::default());
    let mut first = common::session(&engine, &server);
    let mut second = engine.open_session(common::context("s-2"), server.connect());
    let gate = server.pause("RENAME");

    let (renamed, created, ()) = tokio::join!(
        first.rename_folder("Projects", "Alpha"),
        async {
            gate.entered().await;
            second.create_folder(None, "Alpha", CreateOptions::default()).await
        },
        async {
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
            gate.release();
        }
    );

    assert_eq!(renamed?, "Alpha");
    assert_eq!(created.unwrap_err().kind(), ErrorKind::Duplicate);
    assert_eq!(server.call_count("CREATE"), 0);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_broken_connection_fails_fast_until_cooldown() -> Result<()> {
    let server = common::server();
    server.add_messages("Work", 2);
    server.fail_next("UID SEARCH", ImapError::ConnectionLost("reset by peer".to_string()));
    let clock = Arc::new(ManualClock::new());
    let props = ImapProperties::builder()
        .fail_fast_cooldown(Duration::from_secs(10))
        .build()?;
    let engine = Engine::with_clock(props, Arc::new(common::directory()), clock.clone());
    let mut first = common::session(&engine, &server);
    let mut second = engine.open_session(common::context("s-2"), server.connect());

    let err = first.search("Work", &SearchQuery::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);

    let examined = server.call_count("EXAMINE");
    let err = second.search("Work", &SearchQuery::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(server.call_count("EXAMINE"), examined);

    let other = second.search("Trash", &SearchQuery::default()).await?;
    assert!(other.is_empty());

    clock.advance(Duration::from_secs(11));
    assert_eq!(second.search("Work", &SearchQuery::default()).await?.len(), 2);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_broken_select_fails_fast_for_other_sessions() -> Result<()> {
    let server = common::server();
    server.add_messages("Work", 2);
    server.fail_next("SELECT", ImapError::ConnectionLost("reset by peer".to_string()));
    let engine = common::engine(ImapProperties::default());
    let mut first = common::session(&engine, &server);
    let mut second = engine.open_session(common::context("s-2"), server.connect());

    let err = first.clear_folder("Work", true).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);

    let selected = server.call_count("SELECT");
    let err = second.clear_folder("Work", true).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(server.call_count("SELECT"), selected);
    assert_eq!(server.message_count("Work"), 2);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_broken_acl_update_fails_fast() -> Result<()> {
    let server = common::server();
    server.fail_next("SETACL", ImapError::ConnectionLost("reset by peer".to_string()));
    let engine = common::engine(ImapProperties::default());
    let mut first = common::session(&engine, &server);
    let mut second = engine.open_session(common::context("s-2"), server.connect());
    let update = FolderUpdate {
        acls: Some(vec![AclEntry::new("alice", Rights::all()), AclEntry::parse("bob", "lr")]),
        subscribe: None,
    };

    let err = first.update_folder("Work", update).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);

    let err = second.search("Work", &SearchQuery::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(server.call_count("EXAMINE"), 0);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_in_use_answer_marks_folder() -> Result<()> {
    let server = common::server();
    let uids = server.add_messages("Work", 1);
    server.fail_next(
        "UID STORE",
        ImapError::no(mailkeeper_imap::ResponseCode::InUse, "Mailbox locked"),
    );
    let engine = common::engine(ImapProperties::default());
    let mut session = common::session(&engine, &server);
    let seen = Flags::from_vec(vec![Flag::Seen]);

    let err = session.update_flags("Work", &uids, &seen, true).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConcurrentUse);

    let err = session.update_flags("Work", &uids, &seen, true).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    Ok(())
}
