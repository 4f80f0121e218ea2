//! Message operations against the in-memory server.

#![allow(clippy::unwrap_used)]

mod common;

use anyhow::Result;
use mailkeeper_core::{AppendMessage, Error, ErrorKind, ImapProperties, SearchQuery, SortOrder};
use mailkeeper_imap::mock::MockServer;
use mailkeeper_imap::{
    AclEntry, Error as ImapError, FetchProfile, Flag, Flags, SearchCriteria, SortKey, SpecialUse,
    Uid,
};

const NO_MOVE: &str = "IMAP4rev1 NAMESPACE UIDPLUS ACL QUOTA SORT CHILDREN SPECIAL-USE";
const NO_UIDPLUS: &str = "IMAP4rev1 NAMESPACE MOVE ACL QUOTA SORT CHILDREN SPECIAL-USE";

fn uid(n: u32) -> Uid {
    Uid::new(n).unwrap()
}

/// Three messages whose subjects sort as 3, 1, 2.
fn fruit(server: &MockServer) {
    for subject in ["banana", "cherry", "apple"] {
        server.add_message("Work", &format!("Subject: {subject}\r\n\r\nabout {subject}\r\n"), Flags::new());
    }
}

mod delete {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_soft_delete_moves_in_blocks() -> Result<()> {
        let server = common::server();
        let uids = server.add_messages("Work", 250);
        let engine = common::engine(ImapProperties::builder().block_size(100).build()?);
        let mut session = common::session(&engine, &server);

        session.delete_messages("Work", &uids, false).await?;

        let moves: Vec<String> = server.calls_of("UID MOVE").into_iter().map(|c| c.args).collect();
        assert_eq!(moves, vec!["1:100 Trash", "101:200 Trash", "201:250 Trash"]);
        assert_eq!(server.message_count("Work"), 0);
        assert_eq!(server.message_count("Trash"), 250);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_zero_limits_work_one_message_at_a_time() -> Result<()> {
        let server = common::server();
        let uids = server.add_messages("Work", 3);
        let props = ImapProperties {
            block_size: 0,
            fetch_limit: 0,
            ..ImapProperties::default()
        };
        let engine = common::engine(props);
        let mut session = common::session(&engine, &server);

        assert_eq!(session.fetch("Work", &uids, FetchProfile::HeadersOnly).await?.len(), 3);
        assert_eq!(server.call_count("UID FETCH"), 3);

        session.delete_messages("Work", &uids, false).await?;
        let moves: Vec<String> = server.calls_of("UID MOVE").into_iter().map(|c| c.args).collect();
        assert_eq!(moves, vec!["1 Trash", "2 Trash", "3 Trash"]);
        assert_eq!(engine.properties().block_size, 1);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_soft_delete_without_move_copies_and_expunges() -> Result<()> {
        let server = common::server().with_capabilities(NO_MOVE);
        let uids = server.add_messages("Work", 5);
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        session.delete_messages("Work", &uids, false).await?;

        assert_eq!(server.call_count("UID MOVE"), 0);
        assert_eq!(server.call_count("UID COPY"), 1);
        assert_eq!(server.call_count("UID EXPUNGE"), 1);
        assert_eq!(server.message_count("Work"), 0);
        assert_eq!(server.message_count("Trash"), 5);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_hard_delete_skips_trash() -> Result<()> {
        let server = common::server();
        let uids = server.add_messages("Work", 5);
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        session.delete_messages("Work", &uids[..3], true).await?;

        assert_eq!(server.message_count("Work"), 2);
        assert_eq!(server.message_count("Trash"), 0);
        assert_eq!(server.call_count("UID MOVE"), 0);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_hard_delete_without_uidplus_expunges_folder() -> Result<()> {
        let server = common::server().with_capabilities(NO_UIDPLUS);
        let uids = server.add_messages("Work", 3);
        let engine = common::engine(ImapProperties::builder().hard_delete_msgs(true).build()?);
        let mut session = common::session(&engine, &server);

        session.delete_messages("Work", &uids, false).await?;

        assert_eq!(server.call_count("EXPUNGE"), 1);
        assert_eq!(server.call_count("UID EXPUNGE"), 0);
        assert_eq!(server.message_count("Work"), 0);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_delete_in_trash_is_final() -> Result<()> {
        let server = common::server();
        let uids = server.add_messages("Trash", 2);
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        session.delete_messages("Trash", &uids, false).await?;

        assert_eq!(server.message_count("Trash"), 0);
        assert_eq!(server.call_count("UID MOVE"), 0);
        Ok(())
    }
}

mod relocate {
    use super::*;

    fn with_drafts() -> MockServer {
        let server = common::server();
        server.add_special_mailbox("Drafts", SpecialUse::Drafts);
        server
    }

    #[test_log::test(tokio::test)]
    async fn test_copy_into_drafts_marks_copies() -> Result<()> {
        let server = with_drafts();
        let uids = server.add_messages("Work", 2);
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let copied = session.copy_messages("Work", &uids, "Drafts").await?;

        assert_eq!(copied, vec![Some(uid(1)), Some(uid(2))]);
        assert!(server.messages("Drafts").iter().all(|m| m.flags.is_draft()));
        assert!(server.messages("Work").iter().all(|m| !m.flags.is_draft()));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_move_out_of_drafts_clears_flag() -> Result<()> {
        let server = with_drafts();
        let draft = server
            .add_message("Drafts", "Subject: unsent\r\n\r\nx\r\n", Flags::from_vec(vec![Flag::Draft]))
            .unwrap();
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        session.move_messages("Drafts", &[draft], "Work").await?;

        assert_eq!(server.message_count("Drafts"), 0);
        let moved = server.messages("Work");
        assert_eq!(moved.len(), 1);
        assert!(!moved[0].flags.is_draft());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_move_onto_itself_is_a_no_op() -> Result<()> {
        let server = common::server();
        let uids = server.add_messages("Work", 2);
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let moved = session.move_messages("Work", &uids, "Work").await?;

        assert_eq!(moved, vec![Some(uid(1)), Some(uid(2))]);
        assert_eq!(server.call_count("UID MOVE"), 0);
        assert_eq!(server.call_count("UID COPY"), 0);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_destination() -> Result<()> {
        let server = common::server();
        let uids = server.add_messages("Work", 1);
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let err = session.copy_messages("Work", &uids, "Nowhere").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_full_destination_is_quota_error() -> Result<()> {
        let server = common::server();
        server.set_message_limit("Trash", 1);
        let uids = server.add_messages("Work", 3);
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let err = session.copy_messages("Work", &uids, "Trash").await.unwrap_err();

        assert!(matches!(err, Error::QuotaExceeded { ref folder } if folder == "Trash"));
        assert_eq!(server.message_count("Work"), 3);
        Ok(())
    }
}

mod flags {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_seen_needs_keep_seen_right() -> Result<()> {
        let server = common::server();
        let uids = server.add_messages("Work", 2);
        server.set_acl("Work", vec![AclEntry::parse("alice", "lrw")]);
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let seen = Flags::from_vec(vec![Flag::Seen]);
        let err = session.update_flags("Work", &uids, &seen, true).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);

        let flagged = Flags::from_vec(vec![Flag::Flagged]);
        session.update_flags("Work", &uids, &flagged, true).await?;
        assert!(server.messages("Work").iter().all(|m| m.flags.is_flagged()));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_keywords_ignored_by_system_flag_update() -> Result<()> {
        let server = common::server();
        let uids = server.add_messages("Work", 1);
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let flags = Flags::from_vec(vec![Flag::Keyword("$Label".to_string())]);
        session.update_flags("Work", &uids, &flags, true).await?;

        assert_eq!(server.call_count("UID STORE"), 0);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_user_flags_set_and_cleared() -> Result<()> {
        let server = common::server();
        let uids = server.add_messages("Work", 2);
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);
        let label = Flag::Keyword("$Project".to_string());

        session.update_user_flags("Work", &uids, &["$Project"], true).await?;
        assert!(server.messages("Work").iter().all(|m| m.flags.contains(&label)));

        session.update_user_flags("Work", &uids[..1], &["$Project"], false).await?;
        let messages = server.messages("Work");
        assert!(!messages[0].flags.contains(&label));
        assert!(messages[1].flags.contains(&label));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_user_flags_unsupported_without_keyword_storage() -> Result<()> {
        let server = common::server();
        let uids = server.add_messages("Work", 1);
        server.set_permanent_flags("Work", Flags::from_vec(vec![Flag::Seen, Flag::Deleted]));
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let err = session
            .update_user_flags("Work", &uids, &["$Project"], true)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CapabilityUnsupported);
        assert_eq!(server.call_count("UID STORE"), 0);
        Ok(())
    }
}

mod append {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_appenduid_used_when_available() -> Result<()> {
        let server = common::server();
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let uids = session
            .append_messages("Work", &[AppendMessage::new("Subject: a\r\n\r\nbody\r\n")])
            .await?;

        assert_eq!(uids, vec![Some(uid(1))]);
        assert_eq!(server.call_count("UID SEARCH"), 0);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_marker_search_without_uidplus() -> Result<()> {
        let server = common::server().with_capabilities(NO_UIDPLUS);
        server.add_messages("Work", 2);
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let messages = [
            AppendMessage::new("Subject: a\r\n\r\none\r\n"),
            AppendMessage::new("Subject: b\r\n\r\ntwo\r\n").with_flags(Flags::from_vec(vec![Flag::Seen])),
        ];
        let uids = session.append_messages("Work", &messages).await?;

        assert_eq!(uids, vec![Some(uid(3)), Some(uid(4))]);
        assert_eq!(server.call_count("UID SEARCH"), 2);
        let stored = server.messages("Work");
        assert!(stored[2].raw.starts_with(b"X-Mailkeeper-Marker: "));
        assert!(stored[3].flags.is_seen());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_keywords_dropped_where_not_storable() -> Result<()> {
        let server = common::server();
        server.set_permanent_flags("Work", Flags::from_vec(vec![Flag::Seen]));
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let flags = Flags::from_vec(vec![Flag::Seen, Flag::Keyword("$Label".to_string())]);
        let message = AppendMessage::new("Subject: k\r\n\r\nx\r\n").with_flags(flags);
        session.append_messages("Work", &[message]).await?;

        let append = server.calls_of("APPEND").pop().unwrap();
        assert!(!append.args.contains("$Label"));
        assert!(server.messages("Work")[0].flags.is_seen());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_full_sent_folder_named_in_error() -> Result<()> {
        let server = common::server();
        server
            .add_special_mailbox("Sent", SpecialUse::Sent)
            .set_message_limit("Sent", 0);
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let err = session
            .append_messages("Sent", &[AppendMessage::new("Subject: s\r\n\r\nx\r\n")])
            .await
            .unwrap_err();

        assert!(matches!(err, Error::QuotaExceeded { ref folder } if folder == "Sent"));
        Ok(())
    }
}

mod search {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_server_sort() -> Result<()> {
        let server = common::server();
        fruit(&server);
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let query = SearchQuery::default().sorted_by(SortKey::Subject, SortOrder::Ascending);
        let uids = session.search("Work", &query).await?;

        assert_eq!(uids, vec![uid(3), uid(1), uid(2)]);
        assert_eq!(server.call_count("UID SORT"), 1);
        assert_eq!(server.call_count("UID FETCH"), 0);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_rejected_sort_falls_back() -> Result<()> {
        let server = common::server();
        fruit(&server);
        server.fail_next("UID SORT", ImapError::Bad("SORT not available".to_string()));
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let query = SearchQuery::default().sorted_by(SortKey::Subject, SortOrder::Descending);
        let uids = session.search("Work", &query).await?;

        assert_eq!(uids, vec![uid(2), uid(1), uid(3)]);
        assert_eq!(server.call_count("UID SORT"), 1);
        assert_eq!(server.call_count("UID SEARCH"), 1);
        assert_eq!(server.call_count("UID FETCH"), 1);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_rejected_sort_without_fallback_fails() -> Result<()> {
        let server = common::server();
        fruit(&server);
        server.fail_next("UID SORT", ImapError::Bad("SORT not available".to_string()));
        let engine = common::engine(ImapProperties::builder().fallback_on_failed_sort(false).build()?);
        let mut session = common::session(&engine, &server);

        let query = SearchQuery::default().sorted_by(SortKey::Subject, SortOrder::Ascending);
        let err = session.search("Work", &query).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Protocol);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_flag_keys_sort_in_process() -> Result<()> {
        let server = common::server();
        server.add_message("Work", "Subject: a\r\n\r\nx\r\n", Flags::from_vec(vec![Flag::Flagged]));
        server.add_message("Work", "Subject: b\r\n\r\nx\r\n", Flags::new());
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let query = SearchQuery::default().sorted_by(SortKey::Flagged, SortOrder::Descending);
        let uids = session.search("Work", &query).await?;

        assert_eq!(uids, vec![uid(1), uid(2)]);
        assert_eq!(server.call_count("UID SORT"), 0);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_small_folder_filtered_in_process() -> Result<()> {
        let server = common::server();
        fruit(&server);
        let engine = common::engine(ImapProperties::builder().imap_search(false).build()?);
        let mut session = common::session(&engine, &server);

        let query = SearchQuery::new(SearchCriteria::Subject("CHERRY".to_string()));
        assert_eq!(session.search("Work", &query).await?, vec![uid(2)]);
        assert_eq!(server.call_count("UID SEARCH"), 0);

        let body = SearchQuery::new(SearchCriteria::Body("about apple".to_string()));
        assert_eq!(session.search("Work", &body).await?, vec![uid(3)]);
        assert_eq!(server.call_count("UID SEARCH"), 1);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_range_slices_sorted_result() -> Result<()> {
        let server = common::server();
        fruit(&server);
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let query = SearchQuery::default()
            .sorted_by(SortKey::Subject, SortOrder::Ascending)
            .slice(1..5);
        assert_eq!(session.search("Work", &query).await?, vec![uid(1), uid(2)]);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_empty_folder_issues_no_search() -> Result<()> {
        let server = common::server();
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        assert!(session.search("Work", &SearchQuery::default()).await?.is_empty());
        assert_eq!(server.call_count("UID SEARCH"), 0);
        Ok(())
    }
}

mod fetch {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_rejected_fetch_degrades_and_sticks() -> Result<()> {
        let server = common::server();
        let uids = server.add_messages("Work", 3);
        server.fail_next("UID FETCH", ImapError::Bad("BODYSTRUCTURE failed".to_string()));
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let messages = session.fetch("Work", &uids, FetchProfile::Full).await?;

        assert_eq!(messages.len(), 3);
        assert!(messages.iter().all(|m| m.body_structure.is_none()));
        assert_eq!(session.fetch_profile(), FetchProfile::NoStructure);

        session.fetch("Work", &uids, FetchProfile::Full).await?;
        let last = server.calls_of("UID FETCH").pop().unwrap();
        assert_eq!(last.args, format!("1:3 {}", FetchProfile::NoStructure.items()));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_leanest_profile_failure_surfaces() -> Result<()> {
        let server = common::server();
        let uids = server.add_messages("Work", 1);
        for _ in 0..3 {
            server.fail_next("UID FETCH", ImapError::Bad("FETCH failed".to_string()));
        }
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let err = session.fetch("Work", &uids, FetchProfile::Full).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(server.call_count("UID FETCH"), 3);
        assert_eq!(session.fetch_profile(), FetchProfile::HeadersOnly);
        Ok(())
    }
}
