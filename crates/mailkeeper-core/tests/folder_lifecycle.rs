//! Folder lifecycle against the in-memory server.

#![allow(clippy::unwrap_used)]

mod common;

use anyhow::Result;
use mailkeeper_core::{CreateOptions, Error, ErrorKind, FolderUpdate, ImapProperties, Warning};
use mailkeeper_imap::{
    AclEntry, Error as ImapError, Flag, Flags, NamespaceDescriptor, Namespaces, QuotaResourceName,
    ResponseCode, Rights, SpecialUse,
};

fn shared_namespace() -> Namespaces {
    Namespaces {
        personal: vec![NamespaceDescriptor::new("", Some('/'))],
        other_users: Vec::new(),
        shared: vec![NamespaceDescriptor::new("Shared/", Some('/'))],
    }
}

mod create {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_wildcard_rejected_before_any_command() -> Result<()> {
        let server = common::server();
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let err = session
            .create_folder(None, "Alpha%Beta", CreateOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(matches!(err, Error::InvalidName { .. }));
        assert_eq!(server.call_count("CREATE"), 0);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_create_subscribes_and_applies_acl() -> Result<()> {
        let server = common::server();
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let options = CreateOptions {
            acls: vec![
                AclEntry::new("alice", Rights::all()),
                AclEntry::parse("bob", "lr"),
            ],
            ..CreateOptions::default()
        };
        let name = session.create_folder(Some("Work"), "Q1", options).await?;

        assert_eq!(name, "Work/Q1");
        assert!(server.exists("Work/Q1"));
        assert!(server.is_subscribed("Work/Q1"));
        let acl = server.acl("Work/Q1");
        assert!(acl
            .iter()
            .any(|e| e.identifier == "bob" && e.rights == Rights::parse("lr")));
        assert!(session.exists("Work/Q1").await?);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_acl_setup_removes_folder() -> Result<()> {
        let server = common::server();
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let options = CreateOptions {
            acls: vec![AclEntry::parse("bob", "lr")],
            ..CreateOptions::default()
        };
        let err = session
            .create_folder(Some("Work"), "Q1", options)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NoAdminAcl(_)));
        assert!(!server.exists("Work/Q1"));
        assert_eq!(server.call_count("DELETE"), 1);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_existing_name_is_duplicate() -> Result<()> {
        let server = common::server();
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let err = session
            .create_folder(None, "Work", CreateOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Duplicate);
        assert_eq!(server.call_count("CREATE"), 0);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_parent_rules() -> Result<()> {
        let server = common::server();
        server.add_mailbox("Flat").set_no_inferiors("Flat");
        let engine = common::engine(ImapProperties::builder().root_subfolders_allowed(false).build()?);
        let mut session = common::session(&engine, &server);

        let missing = session
            .create_folder(Some("Nowhere"), "A", CreateOptions::default())
            .await
            .unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let flat = session
            .create_folder(Some("Flat"), "A", CreateOptions::default())
            .await
            .unwrap_err();
        assert_eq!(flat.kind(), ErrorKind::Validation);

        let root = session
            .create_folder(None, "A", CreateOptions::default())
            .await
            .unwrap_err();
        assert_eq!(root.kind(), ErrorKind::Permission);
        assert_eq!(server.call_count("CREATE"), 0);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_server_limit_maps_to_validation() -> Result<()> {
        let server = common::server();
        server.fail_next("CREATE", ImapError::no(ResponseCode::Limit, "Too many mailboxes"));
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let err = session
            .create_folder(None, "Extra", CreateOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_special_use_announced_on_create() -> Result<()> {
        let server = common::server();
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let options = CreateOptions {
            special_use: Some(SpecialUse::Archive),
            subscribe: Some(false),
            ..CreateOptions::default()
        };
        session.create_folder(None, "Archive", options).await?;

        assert_eq!(server.special_use("Archive"), Some(SpecialUse::Archive));
        assert!(!server.is_subscribed("Archive"));
        assert_eq!(server.call_count("SETMETADATA"), 0);
        Ok(())
    }
}

mod rename {
    use super::*;

    fn tree() -> mailkeeper_imap::mock::MockServer {
        let server = common::server();
        server
            .add_mailbox("Projects/Q1/Jan")
            .subscribe("Projects")
            .subscribe("Projects/Q1")
            .subscribe("Projects/Q1/Jan");
        server
    }

    #[test_log::test(tokio::test)]
    async fn test_subscriptions_follow_the_subtree() -> Result<()> {
        let server = tree();
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let renamed = session.rename_folder("Projects", "Archive2024").await?;

        assert_eq!(renamed, "Archive2024");
        assert!(server.exists("Archive2024/Q1/Jan"));
        assert_eq!(
            server.subscriptions(),
            vec!["Archive2024", "Archive2024/Q1", "Archive2024/Q1/Jan", "INBOX"]
        );
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_rename_restores_subscriptions() -> Result<()> {
        let server = tree();
        server.fail_next("RENAME", ImapError::no(ResponseCode::Cannot, "Mailbox busy"));
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let err = session
            .rename_folder("Projects", "Archive2024")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(server.exists("Projects/Q1/Jan"));
        assert_eq!(
            server.subscriptions(),
            vec!["INBOX", "Projects", "Projects/Q1", "Projects/Q1/Jan"]
        );
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_broken_connection_reports_dropped_subscriptions() -> Result<()> {
        let server = tree();
        server.fail_after("UNSUBSCRIBE", 2, ImapError::ConnectionLost("reset by peer".to_string()));
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let err = session
            .rename_folder("Projects", "Archive2024")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(server.call_count("RENAME"), 0);
        assert_eq!(server.subscriptions(), vec!["INBOX", "Projects/Q1/Jan"]);
        let lost: Vec<String> = session
            .take_warnings()
            .into_iter()
            .filter_map(|w| match w {
                Warning::SubscriptionFailed { folder, .. } => Some(folder),
                _ => None,
            })
            .collect();
        assert_eq!(lost, vec!["Projects", "Projects/Q1"]);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_default_folders_keep_their_names() -> Result<()> {
        let server = common::server();
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        for name in ["INBOX", "Trash"] {
            let err = session.rename_folder(name, "Bin").await.unwrap_err();
            assert!(matches!(err, Error::DefaultFolder(_)), "{name}: {err}");
        }
        assert_eq!(server.call_count("RENAME"), 0);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_taken_name_is_duplicate() -> Result<()> {
        let server = tree();
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let err = session.rename_folder("Projects", "Work").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Duplicate);
        Ok(())
    }
}

mod relocate {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_same_namespace_is_one_rename() -> Result<()> {
        let server = common::server();
        server.add_mailbox("Projects/Q1");
        server.add_messages("Projects", 3);
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let moved = session.move_folder("Projects", Some("Work"), None).await?;

        assert_eq!(moved, "Work/Projects");
        assert_eq!(server.call_count("RENAME"), 1);
        assert_eq!(server.call_count("CREATE"), 0);
        assert_eq!(server.message_count("Work/Projects"), 3);
        assert!(server.exists("Work/Projects/Q1"));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_cross_namespace_copies_and_deletes() -> Result<()> {
        let server = common::server().with_namespaces(shared_namespace());
        server.add_mailbox("Shared/Team").add_mailbox("Projects/Q1");
        server.add_messages("Projects", 3);
        server.add_messages("Projects/Q1", 2);
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let moved = session
            .move_folder("Projects", Some("Shared/Team"), None)
            .await?;

        assert_eq!(moved, "Shared/Team/Projects");
        assert_eq!(server.call_count("RENAME"), 0);
        assert_eq!(server.call_count("CREATE"), 2);
        assert_eq!(server.call_count("DELETE"), 2);
        assert_eq!(server.message_count("Shared/Team/Projects"), 3);
        assert_eq!(server.message_count("Shared/Team/Projects/Q1"), 2);
        assert!(!server.exists("Projects"));
        assert!(!server.exists("Projects/Q1"));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_cross_namespace_failure_rolls_back() -> Result<()> {
        let server = common::server().with_namespaces(shared_namespace());
        server.add_mailbox("Shared/Team").add_mailbox("Projects");
        server.add_messages("Projects", 3);
        server.fail_next("UID COPY", ImapError::no(ResponseCode::OverQuota, "Quota exceeded"));
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let err = session
            .move_folder("Projects", Some("Shared/Team"), None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
        assert!(!server.exists("Shared/Team/Projects"));
        assert_eq!(server.message_count("Projects"), 3);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_move_into_own_subtree_rejected() -> Result<()> {
        let server = common::server();
        server.add_mailbox("Projects/Q1");
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let err = session
            .move_folder("Projects", Some("Projects/Q1"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(server.call_count("RENAME"), 0);
        Ok(())
    }
}

mod removal {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_delete_runs_bottom_up() -> Result<()> {
        let server = common::server();
        server.add_mailbox("Old/A/B").subscribe("Old/A");
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        session.delete_folder("Old").await?;

        let order: Vec<String> = server.calls_of("DELETE").into_iter().map(|c| c.args).collect();
        assert_eq!(order, vec!["Old/A/B", "Old/A", "Old"]);
        assert!(!server.is_subscribed("Old/A"));
        assert_eq!(server.mailbox_names(), vec!["INBOX", "Trash", "Work"]);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_default_folders_cannot_be_deleted() -> Result<()> {
        let server = common::server();
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        for name in ["INBOX", "Trash"] {
            let err = session.delete_folder(name).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
        assert_eq!(server.call_count("DELETE"), 0);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_trash_picks_a_free_name() -> Result<()> {
        let server = common::server();
        server.add_mailbox("Trash/Projects").add_mailbox("Projects");
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let trashed = session.trash_folder("Projects").await?;

        assert_eq!(trashed.as_deref(), Some("Trash/Projects_2"));
        assert!(server.exists("Trash/Projects"));
        assert!(!server.exists("Projects"));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_trashing_inside_trash_deletes() -> Result<()> {
        let server = common::server();
        server.add_mailbox("Trash/Old");
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        assert_eq!(session.trash_folder("Trash/Old").await?, None);
        assert!(!server.exists("Trash/Old"));
        Ok(())
    }
}

mod update {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_acl_replaced() -> Result<()> {
        let server = common::server();
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let update = FolderUpdate {
            acls: Some(vec![
                AclEntry::new("alice", Rights::all()),
                AclEntry::parse("staff", "lrs"),
            ]),
            subscribe: None,
        };
        session.update_folder("Work", update).await?;

        let acl = server.acl("Work");
        assert_eq!(acl.len(), 2);
        assert!(acl
            .iter()
            .any(|e| e.identifier == "staff" && e.rights == Rights::parse("lrs")));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_acl_without_admin_rejected() -> Result<()> {
        let server = common::server();
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let update = FolderUpdate {
            acls: Some(vec![AclEntry::parse("bob", "lr")]),
            subscribe: None,
        };
        let err = session.update_folder("Work", update).await.unwrap_err();

        assert!(matches!(err, Error::NoAdminAcl(_)));
        assert_eq!(server.call_count("SETACL"), 0);
        assert_eq!(server.call_count("DELETEACL"), 0);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_owner_keeps_full_rights_on_default_folder() -> Result<()> {
        let server = common::server();
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let update = FolderUpdate {
            acls: Some(vec![
                AclEntry::parse("alice", "lr"),
                AclEntry::new("bob", Rights::all()),
            ]),
            subscribe: None,
        };
        let err = session.update_folder("Trash", update).await.unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(server.call_count("SETACL"), 0);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_default_folder_stays_subscribed() -> Result<()> {
        let server = common::server();
        server.subscribe("Trash");
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let update = FolderUpdate {
            acls: None,
            subscribe: Some(false),
        };
        session.update_folder("Trash", update).await?;

        assert!(server.is_subscribed("Trash"));
        assert_eq!(
            session.take_warnings(),
            vec![Warning::DefaultFolderUnsubscribe {
                folder: "Trash".to_string()
            }]
        );
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_subscription_toggled() -> Result<()> {
        let server = common::server();
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let update = FolderUpdate {
            acls: None,
            subscribe: Some(true),
        };
        session.update_folder("Work", update).await?;

        assert!(server.is_subscribed("Work"));
        assert!(session.folder("Work").await?.unwrap().is_subscribed());
        Ok(())
    }
}

mod contents {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_clear_moves_messages_to_trash() -> Result<()> {
        let server = common::server();
        server.add_messages("Work", 3);
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        session.clear_folder("Work", false).await?;

        assert_eq!(server.message_count("Work"), 0);
        assert_eq!(server.message_count("Trash"), 3);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_hard_clear_skips_trash() -> Result<()> {
        let server = common::server();
        server.add_messages("Work", 3);
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        session.clear_folder("Work", true).await?;

        assert_eq!(server.message_count("Work"), 0);
        assert_eq!(server.message_count("Trash"), 0);
        assert_eq!(server.call_count("UID MOVE"), 0);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_large_trash_emptied_through_rename() -> Result<()> {
        let server = common::server();
        server.subscribe("Trash");
        server.add_messages("Trash", 8);
        let props = ImapProperties::builder()
            .fetch_limit(5)
            .allow_delete_trash_through_rename(true)
            .build()?;
        let engine = common::engine(props);
        let mut session = common::session(&engine, &server);

        session.clear_folder("Trash", false).await?;

        assert_eq!(server.call_count("RENAME"), 1);
        assert_eq!(server.message_count("Trash"), 0);
        assert_eq!(server.special_use("Trash"), Some(SpecialUse::Trash));
        assert!(server.is_subscribed("Trash"));
        assert_eq!(session.pending_purges().len(), 1);

        assert_eq!(session.run_deferred().await?, 1);
        assert!(session.pending_purges().is_empty());
        assert_eq!(server.mailbox_names(), vec!["INBOX", "Trash", "Work"]);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_trash_parked_in_purge_folder_gives_up_its_role() -> Result<()> {
        let server = common::server();
        server.add_mailbox("Purge");
        server.add_messages("Trash", 8);
        let props = ImapProperties::builder()
            .fetch_limit(5)
            .allow_delete_trash_through_rename(true)
            .purge_folder("Purge")
            .build()?;
        let engine = common::engine(props);
        let mut session = common::session(&engine, &server);

        session.clear_folder("Trash", false).await?;

        assert_eq!(session.trash_root().await?, "Trash");
        assert_eq!(server.special_use("Trash"), Some(SpecialUse::Trash));
        let parked: Vec<String> = server
            .mailbox_names()
            .into_iter()
            .filter(|name| name.starts_with("Purge/Trash-"))
            .collect();
        assert_eq!(parked.len(), 1);
        assert_eq!(server.special_use(&parked[0]), None);
        assert_eq!(server.message_count(&parked[0]), 8);

        assert!(session.pending_purges().is_empty());
        assert_eq!(session.run_deferred().await?, 0);
        assert!(server.exists(&parked[0]));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_interrupted_purge_stays_queued() -> Result<()> {
        let server = common::server();
        server.add_messages("Trash", 8);
        let props = ImapProperties::builder()
            .fetch_limit(5)
            .allow_delete_trash_through_rename(true)
            .build()?;
        let engine = common::engine(props);
        let mut session = common::session(&engine, &server);
        session.clear_folder("Trash", false).await?;
        let queued = session.pending_purges().to_vec();
        assert_eq!(queued.len(), 1);

        server.fail_next("DELETE", ImapError::ConnectionLost("reset by peer".to_string()));
        let err = session.run_deferred().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(session.pending_purges(), queued.as_slice());
        assert!(server.exists(&queued[0]));

        assert_eq!(session.run_deferred().await?, 1);
        assert!(!server.exists(&queued[0]));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_small_trash_cleared_in_place() -> Result<()> {
        let server = common::server();
        server.add_messages("Trash", 4);
        let engine = common::engine(ImapProperties::builder().allow_delete_trash_through_rename(true).build()?);
        let mut session = common::session(&engine, &server);

        session.clear_folder("Trash", false).await?;

        assert_eq!(server.call_count("RENAME"), 0);
        assert_eq!(server.message_count("Trash"), 0);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_expunge_backs_up_deleted_messages() -> Result<()> {
        let server = common::server();
        server.add_messages("Work", 4);
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);
        let uids: Vec<_> = server.messages("Work").iter().map(|m| m.uid).collect();
        let deleted = Flags::from_vec(vec![Flag::Deleted]);
        session.update_flags("Work", &uids[..2], &deleted, true).await?;

        session.expunge_folder("Work", false).await?;

        assert_eq!(server.message_count("Work"), 2);
        assert_eq!(server.message_count("Trash"), 2);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_quota_reported() -> Result<()> {
        let server = common::server();
        server.set_message_limit("Work", 10);
        server.add_messages("Work", 4);
        let engine = common::engine(ImapProperties::default());
        let mut session = common::session(&engine, &server);

        let quota = session.get_quota("Work").await?;

        assert_eq!(quota.len(), 1);
        assert_eq!(quota[0].name, QuotaResourceName::Message);
        assert_eq!((quota[0].usage, quota[0].limit), (4, 10));
        Ok(())
    }
}
