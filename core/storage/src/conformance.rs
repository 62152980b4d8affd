//! Behaviour every repository backend must share.
//!
//! Each backend's test module calls these against a fresh instance.

use chrono::{DateTime, TimeZone, Utc};

use crate::repository::{LockTransition, VaultRepository};
use strongroom_common::{
    ClientMeta, Error, FileId, HistoryAction, HistoryEntry, ItemId, LockState,
    PersonalVaultItem, UnlockApproval, UserId, UserProfile, Vault, VaultFile, VaultId, VaultPin,
};

pub(crate) fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub(crate) fn uid(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

pub(crate) fn vid(id: &str) -> VaultId {
    VaultId::new(id).unwrap()
}

pub(crate) fn vault(id: &str, admin: &str, members: &[&str]) -> Vault {
    let mut vault = Vault::new(vid(id), format!("Vault {}", id), uid(admin), 600, at(0));
    vault.member_ids = members.iter().map(|m| uid(m)).collect();
    vault
}

pub(crate) fn file(id: &str, vault_id: &str, name: &str, created: i64) -> VaultFile {
    VaultFile {
        id: FileId::new(id).unwrap(),
        vault_id: vid(vault_id),
        encrypted_data: vec![1, 2, 3],
        iv: Some(vec![9; 36]),
        original_name: name.to_string(),
        mime_type: "text/plain".to_string(),
        size: 3,
        created_at: at(created),
    }
}

pub(crate) fn entry(vault_id: &str, user: &str, action: HistoryAction, ts: i64) -> HistoryEntry {
    HistoryEntry::new(
        vid(vault_id),
        uid(user),
        action,
        format!("{} at {}", action, ts),
        None,
        &ClientMeta {
            ip_address: Some("127.0.0.1".to_string()),
            user_agent: None,
        },
        at(ts),
    )
}

pub(crate) async fn membership_lookup(repo: &dyn VaultRepository) {
    repo.insert_vault(vault("v1", "admin", &["alice"])).await.unwrap();

    let found = repo
        .find_active_vault_for_member(&vid("v1"), &uid("alice"))
        .await
        .unwrap()
        .expect("member should see vault");
    assert_eq!(found.name, "Vault v1");
    assert!(found.member_ids.contains(&uid("alice")));
    assert_eq!(found.lock_state, LockState::Locked);

    assert!(repo
        .find_active_vault_for_member(&vid("v1"), &uid("admin"))
        .await
        .unwrap()
        .is_some());
    assert!(repo
        .find_active_vault_for_member(&vid("v1"), &uid("mallory"))
        .await
        .unwrap()
        .is_none());
    assert!(repo
        .find_active_vault_for_member(&vid("missing"), &uid("alice"))
        .await
        .unwrap()
        .is_none());

    assert!(repo.add_member(&vid("v1"), &uid("bob")).await.unwrap());
    assert!(!repo.add_member(&vid("v1"), &uid("bob")).await.unwrap());
    assert!(!repo.add_member(&vid("v1"), &uid("admin")).await.unwrap());
    assert!(matches!(
        repo.add_member(&vid("missing"), &uid("bob")).await,
        Err(Error::NotFoundOrUnauthorized)
    ));
    assert!(repo
        .find_active_vault_for_member(&vid("v1"), &uid("bob"))
        .await
        .unwrap()
        .is_some());
}

pub(crate) async fn lock_swap_is_compare_and_set(repo: &dyn VaultRepository) {
    repo.insert_vault(vault("v1", "admin", &[])).await.unwrap();
    let open = LockState::unlocked(at(10), 600);

    let opened = repo
        .swap_lock_state(
            &vid("v1"),
            LockTransition {
                expected: LockState::Locked,
                next: open.clone(),
                entry: Some(entry("v1", "admin", HistoryAction::VaultUnlock, 10)),
                clear_approvals: false,
            },
        )
        .await
        .unwrap();
    assert!(opened);

    let stale = repo
        .swap_lock_state(
            &vid("v1"),
            LockTransition {
                expected: LockState::Locked,
                next: LockState::unlocked(at(20), 600),
                entry: Some(entry("v1", "admin", HistoryAction::VaultUnlock, 20)),
                clear_approvals: false,
            },
        )
        .await
        .unwrap();
    assert!(!stale);

    let vault = repo
        .find_active_vault_for_member(&vid("v1"), &uid("admin"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(vault.lock_state, open);

    let closed = repo
        .swap_lock_state(
            &vid("v1"),
            LockTransition {
                expected: open,
                next: LockState::Locked,
                entry: Some(entry("v1", "admin", HistoryAction::AutoLock, 700)),
                clear_approvals: true,
            },
        )
        .await
        .unwrap();
    assert!(closed);

    let history = repo.list_history(&vid("v1"), 10, 0).await.unwrap();
    assert_eq!(history.total, 2);
    assert_eq!(history.entries[0].action, HistoryAction::AutoLock);
    assert_eq!(history.entries[1].action, HistoryAction::VaultUnlock);
}

pub(crate) async fn file_scoping(repo: &dyn VaultRepository) {
    repo.insert_file(file("f1", "va", "a.txt", 1)).await.unwrap();
    repo.insert_file(file("f2", "vb", "b.txt", 2)).await.unwrap();
    repo.insert_file(file("f3", "va", "c.txt", 3)).await.unwrap();

    let f1 = FileId::new("f1").unwrap();
    let stored = repo.find_file_in_vault(&vid("va"), &f1).await.unwrap().unwrap();
    assert_eq!(stored, file("f1", "va", "a.txt", 1));

    assert!(repo.find_file_in_vault(&vid("vb"), &f1).await.unwrap().is_none());

    let listed = repo.list_files(&vid("va")).await.unwrap();
    let names: Vec<_> = listed.iter().map(|f| f.original_name.as_str()).collect();
    assert_eq!(names, vec!["c.txt", "a.txt"]);
}

pub(crate) async fn personal_item_scoping(repo: &dyn VaultRepository) {
    let item = PersonalVaultItem {
        id: ItemId::new("i1").unwrap(),
        owner_id: uid("alice"),
        encrypted_data: vec![4, 5, 6],
        iv: None,
        original_name: "notes.md".to_string(),
        mime_type: "text/markdown".to_string(),
        size: 3,
        created_at: at(5),
    };
    repo.insert_personal_item(item.clone()).await.unwrap();

    let id = ItemId::new("i1").unwrap();
    assert_eq!(
        repo.find_personal_item(&uid("alice"), &id).await.unwrap(),
        Some(item)
    );
    assert!(repo.find_personal_item(&uid("bob"), &id).await.unwrap().is_none());
}

pub(crate) async fn history_paging(repo: &dyn VaultRepository) {
    for ts in [5, 1, 9, 3, 7] {
        repo.append_history(entry("v1", "alice", HistoryAction::FileDownload, ts))
            .await
            .unwrap();
    }
    repo.append_history(entry("other", "alice", HistoryAction::FileDownload, 100))
        .await
        .unwrap();

    let page = repo.list_history(&vid("v1"), 2, 0).await.unwrap();
    assert_eq!(page.total, 5);
    let stamps: Vec<_> = page.entries.iter().map(|e| e.timestamp).collect();
    assert_eq!(stamps, vec![at(9), at(7)]);

    let page = repo.list_history(&vid("v1"), 2, 4).await.unwrap();
    assert_eq!(page.entries.len(), 1);
    assert_eq!(page.entries[0].timestamp, at(1));
    assert_eq!(page.entries[0].ip_address.as_deref(), Some("127.0.0.1"));

    let page = repo.list_history(&vid("v1"), 10, 50).await.unwrap();
    assert!(page.entries.is_empty());
    assert_eq!(page.total, 5);

    let empty = repo.list_history(&vid("none"), 10, 0).await.unwrap();
    assert_eq!(empty.total, 0);
}

pub(crate) async fn batch_lookups(repo: &dyn VaultRepository) {
    for (id, name) in [("alice", "Alice"), ("bob", "Bob")] {
        repo.upsert_user(UserProfile {
            id: uid(id),
            display_name: name.to_string(),
            email: Some(format!("{}@example.com", id)),
        })
        .await
        .unwrap();
    }

    let mut users = repo
        .find_users(&[uid("alice"), uid("bob"), uid("alice"), uid("ghost")])
        .await
        .unwrap();
    users.sort_by(|a, b| a.id.cmp(&b.id));
    let names: Vec<_> = users.iter().map(|u| u.display_name.as_str()).collect();
    assert_eq!(names, vec!["Alice", "Bob"]);

    repo.insert_file(file("f1", "va", "a.txt", 1)).await.unwrap();
    repo.insert_file(file("f2", "vb", "b.txt", 2)).await.unwrap();
    let names = repo
        .find_file_names(
            &vid("va"),
            &[FileId::new("f1").unwrap(), FileId::new("f2").unwrap()],
        )
        .await
        .unwrap();
    assert_eq!(names, vec![(FileId::new("f1").unwrap(), "a.txt".to_string())]);

    assert!(repo.find_users(&[]).await.unwrap().is_empty());
}

pub(crate) async fn approvals_and_pins(repo: &dyn VaultRepository) {
    repo.put_vault_pin(VaultPin {
        vault_id: vid("v1"),
        user_id: uid("alice"),
        pin_hash: "hash-a".to_string(),
    })
    .await
    .unwrap();
    let pin = repo.find_vault_pin(&vid("v1"), &uid("alice")).await.unwrap();
    assert_eq!(pin.map(|p| p.pin_hash), Some("hash-a".to_string()));
    assert!(repo.find_vault_pin(&vid("v2"), &uid("alice")).await.unwrap().is_none());

    for (user, ts) in [("alice", 1), ("bob", 2), ("alice", 3)] {
        repo.record_unlock_approval(UnlockApproval {
            vault_id: vid("v1"),
            user_id: uid(user),
            approved_at: at(ts),
        })
        .await
        .unwrap();
    }
    let mut approvals = repo.list_unlock_approvals(&vid("v1")).await.unwrap();
    approvals.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    assert_eq!(approvals.len(), 2);
    assert_eq!(approvals[0].approved_at, at(3));

    repo.insert_vault(vault("v1", "alice", &["bob"])).await.unwrap();
    repo.swap_lock_state(
        &vid("v1"),
        LockTransition {
            expected: LockState::Locked,
            next: LockState::unlocked(at(4), 60),
            entry: None,
            clear_approvals: true,
        },
    )
    .await
    .unwrap();
    assert!(repo.list_unlock_approvals(&vid("v1")).await.unwrap().is_empty());
}

pub(crate) async fn deactivate(repo: &dyn VaultRepository) {
    repo.insert_vault(vault("v1", "admin", &["alice"])).await.unwrap();

    let removed = repo
        .deactivate_vault(&vid("v1"), entry("v1", "admin", HistoryAction::VaultDelete, 1))
        .await
        .unwrap();
    assert!(removed);
    assert!(repo
        .find_active_vault_for_member(&vid("v1"), &uid("admin"))
        .await
        .unwrap()
        .is_none());

    let again = repo
        .deactivate_vault(&vid("v1"), entry("v1", "admin", HistoryAction::VaultDelete, 2))
        .await
        .unwrap();
    assert!(!again);
    assert_eq!(repo.list_history(&vid("v1"), 10, 0).await.unwrap().total, 1);

    let swapped = repo
        .swap_lock_state(
            &vid("v1"),
            LockTransition {
                expected: LockState::Locked,
                next: LockState::unlocked(at(3), 60),
                entry: None,
                clear_approvals: false,
            },
        )
        .await
        .unwrap();
    assert!(!swapped);
}
