//! End-to-end staging/commit/decrypt flows over in-memory collaborators.

mod common;

use alloy_primitives::Address;
use common::Harness;
use vaultkit_core::kms::{AuthContext, AuthSignature};
use vaultkit_core::predicate::Predicate;
use vaultkit_core::types::FileData;
use vaultkit_core::VaultError;

const CHAIN: &str = "baseSepolia";

fn owner() -> Address {
    Address::repeat_byte(0x11)
}

fn owner_only(address: Address) -> Predicate {
    Predicate::identity(address, CHAIN.to_string())
}

#[tokio::test]
async fn stage_commit_decrypt_round_trip() {
    let harness = Harness::trusted().await;
    let mut session = harness.session(Some(owner()));

    let vault = session.register_data_source("docs").await.unwrap();
    session
        .add_file(
            FileData::new("report.pdf", b"quarterly numbers".to_vec()),
            &owner_only(owner()),
        )
        .await
        .unwrap();
    assert_eq!(session.staged_count(), 1);

    let location = session.commit_vault(vault.vault_id).await.unwrap();
    assert_eq!(session.staged_count(), 0);
    assert_eq!(
        session.get_vault(vault.vault_id).await.unwrap().manifest_location,
        location
    );

    let plaintext = session
        .decrypt_file(vault.vault_id, "report.pdf", None)
        .await
        .unwrap();
    assert_eq!(plaintext, b"quarterly numbers");
}

#[tokio::test]
async fn manifest_entries_are_indexed_in_staging_order() {
    let harness = Harness::trusted().await;
    let mut session = harness.session(Some(owner()));
    let vault = session.register_data_source("ordered").await.unwrap();

    for tag in ["a", "b", "c"] {
        session
            .add_file(FileData::new(tag, tag.as_bytes().to_vec()), &owner_only(owner()))
            .await
            .unwrap();
    }
    session.commit_vault(vault.vault_id).await.unwrap();

    let manifest = session.get_manifest(vault.vault_id).await.unwrap().unwrap();
    let seen: Vec<_> = manifest
        .entries
        .iter()
        .map(|e| (e.tag.as_str(), e.index))
        .collect();
    assert_eq!(seen, [("a", 0), ("b", 1), ("c", 2)]);
}

#[tokio::test]
async fn additive_upload_carries_existing_entries() {
    let harness = Harness::trusted().await;
    let mut session = harness.session(Some(owner()));
    let vault = session.register_data_source("grow").await.unwrap();

    session
        .add_file(FileData::new("first", b"one".to_vec()), &owner_only(owner()))
        .await
        .unwrap();
    session.commit_vault(vault.vault_id).await.unwrap();

    session
        .upload(
            vault.vault_id,
            vec![FileData::new("second", b"two".to_vec())],
            |_| owner_only(owner()),
            false,
        )
        .await
        .unwrap();

    let manifest = session.get_manifest(vault.vault_id).await.unwrap().unwrap();
    assert_eq!(manifest.entries.len(), 2);
    assert_eq!(manifest.entries[0].tag, "first");
    assert_eq!(manifest.entries[1].tag, "second");
    assert_eq!(
        session.decrypt_file(vault.vault_id, "first", None).await.unwrap(),
        b"one"
    );

    // The superseded manifest blob was cleaned up best-effort.
    assert_eq!(harness.store.deleted_ids().len(), 1);
}

#[tokio::test]
async fn overwrite_upload_replaces_the_vault() {
    let harness = Harness::trusted().await;
    let mut session = harness.session(Some(owner()));
    let vault = session.register_data_source("replace").await.unwrap();

    session
        .add_file(FileData::new("old", b"old".to_vec()), &owner_only(owner()))
        .await
        .unwrap();
    session.commit_vault(vault.vault_id).await.unwrap();

    session
        .upload(
            vault.vault_id,
            vec![FileData::new("new", b"new".to_vec())],
            |_| owner_only(owner()),
            true,
        )
        .await
        .unwrap();

    let manifest = session.get_manifest(vault.vault_id).await.unwrap().unwrap();
    assert_eq!(manifest.entries.len(), 1);
    assert_eq!(manifest.entries[0].tag, "new");
}

#[tokio::test]
async fn committing_nothing_is_a_staging_error() {
    let harness = Harness::trusted().await;
    let mut session = harness.session(Some(owner()));
    let vault = session.register_data_source("empty").await.unwrap();

    match session.commit_vault(vault.vault_id).await {
        Err(VaultError::Staging(_)) => (),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn failed_registry_update_keeps_staging_intact() {
    let harness = Harness::trusted().await;
    let mut session = harness.session(Some(owner()));
    let vault = session.register_data_source("retry").await.unwrap();

    session
        .add_file(FileData::new("doc", b"data".to_vec()), &owner_only(owner()))
        .await
        .unwrap();

    harness.registry.fail_next_update();
    assert!(matches!(
        session.commit_vault(vault.vault_id).await,
        Err(VaultError::Upstream(_))
    ));
    assert_eq!(session.staged_count(), 1);

    // The retry publishes the same staged entries.
    session.commit_vault(vault.vault_id).await.unwrap();
    assert_eq!(
        session.decrypt_file(vault.vault_id, "doc", None).await.unwrap(),
        b"data"
    );
}

#[tokio::test]
async fn restaging_a_tag_replaces_its_content() {
    let harness = Harness::trusted().await;
    let mut session = harness.session(Some(owner()));
    let vault = session.register_data_source("restage").await.unwrap();

    session
        .add_file(FileData::new("doc", b"v1".to_vec()), &owner_only(owner()))
        .await
        .unwrap();
    session
        .add_file(FileData::new("doc", b"v2".to_vec()), &owner_only(owner()))
        .await
        .unwrap();
    assert_eq!(session.staged_count(), 1);

    session.commit_vault(vault.vault_id).await.unwrap();
    assert_eq!(
        session.decrypt_file(vault.vault_id, "doc", None).await.unwrap(),
        b"v2"
    );
}

#[tokio::test]
async fn remove_file_unstages() {
    let harness = Harness::trusted().await;
    let mut session = harness.session(Some(owner()));

    session
        .add_file(FileData::new("doc", b"data".to_vec()), &owner_only(owner()))
        .await
        .unwrap();
    assert!(session.remove_file("doc"));
    assert!(!session.remove_file("doc"));
    assert_eq!(session.staged_count(), 0);
}

#[tokio::test]
async fn unknown_vault_and_tag_are_not_found() {
    let harness = Harness::trusted().await;
    let mut session = harness.session(Some(owner()));
    let vault = session.register_data_source("lookup").await.unwrap();

    assert!(matches!(
        session.get_vault(alloy_primitives::B256::repeat_byte(0xEE)).await,
        Err(VaultError::NotFound(_))
    ));

    session
        .add_file(FileData::new("doc", b"data".to_vec()), &owner_only(owner()))
        .await
        .unwrap();
    session.commit_vault(vault.vault_id).await.unwrap();
    assert!(matches!(
        session.decrypt_file(vault.vault_id, "missing", None).await,
        Err(VaultError::NotFound(_))
    ));
}

#[tokio::test]
async fn writes_require_a_signer() {
    let harness = Harness::trusted().await;
    let mut session = harness.session(None);

    assert!(matches!(
        session
            .add_file(FileData::new("doc", b"data".to_vec()), &owner_only(owner()))
            .await,
        Err(VaultError::Configuration(_))
    ));
    assert!(matches!(
        session.register_data_source("nope").await,
        Err(VaultError::Configuration(_))
    ));
}

#[tokio::test]
async fn wrong_caller_is_denied() {
    let harness = Harness::trusted().await;
    let mut writer = harness.session(Some(owner()));
    let vault = writer.register_data_source("private").await.unwrap();

    writer
        .add_file(FileData::new("secret", b"mine".to_vec()), &owner_only(owner()))
        .await
        .unwrap();
    writer.commit_vault(vault.vault_id).await.unwrap();

    let stranger = harness.session(Some(Address::repeat_byte(0x99)));
    match stranger.decrypt_file(vault.vault_id, "secret", None).await {
        Err(VaultError::AccessDenied(reason)) => {
            assert!(reason.contains("does not match"));
        }
        other => panic!("unexpected result: {other:?}"),
    }

    // The owner still reads it.
    assert_eq!(
        writer.decrypt_file(vault.vault_id, "secret", None).await.unwrap(),
        b"mine"
    );
}

#[tokio::test]
async fn supplied_auth_context_overrides_the_session_signer() {
    let harness = Harness::trusted().await;
    let mut writer = harness.session(Some(owner()));
    let vault = writer.register_data_source("delegated").await.unwrap();

    writer
        .add_file(FileData::new("secret", b"mine".to_vec()), &owner_only(owner()))
        .await
        .unwrap();
    writer.commit_vault(vault.vault_id).await.unwrap();

    let owner_proof = AuthContext {
        address: owner(),
        signature: Some(AuthSignature {
            sig: "0xdeadbeef".to_string(),
            derived_via: "web3.eth.personal.sign".to_string(),
            signed_message: "vault access".to_string(),
        }),
    };

    // A signerless session reads with caller-supplied proof material.
    let reader = harness.session(None);
    assert!(matches!(
        reader.decrypt_file(vault.vault_id, "secret", None).await,
        Err(VaultError::Configuration(_))
    ));
    assert_eq!(
        reader
            .decrypt_file(vault.vault_id, "secret", Some(owner_proof.clone()))
            .await
            .unwrap(),
        b"mine"
    );

    // The supplied context wins over the bound signer in both directions.
    let stranger = harness.session(Some(Address::repeat_byte(0x99)));
    assert_eq!(
        stranger
            .decrypt_file(vault.vault_id, "secret", Some(owner_proof))
            .await
            .unwrap(),
        b"mine"
    );
    assert!(matches!(
        writer
            .decrypt_file(
                vault.vault_id,
                "secret",
                Some(AuthContext::unsigned(Address::repeat_byte(0x99))),
            )
            .await,
        Err(VaultError::AccessDenied(_))
    ));
}
