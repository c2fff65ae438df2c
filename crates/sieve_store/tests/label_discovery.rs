use std::collections::{BTreeMap, BTreeSet};

use sieve_store::{
    ArchiveStore, ArchiveWriteApi, ArchivedRecord, LabelDiscoveryApi, SieveConfig, SieveResult,
};
use tempfile::tempdir;
use uuid::Uuid;

fn labelled(labels: &[(&str, &str)]) -> ArchivedRecord {
    let uid = Uuid::new_v4().to_string();
    ArchivedRecord {
        name: format!("wf-{uid}"),
        uid,
        namespace: "argo".to_string(),
        phase: "Failed".to_string(),
        started_at: 1_700_000_000_000,
        finished_at: None,
        labels: labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}

#[tokio::test]
async fn label_keys_collapse_duplicates() -> SieveResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = SieveConfig::default_sqlite(base.join("discovery.sqlite").to_string_lossy());
    let store = ArchiveStore::connect(&config, base).await?;

    assert!(store.list_label_keys().await?.items.is_empty());

    store.archive_record(labelled(&[("env", "prod")])).await?;
    store.archive_record(labelled(&[("env", "dev")])).await?;
    store
        .archive_record(labelled(&[("team", "core"), ("env", "prod")]))
        .await?;

    let keys = store
        .list_label_keys()
        .await?
        .items
        .into_iter()
        .collect::<BTreeSet<_>>();
    assert_eq!(keys, BTreeSet::from(["env".to_string(), "team".to_string()]));
    Ok(())
}

#[tokio::test]
async fn label_values_are_distinct_per_key() -> SieveResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = SieveConfig::default_sqlite(base.join("discovery.sqlite").to_string_lossy());
    let store = ArchiveStore::connect(&config, base).await?;

    store.archive_record(labelled(&[("env", "prod")])).await?;
    store.archive_record(labelled(&[("env", "prod")])).await?;
    store
        .archive_record(labelled(&[("env", "dev"), ("team", "core")]))
        .await?;

    let mut values = store.list_label_values("env").await?.items;
    values.sort();
    assert_eq!(values, vec!["dev".to_string(), "prod".to_string()]);
    assert_eq!(store.list_label_values("team").await?.items, vec!["core"]);
    assert!(store.list_label_values("missing").await?.items.is_empty());
    Ok(())
}
