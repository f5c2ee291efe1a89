//! Screen lifecycle tests: create, upload, read, rollback, listing

use bytes::Bytes;
use screenvault::{
    AppId, BlobStore, MemoryBlobStore, MemoryMetadataStore, ScreenDetails, ScreenDetailsPatch,
    ScreenName, ScreenQuery, ScreenVersion, VaultError, VersionManager,
};

type Manager = VersionManager<MemoryBlobStore, MemoryMetadataStore>;

fn manager() -> Manager {
    VersionManager::new(MemoryBlobStore::new(), MemoryMetadataStore::new())
}

fn app() -> AppId {
    AppId::new("dev-1", "com.example.shop").unwrap()
}

fn screen(name: &str) -> ScreenName {
    ScreenName::new(name).unwrap()
}

fn v(raw: &str) -> ScreenVersion {
    ScreenVersion::parse(raw).unwrap()
}

fn doc(tag: &str) -> Bytes {
    Bytes::from(format!("{{\"screen\":\"{}\"}}", tag))
}

#[tokio::test]
async fn test_create_then_read_current() {
    let m = manager();
    let home = screen("home");

    let record = m
        .create(&app(), &home, &v("1.0.0"), doc("a"), ScreenDetails::default())
        .await
        .unwrap();
    assert_eq!(record.current_version, v("1.0.0"));
    assert!(record.ledger.is_empty());
    assert_eq!(record.revision, 1);
    assert_eq!(record.content_type, "application/json");

    let content = m.get_version(&app(), &home, &v("1.0.0")).await.unwrap();
    assert_eq!(content.data, doc("a"));

    let keys = m.keys(&app(), &home);
    assert_eq!(
        m.blobs().keys(),
        vec![
            "apps/com.example.shop/home/latest.json".to_string(),
            "apps/com.example.shop/home/v1.0.0.json".to_string(),
        ]
    );
    assert_eq!(record.current_blob_key, keys.latest());
}

#[tokio::test]
async fn test_create_twice_rejected() {
    let m = manager();
    let home = screen("home");
    m.create(&app(), &home, &v("1.0.0"), doc("a"), ScreenDetails::default())
        .await
        .unwrap();

    let err = m
        .create(&app(), &home, &v("2.0.0"), doc("b"), ScreenDetails::default())
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::AlreadyExists(_)));

    let record = m.describe(&app(), &home).await.unwrap();
    assert_eq!(record.current_version, v("1.0.0"));
}

#[tokio::test]
async fn test_upload_must_advance() {
    let m = manager();
    let home = screen("home");
    m.create(&app(), &home, &v("1.0.0"), doc("a"), ScreenDetails::default())
        .await
        .unwrap();
    m.upload(&app(), &home, &v("1.0.1"), doc("b")).await.unwrap();

    for stale in ["1.0.0", "1.0.1", "0.9.9"] {
        let err = m.upload(&app(), &home, &v(stale), doc("x")).await.unwrap_err();
        match err {
            VaultError::VersionNotAdvancing { submitted, current } => {
                assert_eq!(submitted, stale);
                assert_eq!(current, "1.0.1");
            }
            other => panic!("expected VersionNotAdvancing, got {:?}", other),
        }
    }

    let record = m.describe(&app(), &home).await.unwrap();
    assert_eq!(record.current_version, v("1.0.1"));
    assert_eq!(record.ledger.len(), 1);
}

#[tokio::test]
async fn test_upload_to_missing_screen() {
    let m = manager();
    let err = m
        .upload(&app(), &screen("ghost"), &v("1.0.0"), doc("a"))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::NotFound(_)));
}

#[tokio::test]
async fn test_every_version_stays_readable() {
    let m = manager();
    let home = screen("home");
    m.create(&app(), &home, &v("1.0.0"), doc("1.0.0"), ScreenDetails::default())
        .await
        .unwrap();

    let uploads = ["1.0.1", "1.2.0", "1.10.0", "2.0.0"];
    for raw in uploads {
        m.upload(&app(), &home, &v(raw), doc(raw)).await.unwrap();
    }

    let record = m.describe(&app(), &home).await.unwrap();
    assert_eq!(record.ledger.len(), uploads.len());
    assert_eq!(record.current_version, v("2.0.0"));

    for raw in ["1.0.0", "1.0.1", "1.2.0", "1.10.0", "2.0.0"] {
        let content = m.get_version(&app(), &home, &v(raw)).await.unwrap();
        assert_eq!(content.data, doc(raw), "content of {}", raw);
        assert_eq!(content.version, v(raw));
    }

    let err = m.get_version(&app(), &home, &v("1.5.0")).await.unwrap_err();
    assert!(matches!(err, VaultError::NotFound(_)));
}

#[tokio::test]
async fn test_list_versions_descending() {
    let m = manager();
    let home = screen("home");
    m.create(&app(), &home, &v("1.0.0"), doc("a"), ScreenDetails::default())
        .await
        .unwrap();
    m.upload(&app(), &home, &v("1.2.0"), doc("b")).await.unwrap();
    m.upload(&app(), &home, &v("1.10.0"), doc("c")).await.unwrap();

    let versions = m.list_versions(&app(), &home).await.unwrap();
    let listed: Vec<String> = versions.iter().map(|info| info.version.to_string()).collect();
    assert_eq!(listed, vec!["1.10.0", "1.2.0", "1.0.0"]);

    assert!(versions[0].is_current);
    assert!(versions[0].archived_at.is_none());
    assert!(versions[1..].iter().all(|info| !info.is_current && info.archived_at.is_some()));
}

#[tokio::test]
async fn test_rollback_mints_next_patch() {
    let m = manager();
    let home = screen("home");
    m.create(&app(), &home, &v("1.0.0"), doc("original"), ScreenDetails::default())
        .await
        .unwrap();
    m.upload(&app(), &home, &v("2.0.0"), doc("second")).await.unwrap();

    let record = m.rollback(&app(), &home, &v("1.0.0")).await.unwrap();
    assert_eq!(record.current_version, v("2.0.1"));
    assert_eq!(record.ledger.len(), 2);

    let current = m.get_version(&app(), &home, &v("2.0.1")).await.unwrap();
    assert_eq!(current.data, doc("original"));

    let keys = m.keys(&app(), &home);
    assert_eq!(m.blobs().get(&keys.latest()).await.unwrap(), doc("original"));

    // History is untouched.
    let target = m.get_version(&app(), &home, &v("1.0.0")).await.unwrap();
    assert_eq!(target.data, doc("original"));
    let superseded = m.get_version(&app(), &home, &v("2.0.0")).await.unwrap();
    assert_eq!(superseded.data, doc("second"));
}

#[tokio::test]
async fn test_rollback_rejections() {
    let m = manager();
    let home = screen("home");
    m.create(&app(), &home, &v("1.0.0"), doc("a"), ScreenDetails::default())
        .await
        .unwrap();
    m.upload(&app(), &home, &v("1.1.0"), doc("b")).await.unwrap();

    let to_current = m.rollback(&app(), &home, &v("1.1.0")).await.unwrap_err();
    assert!(matches!(to_current, VaultError::InvalidRollback(_)));

    let unknown = m.rollback(&app(), &home, &v("0.5.0")).await.unwrap_err();
    assert!(matches!(unknown, VaultError::InvalidRollback(_)));

    let record = m.describe(&app(), &home).await.unwrap();
    assert_eq!(record.current_version, v("1.1.0"));
    assert_eq!(record.revision, 2);
}

#[tokio::test]
async fn test_fetch_counts_access_and_requires_active() {
    let m = manager();
    let home = screen("home");
    m.create(&app(), &home, &v("1.0.0"), doc("a"), ScreenDetails::default())
        .await
        .unwrap();

    let fetched = m.fetch(&app(), &home).await.unwrap();
    assert_eq!(fetched.data, doc("a"));
    m.fetch(&app(), &home).await.unwrap();

    let record = m.describe(&app(), &home).await.unwrap();
    assert_eq!(record.access_count, 2);
    assert!(record.last_accessed.is_some());

    let check = m.current_version(&app(), &home).await.unwrap();
    assert_eq!(check.version, v("1.0.0"));

    m.update_details(
        &app(),
        &home,
        ScreenDetailsPatch {
            is_active: Some(false),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert!(matches!(
        m.fetch(&app(), &home).await,
        Err(VaultError::Inactive(_))
    ));
    assert!(matches!(
        m.current_version(&app(), &home).await,
        Err(VaultError::Inactive(_))
    ));

    // Operator reads ignore the active flag.
    assert!(m.get_version(&app(), &home, &v("1.0.0")).await.is_ok());
}

#[tokio::test]
async fn test_update_details_keeps_versions() {
    let m = manager();
    let home = screen("home");
    m.create(&app(), &home, &v("1.0.0"), doc("a"), ScreenDetails::default())
        .await
        .unwrap();

    let record = m
        .update_details(
            &app(),
            &home,
            ScreenDetailsPatch {
                display_name: Some("Home Screen".into()),
                tags: Some(vec!["landing".into()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(record.display_name(), "Home Screen");
    assert_eq!(record.details.tags, vec!["landing".to_string()]);
    assert_eq!(record.current_version, v("1.0.0"));
    assert_eq!(record.revision, 2);

    let unchanged = m
        .update_details(&app(), &home, ScreenDetailsPatch::default())
        .await
        .unwrap();
    assert_eq!(unchanged.revision, 2);
}

#[tokio::test]
async fn test_list_screens_query() {
    let m = manager();
    let other = AppId::new("dev-2", "com.example.other").unwrap();

    for name in ["home", "cart", "checkout"] {
        m.create(&app(), &screen(name), &v("1.0.0"), doc(name), ScreenDetails::default())
            .await
            .unwrap();
    }
    m.create(&other, &screen("home"), &v("1.0.0"), doc("x"), ScreenDetails::default())
        .await
        .unwrap();
    m.update_details(
        &app(),
        &screen("cart"),
        ScreenDetailsPatch {
            is_active: Some(false),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let all = m.list_screens(&app(), &ScreenQuery::default()).await.unwrap();
    assert_eq!(all.total, 3);

    let active = m
        .list_screens(
            &app(),
            &ScreenQuery {
                is_active: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(active.total, 2);

    let search = m
        .list_screens(
            &app(),
            &ScreenQuery {
                search: Some("CHECK".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(search.total, 1);
    assert_eq!(search.screens[0].name.as_str(), "checkout");

    let paged = m
        .list_screens(
            &app(),
            &ScreenQuery {
                limit: 2,
                page: 2,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(paged.pages, 2);
    assert_eq!(paged.screens.len(), 1);
}
