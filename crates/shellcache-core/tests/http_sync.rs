//! End-to-end tests against a local HTTP origin.

use std::sync::Arc;

use httpmock::prelude::*;
use shellcache_core::store::{CONTENT_STORE, STAGING_STORE};
use shellcache_core::{
    CacheStorage, FetchError, HttpFetcher, Manifest, ManifestBundle, Origin, Phase, Registry,
    Request, SyncError,
};
use tempfile::TempDir;
use url::Url;

fn bundle(pairs: &[(&str, &str)], core: &[&str]) -> ManifestBundle {
    let manifest: Manifest = pairs.iter().copied().collect();
    ManifestBundle::new(manifest, core.iter().map(|s| s.to_string()).collect()).unwrap()
}

fn registry(temp: &TempDir, origin: &str) -> Registry {
    Registry::new(
        CacheStorage::new(temp.path().to_path_buf()),
        Origin::parse(origin).unwrap(),
        Arc::new(HttpFetcher::with_default_timeout().unwrap()),
    )
}

fn get(url: &str) -> Request {
    Request::get(Url::parse(url).unwrap())
}

#[tokio::test]
async fn install_bypasses_caches_and_serves_cached_copies() {
    let server = MockServer::start_async().await;
    let index_install = server
        .mock_async(|when, then| {
            when.method(GET).path("/").header("cache-control", "no-cache");
            then.status(200).header("content-type", "text/html").body("<html>v1</html>");
        })
        .await;
    let index_runtime = server
        .mock_async(|when, then| {
            when.method(GET).path("/").header_missing("cache-control");
            then.status(200).header("content-type", "text/html").body("<html>v1 live</html>");
        })
        .await;
    let main = server
        .mock_async(|when, then| {
            when.method(GET).path("/main.js").header("cache-control", "no-cache");
            then.status(200).body("main v1");
        })
        .await;
    let app = server
        .mock_async(|when, then| {
            when.method(GET).path("/app.js");
            then.status(200).body("app v1");
        })
        .await;

    let temp = TempDir::new().unwrap();
    let mut registry = registry(&temp, &server.base_url());
    let generation = registry
        .deploy(bundle(&[("/", "r1"), ("main.js", "m1"), ("app.js", "a1")], &["main.js", "/"]))
        .await
        .unwrap();
    assert_eq!(generation.phase(), Phase::Ready);
    assert!(!registry.storage().has(STAGING_STORE).await);

    let shell = registry
        .handle(&get(&format!("{}/#/settings", server.base_url())))
        .await
        .unwrap()
        .unwrap();
    // The shell is revalidated with a plain request once installed
    assert_eq!(shell.body, b"<html>v1 live</html>");
    assert_eq!(shell.header("content-type"), Some("text/html"));
    index_install.assert_calls_async(1).await;
    index_runtime.assert_calls_async(1).await;
    main.assert_calls_async(1).await;

    let versioned = format!("{}/app.js?v=3", server.base_url());
    let first = registry.handle(&get(&versioned)).await.unwrap().unwrap();
    assert_eq!(first.body, b"app v1");

    // Served from the cache; the origin sees no second request
    let second = registry.handle(&get(&versioned)).await.unwrap().unwrap();
    assert_eq!(second.body, b"app v1");
    app.assert_calls_async(1).await;
}

#[tokio::test]
async fn upgrade_refetches_only_changed_core() {
    let server = MockServer::start_async().await;
    let temp = TempDir::new().unwrap();
    let mut registry = registry(&temp, &server.base_url());

    let mut v1 = Vec::new();
    for (path, body) in [("/", "index v1"), ("/main.js", "main v1"), ("/logo.png", "logo")] {
        v1.push(
            server
                .mock_async(move |when, then| {
                    when.method(GET).path(path);
                    then.status(200).body(body);
                })
                .await,
        );
    }
    registry
        .deploy(bundle(&[("/", "r1"), ("main.js", "m1"), ("logo.png", "l1")], &["main.js", "/"]))
        .await
        .unwrap();
    registry
        .handle(&get(&format!("{}/logo.png", server.base_url())))
        .await
        .unwrap();
    for mock in v1 {
        mock.delete_async().await;
    }

    for (path, body) in [("/", "index v2"), ("/main.js", "main v2")] {
        server
            .mock_async(move |when, then| {
                when.method(GET).path(path);
                then.status(200).body(body);
            })
            .await;
    }
    registry
        .deploy(bundle(&[("/", "r2"), ("main.js", "m2"), ("logo.png", "l1")], &["main.js", "/"]))
        .await
        .unwrap();

    let content = registry.storage().store(CONTENT_STORE);
    let main = content
        .get(&format!("{}/main.js", server.base_url()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(main.body, b"main v2");
    // Unchanged identifier: kept across the upgrade without a refetch
    let logo = content
        .get(&format!("{}/logo.png", server.base_url()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(logo.body, b"logo");
}

#[tokio::test]
async fn install_fails_on_error_status() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/main.js");
            then.status(500).body("oops");
        })
        .await;

    let temp = TempDir::new().unwrap();
    let mut registry = registry(&temp, &server.base_url());
    let err = registry
        .deploy(bundle(&[("/", "r1"), ("main.js", "m1")], &["main.js"]))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::InstallFailed(_)));
    assert!(registry.active().is_none());
    assert!(registry.storage().store(STAGING_STORE).is_empty().await.unwrap());
}

#[tokio::test]
async fn unreachable_origin_propagates_network_error() {
    // Reserve a port, then free it so nothing is listening
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let origin = format!("http://127.0.0.1:{}", port);
    let fetcher = HttpFetcher::with_default_timeout().unwrap();

    let err = shellcache_core::Fetcher::fetch(
        &fetcher,
        &Url::parse(&format!("{}/", origin)).unwrap(),
        shellcache_core::FetchMode::Default,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, FetchError::Network { .. }));
    assert!(err.is_network_failure());
}
