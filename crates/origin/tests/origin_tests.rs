//! Origin client behavior against a mock HTTP origin

use edgenode_origin::{Error, OriginClient, OriginConfig};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> OriginConfig {
    OriginConfig {
        backoff_unit_ms: 1,
        ..OriginConfig::new(server.uri())
    }
}

async fn received(server: &MockServer) -> usize {
    server.received_requests().await.map_or(0, |r| r.len())
}

#[tokio::test]
async fn successful_pull_returns_body_and_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/css/site.css"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(b"body{}".to_vec(), "text/css; charset=utf-8"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = OriginClient::new(config_for(&server)).unwrap();
    let result = client.pull("/css/./site.css").await.unwrap();

    assert!(result.success);
    assert_eq!(result.key, "css/site.css");
    assert_eq!(result.content_type, "text/css");
    assert_eq!(result.size, 6);
    assert_eq!(&result.body[..], b"body{}");
    assert!(!result.cached);
    assert_eq!(result.url, format!("{}/css/site.css", server.uri()));
}

#[tokio::test]
async fn missing_content_type_falls_back_to_extension() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
        .mount(&server)
        .await;

    let client = OriginClient::new(config_for(&server)).unwrap();
    let result = client.pull("img/logo.png").await.unwrap();
    assert_eq!(result.content_type, "image/png");
}

#[tokio::test]
async fn server_errors_are_retried_until_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky.js"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;

    let client = OriginClient::new(OriginConfig {
        retry_attempts: 3,
        ..config_for(&server)
    })
    .unwrap();
    let err = client.pull("/flaky.js").await.unwrap_err();

    match err {
        Error::OriginFetchFailed { attempts, reason, .. } => {
            assert_eq!(attempts, 4);
            assert!(reason.contains("503"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(received(&server).await, 4);
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = OriginClient::new(config_for(&server)).unwrap();
    let err = client.pull("/gone.png").await.unwrap_err();
    assert!(matches!(err, Error::OriginNotFound { .. }));
    assert_eq!(received(&server).await, 1);
}

#[tokio::test]
async fn other_client_errors_fail_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private.png"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let client = OriginClient::new(config_for(&server)).unwrap();
    let err = client.pull("/private.png").await.unwrap_err();
    assert!(matches!(err, Error::OriginFetchFailed { attempts: 1, .. }));
}

#[tokio::test]
async fn oversized_body_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 2048]))
        .expect(1)
        .mount(&server)
        .await;

    let client = OriginClient::new(OriginConfig {
        max_body_bytes: 1024,
        ..config_for(&server)
    })
    .unwrap();
    let err = client.pull("/big.bin").await.unwrap_err();
    assert!(matches!(err, Error::BodyTooLarge { limit: 1024, .. }));
}

#[tokio::test]
async fn body_at_the_limit_is_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/exact.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 1024]))
        .mount(&server)
        .await;

    let client = OriginClient::new(OriginConfig {
        max_body_bytes: 1024,
        ..config_for(&server)
    })
    .unwrap();
    assert_eq!(client.pull("/exact.bin").await.unwrap().size, 1024);
}

#[tokio::test]
async fn redirect_chain_beyond_limit_fails() {
    let server = MockServer::start().await;
    for i in 0..10 {
        Mock::given(method("GET"))
            .and(path(format!("/r{i}.png")))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", format!("/r{}.png", i + 1)),
            )
            .mount(&server)
            .await;
    }

    let client = OriginClient::new(OriginConfig {
        redirect_limit: 3,
        ..config_for(&server)
    })
    .unwrap();
    let err = client.pull("/r0.png").await.unwrap_err();
    assert!(matches!(err, Error::RedirectLimitExceeded { limit: 3, .. }));
}

#[tokio::test]
async fn redirects_within_limit_are_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old.txt"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/new.txt"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
        .mount(&server)
        .await;

    let client = OriginClient::new(config_for(&server)).unwrap();
    let result = client.pull("/old.txt").await.unwrap();
    assert_eq!(&result.body[..], b"moved");
}

#[tokio::test]
async fn slow_origin_times_out_and_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.png"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let client = OriginClient::new(OriginConfig {
        timeout_secs: 1,
        retry_attempts: 1,
        ..config_for(&server)
    })
    .unwrap();
    let err = client.pull("/slow.png").await.unwrap_err();
    assert!(matches!(err, Error::OriginFetchFailed { attempts: 2, .. }));
}

#[tokio::test]
async fn denied_extension_wins_and_skips_network() {
    let server = MockServer::start().await;
    let client = OriginClient::new(OriginConfig {
        allowed_extensions: vec!["php".into(), "png".into()],
        denied_extensions: vec!["php".into()],
        ..config_for(&server)
    })
    .unwrap();

    let err = client.pull("/index.PHP").await.unwrap_err();
    assert!(matches!(err, Error::ExtensionDenied { .. }));
    let err = client.pull("/notes.txt").await.unwrap_err();
    assert!(matches!(err, Error::ExtensionNotAllowed { .. }));
    assert_eq!(received(&server).await, 0);
}

#[tokio::test]
async fn path_traversal_stays_under_base() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assets/secret.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let client = OriginClient::new(OriginConfig {
        base_url: format!("{}/assets", server.uri()),
        ..config_for(&server)
    })
    .unwrap();
    let result = client.pull("/../../secret.txt").await.unwrap();
    assert_eq!(result.key, "secret.txt");
}

#[tokio::test]
async fn prefetch_keeps_order_and_records_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a.css"))
        .respond_with(ResponseTemplate::new(200).set_body_string("a"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/c.css"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ccc"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b.css"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = OriginClient::new(OriginConfig {
        prefetch_concurrency: 2,
        ..config_for(&server)
    })
    .unwrap();
    let items = [
        format!("{}/a.css", server.uri()),
        "/b.css".to_string(),
        "c.css".to_string(),
    ];
    let report = client.prefetch(&items).await;

    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    let keys: Vec<&str> = report.results.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["a.css", "b.css", "c.css"]);
    assert!(!report.results[1].success);
    assert!(report.results[1].error.is_some());
    assert_eq!(report.results[2].size, 3);
}
