use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use sharedir::{
    config::AppConfig,
    server::{AppState, router},
};
use tempfile::{TempDir, tempdir};
use tower::ServiceExt;

/// share/a.txt and share/sub/b.txt, with a host file sitting next to the share.
fn share_tree() -> (TempDir, std::path::PathBuf) {
    let tmp = tempdir().expect("temp dir");
    let share = tmp.path().join("share");
    std::fs::create_dir_all(share.join("sub")).expect("create share dirs");
    std::fs::write(share.join("a.txt"), "contents of a").expect("write a.txt");
    std::fs::write(share.join("sub/b.txt"), "contents of b").expect("write b.txt");
    std::fs::create_dir_all(tmp.path().join("etc")).expect("create host dir");
    std::fs::write(tmp.path().join("etc/passwd"), "root:x:0:0").expect("write host file");
    (tmp, share)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    (status, content_type, body.to_vec())
}

#[tokio::test]
async fn flat_share_serves_only_root_children() {
    let (_tmp, share) = share_tree();
    let app = router(AppState::new(
        AppConfig::new(&share, false).expect("config"),
    ));

    let (status, content_type, body) = get(&app, "/a.txt").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/plain"));
    assert_eq!(body, b"contents of a");

    let (status, _, body) = get(&app, "/sub/b.txt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, b"unauthorized");

    let (status, _, body) = get(&app, "/sub/../../etc/passwd").await;
    assert!(
        status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED,
        "unexpected status {status}"
    );
    assert_ne!(body, b"root:x:0:0");

    let (status, content_type, body) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/html; charset=utf-8"));
    let html = String::from_utf8(body).expect("utf-8 listing");
    assert!(html.contains("<a href=\"/a.txt\">a.txt</a>"));
    assert!(html.contains("<a href=\"/sub\">sub/</a>"));
}

#[tokio::test]
async fn recursive_share_serves_nested_files() {
    let (_tmp, share) = share_tree();
    let app = router(AppState::new(AppConfig::new(&share, true).expect("config")));

    let (status, _, body) = get(&app, "/sub/b.txt").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"contents of b");

    let (status, _, body) = get(&app, "/sub").await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).expect("utf-8 listing");
    assert!(html.contains("<a href=\"/sub/b.txt\">b.txt</a>"));

    let (status, _, body) = get(&app, "/%2E%2E/etc/passwd").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_ne!(body, b"root:x:0:0");
}

#[tokio::test]
async fn every_root_listing_link_is_servable() {
    let (_tmp, share) = share_tree();
    std::fs::write(share.join("with space (1).txt"), "spaced").expect("write spaced file");
    let app = router(AppState::new(
        AppConfig::new(&share, false).expect("config"),
    ));

    let (_, _, body) = get(&app, "/").await;
    let html = String::from_utf8(body).expect("utf-8 listing");
    let hrefs = html
        .split("href=\"")
        .skip(1)
        .filter_map(|rest| rest.split('"').next())
        .filter(|href| !href.starts_with("/~"))
        .map(str::to_string)
        .collect::<Vec<_>>();
    assert_eq!(hrefs.len(), 3, "{hrefs:?}");

    for href in hrefs {
        let (status, _, _) = get(&app, &href).await;
        let expected = if href == "/sub" {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::OK
        };
        assert_eq!(status, expected, "{href}");
    }
}
