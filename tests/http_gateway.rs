use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use feedline::gateway::{
    Credential, GatewayError, HttpPostCatalog, HttpRelationships, PostCatalog, Relationships,
};
use serde_json::json;
use url::Url;

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn relationships(
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if bearer(&headers).as_deref() != Some("good-token") {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "no" })));
    }
    assert_eq!(query.get("type").map(String::as_str), Some("1"));
    assert_eq!(query.get("offset").map(String::as_str), Some("0"));
    assert_eq!(query.get("limit").map(String::as_str), Some("5000"));
    // Ids come back mixed: strings from one producer, integers from another.
    (StatusCode::OK, Json(json!({ "items": ["A", 42] })))
}

async fn posts(
    headers: HeaderMap,
    Path(author): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    match author.as_str() {
        "A" => {
            let limit: usize = query["limit"].parse().unwrap();
            let media = if bearer(&headers).is_some() {
                json!("https://cdn/a.jpg")
            } else {
                json!(null)
            };
            let items: Vec<_> = (0..limit.min(3))
                .map(|i| {
                    json!({
                        "id": 100 - i as i64,
                        "user_id": "A",
                        "media": media,
                        "description": "hello",
                        "created_at": "2024-05-01T12:00:00Z",
                    })
                })
                .collect();
            (StatusCode::OK, Json(json!({ "items": items })))
        }
        "slow" => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            (StatusCode::OK, Json(json!({ "items": [] })))
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "boom" }))),
    }
}

async fn serve() -> SocketAddr {
    let app = Router::new()
        .route("/api/relationships", get(relationships))
        .route("/api/users/{author}/posts", get(posts));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn base(addr: SocketAddr) -> Url {
    Url::parse(&format!("http://{addr}/api/")).unwrap()
}

#[tokio::test]
async fn following_forwards_bearer_and_normalises_ids() {
    let addr = serve().await;
    let client = HttpRelationships::new(base(addr), Duration::from_secs(5)).unwrap();

    let ids = client
        .following(&Credential::new("good-token"), 5000)
        .await
        .unwrap();
    assert_eq!(ids, vec!["A", "42"]);
}

#[tokio::test]
async fn following_surfaces_upstream_status() {
    let addr = serve().await;
    let client = HttpRelationships::new(base(addr), Duration::from_secs(5)).unwrap();

    let err = client
        .following(&Credential::new("bad-token"), 5000)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Status { status: 401, .. }));
}

#[tokio::test]
async fn recent_posts_honours_limit_and_optional_credential() {
    let addr = serve().await;
    let client = HttpPostCatalog::new(base(addr), Duration::from_secs(5)).unwrap();

    let posts = client
        .recent_posts("A", 2, Some(&Credential::new("t")))
        .await
        .unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].id, 100);
    assert_eq!(posts[0].user_id, "A");
    assert_eq!(posts[0].media.as_deref(), Some("https://cdn/a.jpg"));

    let anonymous = client.recent_posts("A", 10, None).await.unwrap();
    assert_eq!(anonymous.len(), 3);
    assert!(anonymous[0].media.is_none());
}

#[tokio::test]
async fn recent_posts_error_and_timeout() {
    let addr = serve().await;
    let client = HttpPostCatalog::new(base(addr), Duration::from_millis(200)).unwrap();

    assert!(matches!(
        client.recent_posts("broken", 5, None).await,
        Err(GatewayError::Status { status: 500, .. })
    ));
    assert!(matches!(
        client.recent_posts("slow", 5, None).await,
        Err(GatewayError::Http(_))
    ));
}
