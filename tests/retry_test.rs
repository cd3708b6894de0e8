use std::time::{Duration, Instant};

use axum::{http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};

use hydroflow::{Backoff, FetchError, RetryClient};

mod common;
use common::Recorder;

fn status_upstream(rec: Recorder, status: StatusCode) -> Router {
    // ---
    Router::new().route(
        "/api",
        post(move |Json(body): Json<Value>| {
            let rec = rec.clone();
            async move {
                rec.record(body, None);
                (status, "upstream says no")
            }
        }),
    )
}

#[tokio::test]
async fn persistent_503_stops_after_max_attempts() {
    // ---
    let rec = Recorder::default();
    let base = common::serve(status_upstream(rec.clone(), StatusCode::SERVICE_UNAVAILABLE)).await;

    let base_delay = Duration::from_millis(40);
    let client = RetryClient::new(Backoff {
        base_delay,
        max_delay: Duration::from_secs(5),
        jitter: true,
    })
    .unwrap();

    let started = Instant::now();
    let err = client
        .call_with_retry(
            &format!("{base}/api"),
            &json!({"data": {}}),
            3,
            Duration::from_secs(2),
        )
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(rec.hits(), 3);
    assert!(matches!(err, FetchError::Status { status: 503, attempts: 3, .. }));
    // Two sleeps: base*1 and base*2, each with at most 30% jitter
    assert!(elapsed >= base_delay * 3, "{elapsed:?}");
    assert!(elapsed <= base_delay.mul_f64((1.0 + 2.0 + 4.0) * 1.3) + Duration::from_millis(200));
}

#[tokio::test]
async fn client_error_is_not_retried() {
    // ---
    let rec = Recorder::default();
    let base = common::serve(status_upstream(rec.clone(), StatusCode::NOT_FOUND)).await;

    let err = common::client()
        .call_with_retry(&format!("{base}/api"), &json!({}), 5, Duration::from_secs(2))
        .await
        .unwrap_err();

    assert_eq!(rec.hits(), 1);
    assert_eq!(err.status(), Some(404));
    match err {
        FetchError::Status { body, attempts, .. } => {
            assert_eq!(attempts, 1);
            assert_eq!(body, "upstream says no");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn throttling_is_retried_until_success() {
    // ---
    let rec = Recorder::default();
    let router = {
        let rec = rec.clone();
        Router::new().route(
            "/api",
            post(move |Json(body): Json<Value>| {
                let rec = rec.clone();
                async move {
                    rec.record(body, None);
                    if rec.hits() < 3 {
                        (StatusCode::TOO_MANY_REQUESTS, Json(json!({"error": "slow down"})))
                    } else {
                        (StatusCode::OK, Json(json!({"dtData": [1, 2, 3]})))
                    }
                }
            }),
        )
    };
    let base = common::serve(router).await;

    let body = common::client()
        .call_with_retry(&format!("{base}/api"), &json!({}), 3, Duration::from_secs(2))
        .await
        .unwrap();

    assert_eq!(rec.hits(), 3);
    assert_eq!(body["dtData"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn unreachable_upstream_reports_no_response() {
    // ---
    // Bind and drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = common::client()
        .call_with_retry(&format!("http://{addr}/api"), &json!({}), 2, Duration::from_secs(1))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::NoResponse { attempts: 2, .. }));
}
