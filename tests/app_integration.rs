//! End-to-end tests: module wiring against a mock feed endpoint
//!
//! These drive the real composition path: register the built-in modules,
//! fan out config pointing at a wiremock server, activate, then poll
//! through the handle the poller module hands out.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use feedwatch::app::App;
use feedwatch::container::ModuleRef;
use feedwatch::error::Error;
use feedwatch::modules::{feed_module, poller_module, PollerHandle, FEED_MODULE, POLLER_MODULE};
use feedwatch::scheduler::{Job, Trigger};

fn feed_page(ids: &[&str]) -> serde_json::Value {
    json!(ids
        .iter()
        .map(|id| json!({ "id": id, "updated_at": 1_700_000_000 }))
        .collect::<Vec<_>>())
}

async fn app_against(server: &MockServer) -> App {
    let mut app = App::new();
    app.register(FEED_MODULE, feed_module()).unwrap();
    app.register(POLLER_MODULE, poller_module()).unwrap();
    app.apply_config(&json!({
        "feed": { "base_url": server.uri() },
        "poller": { "_enabled": true },
    }))
    .unwrap();
    app.start_enabled().unwrap();
    app
}

#[tokio::test]
async fn polls_report_only_new_items_across_feed_growth() {
    let server = MockServer::start().await;

    // first poll sees three items; every later poll sees one more on top
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed_page(&["c", "b", "a"])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed_page(&["d", "c", "b", "a"])))
        .mount(&server)
        .await;

    let mut app = app_against(&server).await;
    assert_eq!(app.job_count(), 2);

    let handle = app
        .require(POLLER_MODULE)
        .unwrap()
        .downcast::<PollerHandle>()
        .unwrap();

    let first = handle.poller.lock().await.poll_new().await.unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(first[0].id, "c");

    // only the item that appeared since the previous poll comes back
    let second = handle.poller.lock().await.poll_new().await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].id, "d");

    // nothing changed: nothing to report
    let third = handle.poller.lock().await.poll_new().await.unwrap();
    assert!(third.is_empty());
}

#[tokio::test]
async fn server_errors_surface_as_recoverable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut app = app_against(&server).await;
    let handle = app
        .require(POLLER_MODULE)
        .unwrap()
        .downcast::<PollerHandle>()
        .unwrap();

    let err = handle.poller.lock().await.poll_new().await.unwrap_err();
    assert!(err.is_recoverable(), "a 503 must not kill the run loop");
}

#[tokio::test]
async fn malformed_payload_surfaces_as_recoverable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let mut app = app_against(&server).await;
    let handle = app
        .require(POLLER_MODULE)
        .unwrap()
        .downcast::<PollerHandle>()
        .unwrap();

    let err = handle.poller.lock().await.poll_new().await.unwrap_err();
    assert!(matches!(err, Error::Api(_)));
    assert!(err.is_recoverable());
}

#[tokio::test(start_paused = true)]
async fn run_loop_survives_recoverable_failures_until_fatal() {
    // a custom module whose job fails recoverably twice, then fatally;
    // the run loop must execute all three attempts before returning
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();

    let mut app = App::new();
    app.register(
        "flaky",
        Box::new(move |cx| {
            let seen = seen.clone();
            cx.add_job(Job::new(
                "work",
                Trigger::Interval(Duration::from_secs(5)),
                move || {
                    let n = seen.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err(Error::app("transient failure"))
                        } else {
                            Err(Error::config("unrecoverable"))
                        }
                    }
                },
            ))?;
            Ok(Arc::new(()) as ModuleRef)
        }),
    )
    .unwrap();
    app.apply_config(&json!({ "flaky": { "_enabled": true } }))
        .unwrap();
    app.start_enabled().unwrap();

    let err = app.run().await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn run_loop_ends_when_no_jobs_registered() {
    // modules that register no jobs leave the queue empty; run returns
    let mut app = App::new();
    app.register("idle", Box::new(|_cx| Ok(Arc::new(()) as ModuleRef)))
        .unwrap();
    app.apply_config(&json!({ "idle": { "_enabled": true } }))
        .unwrap();
    app.start_enabled().unwrap();

    app.run().await.unwrap();
}
