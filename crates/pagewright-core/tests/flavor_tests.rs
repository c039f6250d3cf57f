//! ---
//! pw_section: "01-page-lifecycle"
//! pw_subsection: "tests"
//! pw_type: "source"
//! pw_scope: "test"
//! pw_description: "Client session and server render driver tests."
//! pw_version: "v0.0.0-prealpha"
//! pw_owner: "tbd"
//! ---
mod support;

use std::sync::Arc;
use std::time::Duration;

use pagewright_core::{
    ClientPageManager, Controller, EventOutcome, PageEvent, PagePhase, ServerPageManager,
};
use serde_json::json;
use support::{request, CallLog, HarnessBuilder, RecordingSink, ScriptedController, ScriptedExtension};

fn pages(log: &CallLog) -> HarnessBuilder {
    HarnessBuilder::new(log)
        .controller("Home", {
            let log = log.clone();
            move || {
                Arc::new(
                    ScriptedController::new("Home", &log)
                        .loading(json!({"title": "home"}))
                        .handling("on_refresh")
                        .with_extension(Arc::new(
                            ScriptedExtension::new("Home.tracking", &log).handling("on_item_selected"),
                        )),
                ) as Arc<dyn Controller>
            }
        })
        .controller("About", {
            let log = log.clone();
            move || {
                Arc::new(
                    ScriptedController::new("About", &log)
                        .loading(json!({"title": "about"}))
                        .slow_load(Duration::from_millis(20)),
                ) as Arc<dyn Controller>
            }
        })
}

#[tokio::test]
async fn sequential_navigation_orders_handlers_around_renders() {
    let log = CallLog::default();
    let harness = pages(&log).build().await;
    let client = ClientPageManager::new(harness.manager.clone());

    let home = client.navigate(request("Home")).await.unwrap();
    assert_eq!(home.status(), 200);
    assert_eq!(harness.manager.current().phase(), PagePhase::Activated);

    let about = client.navigate(request("About")).await.unwrap();
    assert_eq!(about.status(), 200);

    let order = [
        "handler:pre:Home",
        "render:mount:Home",
        "handler:post:Home",
        "Home:activate",
        "handler:pre:About",
        "Home:deactivate",
        "Home:destroy",
        "About:init",
        "render:mount:About",
        "handler:post:About",
        "About:activate",
    ];
    let positions: Vec<usize> = order
        .iter()
        .map(|entry| log.position(entry).unwrap_or_else(|| panic!("missing {entry}")))
        .collect();
    assert!(
        positions.windows(2).all(|pair| pair[0] < pair[1]),
        "unexpected order: {:?}",
        log.entries()
    );
}

#[tokio::test]
async fn newer_navigation_supersedes_slow_one() {
    let log = CallLog::default();
    let harness = pages(&log).build().await;
    let client = Arc::new(ClientPageManager::new(harness.manager.clone()));

    let slow = {
        let client = client.clone();
        tokio::spawn(async move { client.navigate(request("About")).await })
    };
    support::wait_until(|| log.contains("About:load")).await;

    let fast = client.navigate(request("Home")).await.unwrap();
    let slow = slow.await.expect("join").unwrap();

    assert!(slow.is_conflict());
    assert!(!fast.is_conflict());
    assert!(!log.contains("render:mount:About"));
    assert!(!log.contains("About:activate"));
    assert_eq!(
        harness.manager.current().controller_ref().map(|c| c.as_str().to_string()),
        Some("Home".to_string())
    );
    assert_eq!(harness.manager.current().phase(), PagePhase::Activated);
}

#[tokio::test]
async fn events_fall_back_from_controller_to_extensions() {
    let log = CallLog::default();
    let harness = pages(&log).build().await;
    let sink = Arc::new(RecordingSink::default());
    let client = ClientPageManager::new(harness.manager.clone()).with_event_sink(sink.clone());

    client.navigate(request("Home")).await.unwrap();

    let refreshed = client
        .handle_event(PageEvent::new("refresh", json!({})))
        .await
        .unwrap();
    let selected = client
        .handle_event(PageEvent::new("itemSelected", json!({"id": 4})))
        .await
        .unwrap();
    let ignored = client
        .handle_event(PageEvent::new("close", json!(null)))
        .await
        .unwrap();

    assert_eq!(refreshed, EventOutcome::Handled);
    assert_eq!(selected, EventOutcome::Handled);
    assert_eq!(ignored, EventOutcome::Unhandled);
    assert!(log.contains("Home:on_refresh"));
    assert!(log.contains("Home.tracking:on_item_selected"));
    assert_eq!(*sink.unhandled.lock(), vec!["on_close".to_string()]);
}

#[tokio::test]
async fn client_destroy_unmounts_renderer() {
    let log = CallLog::default();
    let harness = pages(&log).build().await;
    let client = ClientPageManager::new(harness.manager.clone());

    client.navigate(request("Home")).await.unwrap();
    client.destroy().await.unwrap();

    assert!(log.position("Home:destroy").unwrap() < log.position("render:unmount").unwrap());
    assert!(harness.manager.current().is_empty());
}

#[tokio::test]
async fn server_render_is_a_single_unactivated_transition() {
    let log = CallLog::default();
    let harness = pages(&log).build().await;
    let server = ServerPageManager::new(harness.manager.clone());

    let outcome = server.render(request("Home")).await.unwrap();
    let response = outcome.response().expect("rendered");
    assert_eq!(response.status, 200);
    assert_eq!(response.page_state.get("title"), Some(&json!("home")));
    assert_eq!(response.content.as_deref(), Some("HomeView"));
    assert!(!log.contains("Home:activate"));
    assert_eq!(harness.manager.current().phase(), PagePhase::Mounted);

    server.destroy().await.unwrap();
    assert!(log.contains("Home:destroy"));
}
