use std::time::Duration;

use tillsync::{
    dispatch::{
        http::{HttpConfig, HttpRemote},
        DispatchError, Endpoint, FailureClass, Remote, RemoteRequest,
    },
    network::{NetworkMonitor, Transition},
};

#[test]
fn only_real_flips_are_transitions() {
    let monitor = NetworkMonitor::new(false);
    assert!(!monitor.is_online());
    assert_eq!(monitor.set_online(false), None);
    assert_eq!(monitor.set_online(true), Some(Transition::WentOnline));
    assert_eq!(monitor.set_online(true), None);
    assert_eq!(monitor.set_online(false), Some(Transition::WentOffline));
}

#[tokio::test]
async fn subscribers_and_clones_see_the_same_state() {
    let monitor = NetworkMonitor::new(false);
    let shared = monitor.clone();
    let mut rx = monitor.subscribe();

    shared.set_online(true);
    tokio::time::timeout(Duration::from_secs(1), rx.changed())
        .await
        .expect("timeout")
        .expect("changed");
    assert!(*rx.borrow_and_update());
    assert!(monitor.is_online());
}

#[test]
fn http_remote_joins_base_url_and_endpoint_path() {
    let remote = HttpRemote::new(HttpConfig {
        base_url: "https://club.example/api/".to_string(),
        timeout_ms: 1_000,
    })
    .expect("client");
    let req = RemoteRequest {
        endpoint: Endpoint::CustomerTopup {
            customer_id: "42".to_string(),
        },
        body: serde_json::json!({"amount": 5}),
    };
    assert_eq!(
        remote.url_for(&req).expect("url").as_str(),
        "https://club.example/api/customers/42/topup"
    );

    let accented = RemoteRequest {
        endpoint: Endpoint::CustomerTopup {
            customer_id: "jürgen".to_string(),
        },
        body: serde_json::json!({"amount": 5}),
    };
    assert_eq!(
        remote.url_for(&accented).expect("url").as_str(),
        "https://club.example/api/customers/j%C3%BCrgen/topup"
    );
}

#[test]
fn http_remote_rejects_unusable_base_url() {
    let err = HttpRemote::new(HttpConfig {
        base_url: "not a url".to_string(),
        timeout_ms: 0,
    })
    .expect_err("must fail");
    assert!(matches!(err, DispatchError::Malformed(_)));
}

#[tokio::test]
async fn unreachable_server_is_a_transient_network_failure() {
    let remote = HttpRemote::new(HttpConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        timeout_ms: 2_000,
    })
    .expect("client");
    let req = RemoteRequest {
        endpoint: Endpoint::Transactions,
        body: serde_json::json!({"items": []}),
    };

    let err = remote.submit(req, None).await.expect_err("nothing listens on port 1");
    assert!(matches!(err, DispatchError::Network(_)));
    assert_eq!(err.class(), FailureClass::Transient);
}
