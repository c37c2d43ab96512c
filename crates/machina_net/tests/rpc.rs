//! End-to-end RPC scenarios against a live broker.
//!
//! All tests here are ignored by default because they need a reachable
//! NATS server with TLS and token auth. Point them at one with
//! `MACHINA_TEST_ENDPOINT` and `MACHINA_TEST_TOKEN`, then run
//! `cargo test -- --ignored`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use machina_net::{
    ConnectConfig, Connection, Operation, RpcClient, RpcError, RpcServer, SubscriptionState,
};

fn test_config() -> ConnectConfig {
    let token = std::env::var("MACHINA_TEST_TOKEN").unwrap_or_else(|_| "test-token".into());
    let endpoint =
        std::env::var("MACHINA_TEST_ENDPOINT").unwrap_or_else(|_| "localhost:4222".into());
    ConnectConfig::new(token, endpoint).danger_skip_verify()
}

async fn open() -> Connection {
    Connection::open(test_config())
        .await
        .expect("broker not reachable")
}

async fn wait_until_closed(sub: &machina_net::Subscription) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while sub.state() != SubscriptionState::Closed {
        assert!(Instant::now() < deadline, "subscription never closed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
#[ignore = "requires a NATS server (MACHINA_TEST_ENDPOINT, MACHINA_TEST_TOKEN)"]
async fn echo_round_trip() {
    let conn = open().await;
    let server = RpcServer::new(&conn);
    let _sub = server
        .serve("res.*", |_subject, _payload| async {
            Bytes::from_static(b"{\"ok\":true}")
        })
        .await
        .unwrap();

    let client = RpcClient::new(&conn);
    let reply = client
        .call("res.create_abc123", "{}", Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(&reply[..], b"{\"ok\":true}");
}

#[tokio::test]
#[ignore = "requires a NATS server (MACHINA_TEST_ENDPOINT, MACHINA_TEST_TOKEN)"]
async fn unanswered_call_times_out_at_the_deadline() {
    let conn = open().await;
    let client = RpcClient::new(&conn);

    let started = Instant::now();
    let err = client
        .call("res.nobody.create_xyz", "{}", Duration::from_secs(2))
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, RpcError::Timeout { .. }), "got {err}");
    // The failure must come from the deadline, not from a no-responder
    // short circuit.
    assert!(elapsed >= Duration::from_millis(1900), "returned after {elapsed:?}");
}

#[tokio::test]
#[ignore = "requires a NATS server (MACHINA_TEST_ENDPOINT, MACHINA_TEST_TOKEN)"]
async fn sub_second_timeouts_are_clamped_to_one_second() {
    let conn = open().await;
    let client = RpcClient::new(&conn);

    let started = Instant::now();
    let err = client
        .call("res.nobody.clamped", "{}", Duration::from_millis(10))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Timeout { .. }));
    assert!(started.elapsed() >= Duration::from_millis(900));
}

#[tokio::test]
#[ignore = "requires a NATS server (MACHINA_TEST_ENDPOINT, MACHINA_TEST_TOKEN)"]
async fn panicking_handler_is_contained_and_the_server_keeps_answering() {
    let conn = open().await;
    let server = RpcServer::new(&conn);
    let _sub = server
        .serve("panicky.*", |subject, _payload| async move {
            assert!(!subject.ends_with("boom"), "injected fault");
            Bytes::from_static(b"{\"ok\":true}")
        })
        .await
        .unwrap();

    let client = RpcClient::new(&conn);

    // The faulting call looks exactly like a timeout to the caller.
    let err = client
        .call("panicky.boom", "{}", Duration::from_secs(2))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Timeout { .. }), "got {err}");

    // An unrelated message on the same subscription still gets answered.
    let reply = client
        .call("panicky.fine", "{}", Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(&reply[..], b"{\"ok\":true}");
}

#[tokio::test]
#[ignore = "requires a NATS server (MACHINA_TEST_ENDPOINT, MACHINA_TEST_TOKEN)"]
async fn stop_is_idempotent_and_ends_delivery() {
    let conn = open().await;
    let server = RpcServer::new(&conn);
    let sub = server
        .serve("stoppable.*", |_subject, _payload| async {
            Bytes::from_static(b"{}")
        })
        .await
        .unwrap();

    sub.stop();
    sub.stop();
    wait_until_closed(&sub).await;
    sub.stop();
    assert_eq!(sub.state(), SubscriptionState::Closed);

    // Nobody answers after the drain.
    let client = RpcClient::new(&conn);
    let err = client
        .call("stoppable.late", "{}", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Timeout { .. }));
}

#[tokio::test]
#[ignore = "requires a NATS server (MACHINA_TEST_ENDPOINT, MACHINA_TEST_TOKEN)"]
async fn queue_group_members_split_the_load() {
    let conn = open().await;
    let server = RpcServer::new(&conn);

    let hits_a = Arc::new(AtomicUsize::new(0));
    let hits_b = Arc::new(AtomicUsize::new(0));
    let counted = |hits: Arc<AtomicUsize>| {
        move |_subject: String, _payload: Bytes| {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Bytes::from_static(b"{}")
            }
        }
    };
    let _a = server
        .serve("balanced.*", counted(Arc::clone(&hits_a)))
        .await
        .unwrap();
    let _b = server
        .serve("balanced.*", counted(Arc::clone(&hits_b)))
        .await
        .unwrap();

    let client = RpcClient::new(&conn);
    for i in 0..10 {
        client
            .call(&format!("balanced.{i}"), "{}", Duration::from_secs(2))
            .await
            .unwrap();
    }

    // Exactly one member answered each message.
    let total = hits_a.load(Ordering::SeqCst) + hits_b.load(Ordering::SeqCst);
    assert_eq!(total, 10);
}

#[tokio::test]
#[ignore = "requires a NATS server (MACHINA_TEST_ENDPOINT, MACHINA_TEST_TOKEN)"]
async fn concurrent_lifecycle_calls_do_not_corrupt_unrelated_subscriptions() {
    let conn = open().await;
    let server = RpcServer::new(&conn);
    let _lifecycle = server
        .serve("raced.>", |_subject, _payload| async {
            Bytes::from_static(b"{\"ok\":true}")
        })
        .await
        .unwrap();
    let _unrelated = server
        .serve("calm.*", |_subject, _payload| async {
            Bytes::from_static(b"{\"calm\":true}")
        })
        .await
        .unwrap();

    let client = RpcClient::new(&conn);
    let calls = Operation::ALL.map(|op| {
        let client = client.clone();
        async move {
            client
                .invoke("raced", op, "same-id", "{}", Duration::from_secs(2))
                .await
        }
    });
    let replies = futures::future::join_all(calls).await;
    for reply in replies {
        assert_eq!(&reply.unwrap()[..], b"{\"ok\":true}");
    }

    let reply = client
        .call("calm.after", "{}", Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(&reply[..], b"{\"calm\":true}");
}

#[tokio::test]
#[ignore = "requires a NATS server (MACHINA_TEST_ENDPOINT, MACHINA_TEST_TOKEN)"]
async fn invoke_surfaces_non_object_replies_as_remote_errors() {
    let conn = open().await;
    let server = RpcServer::new(&conn);
    let _sub = server
        .serve("grumpy.*", |_subject, _payload| async {
            Bytes::from_static(b"provisioning failed: out of disk")
        })
        .await
        .unwrap();

    let client = RpcClient::new(&conn);
    let err = client
        .invoke("grumpy", Operation::Create, "abc", "{}", Duration::from_secs(2))
        .await
        .unwrap_err();
    match err {
        RpcError::Remote(msg) => assert_eq!(msg, "provisioning failed: out of disk"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
#[ignore = "requires a NATS server (MACHINA_TEST_ENDPOINT, MACHINA_TEST_TOKEN)"]
async fn invoke_rejects_an_empty_resource_path_before_any_io() {
    let conn = open().await;
    let client = RpcClient::new(&conn);

    let started = Instant::now();
    let err = client
        .invoke("", Operation::Create, "abc", "{}", Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Validation(_)), "got {err}");
    // Fails fast: no subject was built, no request went out.
    assert!(started.elapsed() < Duration::from_millis(100));
}
