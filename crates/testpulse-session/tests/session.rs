//! End-to-end tests for a single session, driven over an in-process
//! channel connection with the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use testpulse_auth::{CredentialVerifier, PasswordAuthenticator, TokenIssuer, DEFAULT_TOKEN_TTL};
use testpulse_session::{AuthPolicy, PushScope, Session, SessionConfig, SessionError};
use testpulse_store::{MemoryStore, TestOutcome, UserId};
use testpulse_transport::channel::{self, ChannelPeer};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SECRET: &[u8] = b"session-test-secret";

// =========================================================================
// Harness
// =========================================================================

struct Harness {
    peer: ChannelPeer,
    store: Arc<MemoryStore>,
    alice: UserId,
    session: JoinHandle<Result<(), SessionError>>,
    cancel: CancellationToken,
}

impl Harness {
    async fn start(config: SessionConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let verifier = CredentialVerifier::new(4);
        let hash = verifier.hash("s3cret").await.unwrap();
        let alice = store.insert_user("alice", &hash).await;

        let auth = Arc::new(PasswordAuthenticator::new(
            Arc::clone(&store),
            verifier,
            TokenIssuer::new(SECRET, DEFAULT_TOKEN_TTL),
        )
        .await
        .unwrap());
        let (conn, peer) = channel::pair();
        let session = Session::new(Arc::new(conn), auth, Arc::clone(&store), config);
        let cancel = session.cancel_token();
        let session = tokio::spawn(session.run());

        Self {
            peer,
            store,
            alice,
            session,
            cancel,
        }
    }

    fn send(&self, frame: &str) {
        assert!(self.peer.send(frame), "session stopped reading");
    }

    async fn next(&mut self) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(10), self.peer.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("session closed the connection");
        serde_json::from_slice(&frame).expect("every frame is one JSON document")
    }

    async fn expect_error(&mut self) -> String {
        let msg = self.next().await;
        assert_eq!(msg["type"], "error", "expected error, got {msg}");
        assert_eq!(msg["payload"]["status"], "error");
        msg["payload"]["message"].as_str().unwrap().to_string()
    }

    async fn login(&mut self) -> String {
        self.send(r#"{"type":"auth","payload":{"username":"alice","password":"s3cret"}}"#);
        let msg = self.next().await;
        assert_eq!(msg["type"], "auth_response", "got {msg}");
        msg["payload"]["token"].as_str().unwrap().to_string()
    }
}

/// Pushes far enough apart that they never show up in a test.
fn quiet() -> SessionConfig {
    SessionConfig {
        push_interval: Duration::from_secs(3600),
        push_jitter: Duration::ZERO,
        ..SessionConfig::default()
    }
}

// =========================================================================
// Decoding
// =========================================================================

#[tokio::test]
async fn test_malformed_frames_each_get_one_error_and_session_survives() {
    let mut h = Harness::start(quiet()).await;

    h.send("not json at all");
    h.send(r#"{"payload":{}}"#);
    h.send(r#"{"type":"teleport","payload":{}}"#);
    h.send(r#"{"type":"auth","payload":"alice"}"#);
    h.send(r#"{"type":"request_analytics"}"#);

    assert_eq!(h.expect_error().await, "invalid message format");
    assert_eq!(h.expect_error().await, "invalid message format");
    assert_eq!(h.expect_error().await, "unknown message type");
    assert_eq!(h.expect_error().await, "invalid auth request");
    assert_eq!(h.next().await["type"], "analytics");

    assert!(h.peer.try_recv().is_none(), "exactly one reply per frame");
    assert!(!h.session.is_finished());
}

// =========================================================================
// Auth
// =========================================================================

#[tokio::test]
async fn test_wrong_password_is_reported() {
    let mut h = Harness::start(quiet()).await;

    h.send(r#"{"type":"auth","payload":{"username":"alice","password":"wrong"}}"#);
    let wrong = h.expect_error().await;
    assert!(wrong.contains("password"), "{wrong}");

    h.send(r#"{"type":"auth","payload":{"username":"nobody","password":"wrong"}}"#);
    assert_eq!(h.expect_error().await, wrong);
}

#[tokio::test]
async fn test_successful_auth_returns_valid_token() {
    let mut h = Harness::start(quiet()).await;

    h.send(r#"{"type":"auth","payload":{"username":"alice","password":"s3cret"}}"#);
    let msg = h.next().await;
    assert_eq!(msg["type"], "auth_response");
    assert_eq!(msg["payload"]["status"], "success");
    assert_eq!(msg["payload"]["message"], "authenticated");

    let token = msg["payload"]["token"].as_str().unwrap();
    let issuer = TokenIssuer::new(SECRET, DEFAULT_TOKEN_TTL);
    assert_eq!(issuer.validate(token).unwrap(), h.alice);
}

#[tokio::test]
async fn test_auth_with_store_down() {
    let mut h = Harness::start(quiet()).await;
    h.store.set_unavailable(true);

    h.send(r#"{"type":"auth","payload":{"username":"alice","password":"s3cret"}}"#);
    assert_eq!(h.expect_error().await, "store unavailable");
}

// =========================================================================
// Analytics
// =========================================================================

#[tokio::test]
async fn test_request_analytics_counts() {
    let mut h = Harness::start(quiet()).await;
    h.store.record_test(h.alice, TestOutcome::Passed).await;
    h.store.record_test(h.alice, TestOutcome::Passed).await;
    h.store.record_test(h.alice, TestOutcome::Failed).await;
    h.store.add_device("pixel", true).await;
    h.store.add_device("ipad", false).await;

    h.send(r#"{"type":"request_analytics","payload":{}}"#);
    let msg = h.next().await;
    assert_eq!(
        msg,
        serde_json::json!({
            "type": "analytics",
            "payload": {"total_tests": 3, "passed": 2, "failed": 1, "devices_online": 1}
        })
    );
}

#[tokio::test]
async fn test_empty_store_reports_zeros_plus_online_devices() {
    let mut h = Harness::start(quiet()).await;
    h.store.add_device("pixel", true).await;

    h.send(r#"{"type":"request_analytics"}"#);
    let payload = h.next().await["payload"].clone();
    assert_eq!(payload["total_tests"], 0);
    assert_eq!(payload["passed"], 0);
    assert_eq!(payload["failed"], 0);
    assert_eq!(payload["devices_online"], 1);
}

#[tokio::test]
async fn test_request_analytics_ignores_payload_shape() {
    let mut h = Harness::start(quiet()).await;

    h.send(r#"{"type":"request_analytics","payload":7}"#);
    h.send(r#"{"type":"request_analytics","payload":"x"}"#);
    h.send(r#"{"type":"request_analytics","payload":{"token":5}}"#);
    h.send(r#"{"type":"request_analytics","payload":null}"#);

    for _ in 0..4 {
        let msg = h.next().await;
        assert_eq!(msg["type"], "analytics", "got {msg}");
    }
    assert!(h.peer.try_recv().is_none());
}

#[tokio::test]
async fn test_request_analytics_store_failure() {
    let mut h = Harness::start(quiet()).await;
    h.store.set_unavailable(true);

    h.send(r#"{"type":"request_analytics"}"#);
    assert_eq!(h.expect_error().await, "analytics unavailable");

    h.store.set_unavailable(false);
    h.send(r#"{"type":"request_analytics"}"#);
    assert_eq!(h.next().await["type"], "analytics");
}

#[tokio::test]
async fn test_require_token_gates_analytics() {
    let mut h = Harness::start(SessionConfig {
        auth_policy: AuthPolicy::RequireToken,
        ..quiet()
    })
    .await;

    h.send(r#"{"type":"request_analytics"}"#);
    assert_eq!(h.expect_error().await, "authentication required");

    h.send(r#"{"type":"request_analytics","payload":{"token":"garbage"}}"#);
    assert_eq!(h.expect_error().await, "invalid token");

    h.send(r#"{"type":"request_analytics","payload":{"token":5}}"#);
    assert_eq!(h.expect_error().await, "invalid token");

    h.send(r#"{"type":"request_analytics","payload":7}"#);
    assert_eq!(h.expect_error().await, "authentication required");

    let stale = TokenIssuer::new(SECRET, DEFAULT_TOKEN_TTL)
        .issue_at(h.alice, 1_000)
        .unwrap();
    h.send(&format!(
        r#"{{"type":"request_analytics","payload":{{"token":"{stale}"}}}}"#
    ));
    assert_eq!(h.expect_error().await, "token expired");

    let token = h.login().await;
    h.send(&format!(
        r#"{{"type":"request_analytics","payload":{{"token":"{token}"}}}}"#
    ));
    assert_eq!(h.next().await["type"], "analytics");
}

// =========================================================================
// User data
// =========================================================================

#[tokio::test]
async fn test_user_data_requires_identity() {
    let mut h = Harness::start(quiet()).await;
    h.send(r#"{"type":"request_user_data"}"#);
    assert_eq!(h.expect_error().await, "authentication required");
}

#[tokio::test]
async fn test_user_data_after_auth() {
    let mut h = Harness::start(quiet()).await;
    let team = h.store.add_team("Mobile QA").await;
    h.store
        .update_profile(h.alice, Some(team), Some("https://cdn.example/alice.png"))
        .await;

    h.login().await;
    h.send(r#"{"type":"request_user_data"}"#);
    let msg = h.next().await;
    assert_eq!(msg["type"], "user_data");
    assert_eq!(msg["payload"]["id"], h.alice.0);
    assert_eq!(msg["payload"]["username"], "alice");
    assert_eq!(msg["payload"]["team_name"], "Mobile QA");
    assert_eq!(msg["payload"]["avatar_url"], "https://cdn.example/alice.png");
}

#[tokio::test]
async fn test_user_data_by_token_without_team() {
    let mut h = Harness::start(quiet()).await;
    let token = TokenIssuer::new(SECRET, DEFAULT_TOKEN_TTL).issue(h.alice).unwrap();

    h.send(&format!(
        r#"{{"type":"request_user_data","payload":{{"token":"{token}"}}}}"#
    ));
    let msg = h.next().await;
    assert_eq!(msg["payload"]["team_name"], "");
    assert_eq!(msg["payload"]["avatar_url"], "");
}

#[tokio::test]
async fn test_user_data_for_deleted_user() {
    let mut h = Harness::start(quiet()).await;
    let token = TokenIssuer::new(SECRET, DEFAULT_TOKEN_TTL).issue(UserId(404)).unwrap();

    h.send(&format!(
        r#"{{"type":"request_user_data","payload":{{"token":"{token}"}}}}"#
    ));
    assert_eq!(h.expect_error().await, "failed to get user data");
}

// =========================================================================
// Push loop
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_push_arrives_after_one_interval() {
    let mut h = Harness::start(SessionConfig {
        push_interval: Duration::from_secs(5),
        push_jitter: Duration::ZERO,
        ..SessionConfig::default()
    })
    .await;
    h.store.add_device("pixel", true).await;
    let start = tokio::time::Instant::now();

    let msg = h.next().await;
    assert_eq!(msg["type"], "analytics");
    assert_eq!(msg["payload"]["devices_online"], 1);
    let waited = start.elapsed();
    assert!(waited >= Duration::from_secs(5) && waited < Duration::from_secs(6), "{waited:?}");

    assert_eq!(h.next().await["type"], "analytics");
}

#[tokio::test(start_paused = true)]
async fn test_require_token_pauses_pushes_until_auth() {
    let mut h = Harness::start(SessionConfig {
        push_interval: Duration::from_secs(5),
        push_jitter: Duration::ZERO,
        auth_policy: AuthPolicy::RequireToken,
        ..SessionConfig::default()
    })
    .await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(h.peer.try_recv().is_none(), "no pushes before auth");

    h.login().await;
    let start = tokio::time::Instant::now();
    assert_eq!(h.next().await["type"], "analytics");
    let waited = start.elapsed();
    assert!(waited > Duration::ZERO && waited <= Duration::from_secs(5), "{waited:?}");
}

#[tokio::test(start_paused = true)]
async fn test_push_store_failure_is_reported() {
    let mut h = Harness::start(SessionConfig {
        push_interval: Duration::from_secs(5),
        push_jitter: Duration::ZERO,
        ..SessionConfig::default()
    })
    .await;
    h.store.set_unavailable(true);

    assert_eq!(h.expect_error().await, "analytics unavailable");
    h.store.set_unavailable(false);
    assert_eq!(h.next().await["type"], "analytics");
}

#[tokio::test]
async fn test_user_scoped_push() {
    let mut h = Harness::start(SessionConfig {
        push_interval: Duration::from_millis(50),
        push_jitter: Duration::ZERO,
        auth_policy: AuthPolicy::RequireToken,
        push_scope: PushScope::User,
        ..SessionConfig::default()
    })
    .await;
    let bob = h.store.insert_user("bob", "x").await;
    h.store.record_test(h.alice, TestOutcome::Failed).await;
    h.store.record_test(bob, TestOutcome::Passed).await;
    h.store.record_test(bob, TestOutcome::Passed).await;

    h.login().await;
    let msg = h.next().await;
    assert_eq!(msg["type"], "analytics");
    assert_eq!(msg["payload"]["total_tests"], 1);
    assert_eq!(msg["payload"]["failed"], 1);
}

#[tokio::test]
async fn test_requests_and_pushes_never_interleave() {
    let mut h = Harness::start(SessionConfig {
        push_interval: Duration::from_millis(10),
        push_jitter: Duration::ZERO,
        ..SessionConfig::default()
    })
    .await;

    for _ in 0..25 {
        h.send(r#"{"type":"request_analytics"}"#);
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Replies and pushes are mixed, but each frame is a whole document.
    let mut frames = 0;
    while let Some(frame) = h.peer.try_recv() {
        let msg: Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(msg["type"], "analytics");
        frames += 1;
    }
    assert!(frames > 25, "expected replies plus pushes, got {frames}");
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test]
async fn test_peer_close_ends_session_cleanly() {
    let mut h = Harness::start(quiet()).await;
    h.peer.close();
    let result = tokio::time::timeout(Duration::from_secs(5), h.session)
        .await
        .expect("session should stop")
        .unwrap();
    assert!(result.is_ok());
    assert!(h.peer.recv().await.is_none(), "server side closed too");
}

#[tokio::test]
async fn test_read_failure_ends_session_with_error() {
    let h = Harness::start(quiet()).await;
    h.peer.reset("connection reset by peer");
    let result = tokio::time::timeout(Duration::from_secs(5), h.session)
        .await
        .expect("session should stop")
        .unwrap();
    assert!(matches!(result, Err(SessionError::Transport(_))));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_session_and_timer() {
    let mut h = Harness::start(SessionConfig {
        push_interval: Duration::from_secs(5),
        push_jitter: Duration::ZERO,
        ..SessionConfig::default()
    })
    .await;

    h.cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(1), h.session)
        .await
        .expect("session should stop promptly")
        .unwrap();
    assert!(result.is_ok());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(h.peer.recv().await.is_none(), "no pushes after cancellation");
}
