//! Integration tests for the WebSocket transport.
//!
//! These spin up a real listener on an OS-assigned port and talk to it
//! with a `tokio-tungstenite` client.

#[cfg(feature = "websocket")]
mod websocket {
    use futures_util::{SinkExt, StreamExt};
    use testpulse_transport::{
        Connection, Transport, TransportError, WebSocketConfig, WebSocketTransport,
    };
    use tokio_tungstenite::tungstenite::Message;

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn connect_client(addr: std::net::SocketAddr, path: &str) -> ClientWs {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}{path}"))
            .await
            .expect("client should connect");
        ws
    }

    #[tokio::test]
    async fn test_websocket_accept_and_send_receive() {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr();

        let mut client_ws = connect_client(addr, "/ws").await;
        let server_conn = transport.accept().await.expect("should accept");
        assert!(server_conn.id().into_inner() > 0);

        // JSON goes out as a text frame.
        server_conn
            .send(br#"{"type":"analytics"}"#)
            .await
            .expect("send should succeed");
        let msg = client_ws.next().await.unwrap().unwrap();
        assert!(msg.is_text(), "expected a text frame, got {msg:?}");
        assert_eq!(msg.into_data().as_ref(), br#"{"type":"analytics"}"#);

        client_ws
            .send(Message::text(r#"{"type":"auth"}"#))
            .await
            .unwrap();
        let received = server_conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, br#"{"type":"auth"}"#);

        server_conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr();

        let mut client_ws = connect_client(addr, "/ws").await;
        let server_conn = transport.accept().await.unwrap();

        client_ws.send(Message::Close(None)).await.unwrap();

        let result = server_conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }

    #[tokio::test]
    async fn test_websocket_rejects_other_paths() {
        let transport = WebSocketTransport::bind_with(
            "127.0.0.1:0",
            WebSocketConfig {
                path: "/ws".into(),
                ..WebSocketConfig::default()
            },
        )
        .await
        .unwrap();
        let addr = transport.local_addr();

        let result = tokio_tungstenite::connect_async(format!("ws://{addr}/nope")).await;
        assert!(result.is_err(), "upgrade on the wrong path must fail");
    }

    #[tokio::test]
    async fn test_websocket_send_while_recv_pending() {
        // A reader parked in recv() must not block the writer.
        let mut transport = WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr();
        let mut client_ws = connect_client(addr, "/ws").await;
        let conn = std::sync::Arc::new(transport.accept().await.unwrap());

        let reader = {
            let conn = std::sync::Arc::clone(&conn);
            tokio::spawn(async move { conn.recv().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        tokio::time::timeout(std::time::Duration::from_secs(2), conn.send(b"{}"))
            .await
            .expect("send must not wait for recv")
            .unwrap();
        let msg = client_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"{}");

        client_ws.send(Message::Close(None)).await.unwrap();
        assert!(reader.await.unwrap().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_accept_after_shutdown_returns_error() {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
        transport.shutdown().await.unwrap();

        let result = transport.accept().await;
        assert!(matches!(result, Err(TransportError::Shutdown)));
    }
}
