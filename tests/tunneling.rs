//! CONNECT tunneling through the proxy.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

mod common;

async fn send_connect(proxy: std::net::SocketAddr, target: std::net::SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    let request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    stream
}

#[tokio::test]
async fn connect_relays_bytes_in_both_directions() {
    let echo = common::start_echo_server().await;
    let proxy = common::start_proxy().await;

    let mut stream = send_connect(proxy.addr, echo).await;
    let (head, rest) = tokio::time::timeout(common::STEP_TIMEOUT, common::read_head(&mut stream))
        .await
        .unwrap();
    assert!(head.starts_with("HTTP/1.1 200"), "unexpected head: {head}");
    assert!(rest.is_empty());

    stream.write_all(b"ping through the tunnel").await.unwrap();
    let mut buf = [0u8; 23];
    tokio::time::timeout(common::STEP_TIMEOUT, stream.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"ping through the tunnel");

    // Closing our side must tear the whole tunnel down.
    stream.shutdown().await.unwrap();
    let mut tail = Vec::new();
    tokio::time::timeout(common::STEP_TIMEOUT, stream.read_to_end(&mut tail))
        .await
        .expect("tunnel should close after the client closes")
        .unwrap();
    assert!(tail.is_empty());

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn connect_carries_opaque_binary_data() {
    let echo = common::start_echo_server().await;
    let proxy = common::start_proxy().await;

    let mut stream = send_connect(proxy.addr, echo).await;
    let (head, _) = common::read_head(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 200"));

    let payload: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
    let (mut reader, mut writer) = stream.into_split();
    let expected = payload.clone();
    let write = tokio::spawn(async move {
        writer.write_all(&payload).await.unwrap();
        writer.shutdown().await.unwrap();
    });

    let mut echoed = Vec::new();
    tokio::time::timeout(common::STEP_TIMEOUT, reader.read_to_end(&mut echoed))
        .await
        .unwrap()
        .unwrap();
    write.await.unwrap();
    assert_eq!(echoed, expected);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn connect_to_unreachable_target_drops_connection_silently() {
    let target = common::closed_port().await;
    let proxy = common::start_proxy().await;

    let mut stream = send_connect(proxy.addr, target).await;
    let mut received = Vec::new();
    let mut chunk = [0u8; 256];
    let outcome = tokio::time::timeout(common::STEP_TIMEOUT, async {
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => received.extend_from_slice(&chunk[..n]),
            }
        }
    })
    .await;

    assert!(outcome.is_ok(), "connection should be closed, not left hanging");
    assert!(
        received.is_empty(),
        "no response expected, got {:?}",
        String::from_utf8_lossy(&received)
    );

    proxy.shutdown.trigger();
}
