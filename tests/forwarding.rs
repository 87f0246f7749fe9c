//! Forwarding of plain HTTP requests through the proxy.

use reqwest::StatusCode;

mod common;

#[tokio::test]
async fn get_preserves_status_repeated_headers_and_body() {
    let backend = common::start_raw_backend(
        "HTTP/1.1 200 OK\r\nX-Test: a\r\nX-Test: b\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
    )
    .await;
    let proxy = common::start_proxy().await;

    let res = proxy
        .client()
        .get(format!("http://{}/greeting", backend))
        .send()
        .await
        .expect("proxy unreachable");

    assert_eq!(res.status(), StatusCode::OK);
    let values: Vec<_> = res
        .headers()
        .get_all("x-test")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert_eq!(values, ["a", "b"]);
    assert_eq!(res.text().await.unwrap(), "hello");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn upstream_error_status_is_mirrored() {
    let backend = common::start_raw_backend(
        "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 4\r\nConnection: close\r\n\r\ndown",
    )
    .await;
    let proxy = common::start_proxy().await;

    let res = proxy
        .client()
        .get(format!("http://{}/", backend))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.text().await.unwrap(), "down");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn request_body_is_streamed_upstream() {
    let backend = common::start_body_echo_backend().await;
    let proxy = common::start_proxy().await;

    let res = proxy
        .client()
        .post(format!("http://{}/upload", backend))
        .body("payload bytes")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.text().await.unwrap(), "payload bytes");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn unreachable_target_returns_500_with_error_text() {
    let target = common::closed_port().await;
    let proxy = common::start_proxy().await;

    let res = proxy
        .client()
        .get(format!("http://{}/", target))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!res.text().await.unwrap().is_empty());

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn server_stops_after_shutdown_trigger() {
    let proxy = common::start_proxy().await;
    proxy.shutdown.trigger();

    let result = tokio::time::timeout(common::STEP_TIMEOUT, proxy.handle)
        .await
        .expect("server should stop after shutdown")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn default_listener_serves_ipv6_and_ipv4_clients() {
    let backend = common::start_raw_backend(
        "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
    )
    .await;
    let proxy = common::start_proxy_with(|config| {
        let mut addr: std::net::SocketAddr = attribution_proxy::config::ListenerConfig::default()
            .bind_address
            .parse()
            .unwrap();
        addr.set_port(0);
        config.listener.bind_address = addr.to_string();
    })
    .await;

    for proxy_host in ["[::1]", "127.0.0.1"] {
        let proxy_url = format!("http://{}:{}", proxy_host, proxy.addr.port());
        let client = reqwest::Client::builder()
            .proxy(reqwest::Proxy::all(proxy_url).unwrap())
            .build()
            .unwrap();
        let res = client
            .get(format!("http://{}/", backend))
            .send()
            .await
            .unwrap_or_else(|e| panic!("proxy unreachable via {proxy_host}: {e}"));
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.text().await.unwrap(), "ok");
    }

    proxy.shutdown.trigger();
}
