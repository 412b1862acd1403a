//! 测试用服务器：内存存储 + 随机端口

#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{InMemoryPartyRepository, InMemoryProfileRepository};
use config::AppConfig;
use futures_util::{SinkExt, StreamExt};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::oneshot, time::timeout};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState};

pub type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    shutdown: Option<oneshot::Sender<()>>,
}

pub struct Account {
    pub uid: String,
    pub token: String,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let config = AppConfig::default();
        let state = AppState::build(
            &config,
            Arc::new(InMemoryProfileRepository::new()),
            Arc::new(InMemoryPartyRepository::new()),
        );
        let app = router(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            client: Client::new(),
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn register(&self, nickname: &str) -> Account {
        let response = self
            .client
            .post(self.url("/api/v1/profiles"))
            .json(&json!({ "nickname": nickname }))
            .send()
            .await
            .expect("register");
        assert_eq!(response.status(), StatusCode::CREATED);
        let body: Value = response.json().await.expect("register json");
        Account {
            uid: body["profile"]["uid"].as_str().expect("uid").to_owned(),
            token: body["token"].as_str().expect("token").to_owned(),
        }
    }

    pub async fn get(&self, account: &Account, path: &str) -> (StatusCode, Value) {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&account.token)
            .send()
            .await
            .expect("get");
        split(response).await
    }

    pub async fn post(&self, account: &Account, path: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&account.token)
            .json(&body)
            .send()
            .await
            .expect("post");
        split(response).await
    }

    /// 建立 WebSocket 连接并完成认证，返回收到 `authenticated` 之后的连接
    pub async fn connect(&self, account: &Account) -> WsClient {
        let mut ws = self.connect_anonymous().await;
        send_json(
            &mut ws,
            json!({ "type": "authenticate", "sessionToken": account.token }),
        )
        .await;
        let frame = next_frame(&mut ws).await;
        assert_eq!(frame["event"], "authenticated");
        assert_eq!(frame["data"]["uid"], account.uid.as_str());
        ws
    }

    pub async fn connect_anonymous(&self) -> WsClient {
        let (ws, _) = connect_async(format!("ws://{}/api/v1/ws", self.addr))
            .await
            .expect("ws connect");
        ws
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn split(response: reqwest::Response) -> (StatusCode, Value) {
    let status = response.status();
    let text = response.text().await.expect("body");
    let body = if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).expect("json body")
    };
    (status, body)
}

pub async fn send_json(ws: &mut WsClient, value: Value) {
    ws.send(TungsteniteMessage::Text(value.to_string().into()))
        .await
        .expect("ws send");
}

/// 读取下一个文本帧，忽略控制帧
pub async fn next_frame(ws: &mut WsClient) -> Value {
    loop {
        let message = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream closed")
            .expect("ws error");
        if let TungsteniteMessage::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("frame json");
        }
    }
}

/// 断言短时间内没有文本帧到达
pub async fn assert_silent(ws: &mut WsClient) {
    let outcome = timeout(Duration::from_millis(200), async {
        loop {
            match ws.next().await {
                Some(Ok(TungsteniteMessage::Text(text))) => return Some(text.to_string()),
                Some(Ok(_)) => continue,
                _ => return None,
            }
        }
    })
    .await;
    if let Ok(Some(text)) = outcome {
        panic!("unexpected frame: {text}");
    }
}
