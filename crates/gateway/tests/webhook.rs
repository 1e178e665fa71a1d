//! Integration tests for the webhook endpoint and the health probe.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    serde_json::{Value, json},
    tokio::{net::TcpListener, sync::mpsc},
};

use {
    wxhook_gateway::{Dispatcher, build_app, observer_fn},
    wxhook_messages::{MessageRecord, MessageVariant},
    wxhook_plugins::{Plugin, PluginRegistry},
};

/// Records the ids of the messages it handles.
struct Collect {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Plugin for Collect {
    fn name(&self) -> &str {
        "collect"
    }

    fn matches(&self, record: &MessageRecord) -> bool {
        record.variant() == MessageVariant::Text
    }

    async fn handle(&self, record: &MessageRecord) -> anyhow::Result<()> {
        self.tx.send(record.header.message_id.clone())?;
        Ok(())
    }
}

struct TestServer {
    addr: SocketAddr,
    dispatcher: Dispatcher,
    observed: mpsc::UnboundedReceiver<Arc<MessageRecord>>,
    handled: mpsc::UnboundedReceiver<String>,
}

async fn start_server() -> TestServer {
    let (plugin_tx, handled) = mpsc::unbounded_channel();
    let registry = Arc::new(PluginRegistry::new());
    registry
        .register(Arc::new(Collect { tx: plugin_tx }))
        .unwrap();
    registry.enable("collect").unwrap();

    let dispatcher = Dispatcher::builder().workers(2).plugins(registry).build();
    let (observer_tx, observed) = mpsc::unbounded_channel();
    dispatcher.register_observer(observer_fn(move |record| {
        let tx = observer_tx.clone();
        async move {
            tx.send(record)?;
            Ok(())
        }
    }));

    let app = build_app(dispatcher.clone(), "/webhook");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        addr,
        dispatcher,
        observed,
        handled,
    }
}

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("delivery timed out")
        .expect("channel closed")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn text_envelope_reaches_observer_and_plugin() {
    let mut server = start_server().await;
    let resp = reqwest::Client::new()
        .post(format!("http://{}/webhook", server.addr))
        .json(&json!({
            "TypeName": "AddMsg",
            "Appid": "device-1",
            "Wxid": "wxid_self",
            "Data": {
                "MsgId": 1001,
                "NewMsgId": 77001,
                "MsgType": 1,
                "FromUserName": {"string": "12345@chatroom"},
                "ToUserName": {"string": "wxid_self"},
                "Content": {"string": "wxid_a:hi there"},
                "CreateTime": 1700000000
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"ok": true}));

    let record = recv(&mut server.observed).await;
    assert_eq!(record.variant(), MessageVariant::Text);
    assert_eq!(record.header.room_id, "12345@chatroom");
    assert_eq!(record.header.actual_sender_id, "wxid_a");
    assert_eq!(record.text(), Some("hi there"));

    assert_eq!(recv(&mut server.handled).await, "1001");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_and_unknown_bodies_are_acknowledged() {
    let mut server = start_server().await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/webhook", server.addr);

    let resp = client
        .post(&url)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.json::<Value>().await.unwrap(), json!({"ok": true}));

    let resp = client
        .post(&url)
        .json(&json!({"typename": "Heartbeat"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    server.dispatcher.shutdown().await;
    assert!(server.observed.try_recv().is_err());
    assert!(server.handled.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_text_records_skip_the_plugin_but_reach_the_observer() {
    let mut server = start_server().await;
    reqwest::Client::new()
        .post(format!("http://{}/webhook", server.addr))
        .json(&json!({"typename": "DelContacts", "payload": {"user_name": "wxid_gone"}}))
        .send()
        .await
        .unwrap();

    let record = recv(&mut server.observed).await;
    assert_eq!(record.variant(), MessageVariant::ContactDeleted);

    server.dispatcher.shutdown().await;
    assert!(server.handled.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_reports_pool_and_plugins() {
    let server = start_server().await;
    let body: Value = reqwest::get(format!("http://{}/health", server.addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["workers"], 2);
    assert_eq!(body["plugins"], json!([{"name": "collect", "enabled": true}]));
}
