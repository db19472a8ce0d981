// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::significant_drop_tightening
)]

//! End-to-end sync: REST backend mocked with `wiremock`, push channel served
//! by a real WebSocket server, and the real store, channel manager and
//! coordinator in between.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use todosync::api::{ApiConfig, HttpTaskApi};
use todosync::channel::{
    ChannelConfig, ChannelManager, ConnectionState, PushChannel, ReconnectPolicy,
};
use todosync::store::TaskStore;
use todosync::sync::SyncCoordinator;
use todosync_proto::{Action, ListId, PushMessage, TaskFilter, UserId, codec};

// =============================================================================
// Helpers
// =============================================================================

/// WebSocket server that records handshake targets and pushes frames to
/// every open connection.
struct PushServer {
    addr: SocketAddr,
    targets: Arc<Mutex<Vec<String>>>,
    conns: Arc<Mutex<Vec<mpsc::UnboundedSender<String>>>>,
    accept: tokio::task::JoinHandle<()>,
}

impl PushServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let targets = Arc::new(Mutex::new(Vec::new()));
        let conns = Arc::new(Mutex::new(Vec::new()));

        let accept = {
            let targets = Arc::clone(&targets);
            let conns = Arc::clone(&conns);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let targets = Arc::clone(&targets);
                    let callback = move |req: &Request, resp: Response| {
                        targets.lock().push(req.uri().to_string());
                        Ok(resp)
                    };
                    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await
                    else {
                        continue;
                    };
                    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
                    conns.lock().push(tx);
                    tokio::spawn(async move {
                        loop {
                            tokio::select! {
                                out = rx.recv() => match out {
                                    Some(text) => {
                                        if ws.send(Message::text(text)).await.is_err() {
                                            break;
                                        }
                                    }
                                    None => break,
                                },
                                incoming = ws.next() => {
                                    if !matches!(incoming, Some(Ok(_))) {
                                        break;
                                    }
                                }
                            }
                        }
                    });
                }
            })
        };

        Self {
            addr,
            targets,
            conns,
            accept,
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    fn push(&self, message: &PushMessage) {
        self.push_raw(&codec::encode(message).unwrap());
    }

    fn push_raw(&self, text: &str) {
        for tx in self.conns.lock().iter() {
            let _ = tx.send(text.to_string());
        }
    }
}

impl Drop for PushServer {
    fn drop(&mut self) {
        self.accept.abort();
    }
}

fn list_json(id: i64, title: &str) -> Value {
    json!({"id": id, "title": title, "user_role": "owner"})
}

fn task_json(id: i64, list_id: i64, title: &str) -> Value {
    json!({
        "id": id,
        "list_id": list_id,
        "task_title": title,
        "task_details": null,
        "due_date": null,
        "start_time": null,
        "is_completed": false,
        "is_starred": false
    })
}

fn page(items: Vec<Value>) -> Value {
    let total = items.len();
    json!({"items": items, "itemsPerPage": 100, "page": 1, "total": total})
}

async fn mount_get(server: &MockServer, route: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Backend with lists 7 and 9. List 7 holds task 1, list 9 holds task 5.
async fn backend() -> MockServer {
    let server = MockServer::start().await;
    mount_get(
        &server,
        "/tasks/1/todolists",
        page(vec![list_json(7, "Groceries"), list_json(9, "Work")]),
    )
    .await;
    mount_get(&server, "/tasks/7", list_json(7, "Groceries")).await;
    mount_get(&server, "/tasks/9", list_json(9, "Work")).await;
    mount_get(&server, "/tasks/7/tasks", page(vec![task_json(1, 7, "milk")])).await;
    mount_get(&server, "/tasks/9/tasks", page(vec![task_json(5, 9, "report")])).await;
    server
}

struct Client {
    store: Arc<TaskStore<HttpTaskApi>>,
    channel: Arc<ChannelManager>,
    sync: SyncCoordinator<ChannelManager>,
}

async fn client(rest: &MockServer, push: &PushServer) -> Client {
    let api = Arc::new(HttpTaskApi::with_token(ApiConfig::new(rest.uri()), "tok"));
    let store = Arc::new(TaskStore::new(api));
    store.load_lists(UserId(1)).await.unwrap();

    let channel = Arc::new(ChannelManager::new(ChannelConfig {
        ws_url: push.ws_url(),
        reconnect: ReconnectPolicy {
            base_delay: Duration::from_millis(50),
            max_attempts: 5,
        },
        connect_timeout: Duration::from_secs(2),
    }));
    let sync = SyncCoordinator::with_store(Arc::clone(&channel), Arc::clone(&store));
    Client {
        store,
        channel,
        sync,
    }
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_connected(c: &Client, push: &PushServer, conns: usize) {
    wait_until("channel open", || {
        c.channel.status().state == ConnectionState::Open
    })
    .await;
    wait_until("server connection", || push.conns.lock().len() >= conns).await;
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn remote_task_added_refetches_current_list() {
    let rest = backend().await;
    let push = PushServer::start().await;
    let c = client(&rest, &push).await;
    assert_eq!(c.store.current_list_id(), Some(ListId(7)));
    assert_eq!(c.store.tasks().len(), 1);

    c.sync.attach(c.store.current_list_id(), Some("tok"));
    wait_connected(&c, &push, 1).await;
    assert_eq!(push.targets.lock()[0], "/ws/7?token=tok");

    // Another member adds a task; the backend now returns two.
    rest.reset().await;
    mount_get(
        &rest,
        "/tasks/7/tasks",
        page(vec![task_json(2, 7, "eggs"), task_json(1, 7, "milk")]),
    )
    .await;

    push.push(&PushMessage::bare(Action::TaskAdded));

    wait_until("refetched collection", || c.store.tasks().len() == 2).await;
    let snap = c.store.snapshot();
    assert_eq!(snap.filter, TaskFilter::All);
    assert_eq!(snap.current_list.unwrap().id, ListId(7));
    assert!(snap.error.is_none());
}

#[tokio::test]
async fn backend_delete_notice_refetches() {
    let rest = backend().await;
    let push = PushServer::start().await;
    let c = client(&rest, &push).await;
    c.sync.attach(c.store.current_list_id(), Some("tok"));
    wait_connected(&c, &push, 1).await;

    rest.reset().await;
    mount_get(&rest, "/tasks/7/tasks", page(vec![])).await;

    // Deletes are announced with only the id of the removed task.
    push.push_raw(r#"{"action":"task_added","task":{"id":1}}"#);

    wait_until("refetched collection", || c.store.tasks().is_empty()).await;
    assert!(c.store.error().is_none());
}

fn completed_json(id: i64, list_id: i64, title: &str) -> Value {
    let mut task = task_json(id, list_id, title);
    task["is_completed"] = json!(true);
    task
}

#[tokio::test]
async fn refetch_keeps_completed_filter() {
    let rest = backend().await;
    mount_get(
        &rest,
        "/tasks/7/tasks-completed",
        page(vec![completed_json(3, 7, "done")]),
    )
    .await;
    let push = PushServer::start().await;
    let c = client(&rest, &push).await;
    c.store.set_filter(TaskFilter::Completed).await.unwrap();
    assert_eq!(c.store.tasks().len(), 1);
    c.sync.attach(Some(ListId(7)), Some("tok"));
    wait_connected(&c, &push, 1).await;

    rest.reset().await;
    mount_get(
        &rest,
        "/tasks/7/tasks-completed",
        page(vec![completed_json(1, 7, "milk"), completed_json(3, 7, "done")]),
    )
    .await;
    push.push(&PushMessage::bare(Action::TaskUpdated));

    wait_until("completed refetch", || c.store.tasks().len() == 2).await;
    assert_eq!(c.store.filter(), TaskFilter::Completed);
    assert!(c.store.tasks().iter().all(|t| t.completed));
}

#[tokio::test]
async fn list_title_update_refreshes_metadata() {
    let rest = backend().await;
    let push = PushServer::start().await;
    let c = client(&rest, &push).await;
    c.sync.attach(Some(ListId(7)), Some("tok"));
    wait_connected(&c, &push, 1).await;

    rest.reset().await;
    mount_get(&rest, "/tasks/7", list_json(7, "Weekly shop")).await;
    // The backend puts the list update under the `task` key.
    push.push_raw(r#"{"action":"list_title_update","task":{"id":7,"title":"Weekly shop"}}"#);

    wait_until("title refreshed", || {
        c.store
            .snapshot()
            .current_list
            .is_some_and(|l| l.title == "Weekly shop")
    })
    .await;
    assert_eq!(c.store.snapshot().lists[0].title, "Weekly shop");
}

#[tokio::test]
async fn failed_refetch_records_error_and_channel_stays_up() {
    let rest = backend().await;
    let push = PushServer::start().await;
    let c = client(&rest, &push).await;
    c.sync.attach(Some(ListId(7)), Some("tok"));
    wait_connected(&c, &push, 1).await;

    rest.reset().await;
    Mock::given(method("GET"))
        .and(path("/tasks/7/tasks"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({"detail": "Not a member of this list"})),
        )
        .mount(&rest)
        .await;
    push.push(&PushMessage::bare(Action::UserRemoved));

    wait_until("error recorded", || c.store.error().is_some()).await;
    assert_eq!(c.store.error().as_deref(), Some("Not a member of this list"));
    assert_eq!(c.store.tasks().len(), 1);
    assert_eq!(c.channel.status().state, ConnectionState::Open);
}

#[tokio::test]
async fn switching_lists_resubscribes_to_new_topic() {
    let rest = backend().await;
    let push = PushServer::start().await;
    let c = client(&rest, &push).await;
    c.sync.attach(Some(ListId(7)), Some("tok"));
    wait_connected(&c, &push, 1).await;

    c.store.select_list(ListId(9)).await.unwrap();
    c.sync.attach(c.store.current_list_id(), Some("tok"));
    wait_connected(&c, &push, 2).await;

    assert_eq!(
        *push.targets.lock(),
        vec!["/ws/7?token=tok".to_string(), "/ws/9?token=tok".to_string()]
    );
    assert_eq!(c.sync.attached_list(), Some(ListId(9)));
    assert_eq!(c.channel.list_id(), Some(ListId(9)));

    rest.reset().await;
    mount_get(
        &rest,
        "/tasks/9/tasks",
        page(vec![task_json(6, 9, "slides"), task_json(5, 9, "report")]),
    )
    .await;
    push.push(&PushMessage::bare(Action::TaskAdded));
    wait_until("list 9 refetched", || c.store.tasks().len() == 2).await;
    assert!(c.store.tasks().iter().all(|t| t.list_id == ListId(9)));
}

#[tokio::test]
async fn detach_on_session_end_closes_channel() {
    let rest = backend().await;
    let push = PushServer::start().await;
    let c = client(&rest, &push).await;
    c.sync.attach(Some(ListId(7)), Some("tok"));
    wait_connected(&c, &push, 1).await;

    c.sync.attach(None, None);
    c.store.clear();

    assert_eq!(c.channel.status().state, ConnectionState::Closed);
    assert_eq!(c.channel.registry().topic_count(), 0);
    assert!(c.store.snapshot().current_list.is_none());
}
