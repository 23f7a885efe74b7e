//! In-process coordination server for integration tests.
//!
//! Speaks the real wire protocol over a loopback listener: connect
//! handshake, request/reply envelopes, one-shot watch notifications, and
//! session bookkeeping. Tests poke the knobs (`set_reply_delay`,
//! `refuse_session_resumption`, `reject_auth`, `drop_connections`) to
//! exercise the client's failure paths deterministically.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use rookery_common::protocol::records::{
    Acl, AuthPacket, ConnectRequest, ConnectResponse, CreateRequest, CreateResponse,
    DeleteRequest, ExistsRequest, GetAclRequest, GetAclResponse, GetChildren2Request,
    GetChildren2Response, GetDataRequest, GetDataResponse, ReplyHeader, RequestHeader,
    SetAclRequest, SetDataRequest, Stat, StatResponse, SyncRequest, SyncResponse, WatcherEvent,
};
use rookery_common::protocol::wire::{WireReader, WireWriter};
use rookery_common::protocol::xid as reserved;
use rookery_common::{ErrorCode, FrameConnection, OpCode, Result};

const EVENT_STATE_CONNECTED: i32 = 3;

#[derive(Debug, Clone)]
struct Node {
    data: Vec<u8>,
    acl: Vec<Acl>,
    czxid: i64,
    mzxid: i64,
    pzxid: i64,
    version: i32,
    cversion: i32,
    aversion: i32,
    ephemeral_owner: i64,
}

type WatchSink = mpsc::UnboundedSender<WatcherEvent>;

#[derive(Default)]
struct Watches {
    data: HashMap<String, Vec<WatchSink>>,
    exist: HashMap<String, Vec<WatchSink>>,
    child: HashMap<String, Vec<WatchSink>>,
}

struct Tree {
    nodes: HashMap<String, Node>,
    zxid: i64,
    next_session: i64,
    live_sessions: HashSet<i64>,
    watches: Watches,
}

impl Tree {
    fn new() -> Tree {
        let mut nodes = HashMap::new();
        nodes.insert(
            "/".to_string(),
            Node {
                data: Vec::new(),
                acl: Acl::open_unsafe(),
                czxid: 0,
                mzxid: 0,
                pzxid: 0,
                version: 0,
                cversion: 0,
                aversion: 0,
                ephemeral_owner: 0,
            },
        );
        Tree {
            nodes,
            zxid: 0,
            next_session: 0x1000,
            live_sessions: HashSet::new(),
            watches: Watches::default(),
        }
    }

    fn stat_of(&self, path: &str) -> Stat {
        let node = &self.nodes[path];
        Stat {
            czxid: node.czxid,
            mzxid: node.mzxid,
            ctime: 0,
            mtime: 0,
            version: node.version,
            cversion: node.cversion,
            aversion: node.aversion,
            ephemeral_owner: node.ephemeral_owner,
            data_length: node.data.len() as i32,
            num_children: self.children_of(path).len() as i32,
            pzxid: node.pzxid,
        }
    }

    fn children_of(&self, path: &str) -> Vec<String> {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        self.nodes
            .keys()
            .filter(|candidate| {
                candidate.starts_with(&prefix)
                    && candidate.len() > prefix.len()
                    && !candidate[prefix.len()..].contains('/')
            })
            .map(|candidate| candidate[prefix.len()..].to_string())
            .collect()
    }

    fn parent_of(path: &str) -> Option<String> {
        if path == "/" {
            return None;
        }
        match path.rfind('/') {
            Some(0) => Some("/".to_string()),
            Some(idx) => Some(path[..idx].to_string()),
            None => None,
        }
    }

    /// Consumes watch registrations exactly as one-shot semantics demand
    /// and pushes the notification to every subscribed connection.
    fn fire(&mut self, event_type: i32, path: &str) {
        let mut sinks: Vec<WatchSink> = Vec::new();
        let mut drain = |map: &mut HashMap<String, Vec<WatchSink>>| {
            if let Some(found) = map.remove(path) {
                sinks.extend(found);
            }
        };
        match event_type {
            1 | 3 => {
                // created / data changed
                drain(&mut self.watches.data);
                drain(&mut self.watches.exist);
            }
            2 => {
                // deleted
                drain(&mut self.watches.data);
                drain(&mut self.watches.exist);
                drain(&mut self.watches.child);
            }
            4 => {
                // children changed
                drain(&mut self.watches.child);
            }
            _ => {}
        }
        for sink in sinks {
            let _ = sink.send(WatcherEvent {
                event_type,
                state: EVENT_STATE_CONNECTED,
                path: path.to_string(),
            });
        }
    }
}

struct ServerInner {
    tree: Mutex<Tree>,
    reply_delay: Mutex<Option<Duration>>,
    refuse_resume: AtomicBool,
    reject_auth: AtomicBool,
    conns: Mutex<Vec<JoinHandle<()>>>,
}

pub struct MockServer {
    pub addr: String,
    inner: Arc<ServerInner>,
    accept_task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let inner = Arc::new(ServerInner {
            tree: Mutex::new(Tree::new()),
            reply_delay: Mutex::new(None),
            refuse_resume: AtomicBool::new(false),
            reject_auth: AtomicBool::new(false),
            conns: Mutex::new(Vec::new()),
        });

        let accept_inner = inner.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let conn_inner = accept_inner.clone();
                let handle = tokio::spawn(async move {
                    let _ = serve_connection(stream, conn_inner).await;
                });
                accept_inner.conns.lock().unwrap().push(handle);
            }
        });

        MockServer {
            addr,
            inner,
            accept_task,
        }
    }

    /// Delays every non-handshake reply, pings included.
    pub fn set_reply_delay(&self, delay: Option<Duration>) {
        *self.inner.reply_delay.lock().unwrap() = delay;
    }

    /// Makes every session-resumption handshake answer with session id 0.
    pub fn refuse_session_resumption(&self, refuse: bool) {
        self.inner.refuse_resume.store(refuse, Ordering::SeqCst);
    }

    /// Makes every auth packet fail.
    pub fn reject_auth(&self, reject: bool) {
        self.inner.reject_auth.store(reject, Ordering::SeqCst);
    }

    /// Kills every live connection without touching session state, like a
    /// network partition would.
    pub fn drop_connections(&self) {
        for handle in self.inner.conns.lock().unwrap().drain(..) {
            handle.abort();
        }
    }

    /// Whether a node exists, bypassing the protocol.
    pub fn has_node(&self, path: &str) -> bool {
        self.inner.tree.lock().unwrap().nodes.contains_key(path)
    }

    pub fn stop(&self) {
        self.accept_task.abort();
        self.drop_connections();
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn serve_connection(stream: TcpStream, inner: Arc<ServerInner>) -> Result<()> {
    let mut conn = FrameConnection::new(stream);

    // Handshake first; everything else rides request envelopes.
    let frame = conn.read_frame().await?;
    let request = ConnectRequest::from_bytes(&frame)?;
    let refused_resume = {
        let mut tree = inner.tree.lock().unwrap();
        if request.session_id != 0 {
            let refused = inner.refuse_resume.load(Ordering::SeqCst)
                || !tree.live_sessions.contains(&request.session_id);
            if refused {
                None
            } else {
                Some((
                    request.session_id,
                    request.password.clone(),
                    request.timeout_ms.max(1),
                ))
            }
        } else {
            tree.next_session += 1;
            let session_id = tree.next_session;
            tree.live_sessions.insert(session_id);
            Some((session_id, vec![0x5A; 16], request.timeout_ms.max(1)))
        }
    };
    let (session_id, password, granted_ms) = match refused_resume {
        Some(tuple) => tuple,
        None => {
            let refusal = ConnectResponse {
                protocol_version: 0,
                timeout_ms: 0,
                session_id: 0,
                password: Vec::new(),
            };
            conn.write_frame(&refusal.to_bytes()).await?;
            return Ok(());
        }
    };
    let response = ConnectResponse {
        protocol_version: 0,
        timeout_ms: granted_ms,
        session_id,
        password,
    };
    conn.write_frame(&response.to_bytes()).await?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<WatcherEvent>();
    let (read_half, write_half) = conn.into_inner().into_split();
    let mut reader = FrameConnection::new(read_half);
    let mut writer = FrameConnection::new(write_half);

    loop {
        tokio::select! {
            frame = reader.read_frame() => {
                let frame = frame?;
                let delay = *inner.reply_delay.lock().unwrap();
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if !handle_request(&frame, &inner, session_id, &event_tx, &mut writer).await? {
                    return Ok(());
                }
            }
            event = event_rx.recv() => {
                // The sender half lives in this scope, so recv never yields None.
                if let Some(event) = event {
                    let zxid = inner.tree.lock().unwrap().zxid;
                    write_reply(&mut writer, reserved::NOTIFICATION, zxid, 0, &event.to_bytes())
                        .await?;
                }
            }
        }
    }
}

/// Handles one request envelope. Returns `false` when the connection should
/// close (session teardown).
async fn handle_request(
    frame: &[u8],
    inner: &Arc<ServerInner>,
    session_id: i64,
    event_tx: &WatchSink,
    writer: &mut FrameConnection<OwnedWriteHalf>,
) -> Result<bool> {
    let mut r = WireReader::new(frame);
    let header = RequestHeader::decode(&mut r)?;

    match OpCode::from_i32(header.op) {
        Some(OpCode::Ping) => {
            let zxid = inner.tree.lock().unwrap().zxid;
            write_reply(writer, reserved::PING, zxid, 0, &[]).await?;
        }
        Some(OpCode::Auth) => {
            let _packet = AuthPacket::decode(&mut r)?;
            let zxid = inner.tree.lock().unwrap().zxid;
            if inner.reject_auth.load(Ordering::SeqCst) {
                write_reply(
                    writer,
                    reserved::AUTH,
                    zxid,
                    ErrorCode::AuthFailed.as_i32(),
                    &[],
                )
                .await?;
                return Ok(false);
            }
            write_reply(writer, reserved::AUTH, zxid, 0, &[]).await?;
        }
        Some(OpCode::CloseSession) => {
            let zxid = {
                let mut tree = inner.tree.lock().unwrap();
                tree.live_sessions.remove(&session_id);
                tree.zxid
            };
            write_reply(writer, reserved::CLOSE_SESSION, zxid, 0, &[]).await?;
            return Ok(false);
        }
        Some(op) => {
            let (err, body, zxid) = apply_operation(op, &mut r, inner, session_id, event_tx);
            write_reply(writer, header.xid, zxid, err, &body).await?;
        }
        None => {
            let zxid = inner.tree.lock().unwrap().zxid;
            write_reply(
                writer,
                header.xid,
                zxid,
                ErrorCode::Unimplemented.as_i32(),
                &[],
            )
            .await?;
        }
    }
    Ok(true)
}

/// Applies one tree operation under the lock, returning (err, body, zxid).
fn apply_operation(
    op: OpCode,
    r: &mut WireReader<'_>,
    inner: &Arc<ServerInner>,
    session_id: i64,
    event_tx: &WatchSink,
) -> (i32, Vec<u8>, i64) {
    let mut tree = inner.tree.lock().unwrap();
    let (err, body) = match op {
        OpCode::Create => match CreateRequest::decode(r) {
            Ok(request) => create_node(&mut tree, request, session_id),
            Err(_) => (ErrorCode::MarshallingError.as_i32(), Vec::new()),
        },
        OpCode::Delete => match DeleteRequest::decode(r) {
            Ok(request) => delete_node(&mut tree, request),
            Err(_) => (ErrorCode::MarshallingError.as_i32(), Vec::new()),
        },
        OpCode::Exists => match ExistsRequest::decode(r) {
            Ok(request) => {
                if request.watch {
                    tree.watches
                        .exist
                        .entry(request.path.clone())
                        .or_default()
                        .push(event_tx.clone());
                }
                if tree.nodes.contains_key(&request.path) {
                    let stat = tree.stat_of(&request.path);
                    (0, StatResponse { stat }.to_bytes())
                } else {
                    (ErrorCode::NoNode.as_i32(), Vec::new())
                }
            }
            Err(_) => (ErrorCode::MarshallingError.as_i32(), Vec::new()),
        },
        OpCode::GetData => match GetDataRequest::decode(r) {
            Ok(request) => {
                if tree.nodes.contains_key(&request.path) {
                    if request.watch {
                        tree.watches
                            .data
                            .entry(request.path.clone())
                            .or_default()
                            .push(event_tx.clone());
                    }
                    let stat = tree.stat_of(&request.path);
                    let data = tree.nodes[&request.path].data.clone();
                    (0, GetDataResponse { data, stat }.to_bytes())
                } else {
                    (ErrorCode::NoNode.as_i32(), Vec::new())
                }
            }
            Err(_) => (ErrorCode::MarshallingError.as_i32(), Vec::new()),
        },
        OpCode::SetData => match SetDataRequest::decode(r) {
            Ok(request) => set_data(&mut tree, request),
            Err(_) => (ErrorCode::MarshallingError.as_i32(), Vec::new()),
        },
        OpCode::GetAcl => match GetAclRequest::decode(r) {
            Ok(request) => {
                if tree.nodes.contains_key(&request.path) {
                    let stat = tree.stat_of(&request.path);
                    let acl = tree.nodes[&request.path].acl.clone();
                    (0, GetAclResponse { acl, stat }.to_bytes())
                } else {
                    (ErrorCode::NoNode.as_i32(), Vec::new())
                }
            }
            Err(_) => (ErrorCode::MarshallingError.as_i32(), Vec::new()),
        },
        OpCode::SetAcl => match SetAclRequest::decode(r) {
            Ok(request) => set_acl(&mut tree, request),
            Err(_) => (ErrorCode::MarshallingError.as_i32(), Vec::new()),
        },
        OpCode::GetChildren2 => match GetChildren2Request::decode(r) {
            Ok(request) => {
                if tree.nodes.contains_key(&request.path) {
                    if request.watch {
                        tree.watches
                            .child
                            .entry(request.path.clone())
                            .or_default()
                            .push(event_tx.clone());
                    }
                    let children = tree.children_of(&request.path);
                    let stat = tree.stat_of(&request.path);
                    (0, GetChildren2Response { children, stat }.to_bytes())
                } else {
                    (ErrorCode::NoNode.as_i32(), Vec::new())
                }
            }
            Err(_) => (ErrorCode::MarshallingError.as_i32(), Vec::new()),
        },
        OpCode::Sync => match SyncRequest::decode(r) {
            Ok(request) => (0, SyncResponse { path: request.path }.to_bytes()),
            Err(_) => (ErrorCode::MarshallingError.as_i32(), Vec::new()),
        },
        OpCode::Ping | OpCode::Auth | OpCode::CloseSession => {
            (ErrorCode::Unimplemented.as_i32(), Vec::new())
        }
    };
    let zxid = tree.zxid;
    (err, body, zxid)
}

fn create_node(tree: &mut Tree, request: CreateRequest, session_id: i64) -> (i32, Vec<u8>) {
    let CreateRequest {
        mut path,
        data,
        acl,
        flags,
    } = request;

    if acl.is_empty() {
        return (ErrorCode::InvalidAcl.as_i32(), Vec::new());
    }
    let Some(parent) = Tree::parent_of(&path) else {
        return (ErrorCode::NodeExists.as_i32(), Vec::new());
    };
    if !tree.nodes.contains_key(&parent) {
        return (ErrorCode::NoNode.as_i32(), Vec::new());
    }
    if tree.nodes[&parent].ephemeral_owner != 0 {
        return (ErrorCode::NoChildrenForEphemerals.as_i32(), Vec::new());
    }
    if flags == 2 || flags == 3 {
        let sequence = tree.nodes[&parent].cversion;
        path = format!("{path}{sequence:010}");
    }
    if tree.nodes.contains_key(&path) {
        return (ErrorCode::NodeExists.as_i32(), Vec::new());
    }

    tree.zxid += 1;
    let zxid = tree.zxid;
    let ephemeral_owner = if flags == 1 || flags == 3 { session_id } else { 0 };
    tree.nodes.insert(
        path.clone(),
        Node {
            data,
            acl,
            czxid: zxid,
            mzxid: zxid,
            pzxid: zxid,
            version: 0,
            cversion: 0,
            aversion: 0,
            ephemeral_owner,
        },
    );
    if let Some(parent_node) = tree.nodes.get_mut(&parent) {
        parent_node.cversion += 1;
        parent_node.pzxid = zxid;
    }

    tree.fire(1, &path); // created
    tree.fire(4, &parent); // children changed
    (0, CreateResponse { path }.to_bytes())
}

fn delete_node(tree: &mut Tree, request: DeleteRequest) -> (i32, Vec<u8>) {
    let DeleteRequest { path, version } = request;
    if !tree.nodes.contains_key(&path) {
        return (ErrorCode::NoNode.as_i32(), Vec::new());
    }
    if !tree.children_of(&path).is_empty() {
        return (ErrorCode::NotEmpty.as_i32(), Vec::new());
    }
    if version != -1 && tree.nodes[&path].version != version {
        return (ErrorCode::BadVersion.as_i32(), Vec::new());
    }

    tree.zxid += 1;
    let zxid = tree.zxid;
    tree.nodes.remove(&path);
    if let Some(parent) = Tree::parent_of(&path) {
        if let Some(parent_node) = tree.nodes.get_mut(&parent) {
            parent_node.cversion += 1;
            parent_node.pzxid = zxid;
        }
        tree.fire(2, &path); // deleted
        tree.fire(4, &parent); // children changed
    }
    (0, Vec::new())
}

fn set_data(tree: &mut Tree, request: SetDataRequest) -> (i32, Vec<u8>) {
    let SetDataRequest {
        path,
        data,
        version,
    } = request;
    if !tree.nodes.contains_key(&path) {
        return (ErrorCode::NoNode.as_i32(), Vec::new());
    }
    if version != -1 && tree.nodes[&path].version != version {
        return (ErrorCode::BadVersion.as_i32(), Vec::new());
    }

    tree.zxid += 1;
    let zxid = tree.zxid;
    {
        let node = tree.nodes.get_mut(&path).unwrap();
        node.data = data;
        node.version += 1;
        node.mzxid = zxid;
    }
    let stat = tree.stat_of(&path);
    tree.fire(3, &path); // data changed
    (0, StatResponse { stat }.to_bytes())
}

fn set_acl(tree: &mut Tree, request: SetAclRequest) -> (i32, Vec<u8>) {
    let SetAclRequest { path, acl, version } = request;
    if acl.is_empty() {
        return (ErrorCode::InvalidAcl.as_i32(), Vec::new());
    }
    if !tree.nodes.contains_key(&path) {
        return (ErrorCode::NoNode.as_i32(), Vec::new());
    }
    if version != -1 && tree.nodes[&path].aversion != version {
        return (ErrorCode::BadVersion.as_i32(), Vec::new());
    }

    {
        let node = tree.nodes.get_mut(&path).unwrap();
        node.acl = acl;
        node.aversion += 1;
    }
    let stat = tree.stat_of(&path);
    (0, StatResponse { stat }.to_bytes())
}

async fn write_reply(
    writer: &mut FrameConnection<OwnedWriteHalf>,
    xid: i32,
    zxid: i64,
    err: i32,
    body: &[u8],
) -> Result<()> {
    let mut w = WireWriter::with_capacity(16 + body.len());
    ReplyHeader { xid, zxid, err }.encode(&mut w);
    w.write_raw(body);
    writer.write_frame(&w.into_bytes()).await
}
