//! Rookery Record Types
//!
//! Every message body exchanged with the server is one of the fixed-layout
//! records defined here. Each record knows how to append itself to a
//! [`WireWriter`] and how to decode itself from a [`WireReader`]; the
//! `to_bytes` / `from_bytes` helpers wrap those for callers that work with
//! whole frames.
//!
//! # Record Flow
//!
//! 1. The façade encodes an operation body (e.g. [`CreateRequest`])
//! 2. The session engine prepends a [`RequestHeader`] and writes the frame
//! 3. The server replies with a [`ReplyHeader`] followed by the response
//!    body when the error field is zero
//!
//! Watch notifications arrive as [`WatcherEvent`] bodies on the reserved
//! notification xid and never correspond to a request.

use super::error::Result;
use super::wire::{WireReader, WireWriter};

/// Permission bits carried in an [`Acl`] entry.
pub mod perms {
    pub const READ: i32 = 1 << 0;
    pub const WRITE: i32 = 1 << 1;
    pub const CREATE: i32 = 1 << 2;
    pub const DELETE: i32 = 1 << 3;
    pub const ADMIN: i32 = 1 << 4;
    pub const ALL: i32 = READ | WRITE | CREATE | DELETE | ADMIN;
}

/// First frame sent on a fresh socket.
///
/// A brand-new client sends `session_id == 0` and an empty password; a
/// reconnecting client presents the id, password, and last seen zxid of the
/// session it wants to resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub protocol_version: i32,
    pub last_zxid_seen: i64,
    pub timeout_ms: i32,
    pub session_id: i64,
    pub password: Vec<u8>,
}

impl ConnectRequest {
    pub fn new(last_zxid_seen: i64, timeout_ms: i32, session_id: i64, password: Vec<u8>) -> Self {
        ConnectRequest {
            protocol_version: 0,
            last_zxid_seen,
            timeout_ms,
            session_id,
            password,
        }
    }

    pub fn encode(&self, w: &mut WireWriter) {
        w.write_i32(self.protocol_version);
        w.write_i64(self.last_zxid_seen);
        w.write_i32(self.timeout_ms);
        w.write_i64(self.session_id);
        w.write_buffer(&self.password);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        Ok(ConnectRequest {
            protocol_version: r.read_i32()?,
            last_zxid_seen: r.read_i64()?,
            timeout_ms: r.read_i32()?,
            session_id: r.read_i64()?,
            password: r.read_buffer()?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(28 + self.password.len());
        self.encode(&mut w);
        w.into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::decode(&mut WireReader::new(bytes))
    }
}

/// Server's answer to a [`ConnectRequest`].
///
/// A `session_id` of zero means the server refused to resume the presented
/// session; the client must treat its session as expired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
    pub protocol_version: i32,
    pub timeout_ms: i32,
    pub session_id: i64,
    pub password: Vec<u8>,
}

impl ConnectResponse {
    pub fn encode(&self, w: &mut WireWriter) {
        w.write_i32(self.protocol_version);
        w.write_i32(self.timeout_ms);
        w.write_i64(self.session_id);
        w.write_buffer(&self.password);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        Ok(ConnectResponse {
            protocol_version: r.read_i32()?,
            timeout_ms: r.read_i32()?,
            session_id: r.read_i64()?,
            password: r.read_buffer()?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(20 + self.password.len());
        self.encode(&mut w);
        w.into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::decode(&mut WireReader::new(bytes))
    }
}

/// Envelope prefix of every client request after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub xid: i32,
    pub op: i32,
}

impl RequestHeader {
    pub fn new(xid: i32, op: super::OpCode) -> Self {
        RequestHeader {
            xid,
            op: op.as_i32(),
        }
    }

    pub fn encode(&self, w: &mut WireWriter) {
        w.write_i32(self.xid);
        w.write_i32(self.op);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        Ok(RequestHeader {
            xid: r.read_i32()?,
            op: r.read_i32()?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(8);
        self.encode(&mut w);
        w.into_bytes()
    }
}

/// Envelope prefix of every server reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyHeader {
    pub xid: i32,
    pub zxid: i64,
    pub err: i32,
}

impl ReplyHeader {
    pub fn encode(&self, w: &mut WireWriter) {
        w.write_i32(self.xid);
        w.write_i64(self.zxid);
        w.write_i32(self.err);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        Ok(ReplyHeader {
            xid: r.read_i32()?,
            zxid: r.read_i64()?,
            err: r.read_i32()?,
        })
    }
}

/// Node metadata returned by read and mutate operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    pub czxid: i64,
    pub mzxid: i64,
    pub ctime: i64,
    pub mtime: i64,
    pub version: i32,
    pub cversion: i32,
    pub aversion: i32,
    pub ephemeral_owner: i64,
    pub data_length: i32,
    pub num_children: i32,
    pub pzxid: i64,
}

impl Stat {
    pub fn encode(&self, w: &mut WireWriter) {
        w.write_i64(self.czxid);
        w.write_i64(self.mzxid);
        w.write_i64(self.ctime);
        w.write_i64(self.mtime);
        w.write_i32(self.version);
        w.write_i32(self.cversion);
        w.write_i32(self.aversion);
        w.write_i64(self.ephemeral_owner);
        w.write_i32(self.data_length);
        w.write_i32(self.num_children);
        w.write_i64(self.pzxid);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        Ok(Stat {
            czxid: r.read_i64()?,
            mzxid: r.read_i64()?,
            ctime: r.read_i64()?,
            mtime: r.read_i64()?,
            version: r.read_i32()?,
            cversion: r.read_i32()?,
            aversion: r.read_i32()?,
            ephemeral_owner: r.read_i64()?,
            data_length: r.read_i32()?,
            num_children: r.read_i32()?,
            pzxid: r.read_i64()?,
        })
    }
}

/// Identity a permission applies to: a scheme plus a scheme-specific id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Id {
    pub scheme: String,
    pub id: String,
}

impl Id {
    pub fn new(scheme: impl Into<String>, id: impl Into<String>) -> Self {
        Id {
            scheme: scheme.into(),
            id: id.into(),
        }
    }

    pub fn encode(&self, w: &mut WireWriter) {
        w.write_string(&self.scheme);
        w.write_string(&self.id);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        Ok(Id {
            scheme: r.read_string()?,
            id: r.read_string()?,
        })
    }
}

/// A single access-control entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Acl {
    pub perms: i32,
    pub id: Id,
}

impl Acl {
    pub fn new(perms: i32, scheme: impl Into<String>, id: impl Into<String>) -> Self {
        Acl {
            perms,
            id: Id::new(scheme, id),
        }
    }

    /// Everyone may do everything.
    pub fn open_unsafe() -> Vec<Acl> {
        vec![Acl::new(perms::ALL, "world", "anyone")]
    }

    /// Everyone may read; nobody may mutate.
    pub fn read_unsafe() -> Vec<Acl> {
        vec![Acl::new(perms::READ, "world", "anyone")]
    }

    /// Full permissions for the authenticated identity that creates the node.
    pub fn creator_all() -> Vec<Acl> {
        vec![Acl::new(perms::ALL, "auth", "")]
    }

    pub fn encode(&self, w: &mut WireWriter) {
        w.write_i32(self.perms);
        self.id.encode(w);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        Ok(Acl {
            perms: r.read_i32()?,
            id: Id::decode(r)?,
        })
    }
}

fn encode_acl_vec(acl: &[Acl], w: &mut WireWriter) {
    w.write_i32(acl.len() as i32);
    for entry in acl {
        entry.encode(w);
    }
}

fn decode_acl_vec(r: &mut WireReader<'_>) -> Result<Vec<Acl>> {
    let len = r.read_vector_len()?;
    let mut acl = Vec::with_capacity(len.min(64));
    for _ in 0..len {
        acl.push(Acl::decode(r)?);
    }
    Ok(acl)
}

macro_rules! frame_body {
    ($ty:ty) => {
        impl $ty {
            pub fn to_bytes(&self) -> Vec<u8> {
                let mut w = WireWriter::new();
                self.encode(&mut w);
                w.into_bytes()
            }

            pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
                Self::decode(&mut WireReader::new(bytes))
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub path: String,
    pub data: Vec<u8>,
    pub acl: Vec<Acl>,
    pub flags: i32,
}

impl CreateRequest {
    pub fn encode(&self, w: &mut WireWriter) {
        w.write_string(&self.path);
        w.write_buffer(&self.data);
        encode_acl_vec(&self.acl, w);
        w.write_i32(self.flags);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        Ok(CreateRequest {
            path: r.read_string()?,
            data: r.read_buffer()?,
            acl: decode_acl_vec(r)?,
            flags: r.read_i32()?,
        })
    }
}
frame_body!(CreateRequest);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateResponse {
    pub path: String,
}

impl CreateResponse {
    pub fn encode(&self, w: &mut WireWriter) {
        w.write_string(&self.path);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        Ok(CreateResponse {
            path: r.read_string()?,
        })
    }
}
frame_body!(CreateResponse);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub path: String,
    pub version: i32,
}

impl DeleteRequest {
    pub fn encode(&self, w: &mut WireWriter) {
        w.write_string(&self.path);
        w.write_i32(self.version);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        Ok(DeleteRequest {
            path: r.read_string()?,
            version: r.read_i32()?,
        })
    }
}
frame_body!(DeleteRequest);

/// Shared shape of every request that names a path and may set a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistsRequest {
    pub path: String,
    pub watch: bool,
}

impl ExistsRequest {
    pub fn encode(&self, w: &mut WireWriter) {
        w.write_string(&self.path);
        w.write_bool(self.watch);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        Ok(ExistsRequest {
            path: r.read_string()?,
            watch: r.read_bool()?,
        })
    }
}
frame_body!(ExistsRequest);

pub type GetDataRequest = ExistsRequest;
pub type GetChildren2Request = ExistsRequest;

/// Response carrying nothing but a [`Stat`]; shared by exists, set-data,
/// and set-acl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatResponse {
    pub stat: Stat,
}

impl StatResponse {
    pub fn encode(&self, w: &mut WireWriter) {
        self.stat.encode(w);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        Ok(StatResponse {
            stat: Stat::decode(r)?,
        })
    }
}
frame_body!(StatResponse);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetDataResponse {
    pub data: Vec<u8>,
    pub stat: Stat,
}

impl GetDataResponse {
    pub fn encode(&self, w: &mut WireWriter) {
        w.write_buffer(&self.data);
        self.stat.encode(w);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        Ok(GetDataResponse {
            data: r.read_buffer()?,
            stat: Stat::decode(r)?,
        })
    }
}
frame_body!(GetDataResponse);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDataRequest {
    pub path: String,
    pub data: Vec<u8>,
    pub version: i32,
}

impl SetDataRequest {
    pub fn encode(&self, w: &mut WireWriter) {
        w.write_string(&self.path);
        w.write_buffer(&self.data);
        w.write_i32(self.version);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        Ok(SetDataRequest {
            path: r.read_string()?,
            data: r.read_buffer()?,
            version: r.read_i32()?,
        })
    }
}
frame_body!(SetDataRequest);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetAclRequest {
    pub path: String,
}

impl GetAclRequest {
    pub fn encode(&self, w: &mut WireWriter) {
        w.write_string(&self.path);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        Ok(GetAclRequest {
            path: r.read_string()?,
        })
    }
}
frame_body!(GetAclRequest);

pub type SyncRequest = GetAclRequest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetAclResponse {
    pub acl: Vec<Acl>,
    pub stat: Stat,
}

impl GetAclResponse {
    pub fn encode(&self, w: &mut WireWriter) {
        encode_acl_vec(&self.acl, w);
        self.stat.encode(w);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        Ok(GetAclResponse {
            acl: decode_acl_vec(r)?,
            stat: Stat::decode(r)?,
        })
    }
}
frame_body!(GetAclResponse);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetAclRequest {
    pub path: String,
    pub acl: Vec<Acl>,
    pub version: i32,
}

impl SetAclRequest {
    pub fn encode(&self, w: &mut WireWriter) {
        w.write_string(&self.path);
        encode_acl_vec(&self.acl, w);
        w.write_i32(self.version);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        Ok(SetAclRequest {
            path: r.read_string()?,
            acl: decode_acl_vec(r)?,
            version: r.read_i32()?,
        })
    }
}
frame_body!(SetAclRequest);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetChildren2Response {
    pub children: Vec<String>,
    pub stat: Stat,
}

impl GetChildren2Response {
    pub fn encode(&self, w: &mut WireWriter) {
        w.write_i32(self.children.len() as i32);
        for child in &self.children {
            w.write_string(child);
        }
        self.stat.encode(w);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        let len = r.read_vector_len()?;
        let mut children = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            children.push(r.read_string()?);
        }
        Ok(GetChildren2Response {
            children,
            stat: Stat::decode(r)?,
        })
    }
}
frame_body!(GetChildren2Response);

pub type SyncResponse = CreateResponse;

/// Credentials submitted on the reserved auth xid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPacket {
    pub auth_type: i32,
    pub scheme: String,
    pub auth: Vec<u8>,
}

impl AuthPacket {
    pub fn new(scheme: impl Into<String>, auth: Vec<u8>) -> Self {
        AuthPacket {
            auth_type: 0,
            scheme: scheme.into(),
            auth,
        }
    }

    pub fn encode(&self, w: &mut WireWriter) {
        w.write_i32(self.auth_type);
        w.write_string(&self.scheme);
        w.write_buffer(&self.auth);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        Ok(AuthPacket {
            auth_type: r.read_i32()?,
            scheme: r.read_string()?,
            auth: r.read_buffer()?,
        })
    }
}
frame_body!(AuthPacket);

/// Body of a server-initiated watch notification.
///
/// `event_type` and `state` are raw wire values; the client maps them to
/// its own event enums when dispatching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherEvent {
    pub event_type: i32,
    pub state: i32,
    pub path: String,
}

impl WatcherEvent {
    pub fn encode(&self, w: &mut WireWriter) {
        w.write_i32(self.event_type);
        w.write_i32(self.state);
        w.write_string(&self.path);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        Ok(WatcherEvent {
            event_type: r.read_i32()?,
            state: r.read_i32()?,
            path: r.read_string()?,
        })
    }
}
frame_body!(WatcherEvent);
