//! Rookery Protocol Definitions
//!
//! This module defines the wire-level types for the rookery protocol:
//! encoding primitives, record types, opcodes, reserved transaction ids,
//! and error types used throughout the client.
//!
//! # Wire Format
//!
//! All integers are big-endian. Strings and byte buffers are prefixed with
//! an `i32` length; a length of `-1` encodes an absent value. Vectors are
//! prefixed with an `i32` element count.
//!
//! Above the raw frames, three distinguished shapes exist:
//!
//! - **Connect handshake**: the first frame on a fresh socket
//!   ([`ConnectRequest`] / [`ConnectResponse`])
//! - **Request envelope**: [`RequestHeader`] `(xid, opcode)` followed by an
//!   operation body
//! - **Reply envelope**: [`ReplyHeader`] `(xid, zxid, err)` followed by a
//!   response body when `err == 0`
//!
//! # Reserved Transaction Ids
//!
//! A handful of xids never belong to user requests: [`xid::NOTIFICATION`]
//! for server-initiated watch events, [`xid::PING`] for heartbeats,
//! [`xid::AUTH`] for auth packets, and [`xid::CLOSE_SESSION`] for the
//! session teardown envelope.

pub mod error;
pub mod records;
pub mod wire;

#[cfg(test)]
mod tests;

pub use error::{ErrorCode, Result, RookeryError};
pub use records::{
    Acl, AuthPacket, ConnectRequest, ConnectResponse, CreateRequest, CreateResponse,
    DeleteRequest, ExistsRequest, GetAclRequest, GetAclResponse, GetChildren2Request,
    GetChildren2Response, GetDataRequest, GetDataResponse, Id, ReplyHeader, RequestHeader,
    SetAclRequest, SetDataRequest, Stat, StatResponse, SyncRequest, SyncResponse, WatcherEvent,
};
pub use wire::{WireReader, WireWriter};

/// Operation codes carried in the request envelope.
///
/// Only the subset the client submits is represented; the server may know
/// more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum OpCode {
    Create = 1,
    Delete = 2,
    Exists = 3,
    GetData = 4,
    SetData = 5,
    GetAcl = 6,
    SetAcl = 7,
    Sync = 9,
    Ping = 11,
    GetChildren2 = 12,
    Auth = 100,
    CloseSession = -11,
}

impl OpCode {
    /// The wire value of this opcode.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Decodes a wire value back into an opcode.
    pub fn from_i32(value: i32) -> Option<OpCode> {
        Some(match value {
            1 => OpCode::Create,
            2 => OpCode::Delete,
            3 => OpCode::Exists,
            4 => OpCode::GetData,
            5 => OpCode::SetData,
            6 => OpCode::GetAcl,
            7 => OpCode::SetAcl,
            9 => OpCode::Sync,
            11 => OpCode::Ping,
            12 => OpCode::GetChildren2,
            100 => OpCode::Auth,
            -11 => OpCode::CloseSession,
            _ => return None,
        })
    }
}

/// Reserved transaction ids.
///
/// User-request xids are strictly positive; these values are carved out for
/// protocol-internal envelopes.
pub mod xid {
    /// Server-initiated watch event; no matching request exists.
    pub const NOTIFICATION: i32 = -1;
    /// Heartbeat envelope.
    pub const PING: i32 = -2;
    /// Auth-info packet.
    pub const AUTH: i32 = -4;
    /// Session teardown envelope.
    pub const CLOSE_SESSION: i32 = -11;
}
