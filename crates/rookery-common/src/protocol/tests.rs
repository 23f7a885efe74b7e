use super::records::*;
use super::wire::{WireReader, WireWriter};
use super::{xid, OpCode};

#[test]
fn test_connect_request_golden_bytes() {
    let req = ConnectRequest::new(0x1122, 10_000, 0x55, vec![0xAA, 0xBB]);
    let bytes = req.to_bytes();

    // protocolVersion, lastZxidSeen, timeOut, sessionId, password
    let mut expected = Vec::new();
    expected.extend_from_slice(&0i32.to_be_bytes());
    expected.extend_from_slice(&0x1122i64.to_be_bytes());
    expected.extend_from_slice(&10_000i32.to_be_bytes());
    expected.extend_from_slice(&0x55i64.to_be_bytes());
    expected.extend_from_slice(&2i32.to_be_bytes());
    expected.extend_from_slice(&[0xAA, 0xBB]);
    assert_eq!(bytes, expected);
}

#[test]
fn test_connect_refusal_carries_zero_session() {
    let resp = ConnectResponse {
        protocol_version: 0,
        timeout_ms: 0,
        session_id: 0,
        password: Vec::new(),
    };
    let decoded = ConnectResponse::from_bytes(&resp.to_bytes()).unwrap();
    assert_eq!(decoded.session_id, 0);
}

#[test]
fn test_request_envelope_layout() {
    let mut w = WireWriter::new();
    RequestHeader::new(7, OpCode::GetData).encode(&mut w);
    ExistsRequest {
        path: "/a".to_string(),
        watch: true,
    }
    .encode(&mut w);
    let frame = w.into_bytes();

    let mut r = WireReader::new(&frame);
    let header = RequestHeader::decode(&mut r).unwrap();
    assert_eq!(header.xid, 7);
    assert_eq!(OpCode::from_i32(header.op), Some(OpCode::GetData));
    let body = GetDataRequest::decode(&mut r).unwrap();
    assert_eq!(body.path, "/a");
    assert!(body.watch);
    assert_eq!(r.remaining(), 0);
}

#[test]
fn test_reply_envelope_layout() {
    let mut w = WireWriter::new();
    ReplyHeader {
        xid: 3,
        zxid: 99,
        err: -101,
    }
    .encode(&mut w);
    let frame = w.into_bytes();

    let header = ReplyHeader::decode(&mut WireReader::new(&frame)).unwrap();
    assert_eq!((header.xid, header.zxid, header.err), (3, 99, -101));
}

#[test]
fn test_create_request_with_acl_vector() {
    let req = CreateRequest {
        path: "/nest".to_string(),
        data: b"egg".to_vec(),
        acl: Acl::open_unsafe(),
        flags: 1,
    };
    let decoded = CreateRequest::from_bytes(&req.to_bytes()).unwrap();
    assert_eq!(decoded, req);
    assert_eq!(decoded.acl[0].perms, perms::ALL);
    assert_eq!(decoded.acl[0].id.scheme, "world");
}

#[test]
fn test_absent_acl_vector_decodes_to_empty() {
    let mut w = WireWriter::new();
    w.write_string("/nest");
    w.write_buffer(b"");
    w.write_i32(-1); // absent vector
    w.write_i32(0);
    let decoded = CreateRequest::from_bytes(&w.into_bytes()).unwrap();
    assert!(decoded.acl.is_empty());
}

#[test]
fn test_get_children_response_decode() {
    let resp = GetChildren2Response {
        children: vec!["child1".to_string(), "child2".to_string()],
        stat: Stat {
            num_children: 2,
            ..Stat::default()
        },
    };
    let decoded = GetChildren2Response::from_bytes(&resp.to_bytes()).unwrap();
    assert_eq!(decoded.children, vec!["child1", "child2"]);
    assert_eq!(decoded.stat.num_children, 2);
}

#[test]
fn test_watcher_event_decode() {
    let event = WatcherEvent {
        event_type: 3, // data changed
        state: 3,      // connected
        path: "/watched".to_string(),
    };
    let decoded = WatcherEvent::from_bytes(&event.to_bytes()).unwrap();
    assert_eq!(decoded, event);
}

#[test]
fn test_reserved_xids_do_not_collide_with_user_xids() {
    for reserved in [xid::NOTIFICATION, xid::PING, xid::AUTH, xid::CLOSE_SESSION] {
        assert!(reserved < 0, "reserved xid {reserved} must be negative");
    }
}

#[test]
fn test_stat_is_76_bytes() {
    let mut w = WireWriter::new();
    Stat::default().encode(&mut w);
    assert_eq!(w.len(), 76);
}
