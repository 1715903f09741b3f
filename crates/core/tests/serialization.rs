use std::collections::HashMap;

use bincode::config;
use hashwork_core::{
    enums::{ProtocolMessage, StatusCode},
    ids::{JobId, PeerId},
    job::{JobResult, Request, Skills, Status},
    wire::{Frame, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE, PROTOCOL_NAME, PROTOCOL_VERSION},
};

fn roundtrip<T>(value: &T) -> T
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let bytes = bincode::serde::encode_to_vec(value, config::standard()).unwrap();
    let (recovered, _): (T, _) =
        bincode::serde::decode_from_slice(&bytes, config::standard()).unwrap();
    recovered
}

#[test]
fn job_id_is_stable_for_same_data_and_serial() {
    let data = [0x01u8; 32];
    assert_eq!(JobId::derive(&data, 7), JobId::derive(&data, 7));
}

#[test]
fn job_id_changes_with_serial() {
    let data = [0x01u8; 32];
    let ids: Vec<JobId> = (1..=64).map(|serial| JobId::derive(&data, serial)).collect();
    for (i, a) in ids.iter().enumerate() {
        for b in &ids[i + 1..] {
            assert_ne!(a, b);
        }
    }
}

#[test]
fn job_id_displays_as_hex() {
    let id = JobId([0xde, 0xad, 0xbe, 0xef, 0x00, 0x01, 0x02, 0x03]);
    assert_eq!(id.to_string(), "deadbeef00010203");
}

#[test]
fn request_frame_roundtrips_through_bincode() {
    let frame = Frame::Message(ProtocolMessage::Request(Request {
        id: JobId([0xaa; 8]),
        data: vec![1, 2, 3],
        difficulty: 12,
    }));
    assert_eq!(roundtrip(&frame), frame);
}

#[test]
fn result_and_status_frames_roundtrip() {
    let result = Frame::Message(
        JobResult {
            id: JobId([0xbb; 8]),
            nonce: vec![0, 0, 0, 0, 0, 0, 0, 42],
            hash: vec![0x00; 20],
        }
        .into(),
    );
    assert_eq!(roundtrip(&result), result);

    let status = Frame::Message(
        Status {
            id: JobId([0xbb; 8]),
            code: StatusCode::AreYouKidding,
        }
        .into(),
    );
    assert_eq!(roundtrip(&status), status);
}

#[test]
fn hello_carries_protocol_identity() {
    let peer_id = PeerId([0x02; 32]);
    match roundtrip(&Frame::hello(peer_id)) {
        Frame::Hello {
            peer_id: id,
            protocol,
            version,
        } => {
            assert_eq!(id, peer_id);
            assert_eq!(protocol, PROTOCOL_NAME);
            assert_eq!(version, PROTOCOL_VERSION);
        }
        other => panic!("expected Hello, got {:?}", other),
    }
}

#[test]
fn skills_accepts_within_advertised_limits() {
    let skills = Skills {
        difficulty: 8,
        max_payload_size: 64,
    };
    assert!(skills.accepts(8, 64));
    assert!(!skills.accepts(9, 1));
    assert!(!skills.accepts(1, 65));

    let unlimited = Skills {
        difficulty: 8,
        max_payload_size: 0,
    };
    assert!(unlimited.accepts(2, 4096));

    let moocher = Skills::default();
    assert!(!moocher.is_worker());
    assert!(!moocher.accepts(0, 0));
}

#[test]
fn capped_skills_never_exceed_frame_budget() {
    let unlimited = Skills {
        difficulty: 8,
        max_payload_size: 0,
    }
    .capped(MAX_PAYLOAD_SIZE);
    assert_eq!(unlimited.max_payload_size, MAX_PAYLOAD_SIZE);
    assert!(!unlimited.accepts(2, 3000));
    assert_eq!(unlimited.difficulty, 8);

    let huge = Skills {
        difficulty: 8,
        max_payload_size: u16::MAX,
    }
    .capped(MAX_PAYLOAD_SIZE);
    assert_eq!(huge.max_payload_size, MAX_PAYLOAD_SIZE);

    let small = Skills {
        difficulty: 8,
        max_payload_size: 64,
    };
    assert_eq!(small.capped(MAX_PAYLOAD_SIZE), small);
}

#[test]
fn job_id_compiles_as_hashmap_key() {
    let mut map: HashMap<JobId, Request> = HashMap::new();
    let req = Request {
        id: JobId([0xcc; 8]),
        data: vec![],
        difficulty: 0,
    };
    map.insert(req.id, req);
    assert_eq!(map.len(), 1);
}

#[test]
fn largest_request_fits_in_one_frame() {
    let frame = Frame::Message(ProtocolMessage::Request(Request {
        id: JobId([0xff; 8]),
        data: vec![0xff; MAX_PAYLOAD_SIZE as usize],
        difficulty: u8::MAX,
    }));
    let bytes = bincode::serde::encode_to_vec(&frame, config::standard()).unwrap();
    assert!(bytes.len() <= MAX_FRAME_SIZE);
}
