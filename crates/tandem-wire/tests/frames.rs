//! Property tests for the frame codec.
//!
//! Workers and the controller trust the codec to reject garbage instead of
//! panicking, and to carry observation payloads bit-exactly (including
//! NaN payloads, which the worker must be able to report faithfully).

use proptest::prelude::*;
use tandem_core::{Action, Info};
use tandem_wire::{
    decode_command, decode_response, encode_command, encode_response, Command, Response,
    StepReply, WireError, RESP_SPACES,
};

proptest! {
    #[test]
    fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = decode_command(&bytes);
        let _ = decode_response(&bytes);
    }

    #[test]
    fn step_payload_is_bit_exact(
        bits in proptest::collection::vec(any::<u64>(), 0..64),
        reward in any::<f64>(),
        done in any::<bool>(),
    ) {
        let observation: Vec<f64> = bits.iter().map(|&b| f64::from_bits(b)).collect();
        let resp = Response::Step(StepReply {
            observation,
            reward,
            done,
            info: Info::new(),
        });
        let decoded = decode_response(&encode_response(&resp)).unwrap();
        let Response::Step(reply) = decoded else {
            panic!("expected step reply");
        };
        let back: Vec<u64> = reply.observation.iter().map(|v| v.to_bits()).collect();
        prop_assert_eq!(back, bits);
        prop_assert_eq!(reply.reward.to_bits(), reward.to_bits());
        prop_assert_eq!(reply.done, done);
    }

    #[test]
    fn any_prefix_of_a_step_command_is_rejected(values in proptest::collection::vec(-1e3f64..1e3, 1..16)) {
        let frame = encode_command(&Command::Step(Action::new(values)));
        for cut in 0..frame.len() {
            prop_assert!(decode_command(&frame[..cut]).is_err());
        }
    }
}

#[test]
fn command_and_response_tags_are_disjoint() {
    for tag in 0u8..=255 {
        let as_cmd = decode_command(&[tag]);
        let as_resp = decode_response(&[tag]);
        let cmd_known = !matches!(as_cmd, Err(WireError::UnknownTag { .. }));
        let resp_known = !matches!(as_resp, Err(WireError::UnknownTag { .. }));
        assert!(!(cmd_known && resp_known), "tag {tag:#04x} is ambiguous");
    }
}

#[test]
fn spaces_frame_with_overflowing_field_lengths_is_malformed() {
    let mut frame = vec![RESP_SPACES];
    frame.extend_from_slice(&2u32.to_le_bytes());
    for (name, len) in [(b'a', u64::MAX), (b'b', 1)] {
        frame.extend_from_slice(&1u32.to_le_bytes());
        frame.push(name);
        frame.extend_from_slice(&len.to_le_bytes());
    }
    frame.extend_from_slice(&1u64.to_le_bytes());
    frame.push(0);

    let err = decode_response(&frame).unwrap_err();
    assert!(matches!(err, WireError::MalformedFrame { .. }), "{err:?}");
}
