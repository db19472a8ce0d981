#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Property tests for push-frame decoding.
//!
//! 1. Arbitrary text never panics the decoder.
//! 2. Any envelope built from a known action decodes to that action,
//!    regardless of which optional payload fields are present.
//! 3. A known action is accepted whatever shape its payloads have.
//! 4. Unknown action names are always rejected.

use proptest::prelude::*;
use todosync_proto::codec;
use todosync_proto::message::{Action, PushMessage};

fn arb_action() -> impl Strategy<Value = Action> {
    prop::sample::select(Action::ALL.to_vec())
}

proptest! {
    #[test]
    fn arbitrary_text_never_panics(text in ".{0,512}") {
        let _ = codec::decode(&text);
    }

    #[test]
    fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = codec::decode_bytes(&bytes);
    }

    #[test]
    fn known_action_decodes_with_optional_member(
        action in arb_action(),
        user_id in any::<i64>(),
        with_member in any::<bool>(),
    ) {
        let frame = if with_member {
            format!(r#"{{"action":"{}","member":{{"user_id":{user_id}}}}}"#, action.as_str())
        } else {
            format!(r#"{{"action":"{}"}}"#, action.as_str())
        };
        let msg = codec::decode(&frame).unwrap();
        prop_assert_eq!(msg.action, action);
        prop_assert_eq!(msg.member.is_some(), with_member);
    }

    #[test]
    fn known_action_accepts_backend_payload_shapes(
        action in arb_action(),
        id in any::<i64>(),
        title in "[A-Za-z ]{0,16}",
        shape in 0..4usize,
    ) {
        let payload = match shape {
            0 => format!(r#"{{"id":{id}}}"#),
            1 => format!(r#"{{"title":"{title}"}}"#),
            2 => format!(r#"{{"id":{id},"title":"{title}"}}"#),
            _ => "null".to_string(),
        };
        let frame = format!(r#"{{"action":"{}","task":{payload}}}"#, action.as_str());
        let msg = codec::decode(&frame).unwrap();
        prop_assert_eq!(msg.action, action);
        prop_assert!(msg.task.is_none());
    }

    #[test]
    fn unknown_action_rejected(name in "[a-z_]{1,24}") {
        prop_assume!(Action::ALL.iter().all(|a| a.as_str() != name));
        let frame = format!(r#"{{"action":"{name}"}}"#);
        prop_assert!(codec::decode(&frame).is_err());
    }

    #[test]
    fn encoded_bare_message_decodes(action in arb_action()) {
        let text = codec::encode(&PushMessage::bare(action)).unwrap();
        prop_assert_eq!(codec::decode(&text).unwrap(), PushMessage::bare(action));
    }
}
