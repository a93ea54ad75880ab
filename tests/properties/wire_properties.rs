use proptest::prelude::*;

use bsh::daemon::protocol::{ProtocolError, RecordRequest, Request, SuggestRequest, DELIMITER};
use bsh::storage::SearchScope;

/// Any text except the two reserved bytes.
fn field() -> impl Strategy<Value = String> {
    r"[^\x00\x1f]{0,40}"
}

fn arb_scope() -> impl Strategy<Value = SearchScope> {
    prop_oneof![
        Just(SearchScope::Global),
        Just(SearchScope::Directory),
        Just(SearchScope::Branch),
    ]
}

fn arb_request() -> impl Strategy<Value = Request> {
    prop_oneof![
        (field(), arb_scope(), field(), any::<bool>(), proptest::option::of(any::<u16>()))
            .prop_map(|(query, scope, context, only_success, terminal_width)| {
                Request::Suggest(SuggestRequest {
                    query,
                    scope,
                    context,
                    only_success,
                    terminal_width,
                })
            }),
        (field(), field(), field(), any::<i32>(), any::<i64>()).prop_map(
            |(command, session_id, cwd, exit_code, duration_ms)| {
                Request::Record(RecordRequest {
                    command,
                    session_id,
                    cwd,
                    exit_code,
                    duration_ms,
                })
            }
        ),
    ]
}

proptest! {
    #[test]
    fn encode_then_decode_is_identity(request in arb_request()) {
        let bytes = request.encode().unwrap();
        prop_assert_eq!(Request::decode(&bytes).unwrap(), request);
    }

    #[test]
    fn reserved_bytes_are_refused(
        prefix in field(),
        suffix in field(),
        reserved in prop::sample::select(vec!['\u{1f}', '\u{0}']),
    ) {
        let request = Request::Record(RecordRequest {
            command: format!("{prefix}{reserved}{suffix}"),
            session_id: String::new(),
            cwd: String::new(),
            exit_code: 0,
            duration_ms: 0,
        });
        prop_assert_eq!(request.encode(), Err(ProtocolError::ReservedByte("cmd")));
    }

    #[test]
    fn decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = Request::decode(&bytes);
    }

    #[test]
    fn decode_rejects_wrong_field_counts(extra in 7usize..12) {
        let mut bytes = b"RECORD".to_vec();
        for _ in 1..extra {
            bytes.push(DELIMITER);
            bytes.push(b'1');
        }
        let is_field_count = matches!(
            Request::decode(&bytes),
            Err(ProtocolError::FieldCount { .. })
        );
        prop_assert!(is_field_count);
    }
}
