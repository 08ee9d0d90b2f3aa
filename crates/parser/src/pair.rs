use crate::{MessageType, RpcRecord};
use std::collections::HashMap;
use tracing::debug;

/// Post-pass over the ordered message list: matches each rpc-reply to
/// its originating rpc by (session_id, message-id) and computes the
/// elapsed time. The response time lands on both sides of the pair;
/// `has_response` is set on the request only.
///
/// A message-id that re-appears as a request before its reply arrives
/// replaces the earlier pending request (last-writer-wins).
pub fn pair_responses(messages: &mut [RpcRecord]) -> u64 {
    let mut pending: HashMap<(u64, String), usize> = HashMap::new();
    let mut paired = 0u64;

    for i in 0..messages.len() {
        let Some(message_id) = messages[i].message_id.clone() else {
            continue;
        };
        let key = (messages[i].session_id, message_id);

        match messages[i].message_type {
            MessageType::Rpc => {
                if let Some(old) = pending.insert(key, i) {
                    debug!(
                        line = messages[old].line_number,
                        "duplicate pending message-id, keeping the later request"
                    );
                }
            }
            MessageType::RpcReply => {
                if let Some(req) = pending.remove(&key) {
                    let response_time_ms = match (messages[req].timestamp, messages[i].timestamp) {
                        (Some(sent), Some(received)) => {
                            Some((received - sent).num_milliseconds().max(0) as f64)
                        }
                        _ => None,
                    };
                    messages[req].has_response = true;
                    messages[req].response_time_ms = response_time_ms;
                    messages[i].response_time_ms = response_time_ms;
                    paired += 1;
                }
            }
            MessageType::Notification => {}
        }
    }

    paired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Direction;
    use chrono::{Duration, TimeZone, Utc};

    fn record(
        line: u64,
        session: u64,
        message_type: MessageType,
        message_id: Option<&str>,
        offset_ms: i64,
    ) -> RpcRecord {
        RpcRecord {
            line_number: line,
            timestamp: Some(
                Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::milliseconds(offset_ms),
            ),
            session_id: session,
            host: "10.0.0.1".to_string(),
            message_id: message_id.map(String::from),
            message_type,
            direction: Direction::DuToRu,
            operation: None,
            yang_module: None,
            response_time_ms: None,
            has_response: false,
            xml_content: String::new(),
        }
    }

    #[test]
    fn test_basic_pairing() {
        let mut msgs = vec![
            record(1, 1, MessageType::Rpc, Some("1"), 0),
            record(2, 1, MessageType::RpcReply, Some("1"), 50),
        ];
        assert_eq!(pair_responses(&mut msgs), 1);
        assert!(msgs[0].has_response);
        assert_eq!(msgs[0].response_time_ms, Some(50.0));
        assert_eq!(msgs[1].response_time_ms, Some(50.0));
        assert!(!msgs[1].has_response);
    }

    #[test]
    fn test_same_message_id_different_sessions() {
        let mut msgs = vec![
            record(1, 1, MessageType::Rpc, Some("1"), 0),
            record(2, 2, MessageType::Rpc, Some("1"), 0),
            record(3, 2, MessageType::RpcReply, Some("1"), 30),
        ];
        assert_eq!(pair_responses(&mut msgs), 1);
        assert!(!msgs[0].has_response);
        assert!(msgs[1].has_response);
        assert_eq!(msgs[1].response_time_ms, Some(30.0));
    }

    #[test]
    fn test_unmatched_reply_stays_unpaired() {
        let mut msgs = vec![record(1, 1, MessageType::RpcReply, Some("9"), 0)];
        assert_eq!(pair_responses(&mut msgs), 0);
        assert_eq!(msgs[0].response_time_ms, None);
    }

    #[test]
    fn test_duplicate_message_id_last_writer_wins() {
        let mut msgs = vec![
            record(1, 1, MessageType::Rpc, Some("1"), 0),
            record(2, 1, MessageType::Rpc, Some("1"), 100),
            record(3, 1, MessageType::RpcReply, Some("1"), 150),
        ];
        assert_eq!(pair_responses(&mut msgs), 1);
        assert!(!msgs[0].has_response);
        assert!(msgs[1].has_response);
        assert_eq!(msgs[1].response_time_ms, Some(50.0));
    }

    #[test]
    fn test_missing_timestamp_pairs_without_latency() {
        let mut msgs = vec![
            record(1, 1, MessageType::Rpc, Some("1"), 0),
            record(2, 1, MessageType::RpcReply, Some("1"), 50),
        ];
        msgs[1].timestamp = None;
        assert_eq!(pair_responses(&mut msgs), 1);
        assert!(msgs[0].has_response);
        assert_eq!(msgs[0].response_time_ms, None);
    }

    #[test]
    fn test_notifications_never_pair() {
        let mut msgs = vec![
            record(1, 1, MessageType::Rpc, Some("1"), 0),
            record(2, 1, MessageType::Notification, Some("1"), 20),
        ];
        assert_eq!(pair_responses(&mut msgs), 0);
        assert!(!msgs[0].has_response);
    }
}
