use crate::{ErrorRecord, ErrorType, MessageType, ParseStatistics, RpcRecord};
use std::collections::HashMap;

/// Folds the finalized record collections into summary statistics.
/// Response-time aggregates are computed over paired request records
/// only, so each exchange is counted once.
pub fn aggregate(
    messages: &[RpcRecord],
    errors: &[ErrorRecord],
    total_lines: u64,
    paired_count: u64,
) -> ParseStatistics {
    let mut rpc_count = 0u64;
    let mut rpc_reply_count = 0u64;
    let mut notification_count = 0u64;
    let mut operation_stats: HashMap<String, u64> = HashMap::new();
    let mut direction_stats: HashMap<String, u64> = HashMap::new();

    let mut response_times: Vec<f64> = Vec::new();

    for msg in messages {
        match msg.message_type {
            MessageType::Rpc => rpc_count += 1,
            MessageType::RpcReply => rpc_reply_count += 1,
            MessageType::Notification => notification_count += 1,
        }
        if let Some(op) = &msg.operation {
            *operation_stats.entry(op.clone()).or_default() += 1;
        }
        *direction_stats
            .entry(msg.direction.as_str().to_string())
            .or_default() += 1;
        if msg.message_type == MessageType::Rpc {
            if let Some(rt) = msg.response_time_ms {
                response_times.push(rt);
            }
        }
    }

    let mut error_type_stats: HashMap<String, u64> = HashMap::new();
    let mut fault_count = 0u64;
    for err in errors {
        if err.error_type == ErrorType::Fault {
            fault_count += 1;
        }
        *error_type_stats
            .entry(err.error_type.as_str().to_string())
            .or_default() += 1;
    }

    let (avg, max, min) = if response_times.is_empty() {
        (None, None, None)
    } else {
        let sum: f64 = response_times.iter().sum();
        let max = response_times.iter().cloned().fold(f64::MIN, f64::max);
        let min = response_times.iter().cloned().fold(f64::MAX, f64::min);
        (Some(sum / response_times.len() as f64), Some(max), Some(min))
    };

    ParseStatistics {
        total_lines,
        total_messages: messages.len() as u64,
        rpc_count,
        rpc_reply_count,
        notification_count,
        error_count: errors.len() as u64,
        fault_count,
        paired_count,
        operation_stats,
        direction_stats,
        error_type_stats,
        avg_response_time_ms: avg,
        max_response_time_ms: max,
        min_response_time_ms: min,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Direction;

    fn msg(message_type: MessageType, operation: Option<&str>, rt: Option<f64>) -> RpcRecord {
        RpcRecord {
            line_number: 1,
            timestamp: None,
            session_id: 1,
            host: "h".to_string(),
            message_id: None,
            message_type,
            direction: Direction::DuToRu,
            operation: operation.map(String::from),
            yang_module: None,
            response_time_ms: rt,
            has_response: rt.is_some(),
            xml_content: String::new(),
        }
    }

    fn err(error_type: ErrorType) -> ErrorRecord {
        ErrorRecord {
            line_number: 1,
            timestamp: None,
            session_id: 1,
            error_type,
            error_tag: None,
            error_severity: None,
            error_message: None,
            fault_id: None,
            fault_source: None,
            is_cleared: false,
            xml_content: String::new(),
        }
    }

    #[test]
    fn test_counts_add_up() {
        let messages = vec![
            msg(MessageType::Rpc, Some("get"), Some(50.0)),
            msg(MessageType::Rpc, Some("edit-config"), None),
            msg(MessageType::RpcReply, None, Some(50.0)),
            msg(MessageType::Notification, Some("alarm-notif"), None),
        ];
        let s = aggregate(&messages, &[], 10, 1);
        assert_eq!(
            s.rpc_count + s.rpc_reply_count + s.notification_count,
            s.total_messages
        );
        assert_eq!(s.rpc_count, 2);
        assert_eq!(s.operation_stats.get("get"), Some(&1));
        assert_eq!(s.direction_stats.get("DU->RU"), Some(&4));
    }

    #[test]
    fn test_response_times_counted_on_request_side_only() {
        let messages = vec![
            msg(MessageType::Rpc, Some("get"), Some(10.0)),
            msg(MessageType::RpcReply, None, Some(10.0)),
            msg(MessageType::Rpc, Some("get"), Some(30.0)),
            msg(MessageType::RpcReply, None, Some(30.0)),
        ];
        let s = aggregate(&messages, &[], 4, 2);
        assert_eq!(s.avg_response_time_ms, Some(20.0));
        assert_eq!(s.min_response_time_ms, Some(10.0));
        assert_eq!(s.max_response_time_ms, Some(30.0));
        assert_eq!(s.paired_count, 2);
    }

    #[test]
    fn test_no_paired_messages_yields_absent_aggregates() {
        let messages = vec![msg(MessageType::Rpc, Some("get"), None)];
        let s = aggregate(&messages, &[], 1, 0);
        assert_eq!(s.avg_response_time_ms, None);
        assert_eq!(s.max_response_time_ms, None);
        assert_eq!(s.min_response_time_ms, None);
    }

    #[test]
    fn test_error_type_breakdown() {
        let errors = vec![
            err(ErrorType::RpcError),
            err(ErrorType::Fault),
            err(ErrorType::Fault),
        ];
        let s = aggregate(&[], &errors, 3, 0);
        assert_eq!(s.error_count, 3);
        assert_eq!(s.fault_count, 2);
        assert_eq!(s.error_type_stats.get("rpc-error"), Some(&1));
        assert_eq!(s.error_type_stats.get("fault"), Some(&2));
    }
}
