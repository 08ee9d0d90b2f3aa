use crate::{CarrierEvent, CarrierEventType, Direction, LogEntry, MessageType};
use roxmltree::{Document, Node};
use std::collections::HashMap;
use tracing::debug;

/// Config containers whose list entries describe carrier resources.
pub const CARRIER_ELEMENTS: &[&str] = &[
    "rx-array-carriers",
    "tx-array-carriers",
    "low-level-rx-links",
    "low-level-tx-links",
    "low-level-rx-endpoints",
    "low-level-tx-endpoints",
    "static-low-level-rx-endpoints",
    "static-low-level-tx-endpoints",
];

/// Containers the RU reports back wholesale; their RU->DU echoes are
/// not lifecycle events and are skipped.
const STATIC_ENDPOINT_ELEMENTS: &[&str] = &[
    "static-low-level-rx-endpoints",
    "static-low-level-tx-endpoints",
];

const NAME_LEAVES: &[&str] = &["name", "carrier-name", "id", "endpoint-name", "link-name"];
const STATE_LEAVES: &[&str] = &["state", "admin-state", "operational-state", "active"];

const CARRIER_SEARCH_DEPTH: usize = 15;

/// Scans payload bodies for carrier list entries and emits one event per
/// entry found. Owns the last-seen-state map for one parse run; the map
/// never leaks across files.
pub struct CarrierTracker {
    last_states: HashMap<String, String>,
}

impl CarrierTracker {
    pub fn new() -> Self {
        Self {
            last_states: HashMap::new(),
        }
    }

    pub fn extract(
        &mut self,
        entry: &LogEntry,
        message_type: MessageType,
        operation: &str,
        out: &mut Vec<CarrierEvent>,
    ) {
        // Independent pass over the payload; a parse failure here only
        // means no carrier events for this entry.
        let Ok(doc) = Document::parse(&entry.raw_xml) else {
            return;
        };
        let root = doc.root_element();

        let (search_root, base_event) = match root.tag_name().name() {
            "rpc" => {
                if let Some(edit) = element_child(root, "edit-config") {
                    (element_child(edit, "config"), CarrierEventType::Update)
                } else if let Some(get) = element_child(root, "get") {
                    (element_child(get, "filter"), CarrierEventType::Query)
                } else if let Some(get_config) = element_child(root, "get-config") {
                    (element_child(get_config, "filter"), CarrierEventType::Query)
                } else {
                    (None, CarrierEventType::Update)
                }
            }
            "rpc-reply" => (element_child(root, "data"), CarrierEventType::Data),
            "notification" => (Some(root), CarrierEventType::StateChange),
            _ => (None, CarrierEventType::Update),
        };

        let Some(search_root) = search_root else {
            return;
        };

        self.search(search_root, 0, entry, message_type, operation, base_event, out);
    }

    fn search(
        &mut self,
        node: Node,
        depth: usize,
        entry: &LogEntry,
        message_type: MessageType,
        operation: &str,
        base_event: CarrierEventType,
        out: &mut Vec<CarrierEvent>,
    ) {
        if depth > CARRIER_SEARCH_DEPTH {
            return;
        }
        for child in node.children().filter(|n| n.is_element()) {
            let name = child.tag_name().name();
            if CARRIER_ELEMENTS.contains(&name) {
                self.emit(child, entry, message_type, operation, base_event, out);
            } else {
                self.search(child, depth + 1, entry, message_type, operation, base_event, out);
            }
        }
    }

    /// Each matched element is one list entry of its container.
    fn emit(
        &mut self,
        element: Node,
        entry: &LogEntry,
        message_type: MessageType,
        operation: &str,
        base_event: CarrierEventType,
        out: &mut Vec<CarrierEvent>,
    ) {
        let carrier_type = element.tag_name().name().to_string();

        if entry.direction == Direction::RuToDu
            && STATIC_ENDPOINT_ELEMENTS.contains(&carrier_type.as_str())
        {
            return;
        }

        let carrier_name = leaf_text(element, NAME_LEAVES).unwrap_or_else(|| "unknown".to_string());
        let state = leaf_text(element, STATE_LEAVES);

        // The NETCONF operation attribute on the entry overrides the
        // default event type for edit-config bodies.
        let event_type = match element
            .attributes()
            .find(|a| a.name() == "operation")
            .map(|a| a.value())
        {
            Some("create") => CarrierEventType::Create,
            Some("delete") => CarrierEventType::Delete,
            Some("merge") | Some("replace") => CarrierEventType::Update,
            _ => base_event,
        };

        let previous_state = match &state {
            Some(s) => {
                let prev = self.last_states.get(&carrier_name).cloned();
                self.last_states.insert(carrier_name.clone(), s.clone());
                // Unchanged state carries no previous_state.
                prev.filter(|p| p != s)
            }
            None => None,
        };

        let carrier_details = collect_details(element);

        debug!(
            carrier = %carrier_name,
            container = %carrier_type,
            event = event_type.as_str(),
            "carrier event"
        );

        out.push(CarrierEvent {
            line_number: entry.line_number,
            timestamp: entry.timestamp,
            session_id: entry.session_id,
            event_type,
            carrier_type,
            carrier_name,
            state,
            previous_state,
            operation: operation.to_string(),
            direction: entry.direction,
            message_type,
            carrier_details,
            xml_content: entry.raw_xml.clone(),
        });
    }
}

impl Default for CarrierTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn element_child<'a>(node: Node<'a, 'a>, name: &str) -> Option<Node<'a, 'a>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn leaf_text(node: Node, names: &[&str]) -> Option<String> {
    for name in names {
        if let Some(text) = crate::classify::child_text(node, name) {
            return Some(text);
        }
    }
    None
}

/// Remaining scalar leaves of the entry, as a JSON object string.
fn collect_details(element: Node) -> Option<String> {
    let mut details = serde_json::Map::new();
    for child in element.children().filter(|n| n.is_element()) {
        let name = child.tag_name().name();
        if matches!(name, "name" | "carrier-name" | "id") {
            continue;
        }
        if child.children().any(|n| n.is_element()) {
            continue;
        }
        if let Some(text) = child.text().map(str::trim).filter(|t| !t.is_empty()) {
            details.insert(
                name.to_string(),
                serde_json::Value::String(text.to_string()),
            );
        }
    }
    if details.is_empty() {
        None
    } else {
        serde_json::to_string(&details).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(direction: Direction, xml: &str) -> LogEntry {
        LogEntry {
            line_number: 1,
            timestamp: Some(Utc::now()),
            session_id: 1,
            host: "10.0.0.1".to_string(),
            direction,
            raw_xml: xml.to_string(),
            truncated: false,
        }
    }

    fn edit_config(carriers: &str) -> String {
        format!(
            "<rpc message-id=\"1\" xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\" \
             xmlns:nc=\"urn:ietf:params:xml:ns:netconf:base:1.0\">\
             <edit-config><target><running/></target>\
             <config><user-plane-configuration xmlns=\"urn:o-ran:uplane-conf:1.0\">{}</user-plane-configuration></config>\
             </edit-config></rpc>",
            carriers
        )
    }

    #[test]
    fn test_edit_config_create_event() {
        let xml = edit_config(
            "<tx-array-carriers nc:operation=\"create\">\
             <name>txc1</name><state>CREATING</state><gain>20.5</gain>\
             </tx-array-carriers>",
        );
        let mut tracker = CarrierTracker::new();
        let mut out = Vec::new();
        tracker.extract(&entry(Direction::DuToRu, &xml), MessageType::Rpc, "edit-config", &mut out);

        assert_eq!(out.len(), 1);
        let ev = &out[0];
        assert_eq!(ev.event_type, CarrierEventType::Create);
        assert_eq!(ev.carrier_type, "tx-array-carriers");
        assert_eq!(ev.carrier_name, "txc1");
        assert_eq!(ev.state.as_deref(), Some("CREATING"));
        assert_eq!(ev.previous_state, None);
        assert_eq!(ev.operation, "edit-config");
        let details = ev.carrier_details.as_deref().expect("details json");
        assert!(details.contains("\"gain\":\"20.5\""));
        assert!(!details.contains("\"name\""));
    }

    #[test]
    fn test_multiple_entries_emit_multiple_events() {
        let xml = edit_config(
            "<rx-array-carriers><name>rxc1</name><state>ACTIVE</state></rx-array-carriers>\
             <rx-array-carriers><name>rxc2</name><state>ACTIVE</state></rx-array-carriers>",
        );
        let mut tracker = CarrierTracker::new();
        let mut out = Vec::new();
        tracker.extract(&entry(Direction::DuToRu, &xml), MessageType::Rpc, "edit-config", &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].carrier_name, "rxc1");
        assert_eq!(out[1].carrier_name, "rxc2");
        assert_eq!(out[0].event_type, CarrierEventType::Update);
    }

    #[test]
    fn test_state_transition_tracking() {
        let mut tracker = CarrierTracker::new();
        let states = ["CREATING", "ACTIVE", "ACTIVE"];
        let mut seen = Vec::new();
        for s in states {
            let xml = edit_config(&format!(
                "<tx-array-carriers><name>txc1</name><state>{}</state></tx-array-carriers>",
                s
            ));
            let mut out = Vec::new();
            tracker.extract(
                &entry(Direction::DuToRu, &xml),
                MessageType::Rpc,
                "edit-config",
                &mut out,
            );
            seen.push(out.remove(0).previous_state);
        }
        assert_eq!(seen[0], None);
        assert_eq!(seen[1].as_deref(), Some("CREATING"));
        // Unchanged state suppresses previous_state.
        assert_eq!(seen[2], None);
    }

    #[test]
    fn test_notification_state_change() {
        let xml = "<notification><eventTime>2025-01-01T00:00:00Z</eventTime>\
                   <tx-array-carriers-state-change xmlns=\"urn:o-ran:uplane-conf:1.0\">\
                   <tx-array-carriers><name>txc1</name><state>READY</state></tx-array-carriers>\
                   </tx-array-carriers-state-change></notification>";
        let mut tracker = CarrierTracker::new();
        let mut out = Vec::new();
        tracker.extract(
            &entry(Direction::RuToDu, xml),
            MessageType::Notification,
            "tx-array-carriers-state-change",
            &mut out,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].event_type, CarrierEventType::StateChange);
        assert_eq!(out[0].state.as_deref(), Some("READY"));
        assert_eq!(out[0].message_type, MessageType::Notification);
    }

    #[test]
    fn test_get_filter_query_event() {
        let xml = "<rpc message-id=\"5\" xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\">\
                   <get><filter><user-plane-configuration xmlns=\"urn:o-ran:uplane-conf:1.0\">\
                   <rx-array-carriers><name>rxc1</name></rx-array-carriers>\
                   </user-plane-configuration></filter></get></rpc>";
        let mut tracker = CarrierTracker::new();
        let mut out = Vec::new();
        tracker.extract(&entry(Direction::DuToRu, xml), MessageType::Rpc, "get", &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].event_type, CarrierEventType::Query);
        assert_eq!(out[0].state, None);
    }

    #[test]
    fn test_data_reply_event() {
        let xml = "<rpc-reply message-id=\"5\" xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\">\
                   <data><user-plane-configuration xmlns=\"urn:o-ran:uplane-conf:1.0\">\
                   <low-level-rx-links><name>rxl1</name><processing-element>pe0</processing-element></low-level-rx-links>\
                   </user-plane-configuration></data></rpc-reply>";
        let mut tracker = CarrierTracker::new();
        let mut out = Vec::new();
        tracker.extract(&entry(Direction::RuToDu, xml), MessageType::RpcReply, "data", &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].event_type, CarrierEventType::Data);
        assert_eq!(out[0].carrier_type, "low-level-rx-links");
    }

    #[test]
    fn test_static_endpoints_skipped_for_ru_to_du() {
        let xml = "<rpc-reply message-id=\"6\" xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\">\
                   <data><user-plane-configuration xmlns=\"urn:o-ran:uplane-conf:1.0\">\
                   <static-low-level-rx-endpoints><name>ep0</name></static-low-level-rx-endpoints>\
                   </user-plane-configuration></data></rpc-reply>";
        let mut tracker = CarrierTracker::new();
        let mut out = Vec::new();
        tracker.extract(&entry(Direction::RuToDu, xml), MessageType::RpcReply, "data", &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_entry_without_name_leaf() {
        let xml = edit_config("<rx-array-carriers><state>ACTIVE</state></rx-array-carriers>");
        let mut tracker = CarrierTracker::new();
        let mut out = Vec::new();
        tracker.extract(&entry(Direction::DuToRu, &xml), MessageType::Rpc, "edit-config", &mut out);
        assert_eq!(out[0].carrier_name, "unknown");
    }
}
