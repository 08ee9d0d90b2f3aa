use crate::MessageType;
use roxmltree::{Document, Node};
use tracing::debug;

pub const NETCONF_BASE_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

/// Namespace URI -> YANG module name, from the O-RAN / vendor models
/// observed in captured logs. Unknown URIs pass through verbatim.
const YANG_MODULES: &[(&str, &str)] = &[
    ("urn:ietf:params:xml:ns:netconf:base:1.0", "ietf-netconf"),
    ("urn:o-ran:supervision:1.0", "o-ran-supervision"),
    ("urn:o-ran:fm:1.0", "o-ran-fm"),
    ("urn:o-ran:operations:1.0", "o-ran-operations"),
    (
        "urn:o-ran:performance-management:1.0",
        "o-ran-performance-management",
    ),
    ("urn:o-ran:transceiver:1.0", "o-ran-transceiver"),
    ("urn:o-ran:hardware:1.0", "o-ran-hardware"),
    (
        "urn:o-ran:software-management:1.0",
        "o-ran-software-management",
    ),
    ("urn:o-ran:file-management:1.0", "o-ran-file-management"),
    ("urn:o-ran:uplane-conf:1.0", "o-ran-uplane-conf"),
    ("urn:o-ran:delay:1.0", "o-ran-delay-management"),
    ("urn:o-ran:troubleshooting:1.0", "o-ran-troubleshooting"),
    (
        "urn:nokia.com:ran:ru:operations:1.0",
        "nokia-ran-ru-operations",
    ),
    (
        "urn:nokia.com:ran:ru:transceiver:1.0",
        "nokia-ran-ru-transceiver",
    ),
    (
        "urn:nokia.com:ran:ru:performance-management:1.0",
        "nokia-ran-ru-pm",
    ),
    (
        "urn:nokia.com:ran:ru:fcp-triggered-captures:1.0",
        "nokia-ran-ru-fcp",
    ),
];

pub fn module_name(uri: &str) -> &str {
    YANG_MODULES
        .iter()
        .find(|(ns, _)| *ns == uri)
        .map(|(_, name)| *name)
        .unwrap_or(uri)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpcErrorFields {
    pub error_tag: Option<String>,
    pub error_severity: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlarmFields {
    pub fault_id: Option<String>,
    pub fault_source: Option<String>,
    pub fault_severity: Option<String>,
    pub fault_text: Option<String>,
    pub is_cleared: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpcFields {
    pub message_id: Option<String>,
    pub operation: Option<String>,
    pub yang_module: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplyFields {
    pub message_id: Option<String>,
    pub operation: Option<String>,
    pub yang_module: Option<String>,
    pub error: Option<RpcErrorFields>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationFields {
    pub operation: Option<String>,
    pub yang_module: Option<String>,
    pub alarm: Option<AlarmFields>,
}

/// Typed extraction result per message kind. `Unparsed` covers payloads
/// the XML reader rejects (truncated or mangled text); the record is
/// still emitted with null fields.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageFields {
    Rpc(RpcFields),
    Reply(ReplyFields),
    Notification(NotificationFields),
    Unparsed,
}

#[derive(Debug, Clone)]
pub struct Classified {
    pub message_type: MessageType,
    pub fields: MessageFields,
}

impl Classified {
    pub fn message_id(&self) -> Option<&str> {
        match &self.fields {
            MessageFields::Rpc(f) => f.message_id.as_deref(),
            MessageFields::Reply(f) => f.message_id.as_deref(),
            _ => None,
        }
    }

    pub fn operation(&self) -> Option<&str> {
        match &self.fields {
            MessageFields::Rpc(f) => f.operation.as_deref(),
            MessageFields::Reply(f) => f.operation.as_deref(),
            MessageFields::Notification(f) => f.operation.as_deref(),
            MessageFields::Unparsed => None,
        }
    }

    pub fn yang_module(&self) -> Option<&str> {
        match &self.fields {
            MessageFields::Rpc(f) => f.yang_module.as_deref(),
            MessageFields::Reply(f) => f.yang_module.as_deref(),
            MessageFields::Notification(f) => f.yang_module.as_deref(),
            MessageFields::Unparsed => None,
        }
    }
}

/// Classifies a reassembled payload by its root element and extracts the
/// typed fields for that kind. Never fails: unknown roots land in the
/// notification bucket and unparseable XML yields `Unparsed`.
pub fn classify_payload(raw_xml: &str) -> Classified {
    let doc = match Document::parse(raw_xml) {
        Ok(doc) => doc,
        Err(e) => {
            debug!(error = %e, "payload XML did not parse, emitting bare record");
            return Classified {
                message_type: MessageType::Notification,
                fields: MessageFields::Unparsed,
            };
        }
    };
    let root = doc.root_element();

    match root.tag_name().name() {
        "rpc" => Classified {
            message_type: MessageType::Rpc,
            fields: MessageFields::Rpc(extract_rpc(root)),
        },
        "rpc-reply" => Classified {
            message_type: MessageType::RpcReply,
            fields: MessageFields::Reply(extract_reply(root)),
        },
        "notification" => Classified {
            message_type: MessageType::Notification,
            fields: MessageFields::Notification(extract_notification(root)),
        },
        other => {
            debug!(root = other, "unknown root element, treating as notification");
            Classified {
                message_type: MessageType::Notification,
                fields: MessageFields::Notification(NotificationFields::default()),
            }
        }
    }
}

fn extract_rpc(root: Node) -> RpcFields {
    let message_id = root.attribute("message-id").map(str::to_string);
    let op_node = root.children().find(|n| n.is_element());

    let (operation, yang_module) = match op_node {
        Some(op) => {
            let name = op.tag_name().name().to_string();
            let module = specific_yang_module(&name, op);
            (Some(name), module)
        }
        None => (None, None),
    };

    RpcFields {
        message_id,
        operation,
        yang_module,
    }
}

fn extract_reply(root: Node) -> ReplyFields {
    let message_id = root.attribute("message-id").map(str::to_string);

    let error = root
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "rpc-error")
        .map(|err| RpcErrorFields {
            error_tag: child_text(err, "error-tag"),
            error_severity: child_text(err, "error-severity"),
            error_message: child_text(err, "error-message"),
        });

    // Replies carrying only ok/rpc-error do not restate the operation.
    let body = root.children().find(|n| {
        n.is_element() && !matches!(n.tag_name().name(), "ok" | "rpc-error")
    });

    let (operation, yang_module) = match body {
        Some(node) if node.tag_name().name() == "data" => {
            let mut modules = Vec::new();
            collect_modules(node, 0, &mut modules);
            (Some("data".to_string()), join_modules(modules))
        }
        Some(node) => {
            let name = node.tag_name().name().to_string();
            let module = specific_yang_module(&name, node);
            (Some(name), module)
        }
        None => (None, None),
    };

    ReplyFields {
        message_id,
        operation,
        yang_module,
        error,
    }
}

fn extract_notification(root: Node) -> NotificationFields {
    let body = root
        .children()
        .find(|n| n.is_element() && n.tag_name().name() != "eventTime");

    let (operation, yang_module, alarm) = match body {
        Some(node) => {
            let name = node.tag_name().name().to_string();
            let module = specific_yang_module(&name, node);
            let alarm = if name == "alarm-notif" {
                Some(extract_alarm(node))
            } else {
                None
            };
            (Some(name), module, alarm)
        }
        None => (None, None, None),
    };

    NotificationFields {
        operation,
        yang_module,
        alarm,
    }
}

fn extract_alarm(alarm: Node) -> AlarmFields {
    let is_cleared = child_text(alarm, "is-cleared")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    AlarmFields {
        fault_id: child_text(alarm, "fault-id"),
        fault_source: child_text(alarm, "fault-source"),
        fault_severity: child_text(alarm, "fault-severity"),
        fault_text: child_text(alarm, "fault-text"),
        is_cleared,
    }
}

pub fn child_text(node: Node, name: &str) -> Option<String> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Resolves the YANG module an operation targets. The operation's own
/// namespace wins when it is not the base NETCONF one; otherwise the
/// search descends into filter/config per operation kind and collects
/// the specific model namespaces found there.
fn specific_yang_module(op_name: &str, op_node: Node) -> Option<String> {
    if let Some(ns) = op_node.tag_name().namespace() {
        if ns != NETCONF_BASE_NS {
            return Some(module_name(ns).to_string());
        }
    }

    let target = match op_name {
        "get" | "get-config" => op_node
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == "filter"),
        "edit-config" => op_node
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == "config"),
        _ => Some(op_node),
    };

    let mut modules = Vec::new();
    if let Some(node) = target {
        collect_modules(node, 0, &mut modules);
    }
    join_modules(modules)
}

const MODULE_SEARCH_DEPTH: usize = 10;

fn collect_modules(node: Node, depth: usize, out: &mut Vec<String>) {
    if depth > MODULE_SEARCH_DEPTH || !node.is_element() {
        return;
    }
    if let Some(ns) = node.tag_name().namespace() {
        if ns != NETCONF_BASE_NS {
            out.push(module_name(ns).to_string());
        }
    }
    for child in node.children() {
        if child.is_element() {
            collect_modules(child, depth + 1, out);
        }
    }
}

fn join_modules(modules: Vec<String>) -> Option<String> {
    let mut unique = Vec::new();
    for m in modules {
        if m != "ietf-netconf" && !unique.contains(&m) {
            unique.push(m);
        }
    }
    if unique.is_empty() {
        None
    } else {
        unique.truncate(3);
        Some(unique.join(", "))
    }
}
