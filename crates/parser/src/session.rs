use crate::accumulator::PayloadAccumulator;
use crate::carrier::CarrierTracker;
use crate::classify::{self, MessageFields};
use crate::line::{self, LineKind};
use crate::{
    CarrierEvent, ErrorRecord, ErrorType, LogEntry, MessageType, ParseOutput, RpcRecord, pair,
    stats,
};
use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// A sequential source of text lines. Abstracts over file handles and
/// in-memory buffers so callers choose how input is delivered.
pub trait LineSource {
    fn next_line(&mut self) -> anyhow::Result<Option<String>>;
}

pub struct ReaderLineSource<R: BufRead> {
    reader: R,
}

impl<R: BufRead> ReaderLineSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> LineSource for ReaderLineSource<R> {
    fn next_line(&mut self) -> anyhow::Result<Option<String>> {
        let mut buf = String::new();
        let n = self.reader.read_line(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        Ok(Some(buf))
    }
}

pub struct MemoryLineSource {
    lines: std::vec::IntoIter<String>,
}

impl MemoryLineSource {
    pub fn new(text: &str) -> Self {
        Self {
            lines: text
                .lines()
                .map(String::from)
                .collect::<Vec<_>>()
                .into_iter(),
        }
    }
}

impl LineSource for MemoryLineSource {
    fn next_line(&mut self) -> anyhow::Result<Option<String>> {
        Ok(self.lines.next())
    }
}

/// Cooperative cancellation handle, checked at each line boundary. A
/// cancelled session returns an error and produces no output; the
/// caller owns all-or-nothing persistence.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Drives one parse run over one file: line classification, payload
/// accumulation, field extraction and carrier events in a single pass,
/// then the pairing post-pass and the statistics fold. Owns all per-run
/// state; nothing is shared between concurrent sessions.
pub struct ParseSession {
    file_id: String,
    messages: Vec<RpcRecord>,
    errors: Vec<ErrorRecord>,
    carrier_events: Vec<CarrierEvent>,
    tracker: CarrierTracker,
    total_lines: u64,
    skipped_lines: u64,
    truncated_entries: u64,
}

impl ParseSession {
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            messages: Vec::new(),
            errors: Vec::new(),
            carrier_events: Vec::new(),
            tracker: CarrierTracker::new(),
            total_lines: 0,
            skipped_lines: 0,
            truncated_entries: 0,
        }
    }

    pub fn run<S: LineSource>(
        mut self,
        source: &mut S,
        cancel: &CancelToken,
    ) -> anyhow::Result<ParseOutput> {
        let mut acc = PayloadAccumulator::new();
        let mut line_number: u64 = 0;

        while let Some(line) = source.next_line()? {
            line_number += 1;
            if cancel.is_cancelled() {
                anyhow::bail!("parse of {} cancelled at line {}", self.file_id, line_number);
            }

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            self.total_lines += 1;

            match line::classify(line) {
                LineKind::NewEntry { prefix, remainder } => {
                    // A new entry before balance truncates the open one;
                    // its partial text is preserved, never merged.
                    if let Some(entry) = acc.flush_truncated() {
                        self.ingest(entry);
                    }
                    acc.open(line_number, prefix, remainder);
                    if let Some(entry) = acc.take_complete() {
                        self.ingest(entry);
                    }
                }
                LineKind::Continuation(text) => {
                    if acc.is_open() {
                        acc.append(text);
                        if let Some(entry) = acc.take_complete() {
                            self.ingest(entry);
                        }
                    } else {
                        self.skipped_lines += 1;
                        debug!(line = line_number, "no open entry, discarding line");
                    }
                }
            }
        }

        if let Some(entry) = acc.flush_truncated() {
            self.ingest(entry);
        }

        let paired = pair::pair_responses(&mut self.messages);
        let statistics = stats::aggregate(&self.messages, &self.errors, self.total_lines, paired);

        self.messages.sort_by_key(|m| m.line_number);
        self.errors.sort_by_key(|e| e.line_number);
        self.carrier_events.sort_by_key(|c| c.line_number);

        info!(
            file = %self.file_id,
            messages = self.messages.len(),
            errors = self.errors.len(),
            carrier_events = self.carrier_events.len(),
            skipped = self.skipped_lines,
            "parse complete"
        );

        Ok(ParseOutput {
            file_id: self.file_id,
            messages: self.messages,
            errors: self.errors,
            carrier_events: self.carrier_events,
            statistics,
            total_lines: self.total_lines,
            skipped_lines: self.skipped_lines,
            truncated_entries: self.truncated_entries,
        })
    }

    /// Turns one reassembled entry into its records. Every entry yields
    /// exactly one message record; error and carrier extraction are
    /// independent additional passes over the same payload.
    fn ingest(&mut self, entry: LogEntry) {
        if entry.truncated {
            self.truncated_entries += 1;
            warn!(
                line = entry.line_number,
                session = entry.session_id,
                "payload truncated, recording partial text"
            );
        }

        let classified = classify::classify_payload(&entry.raw_xml);

        self.messages.push(RpcRecord {
            line_number: entry.line_number,
            timestamp: entry.timestamp,
            session_id: entry.session_id,
            host: entry.host.clone(),
            message_id: classified.message_id().map(String::from),
            message_type: classified.message_type,
            direction: entry.direction,
            operation: classified.operation().map(String::from),
            yang_module: classified.yang_module().map(String::from),
            response_time_ms: None,
            has_response: false,
            xml_content: entry.raw_xml.clone(),
        });

        match &classified.fields {
            MessageFields::Reply(fields) => {
                if let Some(err) = &fields.error {
                    self.errors.push(ErrorRecord {
                        line_number: entry.line_number,
                        timestamp: entry.timestamp,
                        session_id: entry.session_id,
                        error_type: ErrorType::RpcError,
                        error_tag: err.error_tag.clone(),
                        error_severity: err.error_severity.clone(),
                        error_message: err.error_message.clone(),
                        fault_id: None,
                        fault_source: None,
                        is_cleared: false,
                        xml_content: entry.raw_xml.clone(),
                    });
                }
            }
            MessageFields::Notification(fields) => {
                if let Some(alarm) = &fields.alarm {
                    self.errors.push(ErrorRecord {
                        line_number: entry.line_number,
                        timestamp: entry.timestamp,
                        session_id: entry.session_id,
                        error_type: ErrorType::Fault,
                        error_tag: alarm.fault_severity.clone(),
                        error_severity: alarm.fault_severity.clone(),
                        error_message: alarm.fault_text.clone(),
                        fault_id: alarm.fault_id.clone(),
                        fault_source: alarm.fault_source.clone(),
                        is_cleared: alarm.is_cleared,
                        xml_content: entry.raw_xml.clone(),
                    });
                }
            }
            MessageFields::Rpc(_) | MessageFields::Unparsed => {}
        }

        let operation = classified
            .operation()
            .map(String::from)
            .unwrap_or_else(|| match classified.message_type {
                MessageType::Rpc => "unknown".to_string(),
                MessageType::RpcReply => "reply".to_string(),
                MessageType::Notification => "notification".to_string(),
            });
        self.tracker.extract(
            &entry,
            classified.message_type,
            &operation,
            &mut self.carrier_events,
        );
    }
}
