use crate::line::LinePrefix;
use crate::LogEntry;
use tracing::debug;

/// Incremental XML balance scanner. Fed text fragment by fragment, it
/// tracks element nesting depth while ignoring markup inside comments,
/// processing instructions, declarations and quoted attribute values,
/// so angle brackets in attribute text do not corrupt the count.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ScanMode {
    Text,
    /// Just consumed '<'; the next char decides the construct.
    Lt,
    /// Consumed "<!"; may become a comment or a declaration.
    Bang,
    /// Consumed "<!-"; one more '-' makes it a comment.
    BangDash,
    Comment,
    CommentDash1,
    CommentDash2,
    /// Inside "<? ... >" or "<! ... >"; skipped without depth change.
    Skip,
    Tag {
        closing: bool,
        quote: Option<char>,
        prev_slash: bool,
    },
}

#[derive(Debug)]
pub struct XmlScanner {
    depth: i64,
    opened: bool,
    mode: ScanMode,
}

impl XmlScanner {
    pub fn new() -> Self {
        Self {
            depth: 0,
            opened: false,
            mode: ScanMode::Text,
        }
    }

    pub fn feed(&mut self, text: &str) {
        for c in text.chars() {
            self.step(c);
        }
    }

    /// True once the document has opened at least one element and depth
    /// has returned to zero outside of any tag construct.
    pub fn is_complete(&self) -> bool {
        self.opened && self.depth <= 0 && self.mode == ScanMode::Text
    }

    fn step(&mut self, c: char) {
        self.mode = match self.mode {
            ScanMode::Text => {
                if c == '<' {
                    ScanMode::Lt
                } else {
                    ScanMode::Text
                }
            }
            ScanMode::Lt => match c {
                '!' => ScanMode::Bang,
                '?' => ScanMode::Skip,
                '/' => ScanMode::Tag {
                    closing: true,
                    quote: None,
                    prev_slash: false,
                },
                '>' => {
                    // Degenerate "<>": count it as an opening tag.
                    self.depth += 1;
                    self.opened = true;
                    ScanMode::Text
                }
                _ => ScanMode::Tag {
                    closing: false,
                    quote: None,
                    prev_slash: false,
                },
            },
            ScanMode::Bang => match c {
                '-' => ScanMode::BangDash,
                '>' => ScanMode::Text,
                _ => ScanMode::Skip,
            },
            ScanMode::BangDash => match c {
                '-' => ScanMode::Comment,
                '>' => ScanMode::Text,
                _ => ScanMode::Skip,
            },
            ScanMode::Comment => {
                if c == '-' {
                    ScanMode::CommentDash1
                } else {
                    ScanMode::Comment
                }
            }
            ScanMode::CommentDash1 => {
                if c == '-' {
                    ScanMode::CommentDash2
                } else {
                    ScanMode::Comment
                }
            }
            ScanMode::CommentDash2 => match c {
                '>' => ScanMode::Text,
                '-' => ScanMode::CommentDash2,
                _ => ScanMode::Comment,
            },
            ScanMode::Skip => {
                if c == '>' {
                    ScanMode::Text
                } else {
                    ScanMode::Skip
                }
            }
            ScanMode::Tag {
                closing,
                quote,
                prev_slash,
            } => {
                if let Some(q) = quote {
                    if c == q {
                        ScanMode::Tag {
                            closing,
                            quote: None,
                            prev_slash: false,
                        }
                    } else {
                        ScanMode::Tag {
                            closing,
                            quote,
                            prev_slash,
                        }
                    }
                } else {
                    match c {
                        '"' | '\'' => ScanMode::Tag {
                            closing,
                            quote: Some(c),
                            prev_slash: false,
                        },
                        '>' => {
                            if closing {
                                self.depth -= 1;
                            } else if prev_slash {
                                // Self-closing element, depth unchanged.
                                self.opened = true;
                            } else {
                                self.depth += 1;
                                self.opened = true;
                            }
                            ScanMode::Text
                        }
                        '/' => ScanMode::Tag {
                            closing,
                            quote: None,
                            prev_slash: true,
                        },
                        _ => ScanMode::Tag {
                            closing,
                            quote: None,
                            prev_slash: false,
                        },
                    }
                }
            }
        };
    }
}

impl Default for XmlScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Strips NETCONF 1.1 chunked-framing markers ("#<len>" tokens and the
/// "##" terminator) from a fragment. Fragments without markers pass
/// through untouched.
pub fn strip_chunk_markers(fragment: &str) -> &str {
    let mut s = fragment.trim();
    loop {
        let Some(rest) = s.strip_prefix('#') else {
            break;
        };
        if rest == "#" {
            return "";
        }
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let boundary_ok = rest[digits..]
            .chars()
            .next()
            .map(|c| c.is_whitespace() || c == '<')
            .unwrap_or(true);
        if digits > 0 && boundary_ok {
            s = rest[digits..].trim_start();
        } else {
            break;
        }
    }
    if let Some(pre) = s.strip_suffix("##") {
        s = pre.trim_end();
    }
    s
}

struct Pending {
    line_number: u64,
    prefix: LinePrefix,
    buf: String,
    scanner: XmlScanner,
}

/// Buffers continuation fragments for the currently open entry until the
/// scanner reports a balanced document. The joint state machine with the
/// line classifier: Idle --new entry--> Accumulating; Accumulating emits
/// on balance, or flushes a truncated entry when a new entry (or EOF)
/// arrives first.
pub struct PayloadAccumulator {
    current: Option<Pending>,
}

impl PayloadAccumulator {
    pub fn new() -> Self {
        Self { current: None }
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Opens a new entry from a matched prefix line. Any previously open
    /// entry must have been flushed first.
    pub fn open(&mut self, line_number: u64, prefix: LinePrefix, remainder: &str) {
        let mut scanner = XmlScanner::new();
        let fragment = strip_chunk_markers(remainder);
        scanner.feed(fragment);
        self.current = Some(Pending {
            line_number,
            prefix,
            buf: fragment.to_string(),
            scanner,
        });
    }

    /// Appends a continuation fragment to the open entry. No-op while idle.
    pub fn append(&mut self, fragment: &str) {
        if let Some(pending) = self.current.as_mut() {
            let fragment = strip_chunk_markers(fragment);
            if fragment.is_empty() {
                return;
            }
            if !pending.buf.is_empty() {
                pending.buf.push(' ');
            }
            pending.buf.push_str(fragment);
            pending.scanner.feed(" ");
            pending.scanner.feed(fragment);
        }
    }

    /// Emits the open entry if its document is balanced.
    pub fn take_complete(&mut self) -> Option<LogEntry> {
        if self
            .current
            .as_ref()
            .is_some_and(|p| p.scanner.is_complete())
        {
            return self.current.take().map(|p| Self::into_entry(p, false));
        }
        None
    }

    /// Flushes the open entry as truncated, preserving whatever text was
    /// accumulated. Used at a new-entry boundary and at end of input.
    pub fn flush_truncated(&mut self) -> Option<LogEntry> {
        self.current.take().map(|p| {
            debug!(
                line = p.line_number,
                session = p.prefix.session_id,
                "flushing unbalanced payload as truncated"
            );
            Self::into_entry(p, true)
        })
    }

    fn into_entry(pending: Pending, truncated: bool) -> LogEntry {
        LogEntry {
            line_number: pending.line_number,
            timestamp: Some(pending.prefix.timestamp),
            session_id: pending.prefix.session_id,
            host: pending.prefix.host,
            direction: pending.prefix.direction,
            raw_xml: pending.buf,
            truncated,
        }
    }
}

impl Default for PayloadAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
