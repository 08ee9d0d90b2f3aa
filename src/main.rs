use anyhow::Context;
use chrono::{DateTime, Duration, TimeZone, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use oranlens_parser::{CancelToken, ParseOutput, ParseSession, ReaderLineSource};
use oranlens_storage::StorageEngine;
use oranlens_ui::UiServer;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "oranlens")]
#[command(about = "O-RAN NETCONF/RPC debug log analyzer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RecordKind {
    Messages,
    Errors,
    Carriers,
}

#[derive(Subcommand)]
enum Commands {
    /// Parses a debug log file and stores the extracted records
    Parse {
        #[arg(long)]
        input: String,
        #[arg(long, default_value = "results.olens")]
        output: String,
        /// Identifier tagged onto the output records (defaults to the input file name)
        #[arg(long)]
        file_id: Option<String>,
    },
    /// Prints records from a stored result set
    Query {
        #[arg(long, default_value = "results.olens")]
        input: String,
        #[arg(long, value_enum, default_value_t = RecordKind::Messages)]
        kind: RecordKind,
        #[arg(long)]
        session: Option<u64>,
        /// Case-insensitive substring filter over the printed fields
        #[arg(long)]
        filter: Option<String>,
    },
    /// Prints parse statistics from a stored result set
    Stats {
        #[arg(long, default_value = "results.olens")]
        input: String,
    },
    /// Parses (or loads) a file and serves the web viewer
    Serve {
        /// A raw .log file or a stored .olens result set
        #[arg(long)]
        input: String,
        #[arg(long, default_value = "127.0.0.1:8080")]
        ui_addr: String,
    },
    /// Generates a synthetic O-RAN debug log for demos and testing
    Generate {
        #[arg(long, default_value = "demo-oran.log")]
        output: String,
        #[arg(long, default_value = "2")]
        sessions: u64,
        #[arg(long, default_value = "5")]
        exchanges: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        unsafe { std::env::set_var("RUST_LOG", "info,oranlens=debug") };
    }
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Parse {
            input,
            output,
            file_id,
        } => {
            let results = parse_file(&input, file_id).await?;
            StorageEngine::save_results(&results, &output)?;
            print_summary(&results);
            info!("Results saved to {}", output);
        }
        Commands::Query {
            input,
            kind,
            session,
            filter,
        } => {
            let results = StorageEngine::load_results(&input)?;
            let filter_lower = filter.as_ref().map(|s| s.to_lowercase());
            let mut stdout = io::stdout().lock();

            let res = match kind {
                RecordKind::Messages => print_messages(&mut stdout, &results, session, &filter_lower),
                RecordKind::Errors => print_errors(&mut stdout, &results, session, &filter_lower),
                RecordKind::Carriers => print_carriers(&mut stdout, &results, session, &filter_lower),
            };
            if let Err(e) = res {
                if e.kind() == io::ErrorKind::BrokenPipe {
                    return Ok(());
                }
                return Err(e.into());
            }
        }
        Commands::Stats { input } => {
            let results = StorageEngine::load_results(&input)?;
            print_summary(&results);
        }
        Commands::Serve { input, ui_addr } => {
            let results = if input.ends_with(".olens") {
                StorageEngine::load_results(&input)?
            } else {
                parse_file(&input, None).await?
            };
            print_summary(&results);
            let server = UiServer::new(Arc::new(results));

            tokio::select! {
                res = server.run(&ui_addr) => {
                    if let Err(e) = res {
                        tracing::error!("UI server error: {}", e);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                }
            }
        }
        Commands::Generate {
            output,
            sessions,
            exchanges,
        } => {
            let text = generate_log(sessions, exchanges);
            std::fs::write(&output, text).with_context(|| format!("writing {}", output))?;
            info!(
                "Generated demo log with {} sessions x {} exchanges to {}",
                sessions, exchanges, output
            );
        }
    }

    Ok(())
}

/// One parse session per file; heavier files run off the async runtime.
async fn parse_file(input: &str, file_id: Option<String>) -> anyhow::Result<ParseOutput> {
    let file_id = file_id.unwrap_or_else(|| {
        Path::new(input)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.to_string())
    });
    let input = input.to_string();
    tokio::task::spawn_blocking(move || {
        let file = File::open(&input).with_context(|| format!("opening {}", input))?;
        let mut source = ReaderLineSource::new(BufReader::new(file));
        ParseSession::new(file_id).run(&mut source, &CancelToken::new())
    })
    .await?
}

fn print_summary(results: &ParseOutput) {
    let s = &results.statistics;
    println!("Parse summary for {}:", results.file_id);
    println!("  lines:         {}", s.total_lines);
    println!(
        "  messages:      {} (rpc {}, rpc-reply {}, notification {})",
        s.total_messages, s.rpc_count, s.rpc_reply_count, s.notification_count
    );
    println!("  errors:        {} ({} faults)", s.error_count, s.fault_count);
    println!("  carrier events: {}", results.carrier_events.len());
    println!(
        "  paired rpcs:   {} (skipped lines {}, truncated {})",
        s.paired_count, results.skipped_lines, results.truncated_entries
    );
    match (s.min_response_time_ms, s.avg_response_time_ms, s.max_response_time_ms) {
        (Some(min), Some(avg), Some(max)) => {
            println!("  response time: min {:.1} ms / avg {:.1} ms / max {:.1} ms", min, avg, max)
        }
        _ => println!("  response time: n/a"),
    }
    if !s.operation_stats.is_empty() {
        let mut ops: Vec<_> = s.operation_stats.iter().collect();
        ops.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        let line = ops
            .iter()
            .map(|(op, n)| format!("{} x{}", op, n))
            .collect::<Vec<_>>()
            .join(", ");
        println!("  operations:    {}", line);
    }
}

fn fmt_ts(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn matches_filter(filter: &Option<String>, hay: &str) -> bool {
    match filter {
        Some(f) => hay.to_lowercase().contains(f),
        None => true,
    }
}

fn print_messages(
    out: &mut impl Write,
    results: &ParseOutput,
    session: Option<u64>,
    filter: &Option<String>,
) -> io::Result<()> {
    for m in &results.messages {
        if session.is_some_and(|s| m.session_id != s) {
            continue;
        }
        let line = format!(
            "{:>6} {} s{} {:<12} {} {} {} {}",
            m.line_number,
            fmt_ts(m.timestamp),
            m.session_id,
            m.message_type.as_str(),
            m.direction.as_str(),
            m.operation.as_deref().unwrap_or("-"),
            m.yang_module.as_deref().unwrap_or("-"),
            m.response_time_ms
                .map(|rt| format!("{:.0}ms", rt))
                .unwrap_or_else(|| "-".to_string()),
        );
        if matches_filter(filter, &line) {
            writeln!(out, "{}", line)?;
        }
    }
    Ok(())
}

fn print_errors(
    out: &mut impl Write,
    results: &ParseOutput,
    session: Option<u64>,
    filter: &Option<String>,
) -> io::Result<()> {
    for e in &results.errors {
        if session.is_some_and(|s| e.session_id != s) {
            continue;
        }
        let line = format!(
            "{:>6} {} s{} {:<9} tag={} severity={} fault={} {} {}",
            e.line_number,
            fmt_ts(e.timestamp),
            e.session_id,
            e.error_type.as_str(),
            e.error_tag.as_deref().unwrap_or("-"),
            e.error_severity.as_deref().unwrap_or("-"),
            e.fault_id.as_deref().unwrap_or("-"),
            if e.is_cleared { "cleared" } else { "active" },
            e.error_message.as_deref().unwrap_or(""),
        );
        if matches_filter(filter, &line) {
            writeln!(out, "{}", line)?;
        }
    }
    Ok(())
}

fn print_carriers(
    out: &mut impl Write,
    results: &ParseOutput,
    session: Option<u64>,
    filter: &Option<String>,
) -> io::Result<()> {
    for c in &results.carrier_events {
        if session.is_some_and(|s| c.session_id != s) {
            continue;
        }
        let line = format!(
            "{:>6} {} s{} {:<12} {} {} state={} prev={}",
            c.line_number,
            fmt_ts(c.timestamp),
            c.session_id,
            c.event_type.as_str(),
            c.carrier_type,
            c.carrier_name,
            c.state.as_deref().unwrap_or("-"),
            c.previous_state.as_deref().unwrap_or("-"),
        );
        if matches_filter(filter, &line) {
            writeln!(out, "{}", line)?;
        }
    }
    Ok(())
}

const BASE_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";
const UPLANE_NS: &str = "urn:o-ran:uplane-conf:1.0";
const HOST: &str = "192.168.1.10";

/// Deterministic synthetic log: per session a run of get/reply
/// exchanges, a multi-line carrier edit-config, a state-change
/// notification, an alarm raise/clear pair and one failing edit-config.
fn generate_log(sessions: u64, exchanges: u64) -> String {
    let mut out = String::new();
    let mut t = Utc
        .with_ymd_and_hms(2025, 3, 10, 8, 0, 0)
        .single()
        .unwrap_or_default();
    let line = |t: DateTime<Utc>, session: u64, keyword: &str, payload: &str| {
        format!(
            "{} Dbg: [{}] Session {}: {} message:{}\n",
            t.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            HOST,
            session,
            keyword,
            payload
        )
    };

    for s in 1..=sessions {
        for i in 1..=exchanges {
            out.push_str(&line(
                t,
                s,
                "Sending",
                &format!(
                    "<rpc message-id=\"{i}\" xmlns=\"{BASE_NS}\"><get><filter>\
                     <hardware xmlns=\"urn:o-ran:hardware:1.0\"/></filter></get></rpc>"
                ),
            ));
            t += Duration::milliseconds(35 + (i as i64 % 7) * 5);
            out.push_str(&line(
                t,
                s,
                "Received",
                &format!(
                    "<rpc-reply message-id=\"{i}\" xmlns=\"{BASE_NS}\"><data>\
                     <hardware xmlns=\"urn:o-ran:hardware:1.0\"/></data></rpc-reply>"
                ),
            ));
            t += Duration::milliseconds(200);
        }

        // Carrier creation split over three physical lines.
        let id = exchanges + 1;
        out.push_str(&line(
            t,
            s,
            "Sending",
            &format!(
                "<rpc message-id=\"{id}\" xmlns=\"{BASE_NS}\" xmlns:nc=\"{BASE_NS}\">\
                 <edit-config><target><running/></target>"
            ),
        ));
        out.push_str(&format!(
            "<config><user-plane-configuration xmlns=\"{UPLANE_NS}\">\
             <tx-array-carriers nc:operation=\"create\"><name>txc{s}</name><state>CREATING</state><gain>22.0</gain>\n"
        ));
        out.push_str("</tx-array-carriers></user-plane-configuration></config></edit-config></rpc>\n");
        t += Duration::milliseconds(60);
        out.push_str(&line(
            t,
            s,
            "Received",
            &format!("<rpc-reply message-id=\"{id}\" xmlns=\"{BASE_NS}\"><ok/></rpc-reply>"),
        ));
        t += Duration::milliseconds(500);

        out.push_str(&line(
            t,
            s,
            "Received",
            &format!(
                "<notification xmlns=\"urn:ietf:params:xml:ns:netconf:notification:1.0\">\
                 <eventTime>{}</eventTime>\
                 <tx-array-carriers-state-change xmlns=\"{UPLANE_NS}\">\
                 <tx-array-carriers><name>txc{s}</name><state>READY</state></tx-array-carriers>\
                 </tx-array-carriers-state-change></notification>",
                t.format("%Y-%m-%dT%H:%M:%S%.3fZ")
            ),
        ));
        t += Duration::milliseconds(300);

        out.push_str(&line(
            t,
            s,
            "Received",
            &format!(
                "<notification xmlns=\"urn:ietf:params:xml:ns:netconf:notification:1.0\">\
                 <eventTime>{}</eventTime><alarm-notif xmlns=\"urn:o-ran:fm:1.0\">\
                 <fault-id>27</fault-id><fault-source>txc{s}</fault-source>\
                 <fault-severity>MAJOR</fault-severity><is-cleared>false</is-cleared>\
                 <fault-text>carrier synchronisation lost</fault-text></alarm-notif></notification>",
                t.format("%Y-%m-%dT%H:%M:%S%.3fZ")
            ),
        ));
        t += Duration::milliseconds(800);
        out.push_str(&line(
            t,
            s,
            "Received",
            &format!(
                "<notification xmlns=\"urn:ietf:params:xml:ns:netconf:notification:1.0\">\
                 <eventTime>{}</eventTime><alarm-notif xmlns=\"urn:o-ran:fm:1.0\">\
                 <fault-id>27</fault-id><fault-source>txc{s}</fault-source>\
                 <fault-severity>MAJOR</fault-severity><is-cleared>true</is-cleared>\
                 <fault-text>carrier synchronisation lost</fault-text></alarm-notif></notification>",
                t.format("%Y-%m-%dT%H:%M:%S%.3fZ")
            ),
        ));
        t += Duration::milliseconds(100);

        let id = exchanges + 2;
        out.push_str(&line(
            t,
            s,
            "Sending",
            &format!(
                "<rpc message-id=\"{id}\" xmlns=\"{BASE_NS}\"><edit-config><target><running/></target>\
                 <config><user-plane-configuration xmlns=\"{UPLANE_NS}\">\
                 <tx-array-carriers><name>txc{s}</name><state>ACTIVE</state></tx-array-carriers>\
                 </user-plane-configuration></config></edit-config></rpc>"
            ),
        ));
        t += Duration::milliseconds(45);
        out.push_str(&line(
            t,
            s,
            "Received",
            &format!(
                "<rpc-reply message-id=\"{id}\" xmlns=\"{BASE_NS}\"><rpc-error>\
                 <error-type>application</error-type><error-tag>resource-denied</error-tag>\
                 <error-severity>error</error-severity>\
                 <error-message>carrier txc{s} is busy</error-message></rpc-error></rpc-reply>"
            ),
        ));
        t += Duration::milliseconds(1000);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use oranlens_parser::MemoryLineSource;

    #[test]
    fn test_generated_log_parses_cleanly() {
        let text = generate_log(2, 3);
        let mut source = MemoryLineSource::new(&text);
        let out = ParseSession::new("demo")
            .run(&mut source, &CancelToken::new())
            .unwrap();

        assert_eq!(out.skipped_lines, 0);
        assert_eq!(out.truncated_entries, 0);
        // Per session: 3 exchanges (6), carrier create + ok (2),
        // state-change (1), alarm raise + clear (2), failing edit (2).
        assert_eq!(out.messages.len(), 2 * (6 + 2 + 1 + 2 + 2));
        // rpc-error + two faults per session.
        assert_eq!(out.errors.len(), 2 * 3);
        assert_eq!(out.statistics.fault_count, 4);
        // create + state-change + failing update per session.
        assert_eq!(out.carrier_events.len(), 2 * 3);
        // All requests answered.
        assert_eq!(out.statistics.paired_count, 2 * 5);
        assert!(out.statistics.avg_response_time_ms.is_some());
    }

    #[test]
    fn test_generated_multi_line_payload_reassembles() {
        let text = generate_log(1, 1);
        let mut source = MemoryLineSource::new(&text);
        let out = ParseSession::new("demo")
            .run(&mut source, &CancelToken::new())
            .unwrap();

        let create = out
            .carrier_events
            .iter()
            .find(|c| c.event_type == oranlens_parser::CarrierEventType::Create)
            .expect("create event from the multi-line edit-config");
        assert_eq!(create.carrier_name, "txc1");
        assert_eq!(create.state.as_deref(), Some("CREATING"));
    }
}
