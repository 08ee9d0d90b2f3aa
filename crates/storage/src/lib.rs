use anyhow::Context;
use oranlens_parser::{CarrierEvent, ErrorRecord, ParseOutput, ParseStatistics, RpcRecord};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use tracing::info;
use zstd::stream::{decode_all, encode_all};

const FORMAT_VERSION: u8 = 1;
const ZSTD_LEVEL: i32 = 3;

/// On-disk envelope for one parse run. The record collections are
/// postcard-serialized and zstd-compressed per block, so statistics can
/// be decoded without touching the (much larger) xml_content payloads.
#[derive(Serialize, Deserialize)]
pub struct ResultsFile {
    pub version: u8,
    pub file_id: String,
    pub total_lines: u64,
    pub skipped_lines: u64,
    pub truncated_entries: u64,
    pub statistics: ParseStatistics,
    pub message_block: Vec<u8>,
    pub error_block: Vec<u8>,
    pub carrier_block: Vec<u8>,
}

pub struct StorageEngine;

impl StorageEngine {
    pub fn save_results(output: &ParseOutput, path: &str) -> anyhow::Result<()> {
        let message_block = compress(&output.messages)?;
        let error_block = compress(&output.errors)?;
        let carrier_block = compress(&output.carrier_events)?;

        let envelope = ResultsFile {
            version: FORMAT_VERSION,
            file_id: output.file_id.clone(),
            total_lines: output.total_lines,
            skipped_lines: output.skipped_lines,
            truncated_entries: output.truncated_entries,
            statistics: output.statistics.clone(),
            message_block,
            error_block,
            carrier_block,
        };

        let serialized = postcard::to_allocvec(&envelope)?;
        let mut file = File::create(path).with_context(|| format!("creating {}", path))?;
        file.write_all(&serialized)?;
        info!(path, bytes = serialized.len(), "saved parse results");
        Ok(())
    }

    pub fn load_results(path: &str) -> anyhow::Result<ParseOutput> {
        let mut file = File::open(path).with_context(|| format!("opening {}", path))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        let envelope: ResultsFile = postcard::from_bytes(&buf)?;
        anyhow::ensure!(
            envelope.version == FORMAT_VERSION,
            "unsupported results format version {}",
            envelope.version
        );

        let messages: Vec<RpcRecord> = decompress(&envelope.message_block)?;
        let errors: Vec<ErrorRecord> = decompress(&envelope.error_block)?;
        let carrier_events: Vec<CarrierEvent> = decompress(&envelope.carrier_block)?;

        Ok(ParseOutput {
            file_id: envelope.file_id,
            messages,
            errors,
            carrier_events,
            statistics: envelope.statistics,
            total_lines: envelope.total_lines,
            skipped_lines: envelope.skipped_lines,
            truncated_entries: envelope.truncated_entries,
        })
    }
}

fn compress<T: Serialize>(value: &T) -> anyhow::Result<Vec<u8>> {
    let raw = postcard::to_allocvec(value)?;
    Ok(encode_all(&raw[..], ZSTD_LEVEL)?)
}

fn decompress<T: for<'de> Deserialize<'de>>(block: &[u8]) -> anyhow::Result<T> {
    let raw = decode_all(block)?;
    Ok(postcard::from_bytes(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oranlens_parser::{CancelToken, MemoryLineSource, ParseSession};
    use std::fs;

    const SAMPLE: &str = "\
2025-01-01T00:00:00.000Z Dbg: [10.0.0.1] Session 1: Sending message:<rpc message-id=\"1\" xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\"><get/></rpc>
2025-01-01T00:00:00.050Z Dbg: [10.0.0.1] Session 1: Received message:<rpc-reply message-id=\"1\" xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\"><data/></rpc-reply>
";

    #[test]
    fn test_results_round_trip() {
        let mut source = MemoryLineSource::new(SAMPLE);
        let output = ParseSession::new("sample.log")
            .run(&mut source, &CancelToken::new())
            .unwrap();

        let path = "test_results.olens";
        StorageEngine::save_results(&output, path).unwrap();
        let loaded = StorageEngine::load_results(path).unwrap();

        assert_eq!(loaded.file_id, "sample.log");
        assert_eq!(loaded.messages.len(), output.messages.len());
        assert_eq!(loaded.total_lines, output.total_lines);
        assert_eq!(
            loaded.statistics.total_messages,
            output.statistics.total_messages
        );
        for (a, b) in loaded.messages.iter().zip(output.messages.iter()) {
            assert_eq!(a.xml_content, b.xml_content);
            assert_eq!(a.line_number, b.line_number);
            assert_eq!(a.timestamp, b.timestamp);
            assert_eq!(a.response_time_ms, b.response_time_ms);
        }

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let mut source = MemoryLineSource::new(SAMPLE);
        let output = ParseSession::new("sample.log")
            .run(&mut source, &CancelToken::new())
            .unwrap();

        let envelope = ResultsFile {
            version: 99,
            file_id: output.file_id.clone(),
            total_lines: 0,
            skipped_lines: 0,
            truncated_entries: 0,
            statistics: output.statistics.clone(),
            message_block: Vec::new(),
            error_block: Vec::new(),
            carrier_block: Vec::new(),
        };
        let path = "test_results_badver.olens";
        fs::write(path, postcard::to_allocvec(&envelope).unwrap()).unwrap();

        assert!(StorageEngine::load_results(path).is_err());
        fs::remove_file(path).unwrap();
    }
}
