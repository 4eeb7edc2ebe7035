use crate::error::Error;
use crate::structs::EnhancedFlowRecord;

use serde::Serialize;
use std::io::Write;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Csv,
    Json,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "plain" | "plain_text" => Ok(OutputFormat::Text),
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            _ => Err(Error::Precondition(format!(
                "unknown output format: {s} (valid: text, csv, json)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Timestamp,
    StreamId,
    SourceIp,
    DestinationIp,
    ByteCount,
    PacketCount,
}

impl FromStr for SortField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_lowercase().as_str() {
            "timestamp" | "time" | "ts" => Ok(SortField::Timestamp),
            "stream_id" | "stream" | "sid" => Ok(SortField::StreamId),
            "src_ip" | "source_ip" | "srcip" => Ok(SortField::SourceIp),
            "dst_ip" | "destination_ip" | "dstip" => Ok(SortField::DestinationIp),
            "bytes" | "byte_count" => Ok(SortField::ByteCount),
            "packets" | "packet_count" | "pkts" => Ok(SortField::PacketCount),
            _ => Err(Error::Precondition(format!(
                "unknown sort field: {s} \
                 (valid: timestamp, stream_id, src_ip, dst_ip, bytes, packets)"
            ))),
        }
    }
}

impl SortField {
    /// Order a chunk in place. Counters sort descending, everything else
    /// ascending; ties always fall back to the timestamp.
    pub fn sort(&self, records: &mut [EnhancedFlowRecord]) {
        match self {
            SortField::Timestamp => records.sort_by_key(|r| r.first_timestamp),
            SortField::StreamId => records.sort_by_key(|r| (r.stream_id, r.first_timestamp)),
            SortField::SourceIp => records.sort_by_key(|r| (r.source_ip, r.first_timestamp)),
            SortField::DestinationIp => {
                records.sort_by_key(|r| (r.destination_ip, r.first_timestamp))
            }
            SortField::ByteCount => {
                records.sort_by_key(|r| (std::cmp::Reverse(r.byte_count), r.first_timestamp))
            }
            SortField::PacketCount => {
                records.sort_by_key(|r| (std::cmp::Reverse(r.packet_count), r.first_timestamp))
            }
        }
    }
}

/// Wire shape of one JSON record; field order is the emission order.
#[derive(Serialize)]
struct JsonRecord {
    stream_id: u32,
    first_timestamp: u64,
    last_timestamp: u64,
    src_ip: String,
    dst_ip: String,
    src_port: u16,
    dst_port: u16,
    protocol: u8,
    packet_count: u32,
    byte_count: u64,
}

impl From<&EnhancedFlowRecord> for JsonRecord {
    fn from(r: &EnhancedFlowRecord) -> Self {
        JsonRecord {
            stream_id: r.stream_id,
            first_timestamp: r.first_timestamp,
            last_timestamp: r.last_timestamp,
            src_ip: r.source_ip_str(),
            dst_ip: r.destination_ip_str(),
            src_port: r.source_port,
            dst_port: r.destination_port,
            protocol: r.protocol,
            packet_count: r.packet_count,
            byte_count: r.byte_count,
        }
    }
}

pub const ENHANCED_CSV_HEADER: &str =
    "stream_id,first_timestamp,last_timestamp,src_ip,dst_ip,src_port,dst_port,protocol,packet_count,byte_count";

/// Streaming record writer. JSON output is emitted as one array with the
/// separators written before each element, so the stream is well formed no
/// matter where it stops.
pub struct FlowFormatter {
    format: OutputFormat,
    sort_field: SortField,
    pretty: bool,
    emitted: u64,
}

impl FlowFormatter {
    pub fn new(format: OutputFormat, sort_field: SortField, pretty: bool) -> Self {
        FlowFormatter {
            format,
            sort_field,
            pretty,
            emitted: 0,
        }
    }

    pub fn sort_records(&self, records: &mut [EnhancedFlowRecord]) {
        self.sort_field.sort(records);
    }

    pub fn write_header(&mut self, w: &mut dyn Write, suppress: bool) -> std::io::Result<()> {
        match self.format {
            // the JSON array opener is structural, not a header
            OutputFormat::Json => write!(w, "["),
            _ if suppress => Ok(()),
            OutputFormat::Text => writeln!(w, "{}", text_header()),
            OutputFormat::Csv => writeln!(w, "{ENHANCED_CSV_HEADER}"),
        }
    }

    pub fn write_record(
        &mut self,
        w: &mut dyn Write,
        record: &EnhancedFlowRecord,
    ) -> std::io::Result<()> {
        match self.format {
            OutputFormat::Text => writeln!(w, "{}", text_row(record))?,
            OutputFormat::Csv => writeln!(w, "{}", csv_row(record))?,
            OutputFormat::Json => {
                let json = JsonRecord::from(record);
                if self.emitted > 0 {
                    write!(w, ",")?;
                }
                if self.pretty {
                    writeln!(w)?;
                    let body = serde_json::to_string_pretty(&json)?;
                    let indented: Vec<String> =
                        body.lines().map(|line| format!("  {line}")).collect();
                    write!(w, "{}", indented.join("\n"))?;
                } else {
                    write!(w, "{}", serde_json::to_string(&json)?)?;
                }
            }
        }
        self.emitted += 1;
        Ok(())
    }

    pub fn write_footer(&mut self, w: &mut dyn Write) -> std::io::Result<()> {
        if self.format == OutputFormat::Json {
            if self.pretty {
                writeln!(w)?;
            }
            writeln!(w, "]")?;
        }
        Ok(())
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

fn csv_row(r: &EnhancedFlowRecord) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{},{}",
        r.stream_id,
        r.first_timestamp,
        r.last_timestamp,
        r.source_ip_str(),
        r.destination_ip_str(),
        r.source_port,
        r.destination_port,
        r.protocol,
        r.packet_count,
        r.byte_count
    )
}

fn text_header() -> String {
    format!(
        "{:<12}{:<24}{:<24}{:<18}{:<10}{:<18}{:<10}{:<7}{:<10}{:<12}",
        "STREAM",
        "FIRST_TIMESTAMP",
        "LAST_TIMESTAMP",
        "SRC_IP",
        "SRC_PORT",
        "DST_IP",
        "DST_PORT",
        "PROTO",
        "PACKETS",
        "BYTES"
    )
}

fn text_row(r: &EnhancedFlowRecord) -> String {
    format!(
        "0x{:08X}  {:<22}{:<22}{:<18}{:<10}{:<18}{:<10}{:<7}{:<10}{:<12}",
        r.stream_id,
        format_split_timestamp(r.first_timestamp),
        format_split_timestamp(r.last_timestamp),
        r.source_ip_str(),
        r.source_port,
        r.destination_ip_str(),
        r.destination_port,
        r.protocol,
        r.packet_count,
        r.byte_count
    )
}

/// `<seconds>.<9-digit nanoseconds>`
fn format_split_timestamp(ts_ns: u64) -> String {
    format!("{}.{:09}", ts_ns / 1_000_000_000, ts_ns % 1_000_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::PROTO_TCP;

    fn record(stream_id: u32, first: u64) -> EnhancedFlowRecord {
        EnhancedFlowRecord {
            stream_id,
            source_ip: 0xC0A80102,
            destination_ip: 0x0A000003,
            source_port: 51234,
            destination_port: 443,
            protocol: PROTO_TCP,
            first_timestamp: first,
            last_timestamp: first + 42,
            packet_count: 12,
            byte_count: 9000,
        }
    }

    #[test]
    fn format_and_sort_names_resolve_with_aliases() {
        assert_eq!("TEXT".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("plain".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("csv".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert!("xml".parse::<OutputFormat>().is_err());

        assert_eq!("ts".parse::<SortField>().unwrap(), SortField::Timestamp);
        assert_eq!("sid".parse::<SortField>().unwrap(), SortField::StreamId);
        assert_eq!("bytes".parse::<SortField>().unwrap(), SortField::ByteCount);
        assert_eq!("pkts".parse::<SortField>().unwrap(), SortField::PacketCount);
        assert!("color".parse::<SortField>().is_err());
    }

    #[test]
    fn csv_round_trip_recovers_all_fields() {
        let r = record(7, 1_704_067_200_000_000_640);
        let row = csv_row(&r);
        let fields: Vec<&str> = row.split(',').collect();
        assert_eq!(fields.len(), 10);
        assert_eq!(fields[0].parse::<u32>().unwrap(), r.stream_id);
        assert_eq!(fields[1].parse::<u64>().unwrap(), r.first_timestamp);
        assert_eq!(fields[2].parse::<u64>().unwrap(), r.last_timestamp);
        assert_eq!(crate::utils::parse_ipv4(fields[3]).unwrap(), r.source_ip);
        assert_eq!(
            crate::utils::parse_ipv4(fields[4]).unwrap(),
            r.destination_ip
        );
        assert_eq!(fields[5].parse::<u16>().unwrap(), r.source_port);
        assert_eq!(fields[6].parse::<u16>().unwrap(), r.destination_port);
        assert_eq!(fields[7].parse::<u8>().unwrap(), r.protocol);
        assert_eq!(fields[8].parse::<u32>().unwrap(), r.packet_count);
        assert_eq!(fields[9].parse::<u64>().unwrap(), r.byte_count);
    }

    #[test]
    fn compact_json_is_one_whitespace_free_array() {
        let mut formatter = FlowFormatter::new(OutputFormat::Json, SortField::Timestamp, false);
        let mut out = Vec::new();
        formatter.write_header(&mut out, false).unwrap();
        formatter.write_record(&mut out, &record(1, 100)).unwrap();
        formatter.write_record(&mut out, &record(2, 200)).unwrap();
        formatter.write_footer(&mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let trimmed = text.trim_end();
        assert!(!trimmed.contains(' '));
        assert!(!trimmed.contains('\n'));
        let parsed: serde_json::Value = serde_json::from_str(trimmed).unwrap();
        let array = parsed.as_array().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array[0]["stream_id"], 1);
        assert_eq!(array[1]["dst_port"], 443);
        assert_eq!(array[0]["src_ip"], "192.168.1.2");
    }

    #[test]
    fn pretty_json_parses_and_keeps_all_records() {
        let mut formatter = FlowFormatter::new(OutputFormat::Json, SortField::Timestamp, true);
        let mut out = Vec::new();
        formatter.write_header(&mut out, false).unwrap();
        for i in 0..3 {
            formatter.write_record(&mut out, &record(i, 100 * u64::from(i))).unwrap();
        }
        formatter.write_footer(&mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 3);
        // two-space indented object lines
        assert!(text.contains("  {"));
        assert!(text.contains("    \"stream_id\": 0"));
    }

    #[test]
    fn empty_json_stream_is_still_a_closed_array() {
        let mut formatter = FlowFormatter::new(OutputFormat::Json, SortField::Timestamp, false);
        let mut out = Vec::new();
        formatter.write_header(&mut out, false).unwrap();
        formatter.write_footer(&mut out).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(String::from_utf8(out).unwrap().trim_end()).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 0);
    }

    #[test]
    fn text_rows_use_hex_stream_and_split_timestamps() {
        let r = record(0xAB, 1_704_067_200_500_000_001);
        let row = text_row(&r);
        assert!(row.starts_with("0x000000AB"));
        assert!(row.contains("1704067200.500000001"));
        assert!(row.contains("192.168.1.2"));
        let header = text_header();
        assert!(header.starts_with("STREAM"));
        assert!(header.contains("PACKETS"));
    }

    #[test]
    fn sort_orders_match_their_keys() {
        let mut records = vec![
            EnhancedFlowRecord {
                byte_count: 10,
                packet_count: 5,
                ..record(3, 30)
            },
            EnhancedFlowRecord {
                byte_count: 30,
                packet_count: 1,
                ..record(1, 20)
            },
            EnhancedFlowRecord {
                byte_count: 20,
                packet_count: 9,
                ..record(2, 10)
            },
        ];

        SortField::Timestamp.sort(&mut records);
        assert_eq!(
            records.iter().map(|r| r.first_timestamp).collect::<Vec<_>>(),
            [10, 20, 30]
        );

        SortField::StreamId.sort(&mut records);
        assert_eq!(
            records.iter().map(|r| r.stream_id).collect::<Vec<_>>(),
            [1, 2, 3]
        );

        SortField::ByteCount.sort(&mut records);
        assert_eq!(
            records.iter().map(|r| r.byte_count).collect::<Vec<_>>(),
            [30, 20, 10]
        );

        SortField::PacketCount.sort(&mut records);
        assert_eq!(
            records.iter().map(|r| r.packet_count).collect::<Vec<_>>(),
            [9, 5, 1]
        );
    }

    #[test]
    fn sort_breaks_ties_by_timestamp() {
        let mut records = vec![
            EnhancedFlowRecord {
                byte_count: 50,
                ..record(1, 300)
            },
            EnhancedFlowRecord {
                byte_count: 50,
                ..record(1, 100)
            },
        ];
        SortField::ByteCount.sort(&mut records);
        assert_eq!(records[0].first_timestamp, 100);

        SortField::StreamId.sort(&mut records);
        assert_eq!(records[0].first_timestamp, 100);
    }

    #[test]
    fn csv_header_and_suppression() {
        let mut formatter = FlowFormatter::new(OutputFormat::Csv, SortField::Timestamp, false);
        let mut out = Vec::new();
        formatter.write_header(&mut out, false).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap().trim_end(),
            ENHANCED_CSV_HEADER
        );

        let mut out = Vec::new();
        formatter.write_header(&mut out, true).unwrap();
        assert!(out.is_empty());
    }
}
