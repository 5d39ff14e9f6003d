use std::fmt::Write as _;
use std::io::{IsTerminal, Write};
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One request/response round trip as seen by the host.
#[derive(Debug)]
pub struct Exchange<'a> {
    pub peer: SocketAddr,
    pub request: &'a [u8],
    pub response: &'a [u8],
    pub elapsed: Duration,
}

#[derive(Serialize)]
struct ExchangeOutput {
    event: &'static str,
    peer: String,
    request_size: usize,
    response_size: usize,
    response: String,
    command: Option<String>,
    round_trip_ms: f64,
    timestamp: String,
}

pub fn print_exchange(exchange: &Exchange<'_>, format: OutputFormat) {
    let response_hex = to_hex(exchange.response);
    let command = exchange.response.first().map(|id| format!("{id:#04x}"));
    let round_trip_ms = millis(exchange.elapsed);

    match format {
        OutputFormat::Json => {
            let out = ExchangeOutput {
                event: "response",
                peer: exchange.peer.to_string(),
                request_size: exchange.request.len(),
                response_size: exchange.response.len(),
                response: response_hex,
                command,
                round_trip_ms,
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PEER", "REQ", "RESP", "RTT (ms)", "RESPONSE"])
                .add_row(vec![
                    exchange.peer.to_string(),
                    exchange.request.len().to_string(),
                    exchange.response.len().to_string(),
                    format!("{round_trip_ms:.2}"),
                    response_hex,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "peer={} request={}B response={}B rtt={:.2}ms data={}",
                exchange.peer,
                exchange.request.len(),
                exchange.response.len(),
                round_trip_ms,
                response_hex
            );
        }
        OutputFormat::Raw => print_raw(exchange.response),
    }
}

#[derive(Serialize)]
struct ListeningOutput {
    event: &'static str,
    addr: String,
    console_addr: Option<String>,
    processor: &'static str,
}

/// Announce the bound address(es) on stdout so wrappers can pick up port 0.
pub fn print_listening(
    addr: SocketAddr,
    console_addr: Option<SocketAddr>,
    processor: &'static str,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => print_json(&ListeningOutput {
            event: "listening",
            addr: addr.to_string(),
            console_addr: console_addr.map(|a| a.to_string()),
            processor,
        }),
        OutputFormat::Table | OutputFormat::Pretty => {
            print!("listening on {addr} (processor: {processor})");
            if let Some(console) = console_addr {
                print!(", console on {console}");
            }
            println!();
        }
        OutputFormat::Raw => println!("{addr}"),
    }
    let _ = std::io::stdout().flush();
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Lowercase hex without separators.
pub fn to_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Parse hex bytes. Whitespace, `:` and `-` between digit pairs are ignored,
/// as is a leading `0x`.
pub fn parse_hex(input: &str) -> Result<Vec<u8>, String> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: Vec<u8> = trimmed
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b':' && *b != b'-')
        .collect();

    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in {input:?}"));
    }

    digits
        .chunks(2)
        .map(|pair| {
            let hi = hex_value(pair[0]);
            let lo = hex_value(pair[1]);
            match (hi, lo) {
                (Some(hi), Some(lo)) => Ok((hi << 4) | lo),
                _ => Err(format!(
                    "invalid hex digit in {:?}",
                    String::from_utf8_lossy(pair)
                )),
            }
        })
        .collect()
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

pub fn millis(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 1000.0 * 100.0).round() / 100.0
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let bytes = parse_hex("00 ff:0A-b1").unwrap();
        assert_eq!(bytes, vec![0x00, 0xFF, 0x0A, 0xB1]);
        assert_eq!(to_hex(&bytes), "00ff0ab1");
    }

    #[test]
    fn hex_accepts_prefix_and_empty() {
        assert_eq!(parse_hex("0x00fe").unwrap(), vec![0x00, 0xFE]);
        assert!(parse_hex("").unwrap().is_empty());
    }

    #[test]
    fn hex_rejects_bad_input() {
        assert!(parse_hex("abc").unwrap_err().contains("odd"));
        assert!(parse_hex("zz").unwrap_err().contains("invalid"));
    }

    #[test]
    fn millis_rounds_to_hundredths() {
        assert_eq!(millis(Duration::from_micros(1_234)), 1.23);
    }
}
