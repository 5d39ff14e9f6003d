use std::time::Instant;

use dapbridge_server::processor::{DAP_ID_PACKET_COUNT, DAP_ID_PACKET_SIZE, ID_DAP_INFO};
use serde::Serialize;

use crate::cmd::client::ProbeClient;
use crate::cmd::{parse_duration, InfoArgs};
use crate::exit::{CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{millis, print_json, OutputFormat};

#[derive(Serialize)]
struct InfoOutput {
    peer: String,
    packet_size: Option<u16>,
    packet_count: Option<u8>,
    round_trip_ms: f64,
    connected: bool,
}

pub fn run(args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let mut client = ProbeClient::connect(&args.addr, timeout)?;

    let start = Instant::now();
    let size = query(&mut client, DAP_ID_PACKET_SIZE)?;
    let round_trip = start.elapsed();
    let count = query(&mut client, DAP_ID_PACKET_COUNT)?;

    let out = InfoOutput {
        peer: client.peer().to_string(),
        packet_size: size
            .as_deref()
            .and_then(|data| data.get(..2))
            .map(|b| u16::from_le_bytes([b[0], b[1]])),
        packet_count: count.as_deref().and_then(|data| data.first().copied()),
        round_trip_ms: millis(round_trip),
        connected: true,
    };

    print_info(&out, format);
    Ok(SUCCESS)
}

/// Issue one DAP_Info request. `None` means the probe does not know the ID.
fn query(client: &mut ProbeClient, id: u8) -> CliResult<Option<Vec<u8>>> {
    let response = client.exchange(&[ID_DAP_INFO, id])?;
    parse_info_response(&response)
}

fn parse_info_response(response: &[u8]) -> CliResult<Option<Vec<u8>>> {
    match response {
        [ID_DAP_INFO, 0, ..] => Ok(None),
        [ID_DAP_INFO, len, data @ ..] if data.len() >= usize::from(*len) => {
            Ok(Some(data[..usize::from(*len)].to_vec()))
        }
        [ID_DAP_INFO, len, data @ ..] => Err(CliError::new(
            DATA_INVALID,
            format!("DAP_Info claims {len} bytes but carries {}", data.len()),
        )),
        [other, ..] => Err(CliError::new(
            DATA_INVALID,
            format!("probe answered DAP_Info with command {other:#04x}"),
        )),
        [] => Err(CliError::new(DATA_INVALID, "empty DAP_Info response")),
    }
}

fn print_info(out: &InfoOutput, format: OutputFormat) {
    let size = out
        .packet_size
        .map_or_else(|| "unknown".to_string(), |v| v.to_string());
    let count = out
        .packet_count
        .map_or_else(|| "unknown".to_string(), |v| v.to_string());

    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("Probe Info:");
            println!("  Peer:          {}", out.peer);
            println!("  Packet size:   {size}");
            println!("  Packet count:  {count}");
            println!("  Round trip:    {:.2}ms", out.round_trip_ms);
        }
        OutputFormat::Raw => println!("{size} {count}"),
    }
}
