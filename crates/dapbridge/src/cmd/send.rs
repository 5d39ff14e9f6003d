use std::fs;
use std::time::Instant;

use dapbridge_frame::MAX_PAYLOAD;

use crate::cmd::client::ProbeClient;
use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{io_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{parse_hex, print_exchange, Exchange, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let request = resolve_payload(&args)?;

    let mut client = ProbeClient::connect(&args.addr, timeout)?;
    let start = Instant::now();
    let response = client.exchange(&request)?;
    let elapsed = start.elapsed();

    print_exchange(
        &Exchange {
            peer: client.peer(),
            request: &request,
            response: &response,
            elapsed,
        },
        format,
    );
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    let payload = match (&args.data, &args.file) {
        (Some(data), _) => {
            parse_hex(data).map_err(|err| CliError::new(USAGE, format!("--data: {err}")))?
        }
        (None, Some(path)) => fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?,
        (None, None) => Vec::new(),
    };
    check_size(payload)
}

fn check_size(payload: Vec<u8>) -> CliResult<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD {
        return Err(CliError::new(
            USAGE,
            format!(
                "request is {} bytes, a frame carries at most {MAX_PAYLOAD}",
                payload.len()
            ),
        ));
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(data: Option<&str>, file: Option<std::path::PathBuf>) -> SendArgs {
        SendArgs {
            addr: "127.0.0.1:4441".to_string(),
            data: data.map(str::to_string),
            file,
            timeout: "1s".to_string(),
        }
    }

    #[test]
    fn hex_payload_is_decoded() {
        assert_eq!(
            resolve_payload(&args(Some("00 fe"), None)).unwrap(),
            vec![0x00, 0xFE]
        );
    }

    #[test]
    fn bad_hex_is_a_usage_error() {
        let err = resolve_payload(&args(Some("0g"), None)).unwrap_err();
        assert_eq!(err.code, USAGE);
        assert!(err.message.starts_with("--data: "));
    }

    #[test]
    fn file_payload_is_read_verbatim() {
        let path = std::env::temp_dir().join(format!("dapbridge-send-{}.bin", std::process::id()));
        fs::write(&path, [0x00, 0xFF, 0x7E]).unwrap();
        let payload = resolve_payload(&args(None, Some(path.clone()))).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(payload, vec![0x00, 0xFF, 0x7E]);
    }

    #[test]
    fn oversized_payload_is_refused_before_connecting() {
        let err = check_size(vec![0u8; MAX_PAYLOAD + 1]).unwrap_err();
        assert_eq!(err.code, USAGE);
        assert!(check_size(vec![0u8; MAX_PAYLOAD]).is_ok());
    }
}
