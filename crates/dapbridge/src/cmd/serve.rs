use std::fs::{File, OpenOptions};
use std::net::SocketAddr;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dapbridge_server::{
    CommandProcessor, ConsoleBridge, DapInfoStub, DapServer, EchoProcessor, ServerConfig,
};
use dapbridge_transport::KeepaliveConfig;

use crate::cmd::{parse_duration, ProcessorKind, ServeArgs};
use crate::exit::{io_error, server_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_listening, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let idle = parse_duration(&args.idle_sleep)?;
    let keepalive = keepalive_from_args(&args);
    let config = ServerConfig::default()
        .with_bind(SocketAddr::new(args.bind, args.port))
        .with_keepalive(keepalive)
        .with_max_protocol_errors(args.max_protocol_errors);

    let mut server = DapServer::start(config, build_processor(args.processor))
        .map_err(|err| server_error("failed to start server", err))?;

    let mut console = match &args.console_device {
        Some(path) => {
            let device = open_console_device(path)?;
            let bind = SocketAddr::new(args.bind, args.console_port);
            Some(
                ConsoleBridge::start(bind, keepalive, device)
                    .map_err(|err| server_error("failed to start console bridge", err))?,
            )
        }
        None => None,
    };

    print_listening(
        server.local_addr(),
        console.as_ref().map(ConsoleBridge::local_addr),
        processor_name(args.processor),
        format,
    );

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    match console.as_mut() {
        None => server.run_until(&running, idle),
        Some(console) => {
            while running.load(Ordering::SeqCst) {
                let dap = server.tick();
                let relay = console.tick();
                if dap.is_idle() && relay.is_idle() {
                    std::thread::sleep(idle);
                }
            }
            tracing::info!(exchanges = server.total_exchanges(), "shutting down");
        }
    }

    Ok(SUCCESS)
}

fn build_processor(kind: ProcessorKind) -> Box<dyn CommandProcessor> {
    match kind {
        ProcessorKind::Echo => Box::new(EchoProcessor),
        ProcessorKind::DapStub => Box::new(DapInfoStub::default()),
    }
}

fn processor_name(kind: ProcessorKind) -> &'static str {
    match kind {
        ProcessorKind::Echo => "echo",
        ProcessorKind::DapStub => "dap-stub",
    }
}

fn keepalive_from_args(args: &ServeArgs) -> Option<KeepaliveConfig> {
    if args.no_keepalive {
        return None;
    }
    Some(KeepaliveConfig {
        idle: Duration::from_secs(args.keepalive_idle),
        interval: Duration::from_secs(args.keepalive_interval),
        retries: args.keepalive_count,
    })
}

// Opened O_NONBLOCK and O_NOCTTY: reads must never stall the DAP port.
fn open_console_device(path: &Path) -> CliResult<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
        .open(path)
        .map_err(|err| io_error(&format!("failed to open {}", path.display()), err))
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("failed to install signal handler: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: ServeArgs,
    }

    fn parse(argv: &[&str]) -> ServeArgs {
        let mut full = vec!["serve"];
        full.extend_from_slice(argv);
        Harness::try_parse_from(full).unwrap().args
    }

    #[test]
    fn keepalive_defaults_follow_flags() {
        let args = parse(&["--keepalive-idle", "3", "--keepalive-count", "2"]);
        let keepalive = keepalive_from_args(&args).unwrap();
        assert_eq!(keepalive.idle, Duration::from_secs(3));
        assert_eq!(keepalive.interval, Duration::from_secs(1));
        assert_eq!(keepalive.retries, 2);
    }

    #[test]
    fn keepalive_can_be_disabled() {
        let args = parse(&["--no-keepalive"]);
        assert!(keepalive_from_args(&args).is_none());
    }

    #[test]
    fn stub_processor_answers_packet_size() {
        let mut processor = build_processor(ProcessorKind::DapStub);
        let mut response = [0u8; 8];
        let processed = processor.process(&[0x00, 0xFF], &mut response);
        assert_eq!(processed.response_len, 4);
        assert_eq!(&response[..4], &[0x00, 0x02, 0x00, 0x04]);
        assert_eq!(processor_name(ProcessorKind::DapStub), "dap-stub");
    }

    #[test]
    fn missing_console_device_is_reported() {
        let err = open_console_device(Path::new("/nonexistent/dapbridge-tty")).unwrap_err();
        assert!(err.message.contains("/nonexistent/dapbridge-tty"));
    }
}
