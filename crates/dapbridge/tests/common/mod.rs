#![allow(dead_code)]

use std::io::{BufRead, BufReader};
use std::net::SocketAddr;
use std::process::{Child, Command, Stdio};

/// A `dapbridge serve` child bound to an ephemeral loopback port.
pub struct ServeProcess {
    child: Child,
    pub addr: SocketAddr,
}

impl ServeProcess {
    pub fn spawn(extra: &[&str]) -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_dapbridge"))
            .args(["--log-level", "error", "--format", "json", "serve"])
            .args(["--bind", "127.0.0.1", "--port", "0"])
            .args(extra)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("serve should start");

        let stdout = child.stdout.take().expect("stdout should be piped");
        let mut line = String::new();
        BufReader::new(stdout)
            .read_line(&mut line)
            .expect("serve should announce its address");
        let event: serde_json::Value =
            serde_json::from_str(&line).expect("listening event should be json");
        assert_eq!(event["event"], "listening");
        let addr = event["addr"]
            .as_str()
            .expect("listening event should carry addr")
            .parse()
            .expect("addr should parse");

        Self { child, addr }
    }
}

impl Drop for ServeProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn frame(packet_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(&0x0050_4144u32.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.push(packet_type);
    out.push(0);
    out.extend_from_slice(payload);
    out
}

pub fn request(payload: &[u8]) -> Vec<u8> {
    frame(1, payload)
}
