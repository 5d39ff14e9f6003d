use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("dapbridge {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: dapbridge");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target: {}", option_env!("DAPBRIDGE_BUILD_TARGET").unwrap_or("unknown"));
    println!("profile: {}", option_env!("DAPBRIDGE_BUILD_PROFILE").unwrap_or("unknown"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("features: server={}, cli=true", cfg!(feature = "server"));
    println!(
        "wire: signature={:#010x} max_payload={}",
        dapbridge_frame::SIGNATURE,
        dapbridge_frame::MAX_PAYLOAD
    );

    Ok(SUCCESS)
}
