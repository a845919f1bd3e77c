use msgports::wire::WIRE_VERSION;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("msgports {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: msgports");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("wire_version: {WIRE_VERSION}");
    println!(
        "target: {}",
        option_env!("MSGPORTS_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("features: wire={}, cli=true", cfg!(feature = "wire"));

    Ok(SUCCESS)
}
