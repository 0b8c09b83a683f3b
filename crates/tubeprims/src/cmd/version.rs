use tubeprims_transport::{DEFAULT_SOCKET_BUFFER_SIZE, REVERSE_BUFFER_SIZE};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    println!("tubeprims {}", env!("CARGO_PKG_VERSION"));
    if !args.extended {
        return Ok(SUCCESS);
    }

    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("default_buffer_size: {DEFAULT_SOCKET_BUFFER_SIZE}");
    println!("reverse_buffer_size: {REVERSE_BUFFER_SIZE}");
    println!(
        "abstract_names: {}",
        cfg!(any(target_os = "linux", target_os = "android"))
    );

    Ok(SUCCESS)
}
