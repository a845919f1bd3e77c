use std::fs::File;
use std::io::BufReader;

use msgports::wire::{WireConfig, WireReader};
use tracing::debug;

use crate::cmd::DecodeArgs;
use crate::exit::{io_error, wire_error, CliResult, SUCCESS};
use crate::output::{print_events, Event, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let file = File::open(&args.path).map_err(|err| io_error("open capture", err))?;

    let mut config = WireConfig::default();
    if let Some(max) = args.max_payload {
        config.max_payload_size = max;
    }

    let mut reader = WireReader::with_config(BufReader::new(file), config);
    let messages = reader
        .read_all()
        .map_err(|err| wire_error("decode capture", err))?;
    debug!(path = %args.path.display(), messages = messages.len(), "decoded capture");

    let events: Vec<Event> = messages
        .iter()
        .enumerate()
        .map(|(index, message)| Event::delivered(index + 1, message))
        .collect();
    print_events(&events, format);

    Ok(SUCCESS)
}
