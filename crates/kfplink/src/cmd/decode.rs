use std::io::Read;

use kfplink_frame::{Decoder, Frame};

use crate::cmd::{parse_hex, DecodeArgs};
use crate::exit::{io_error, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_decoded, OutputFormat};

/// Exit with `DATA_INVALID` when the dump held no complete frame.
pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let input = match args.input {
        Some(input) => input,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|err| io_error("failed reading stdin", err))?;
            buf
        }
    };
    let bytes = parse_hex(&input)?;

    let mut decoder = Decoder::new();
    let frames: Vec<Frame> = bytes.iter().filter_map(|&b| decoder.feed(b)).collect();
    print_decoded(&frames, decoder.stats(), format);

    if frames.is_empty() {
        Ok(DATA_INVALID)
    } else {
        Ok(SUCCESS)
    }
}
