use kfplink_frame::encode;

use crate::cmd::EncodeArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_encoded, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let frame = args.frame.to_frame()?;
    let encoded = encode(&frame);
    print_encoded(&frame, encoded.as_bytes(), format);
    Ok(SUCCESS)
}
