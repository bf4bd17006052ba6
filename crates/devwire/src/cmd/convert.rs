use std::io::Write;

use devwire_plist::{decode, encode, Format};
use tracing::debug;

use crate::cmd::{read_file, ConvertArgs};
use crate::exit::{io_error, plist_error, CliResult, SUCCESS};
use crate::output::{print_value, OutputFormat};

pub fn run(args: ConvertArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = read_file(&args.input)?;
    let source = Format::sniff(&bytes);
    debug!(input = %args.input.display(), format = %source, len = bytes.len(), "decoding");

    let value = decode(&bytes, source).map_err(|err| {
        plist_error(&format!("failed decoding {}", args.input.display()), err)
    })?;

    let Some(target) = args.to else {
        print_value(&value, None, format);
        return Ok(SUCCESS);
    };

    let encoded =
        encode(&value, target.into()).map_err(|err| plist_error("failed encoding", err))?;
    match &args.output {
        Some(path) => std::fs::write(path, &encoded)
            .map_err(|err| io_error(&format!("failed writing {}", path.display()), err))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&encoded)
                .and_then(|()| stdout.flush())
                .map_err(|err| io_error("failed writing stdout", err))?;
        }
    }
    Ok(SUCCESS)
}
