use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use devwire_frame::{
    device_error, is_complete, ChannelConfig, ChannelError, Dictionary, MessageChannel,
    ReadStrategy, Value,
};
use devwire_transport::DeviceRef;
use tracing::{debug, info};

use crate::cmd::{Context, WatchArgs};
use crate::exit::{channel_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_value, Origin};

pub fn run(args: WatchArgs, ctx: &Context) -> CliResult<i32> {
    let device = DeviceRef::new(args.device.as_str());
    let config = ChannelConfig::default()
        .with_format(args.plist_format.into())
        .with_read_strategy(ReadStrategy::Streaming);

    let mut channel = MessageChannel::open(&ctx.provider(), &device, &args.service, config)
        .map_err(|err| channel_error("connect failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    let handle = channel
        .close_handle()
        .map_err(|err| channel_error("connect failed", err))?;
    {
        let running = running.clone();
        install_ctrlc_handler(move || {
            running.store(false, Ordering::SeqCst);
            let _ = handle.close();
        })?;
    }

    if !args.fields.is_empty() {
        let request: Dictionary = args
            .fields
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        channel
            .send(&Value::Dictionary(request))
            .map_err(|err| channel_error("send failed", err))?;
    }

    let origin = Origin {
        device: &args.device,
        service: &args.service,
    };
    let mut printed = 0usize;

    loop {
        let message = match channel.receive() {
            Ok(message) => message,
            Err(_) if !running.load(Ordering::SeqCst) => {
                info!(printed, "interrupted");
                return Ok(SUCCESS);
            }
            Err(ChannelError::ConnectionClosed) => {
                info!(printed, "service closed the stream");
                return Ok(SUCCESS);
            }
            Err(err) => return Err(channel_error("receive failed", err)),
        };

        print_value(&message, Some(origin), ctx.format);
        printed += 1;

        if let Some(err) = message.as_dictionary().and_then(device_error) {
            return Err(channel_error("operation failed", err));
        }
        if is_complete(&message) {
            debug!(printed, "operation complete");
            return Ok(SUCCESS);
        }
        if args.count.is_some_and(|limit| printed >= limit) {
            return Ok(SUCCESS);
        }
    }
}

fn install_ctrlc_handler<F>(on_interrupt: F) -> CliResult<()>
where
    F: FnMut() + Send + 'static,
{
    ctrlc::set_handler(on_interrupt).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })
}
