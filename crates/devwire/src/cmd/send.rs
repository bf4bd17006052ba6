use std::time::Duration;

use devwire_frame::{ChannelConfig, Dictionary, MessageChannel, Value};
use devwire_transport::DeviceRef;
use tracing::info;

use crate::cmd::{Context, SendArgs};
use crate::exit::{channel_error, transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_value, Origin};

pub fn run(args: SendArgs, ctx: &Context) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let device = DeviceRef::new(args.device.as_str());
    let config = ChannelConfig::default().with_format(args.plist_format.into());

    let mut channel = MessageChannel::open(&ctx.provider(), &device, &args.service, config)
        .map_err(|err| channel_error("connect failed", err))?;

    let message = build_message(&args.fields);
    channel
        .send(&message)
        .map_err(|err| channel_error("send failed", err))?;
    info!(%device, service = %args.service, fields = args.fields.len(), "message sent");

    if args.wait {
        channel
            .get_ref()
            .set_read_timeout(Some(wait_timeout))
            .map_err(|err| transport_error("failed setting read timeout", err))?;
        let reply = channel
            .receive()
            .map_err(|err| channel_error("receive failed", err))?;
        let origin = Origin {
            device: &args.device,
            service: &args.service,
        };
        print_value(&reply, Some(origin), ctx.format);
    }

    Ok(SUCCESS)
}

/// `KEY=VALUE` pairs become a dictionary of text values, in order.
fn build_message(fields: &[(String, String)]) -> Value {
    let dict: Dictionary = fields
        .iter()
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect();
    Value::Dictionary(dict)
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}
