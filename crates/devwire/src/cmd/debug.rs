use devwire_debug::{DebugConfig, DebugSession, SessionState, Termination, KILLED_EXIT_CODE};
use devwire_transport::DeviceRef;
use tracing::info;

use crate::cmd::{Context, DebugArgs};
use crate::exit::{debug_error, CliResult, SUCCESS};

pub fn run(args: DebugArgs, ctx: &Context) -> CliResult<i32> {
    let device = DeviceRef::new(args.device.as_str());
    let config = DebugConfig {
        launch_only: args.launch_only,
        strict_checksums: args.strict_checksums,
        ..DebugConfig::default()
    };

    let mut session = DebugSession::open(&ctx.provider(), &device, &args.service, config)
        .map_err(|err| debug_error("connect failed", err))?;
    session
        .launch(&args.args)
        .map_err(|err| debug_error("launch failed", err))?;

    if session.state() == SessionState::Terminated {
        info!(program = ?args.args.first(), "launched and detached");
        return Ok(SUCCESS);
    }

    let mut stdout = std::io::stdout().lock();
    let termination = session
        .run_until_terminated(&mut stdout)
        .map_err(|err| debug_error("debug session failed", err))?;
    info!(?termination, "debug session ended");

    Ok(match termination {
        // The kill action exits the process before this is reached.
        Termination::Killed => KILLED_EXIT_CODE,
        Termination::Detached | Termination::Disconnected => SUCCESS,
    })
}
