use ticprims_core::Identifier;
use ticprims_transport::PortFinder;

use crate::cmd::ListArgs;
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_modems, OutputFormat};

pub fn run(args: ListArgs, format: OutputFormat) -> CliResult<i32> {
    let modems = args
        .discovery
        .finder()
        .find_all()
        .map_err(|err| transport_error("port enumeration failed", err))?;

    let modems = modems
        .into_iter()
        .filter(|m| Identifier::from_descriptor(m).is_ok())
        .collect::<Vec<_>>();
    tracing::debug!(count = modems.len(), "modems found");

    print_modems(&modems, format);
    Ok(SUCCESS)
}
