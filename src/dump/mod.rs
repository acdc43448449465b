pub(crate) mod args;
pub(crate) mod metadata;
pub(crate) mod options;

pub use args::build_dump_args;
use args::redacted;
pub use metadata::ConsistencyPoint;
pub use options::{Connection, DumpConfig, LockStrategy};

use std::path::Path;
use tracing::{debug, info};

use crate::errors::Result;
use crate::runner::{ProcessRunner, ToolOutput, tool_name};

/// Runs the dump tool with a prebuilt argument vector.
///
/// Fails with `ExternalToolFailed` on a non-zero exit.
pub async fn execute_dump(
    config: &DumpConfig,
    args: &[String],
    runner: &dyn ProcessRunner,
) -> Result<ToolOutput> {
    let tool = tool_name(config.executable());
    info!(tool = %tool, output_dir = config.output_dir(), "Starting dump");
    debug!(args = %redacted(args), "Dump invocation");

    let output = runner.run(config.executable(), args).await?.into_success(&tool)?;
    debug!(tool = %tool, stdout = %String::from_utf8_lossy(&output.stdout).trim_end(), "Dump tool output");
    info!(tool = %tool, "Dump finished");
    Ok(output)
}

/// Reads the consistency point the dump tool left in its output directory.
pub fn read_consistency_point(config: &DumpConfig) -> Result<ConsistencyPoint> {
    ConsistencyPoint::read_from_dir(Path::new(config.output_dir()))
}
