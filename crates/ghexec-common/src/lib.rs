// ghexec-common: Shared services for ghexec.
// Holds the host context, constants, workflow
// command parsing and the job logger.

pub mod action_command;
pub mod constants;
pub mod host_context;
pub mod logging;

pub use action_command::ActionCommand;
pub use constants::{WellKnownDirectory, WellKnownFile};
pub use host_context::HostContext;
pub use logging::{Annotation, JobLogger};
