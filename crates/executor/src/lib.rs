pub mod guard;
pub mod invoker;
pub mod limits;
pub mod scratch;

pub use guard::{ExecutorError, ProgramGuard};
pub use invoker::{ExecutorConfig, ProcessInvoker, DEFAULT_MAX_OUTPUT_BYTES};
pub use limits::ResourceLimits;
pub use scratch::ScratchFile;
