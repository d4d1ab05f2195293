pub mod argv;
pub mod dispatcher;
pub mod error;
pub mod execution_context;
pub mod metrics;
pub mod normalize;
pub mod registry;
pub mod remote;
pub mod schema;
pub mod traits;
pub mod types;

pub use argv::ArgvBuilder;
pub use dispatcher::{CallStage, DispatchEngine, DEFAULT_TIMEOUT};
pub use error::{BridgeError, CompletedStep, FaultKind, RegistryError, RemoteFault, ValidationRule};
pub use execution_context::ExecutionContext;
pub use metrics::{Metrics, MetricsSnapshot};
pub use normalize::{Conversion, FieldRule, OutputFormat, OutputSpec, Shape};
pub use registry::{RegisteredTool, ToolPlan, ToolRegistry, Translator};
pub use remote::RemoteInvoker;
pub use schema::{validate, whole_i64, ValidatedArgs};
pub use traits::{ProcessOutput, RemoteClient, SubprocessInvoker};
pub use types::*;
