pub mod activation;
pub mod assembler;
pub mod channel;
pub mod engine;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod interpolation;
pub mod lease;
pub mod model;
pub mod profiles;
pub mod properties;
pub mod result;
pub mod session;
pub mod token;

pub use assembler::{InheritancePolicy, ModelAssembler};
pub use channel::{ArtifactEvent, ChannelRegistry, ConsoleEvent, ConsoleLevel, EventChannel};
pub use engine::{
    ArtifactRequest, EngineContext, EngineError, EngineFactory, EngineFailure, EngineSettings,
    ProjectOutcome, ResolutionEngine, ResolvedArtifact, ResolvedProject, SessionSettings,
};
pub use error::{GatewayError, GatewayResult};
pub use executor::{TaskExecutor, WorkError, WorkResult};
pub use gateway::{Gateway, GatewayConfig, Watchdog};
pub use model::Model;
pub use profiles::{ExplicitProfiles, ProfileApplication, ProfileResolver};
pub use result::{ExecutionRequest, ExecutionResult, GoalExecutionResult, LongRunningTaskStatus};
pub use token::{Token, TokenGuard};
