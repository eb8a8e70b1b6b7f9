pub mod bdw {
    pub mod v1 {
        use std::collections::BTreeMap;

        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum ConsoleLevel {
            Unspecified = 0,
            Debug = 1,
            Info = 2,
            Warn = 3,
            Error = 4,
            Fatal = 5,
            Disabled = 6,
        }

        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum ResolveKind {
            Unspecified = 0,
            Dependency = 1,
            Plugin = 2,
        }

        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum ArtifactEventKind {
            Unspecified = 0,
            DownloadStarted = 1,
            DownloadCompleted = 2,
            DownloadFailed = 3,
        }

        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum ProblemKind {
            Unspecified = 0,
            Structure = 1,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct PingRequest {
            #[prost(string, tag = "1")]
            pub token: String,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct PingResponse {
            #[prost(bool, tag = "1")]
            pub alive: bool,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct EngineSettings {
            #[prost(bool, tag = "1")]
            pub offline: bool,
            #[prost(enumeration = "ConsoleLevel", tag = "2")]
            pub logging_threshold: i32,
            #[prost(string, tag = "3")]
            pub engine_home: String,
            #[prost(string, tag = "4")]
            pub user_settings_path: String,
            #[prost(string, tag = "5")]
            pub global_settings_path: String,
            #[prost(string, tag = "6")]
            pub local_repository_path: String,
            #[prost(string, repeated, tag = "7")]
            pub extra_cli_args: Vec<String>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct CreateSessionRequest {
            #[prost(string, tag = "1")]
            pub token: String,
            #[prost(message, optional, tag = "2")]
            pub settings: Option<EngineSettings>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct CreateIndexSessionRequest {
            #[prost(string, tag = "1")]
            pub token: String,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct CreateSessionResponse {
            #[prost(string, tag = "1")]
            pub session_id: String,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct SessionRequest {
            #[prost(string, tag = "1")]
            pub token: String,
            #[prost(string, tag = "2")]
            pub session_id: String,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ReleaseResponse {
            #[prost(bool, tag = "1")]
            pub released: bool,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct InterpolateRequest {
            #[prost(string, tag = "1")]
            pub token: String,
            #[prost(string, tag = "2")]
            pub model_json: String,
            #[prost(string, tag = "3")]
            pub base_dir: String,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct InheritanceRequest {
            #[prost(string, tag = "1")]
            pub token: String,
            #[prost(string, tag = "2")]
            pub model_json: String,
            #[prost(string, tag = "3")]
            pub parent_json: String,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ModelResponse {
            #[prost(string, tag = "1")]
            pub model_json: String,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ApplyProfilesRequest {
            #[prost(string, tag = "1")]
            pub token: String,
            #[prost(string, tag = "2")]
            pub model_json: String,
            #[prost(string, tag = "3")]
            pub base_dir: String,
            #[prost(string, repeated, tag = "4")]
            pub enabled_profiles: Vec<String>,
            #[prost(string, repeated, tag = "5")]
            pub disabled_profiles: Vec<String>,
            #[prost(string, repeated, tag = "6")]
            pub always_on_profiles: Vec<String>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ApplyProfilesResponse {
            #[prost(string, tag = "1")]
            pub model_json: String,
            #[prost(string, repeated, tag = "2")]
            pub activated_profiles: Vec<String>,
            #[prost(string, repeated, tag = "3")]
            pub deactivated_profiles: Vec<String>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct OpenCommandRequest {
            #[prost(string, tag = "1")]
            pub token: String,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct CommandRef {
            #[prost(string, tag = "1")]
            pub command_id: String,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct CommandRequest {
            #[prost(string, tag = "1")]
            pub token: String,
            #[prost(string, tag = "2")]
            pub command_id: String,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct CloseCommandResponse {
            #[prost(bool, tag = "1")]
            pub closed: bool,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct CancelCommandResponse {
            #[prost(bool, tag = "1")]
            pub accepted: bool,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ArtifactEvent {
            #[prost(enumeration = "ResolveKind", tag = "1")]
            pub resolve_kind: i32,
            #[prost(enumeration = "ArtifactEventKind", tag = "2")]
            pub kind: i32,
            #[prost(string, tag = "3")]
            pub dependency_id: String,
            #[prost(string, optional, tag = "4")]
            pub error_message: Option<String>,
            #[prost(string, optional, tag = "5")]
            pub error_detail: Option<String>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct DownloadEventBatch {
            #[prost(message, repeated, tag = "1")]
            pub events: Vec<ArtifactEvent>,
        }

        /// An absent batch means nothing was queued; it is never sent empty.
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct PullDownloadEventsResponse {
            #[prost(message, optional, tag = "1")]
            pub batch: Option<DownloadEventBatch>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ConsoleEvent {
            #[prost(enumeration = "ConsoleLevel", tag = "1")]
            pub level: i32,
            #[prost(string, tag = "2")]
            pub message: String,
            #[prost(string, optional, tag = "3")]
            pub error_detail: Option<String>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ConsoleEventBatch {
            #[prost(message, repeated, tag = "1")]
            pub events: Vec<ConsoleEvent>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct PullConsoleEventsResponse {
            #[prost(message, optional, tag = "1")]
            pub batch: Option<ConsoleEventBatch>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ResolveProjectsRequest {
            #[prost(string, tag = "1")]
            pub token: String,
            #[prost(string, tag = "2")]
            pub session_id: String,
            #[prost(string, tag = "3")]
            pub command_id: String,
            #[prost(string, repeated, tag = "4")]
            pub files: Vec<String>,
            #[prost(string, repeated, tag = "5")]
            pub active_profiles: Vec<String>,
            #[prost(string, repeated, tag = "6")]
            pub inactive_profiles: Vec<String>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ProjectProblem {
            #[prost(enumeration = "ProblemKind", tag = "1")]
            pub kind: i32,
            #[prost(string, tag = "2")]
            pub path: String,
            #[prost(string, tag = "3")]
            pub message: String,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ArtifactId {
            #[prost(string, tag = "1")]
            pub group_id: String,
            #[prost(string, tag = "2")]
            pub artifact_id: String,
            #[prost(string, tag = "3")]
            pub version: String,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ProjectData {
            #[prost(string, tag = "1")]
            pub model_json: String,
            #[prost(btree_map = "string, string", tag = "2")]
            pub raw_model: BTreeMap<String, String>,
            #[prost(string, tag = "3")]
            pub handle: String,
            #[prost(string, repeated, tag = "4")]
            pub activated_profiles: Vec<String>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ExecutionResult {
            #[prost(string, tag = "1")]
            pub file: String,
            #[prost(message, optional, tag = "2")]
            pub project: Option<ProjectData>,
            #[prost(message, repeated, tag = "3")]
            pub problems: Vec<ProjectProblem>,
            #[prost(message, repeated, tag = "4")]
            pub unresolved_artifacts: Vec<ArtifactId>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ResolveProjectsResponse {
            #[prost(message, repeated, tag = "1")]
            pub results: Vec<ExecutionResult>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ExecuteGoalRequest {
            #[prost(string, tag = "1")]
            pub token: String,
            #[prost(string, tag = "2")]
            pub session_id: String,
            #[prost(string, tag = "3")]
            pub command_id: String,
            #[prost(string, repeated, tag = "4")]
            pub files: Vec<String>,
            #[prost(string, repeated, tag = "5")]
            pub active_profiles: Vec<String>,
            #[prost(string, repeated, tag = "6")]
            pub inactive_profiles: Vec<String>,
            #[prost(string, tag = "7")]
            pub goal: String,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct GoalExecutionResult {
            #[prost(string, tag = "1")]
            pub file: String,
            #[prost(bool, tag = "2")]
            pub success: bool,
            #[prost(message, repeated, tag = "3")]
            pub problems: Vec<ProjectProblem>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ExecuteGoalResponse {
            #[prost(message, repeated, tag = "1")]
            pub results: Vec<GoalExecutionResult>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct RemoteRepository {
            #[prost(string, tag = "1")]
            pub id: String,
            #[prost(string, tag = "2")]
            pub url: String,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ArtifactCoordinates {
            #[prost(string, tag = "1")]
            pub group_id: String,
            #[prost(string, tag = "2")]
            pub artifact_id: String,
            #[prost(string, tag = "3")]
            pub version: String,
            #[prost(string, tag = "4")]
            pub packaging: String,
            #[prost(string, tag = "5")]
            pub classifier: String,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ArtifactResolutionRequest {
            #[prost(message, optional, tag = "1")]
            pub artifact: Option<ArtifactCoordinates>,
            #[prost(message, repeated, tag = "2")]
            pub remote_repositories: Vec<RemoteRepository>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ResolveArtifactsRequest {
            #[prost(string, tag = "1")]
            pub token: String,
            #[prost(string, tag = "2")]
            pub session_id: String,
            #[prost(string, tag = "3")]
            pub command_id: String,
            #[prost(message, repeated, tag = "4")]
            pub requests: Vec<ArtifactResolutionRequest>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ResolveArtifactsTransitivelyRequest {
            #[prost(string, tag = "1")]
            pub token: String,
            #[prost(string, tag = "2")]
            pub session_id: String,
            #[prost(string, tag = "3")]
            pub command_id: String,
            #[prost(message, repeated, tag = "4")]
            pub artifacts: Vec<ArtifactCoordinates>,
            #[prost(message, repeated, tag = "5")]
            pub remote_repositories: Vec<RemoteRepository>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ResolvedArtifact {
            #[prost(message, optional, tag = "1")]
            pub artifact: Option<ArtifactCoordinates>,
            #[prost(string, tag = "2")]
            pub file: String,
            #[prost(bool, tag = "3")]
            pub resolved: bool,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ResolveArtifactsResponse {
            #[prost(message, repeated, tag = "1")]
            pub artifacts: Vec<ResolvedArtifact>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct LeaseRequest {
            #[prost(string, tag = "1")]
            pub token: String,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct LeaseResponse {
            #[prost(uint64, tag = "1")]
            pub holders: u64,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct LongRunningTaskRequest {
            #[prost(string, tag = "1")]
            pub token: String,
            #[prost(string, tag = "2")]
            pub task_id: String,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct LongRunningTaskStatusResponse {
            #[prost(double, tag = "1")]
            pub fraction: f64,
            #[prost(message, repeated, tag = "2")]
            pub console_events: Vec<ConsoleEvent>,
            #[prost(message, repeated, tag = "3")]
            pub download_events: Vec<ArtifactEvent>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct CancelLongRunningTaskResponse {
            #[prost(bool, tag = "1")]
            pub accepted: bool,
        }

        include!(concat!(env!("OUT_DIR"), "/bdw.v1.BuildWorker.rs"));
    }
}
