use tonic_build::manual::{Builder, Method, Service};

const CODEC: &str = "tonic::codec::ProstCodec";
const MESSAGES: &str = "crate::bdw::v1";

// (method name, route name, request type, response type)
const METHODS: &[(&str, &str, &str, &str)] = &[
    ("ping", "Ping", "PingRequest", "PingResponse"),
    ("create_session", "CreateSession", "CreateSessionRequest", "CreateSessionResponse"),
    (
        "create_index_session",
        "CreateIndexSession",
        "CreateIndexSessionRequest",
        "CreateSessionResponse",
    ),
    ("ping_session", "PingSession", "SessionRequest", "PingResponse"),
    ("release", "Release", "SessionRequest", "ReleaseResponse"),
    (
        "interpolate_and_align_model",
        "InterpolateAndAlignModel",
        "InterpolateRequest",
        "ModelResponse",
    ),
    ("assemble_inheritance", "AssembleInheritance", "InheritanceRequest", "ModelResponse"),
    ("apply_profiles", "ApplyProfiles", "ApplyProfilesRequest", "ApplyProfilesResponse"),
    ("open_command", "OpenCommand", "OpenCommandRequest", "CommandRef"),
    ("close_command", "CloseCommand", "CommandRequest", "CloseCommandResponse"),
    ("cancel_command", "CancelCommand", "CommandRequest", "CancelCommandResponse"),
    (
        "pull_download_events",
        "PullDownloadEvents",
        "CommandRequest",
        "PullDownloadEventsResponse",
    ),
    (
        "pull_console_events",
        "PullConsoleEvents",
        "CommandRequest",
        "PullConsoleEventsResponse",
    ),
    ("resolve_projects", "ResolveProjects", "ResolveProjectsRequest", "ResolveProjectsResponse"),
    (
        "resolve_artifacts",
        "ResolveArtifacts",
        "ResolveArtifactsRequest",
        "ResolveArtifactsResponse",
    ),
    ("execute_goal", "ExecuteGoal", "ExecuteGoalRequest", "ExecuteGoalResponse"),
    (
        "resolve_artifacts_transitively",
        "ResolveArtifactsTransitively",
        "ResolveArtifactsTransitivelyRequest",
        "ResolveArtifactsResponse",
    ),
    ("acquire_lease", "AcquireLease", "LeaseRequest", "LeaseResponse"),
    ("release_lease", "ReleaseLease", "LeaseRequest", "LeaseResponse"),
    (
        "get_long_running_task_status",
        "GetLongRunningTaskStatus",
        "LongRunningTaskRequest",
        "LongRunningTaskStatusResponse",
    ),
    (
        "cancel_long_running_task",
        "CancelLongRunningTask",
        "LongRunningTaskRequest",
        "CancelLongRunningTaskResponse",
    ),
];

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let mut service = Service::builder()
        .name("BuildWorker")
        .package("bdw.v1")
        .comment("Token-guarded gateway into a build description worker.");

    for (name, route, input, output) in METHODS {
        service = service.method(
            Method::builder()
                .name(*name)
                .route_name(*route)
                .input_type(format!("{MESSAGES}::{input}"))
                .output_type(format!("{MESSAGES}::{output}"))
                .codec_path(CODEC)
                .build(),
        );
    }

    Builder::new()
        .build_server(true)
        .build_client(true)
        .compile(&[service.build()]);
}
