mod status;

use std::{
    fs,
    future::Future,
    path::{Path, PathBuf},
    time::Duration,
};

use bdw_core::{ConsoleLevel, Model};
use bdw_proto::bdw::v1::{
    self as pb, build_worker_client::BuildWorkerClient, ApplyProfilesRequest,
    ArtifactCoordinates, ArtifactEventKind, ArtifactResolutionRequest, CommandRequest,
    CreateSessionRequest, EngineSettings, ExecuteGoalRequest, ExecutionResult,
    GoalExecutionResult, InheritanceRequest, InterpolateRequest, LeaseRequest,
    LongRunningTaskRequest, OpenCommandRequest, PingRequest, RemoteRepository,
    ResolveArtifactsRequest, ResolveArtifactsResponse, ResolveArtifactsTransitivelyRequest,
    ResolveProjectsRequest, SessionRequest,
};
use bdw_util::{worker_addr, TOKEN_ENV};
use clap::{Args, Parser, Subcommand};
use tonic::{transport::Channel, Response, Status};

type Client = BuildWorkerClient<Channel>;

#[derive(Parser)]
#[command(name = "bdw-cli", version, about = "Host-side driver for the build description worker")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Args)]
struct Conn {
    #[arg(long, default_value_t = worker_addr())]
    addr: String,
    /// Worker token; defaults to BDW_TOKEN
    #[arg(long)]
    token: Option<String>,
}

impl Conn {
    fn token(&self) -> Result<String, Box<dyn std::error::Error>> {
        self.token
            .clone()
            .or_else(|| std::env::var(TOKEN_ENV).ok())
            .ok_or_else(|| format!("--token or {TOKEN_ENV} is required").into())
    }
}

#[derive(Args)]
struct SessionArgs {
    #[arg(long)]
    offline: bool,
    /// Console threshold: debug, info, warn, error, fatal or disabled
    #[arg(long, default_value = "info")]
    threshold: String,
    #[arg(long)]
    local_repository: Option<PathBuf>,
    /// Extra engine arguments such as -U or -Dname=value
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    engine_args: Vec<String>,
}

impl SessionArgs {
    fn settings(&self) -> EngineSettings {
        let level = ConsoleLevel::parse(&self.threshold).unwrap_or(ConsoleLevel::Info);
        EngineSettings {
            offline: self.offline,
            logging_threshold: wire_level(level) as i32,
            local_repository_path: self
                .local_repository
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            extra_cli_args: self.engine_args.clone(),
            ..EngineSettings::default()
        }
    }
}

#[derive(Subcommand)]
enum Cmd {
    /// Ask whether the worker still sees its host
    Ping {
        #[command(flatten)]
        conn: Conn,
    },
    /// Interpolate a description and make its paths absolute
    Interpolate {
        #[command(flatten)]
        conn: Conn,
        file: PathBuf,
        #[arg(long)]
        base_dir: Option<PathBuf>,
    },
    /// Merge a child description over its parent
    Inherit {
        #[command(flatten)]
        conn: Conn,
        child: PathBuf,
        parent: PathBuf,
    },
    /// Select and inject the profiles of a description
    ApplyProfiles {
        #[command(flatten)]
        conn: Conn,
        file: PathBuf,
        #[arg(long, value_delimiter = ',')]
        enable: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        disable: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        always_on: Vec<String>,
    },
    /// Resolve projects while polling console and download events
    Resolve {
        #[command(flatten)]
        conn: Conn,
        #[command(flatten)]
        session: SessionArgs,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long, value_delimiter = ',')]
        active: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        inactive: Vec<String>,
        #[arg(long, default_value_t = 100)]
        poll_ms: u64,
    },
    /// Resolve artifacts given as group:artifact[:packaging[:classifier]]:version
    ResolveArtifacts {
        #[command(flatten)]
        conn: Conn,
        #[command(flatten)]
        session: SessionArgs,
        #[arg(required = true)]
        coordinates: Vec<String>,
        /// Remote repository as id=url
        #[arg(long = "repo")]
        repositories: Vec<String>,
    },
    /// Run one goal (validate, resolve or clean) on each file
    Goal {
        #[command(flatten)]
        conn: Conn,
        #[command(flatten)]
        session: SessionArgs,
        goal: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long, value_delimiter = ',')]
        active: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        inactive: Vec<String>,
        #[arg(long, default_value_t = 100)]
        poll_ms: u64,
    },
    /// Resolve artifacts together with their runtime dependencies
    ResolveTransitive {
        #[command(flatten)]
        conn: Conn,
        #[command(flatten)]
        session: SessionArgs,
        #[arg(required = true)]
        coordinates: Vec<String>,
        /// Remote repository as id=url
        #[arg(long = "repo")]
        repositories: Vec<String>,
    },
    /// Cancel a running command by id
    Cancel {
        #[command(flatten)]
        conn: Conn,
        command_id: String,
    },
    /// Worker lease management
    Lease {
        #[command(subcommand)]
        cmd: LeaseCmd,
    },
    /// Status of a long-running task
    TaskStatus {
        #[command(flatten)]
        conn: Conn,
        task_id: String,
    },
}

#[derive(Subcommand)]
enum LeaseCmd {
    Acquire {
        #[command(flatten)]
        conn: Conn,
    },
    /// Releasing the last lease shuts the worker down
    Release {
        #[command(flatten)]
        conn: Conn,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.cmd {
        Cmd::Ping { conn } => {
            let token = conn.token()?;
            let mut client = Client::new(connect(&conn.addr).await?);
            let resp = client
                .ping(PingRequest { token })
                .await
                .map_err(failure)?
                .into_inner();
            println!("alive={}", resp.alive);
        }
        Cmd::Interpolate {
            conn,
            file,
            base_dir,
        } => {
            let token = conn.token()?;
            let base_dir = base_dir.unwrap_or_else(|| parent_dir(&file));
            let mut client = Client::new(connect(&conn.addr).await?);
            let resp = client
                .interpolate_and_align_model(InterpolateRequest {
                    token,
                    model_json: fs::read_to_string(&file)?,
                    base_dir: base_dir.display().to_string(),
                })
                .await
                .map_err(failure)?
                .into_inner();
            print_json(&resp.model_json)?;
        }
        Cmd::Inherit {
            conn,
            child,
            parent,
        } => {
            let token = conn.token()?;
            let mut client = Client::new(connect(&conn.addr).await?);
            let resp = client
                .assemble_inheritance(InheritanceRequest {
                    token,
                    model_json: fs::read_to_string(&child)?,
                    parent_json: fs::read_to_string(&parent)?,
                })
                .await
                .map_err(failure)?
                .into_inner();
            print_json(&resp.model_json)?;
        }
        Cmd::ApplyProfiles {
            conn,
            file,
            enable,
            disable,
            always_on,
        } => {
            let token = conn.token()?;
            let mut client = Client::new(connect(&conn.addr).await?);
            let resp = client
                .apply_profiles(ApplyProfilesRequest {
                    token,
                    model_json: fs::read_to_string(&file)?,
                    base_dir: parent_dir(&file).display().to_string(),
                    enabled_profiles: enable,
                    disabled_profiles: disable,
                    always_on_profiles: always_on,
                })
                .await
                .map_err(failure)?
                .into_inner();
            println!("activated={}", resp.activated_profiles.join(","));
            println!("deactivated={}", resp.deactivated_profiles.join(","));
            print_json(&resp.model_json)?;
        }
        Cmd::Resolve {
            conn,
            session,
            files,
            active,
            inactive,
            poll_ms,
        } => {
            let token = conn.token()?;
            let client = Client::new(connect(&conn.addr).await?);
            let files = canonical(&files)?;
            let call_token = token.clone();
            let results = run_command(
                client,
                &token,
                session.settings(),
                Duration::from_millis(poll_ms.max(1)),
                |mut client, session_id, command_id| async move {
                    client
                        .resolve_projects(ResolveProjectsRequest {
                            token: call_token,
                            session_id,
                            command_id,
                            files,
                            active_profiles: active,
                            inactive_profiles: inactive,
                        })
                        .await
                },
            )
            .await?
            .results;
            for result in &results {
                print_result(result);
            }
        }
        Cmd::Goal {
            conn,
            session,
            goal,
            files,
            active,
            inactive,
            poll_ms,
        } => {
            let token = conn.token()?;
            let client = Client::new(connect(&conn.addr).await?);
            let files = canonical(&files)?;
            let call_token = token.clone();
            let results = run_command(
                client,
                &token,
                session.settings(),
                Duration::from_millis(poll_ms.max(1)),
                |mut client, session_id, command_id| async move {
                    client
                        .execute_goal(ExecuteGoalRequest {
                            token: call_token,
                            session_id,
                            command_id,
                            files,
                            active_profiles: active,
                            inactive_profiles: inactive,
                            goal,
                        })
                        .await
                },
            )
            .await?
            .results;
            for result in &results {
                print_goal_result(result);
            }
        }
        Cmd::ResolveArtifacts {
            conn,
            session,
            coordinates,
            repositories,
        } => {
            let token = conn.token()?;
            let remote_repositories = repositories
                .iter()
                .map(|repo| parse_repository(repo))
                .collect::<Result<Vec<_>, _>>()?;
            let requests = coordinates
                .iter()
                .map(|text| {
                    parse_coordinates(text).map(|artifact| ArtifactResolutionRequest {
                        artifact: Some(artifact),
                        remote_repositories: remote_repositories.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let mut client = Client::new(connect(&conn.addr).await?);
            let session_id = create_session(&mut client, &token, session.settings()).await?;
            let resolved = client
                .resolve_artifacts(ResolveArtifactsRequest {
                    token: token.clone(),
                    session_id: session_id.clone(),
                    command_id: String::new(),
                    requests,
                })
                .await;
            release_session(&mut client, &token, &session_id).await;
            print_artifacts(resolved.map_err(failure)?.into_inner());
        }
        Cmd::ResolveTransitive {
            conn,
            session,
            coordinates,
            repositories,
        } => {
            let token = conn.token()?;
            let remote_repositories = repositories
                .iter()
                .map(|repo| parse_repository(repo))
                .collect::<Result<Vec<_>, _>>()?;
            let artifacts = coordinates
                .iter()
                .map(|text| parse_coordinates(text))
                .collect::<Result<Vec<_>, _>>()?;

            let mut client = Client::new(connect(&conn.addr).await?);
            let session_id = create_session(&mut client, &token, session.settings()).await?;
            let resolved = client
                .resolve_artifacts_transitively(ResolveArtifactsTransitivelyRequest {
                    token: token.clone(),
                    session_id: session_id.clone(),
                    command_id: String::new(),
                    artifacts,
                    remote_repositories,
                })
                .await;
            release_session(&mut client, &token, &session_id).await;
            print_artifacts(resolved.map_err(failure)?.into_inner());
        }
        Cmd::Cancel { conn, command_id } => {
            let token = conn.token()?;
            let mut client = Client::new(connect(&conn.addr).await?);
            let resp = client
                .cancel_command(CommandRequest { token, command_id })
                .await
                .map_err(failure)?
                .into_inner();
            println!("accepted={}", resp.accepted);
        }
        Cmd::Lease { cmd } => match cmd {
            LeaseCmd::Acquire { conn } => {
                let token = conn.token()?;
                let mut client = Client::new(connect(&conn.addr).await?);
                let resp = client
                    .acquire_lease(LeaseRequest { token })
                    .await
                    .map_err(failure)?
                    .into_inner();
                println!("holders={}", resp.holders);
            }
            LeaseCmd::Release { conn } => {
                let token = conn.token()?;
                let mut client = Client::new(connect(&conn.addr).await?);
                let resp = client
                    .release_lease(LeaseRequest { token })
                    .await
                    .map_err(failure)?
                    .into_inner();
                println!("holders={}", resp.holders);
            }
        },
        Cmd::TaskStatus { conn, task_id } => {
            let token = conn.token()?;
            let mut client = Client::new(connect(&conn.addr).await?);
            let resp = client
                .get_long_running_task_status(LongRunningTaskRequest { token, task_id })
                .await
                .map_err(failure)?
                .into_inner();
            println!(
                "fraction={}\tconsole={}\tdownloads={}",
                resp.fraction,
                resp.console_events.len(),
                resp.download_events.len()
            );
        }
    }

    Ok(())
}

/// Runs a batch call on its own session and command, draining both event
/// queues while the call is in flight. Ctrl-c cancels the command once.
async fn run_command<T, F, Fut>(
    mut client: Client,
    token: &str,
    settings: EngineSettings,
    poll: Duration,
    call: F,
) -> Result<T, Box<dyn std::error::Error>>
where
    F: FnOnce(Client, String, String) -> Fut,
    Fut: Future<Output = Result<Response<T>, Status>>,
{
    let session_id = create_session(&mut client, token, settings).await?;
    let command_id = match client
        .open_command(OpenCommandRequest {
            token: token.to_string(),
        })
        .await
    {
        Ok(resp) => resp.into_inner().command_id,
        Err(status) => {
            release_session(&mut client, token, &session_id).await;
            return Err(failure(status));
        }
    };
    eprintln!("session={session_id} command={command_id}");

    let call = call(client.clone(), session_id.clone(), command_id.clone());
    tokio::pin!(call);
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    let mut ticker = tokio::time::interval(poll);
    let mut canceled = false;

    let outcome = loop {
        tokio::select! {
            result = &mut call => break result,
            _ = ticker.tick() => drain_events(&mut client, token, &command_id).await,
            _ = &mut interrupt, if !canceled => {
                canceled = true;
                eprintln!("canceling {command_id}");
                if let Err(status) = client
                    .cancel_command(CommandRequest {
                        token: token.to_string(),
                        command_id: command_id.clone(),
                    })
                    .await
                {
                    eprintln!("cancel failed: {}", status::gateway_error(&status));
                }
            }
        }
    };

    drain_events(&mut client, token, &command_id).await;
    if let Err(status) = client
        .close_command(CommandRequest {
            token: token.to_string(),
            command_id,
        })
        .await
    {
        eprintln!("close failed: {}", status::gateway_error(&status));
    }
    release_session(&mut client, token, &session_id).await;

    Ok(outcome.map_err(failure)?.into_inner())
}

async fn create_session(
    client: &mut Client,
    token: &str,
    settings: EngineSettings,
) -> Result<String, Box<dyn std::error::Error>> {
    let resp = client
        .create_session(CreateSessionRequest {
            token: token.to_string(),
            settings: Some(settings),
        })
        .await
        .map_err(failure)?
        .into_inner();
    Ok(resp.session_id)
}

async fn release_session(client: &mut Client, token: &str, session_id: &str) {
    let released = client
        .release(SessionRequest {
            token: token.to_string(),
            session_id: session_id.to_string(),
        })
        .await;
    if let Err(status) = released {
        eprintln!("release failed: {}", status::gateway_error(&status));
    }
}

async fn drain_events(client: &mut Client, token: &str, command_id: &str) {
    let request = || CommandRequest {
        token: token.to_string(),
        command_id: command_id.to_string(),
    };
    match client.pull_console_events(request()).await {
        Ok(resp) => {
            for event in resp.into_inner().batch.into_iter().flat_map(|b| b.events) {
                let level = pb::ConsoleLevel::try_from(event.level)
                    .unwrap_or(pb::ConsoleLevel::Unspecified);
                eprint!("[{level:?}] {}", event.message);
                if let Some(detail) = event.error_detail {
                    eprintln!("{detail}");
                }
            }
        }
        Err(status) => eprintln!("console poll failed: {}", status::gateway_error(&status)),
    }
    match client.pull_download_events(request()).await {
        Ok(resp) => {
            for event in resp.into_inner().batch.into_iter().flat_map(|b| b.events) {
                let kind = match ArtifactEventKind::try_from(event.kind) {
                    Ok(ArtifactEventKind::DownloadStarted) => "started",
                    Ok(ArtifactEventKind::DownloadCompleted) => "completed",
                    Ok(ArtifactEventKind::DownloadFailed) => "failed",
                    _ => "unknown",
                };
                match event.error_message {
                    Some(message) => eprintln!("download {kind} {}: {message}", event.dependency_id),
                    None => eprintln!("download {kind} {}", event.dependency_id),
                }
            }
        }
        Err(status) => eprintln!("download poll failed: {}", status::gateway_error(&status)),
    }
}

fn print_result(result: &ExecutionResult) {
    match &result.project {
        Some(project) => {
            let key = Model::from_json(&project.model_json)
                .map(|m| m.key().to_string())
                .unwrap_or_else(|_| "?".into());
            println!(
                "{}\t{key}\tprofiles={}",
                result.file,
                project.activated_profiles.join(",")
            );
        }
        None => println!("{}\t(no project)", result.file),
    }
    for problem in &result.problems {
        println!("  problem: {}", problem.message);
    }
    for artifact in &result.unresolved_artifacts {
        println!(
            "  unresolved: {}:{}:{}",
            artifact.group_id, artifact.artifact_id, artifact.version
        );
    }
}

fn print_goal_result(result: &GoalExecutionResult) {
    let outcome = if result.success { "ok" } else { "failed" };
    println!("{}\t{outcome}", result.file);
    for problem in &result.problems {
        println!("  problem: {}", problem.message);
    }
}

fn print_artifacts(resp: ResolveArtifactsResponse) {
    if resp.artifacts.is_empty() {
        println!("nothing resolved");
    }
    for artifact in resp.artifacts {
        let id = artifact
            .artifact
            .map(|a| format!("{}:{}:{}", a.group_id, a.artifact_id, a.version))
            .unwrap_or_default();
        println!("{id}\tresolved={}\t{}", artifact.resolved, artifact.file);
    }
}

fn wire_level(level: ConsoleLevel) -> pb::ConsoleLevel {
    match level {
        ConsoleLevel::Debug => pb::ConsoleLevel::Debug,
        ConsoleLevel::Info => pb::ConsoleLevel::Info,
        ConsoleLevel::Warn => pb::ConsoleLevel::Warn,
        ConsoleLevel::Error => pb::ConsoleLevel::Error,
        ConsoleLevel::Fatal => pb::ConsoleLevel::Fatal,
        ConsoleLevel::Disabled => pb::ConsoleLevel::Disabled,
    }
}

fn canonical(files: &[PathBuf]) -> Result<Vec<String>, std::io::Error> {
    files
        .iter()
        .map(|f| fs::canonicalize(f).map(|p| p.display().to_string()))
        .collect()
}

fn print_json(text: &str) -> Result<(), Box<dyn std::error::Error>> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn parent_dir(file: &Path) -> PathBuf {
    fs::canonicalize(file)
        .ok()
        .and_then(|path| path.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn parse_coordinates(text: &str) -> Result<ArtifactCoordinates, String> {
    let parts: Vec<&str> = text.split(':').collect();
    let (packaging, classifier) = match parts.len() {
        3 => ("jar", ""),
        4 => (parts[2], ""),
        5 => (parts[2], parts[3]),
        _ => return Err(format!("invalid coordinates: {text}")),
    };
    let version = parts[parts.len() - 1];
    if parts[0].is_empty() || parts[1].is_empty() || version.is_empty() {
        return Err(format!("invalid coordinates: {text}"));
    }
    Ok(ArtifactCoordinates {
        group_id: parts[0].to_string(),
        artifact_id: parts[1].to_string(),
        version: version.to_string(),
        packaging: packaging.to_string(),
        classifier: classifier.to_string(),
    })
}

fn parse_repository(text: &str) -> Result<RemoteRepository, String> {
    match text.split_once('=') {
        Some((id, url)) if !id.is_empty() && !url.is_empty() => Ok(RemoteRepository {
            id: id.to_string(),
            url: url.to_string(),
        }),
        _ => Err(format!("repository must be id=url: {text}")),
    }
}

fn failure(status: Status) -> Box<dyn std::error::Error> {
    Box::new(status::gateway_error(&status))
}

async fn connect(addr: &str) -> Result<Channel, Box<dyn std::error::Error>> {
    let endpoint = format!("http://{addr}");
    Ok(Channel::from_shared(endpoint)?.connect().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn coordinates_accept_three_to_five_parts() {
        let plain = parse_coordinates("org.acme:lib:1.0").unwrap();
        assert_eq!((plain.packaging.as_str(), plain.version.as_str()), ("jar", "1.0"));
        let typed = parse_coordinates("org.acme:lib:pom:1.0").unwrap();
        assert_eq!(typed.packaging, "pom");
        let classified = parse_coordinates("org.acme:lib:jar:sources:1.0").unwrap();
        assert_eq!(classified.classifier, "sources");
        assert!(parse_coordinates("org.acme:lib").is_err());
        assert!(parse_coordinates("org.acme::1.0").is_err());
    }

    #[test]
    fn repositories_need_id_and_url() {
        let repo = parse_repository("central=https://repo.example/maven2").unwrap();
        assert_eq!(repo.id, "central");
        assert!(parse_repository("central").is_err());
    }

    #[test]
    fn session_args_map_threshold() {
        let args = SessionArgs {
            offline: true,
            threshold: "warn".into(),
            local_repository: None,
            engine_args: vec!["-U".into()],
        };
        let settings = args.settings();
        assert_eq!(settings.logging_threshold, pb::ConsoleLevel::Warn as i32);
        assert!(settings.offline);
        assert_eq!(settings.local_repository_path, "");
    }
}
