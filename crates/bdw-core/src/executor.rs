use std::{any::Any, time::Duration};

use thiserror::Error;
use tokio::task::JoinError;
use tracing::debug;

use crate::{
    channel::EventChannel,
    error::{GatewayError, GatewayResult},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Failure of a unit of work run by the [`TaskExecutor`].
///
/// `Context` layers are added by the machinery between the work and the
/// boundary; they are peeled off before the failure is reported.
#[derive(Debug, Error)]
pub enum WorkError {
    #[error("work canceled")]
    Canceled,
    #[error("{context}")]
    Context {
        context: String,
        #[source]
        source: Box<WorkError>,
    },
    #[error("{message}")]
    Failed { origin: String, message: String },
}

impl WorkError {
    pub fn failed(origin: impl Into<String>, message: impl Into<String>) -> Self {
        WorkError::Failed {
            origin: origin.into(),
            message: message.into(),
        }
    }

    /// Captures the message and the type tag of an arbitrary error.
    pub fn from_error<E: std::error::Error>(err: &E) -> Self {
        WorkError::Failed {
            origin: type_tag::<E>(),
            message: err.to_string(),
        }
    }

    pub fn context(self, context: impl Into<String>) -> Self {
        WorkError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn into_root(self) -> WorkError {
        let mut current = self;
        while let WorkError::Context { source, .. } = current {
            current = *source;
        }
        current
    }
}

pub type WorkResult<T> = Result<T, WorkError>;

/// Runs blocking work in the background and waits for it in short slices,
/// checking the command's cancel flag between slices.
///
/// Cancellation only stops the waiting: the work itself is detached and may
/// keep running until it returns on its own.
#[derive(Clone, Debug)]
pub struct TaskExecutor {
    poll_interval: Duration,
}

impl Default for TaskExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl TaskExecutor {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub async fn run<T, F>(&self, channel: &EventChannel, work: F) -> GatewayResult<T>
    where
        F: FnOnce() -> WorkResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut handle = tokio::task::spawn_blocking(work);
        loop {
            if channel.is_canceled() {
                debug!("command canceled; detaching background work");
                return Err(GatewayError::Canceled);
            }
            match tokio::time::timeout(self.poll_interval, &mut handle).await {
                Err(_elapsed) => continue,
                Ok(Ok(Ok(value))) => return Ok(value),
                Ok(Ok(Err(err))) => return Err(reclassify(err)),
                Ok(Err(join_err)) => return Err(reclassify_join(join_err)),
            }
        }
    }
}

/// Peels context layers off and maps the root failure to its boundary form.
pub(crate) fn reclassify(err: WorkError) -> GatewayError {
    match err.into_root() {
        WorkError::Canceled => GatewayError::Canceled,
        WorkError::Failed { origin, message } => GatewayError::TransportFailure { origin, message },
        other => GatewayError::transport("WorkError", other.to_string()),
    }
}

fn reclassify_join(err: JoinError) -> GatewayError {
    if err.is_cancelled() {
        return GatewayError::Canceled;
    }
    match err.try_into_panic() {
        Ok(payload) => GatewayError::transport("panic", panic_message(payload.as_ref())),
        Err(err) => GatewayError::transport("JoinError", err.to_string()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic".to_string()
    }
}

fn type_tag<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
