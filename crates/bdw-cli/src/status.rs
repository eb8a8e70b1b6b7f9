use bdw_core::GatewayError;
use bdw_util::ORIGIN_METADATA_KEY;
use tonic::{Code, Status};

/// Rebuilds the worker's error from a call status.
pub(crate) fn gateway_error(status: &Status) -> GatewayError {
    let message = status.message().to_string();
    match status.code() {
        Code::PermissionDenied => GatewayError::AccessDenied,
        Code::Cancelled => GatewayError::Canceled,
        Code::InvalidArgument => GatewayError::InvalidArgument(message),
        Code::NotFound => {
            if let Some(id) = message.strip_prefix("unknown session: ") {
                GatewayError::UnknownSession(id.to_string())
            } else if let Some(id) = message.strip_prefix("unknown command: ") {
                GatewayError::UnknownCommand(id.to_string())
            } else {
                GatewayError::transport("NotFound", message)
            }
        }
        code => {
            let origin = status
                .metadata()
                .get(ORIGIN_METADATA_KEY)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
                .unwrap_or_else(|| format!("{code:?}"));
            GatewayError::transport(origin, message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tonic::metadata::AsciiMetadataValue;

    #[test]
    fn codes_map_back_to_gateway_errors() {
        assert_eq!(
            gateway_error(&Status::permission_denied("access denied")),
            GatewayError::AccessDenied
        );
        assert_eq!(gateway_error(&Status::cancelled("x")), GatewayError::Canceled);
        assert_eq!(
            gateway_error(&Status::not_found("unknown session: s-1")),
            GatewayError::UnknownSession("s-1".into())
        );
        assert_eq!(
            gateway_error(&Status::not_found("unknown command: c-1")),
            GatewayError::UnknownCommand("c-1".into())
        );
        assert_eq!(
            gateway_error(&Status::invalid_argument("base_dir is required")),
            GatewayError::InvalidArgument("base_dir is required".into())
        );
    }

    #[test]
    fn transport_failures_keep_their_origin() {
        let mut status = Status::internal("disk full");
        let origin: AsciiMetadataValue = "Io".parse().unwrap();
        status.metadata_mut().insert(ORIGIN_METADATA_KEY, origin);
        assert_eq!(gateway_error(&status), GatewayError::transport("Io", "disk full"));

        assert_eq!(
            gateway_error(&Status::unavailable("connection refused")),
            GatewayError::transport("Unavailable", "connection refused")
        );
    }
}
