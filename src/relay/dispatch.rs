use tracing::warn;

use crate::error::AppError;
use crate::models::events::{ClientMessage, ErrorEvent, ServerEvent, WarningEvent};
use crate::registry::SessionId;
use crate::relay::LocationRelay;

pub fn parse_client_message(text: &str) -> Result<ClientMessage, AppError> {
    serde_json::from_str(text)
        .map_err(|err| AppError::InvalidData(format!("malformed message: {err}")))
}

/// Runs one inbound message and returns the replies addressed to the sender.
/// Broadcasts triggered by the message go out through the registry.
pub async fn handle_client_message(
    relay: &LocationRelay,
    session_id: SessionId,
    message: ClientMessage,
) -> Vec<ServerEvent> {
    match message {
        ClientMessage::ReportPosition(report) => match relay.report_position(report).await {
            Ok(outcome) => outcome
                .warnings
                .into_iter()
                .map(|warning| ServerEvent::Warning(WarningEvent::from(warning)))
                .collect(),
            Err(err) => vec![error_reply(session_id, &err)],
        },
        ClientMessage::StartDelivery(request) => {
            let result = relay
                .start_delivery(request.courier_id.as_deref(), request.order_id.as_deref())
                .await;
            status_reply(session_id, result)
        }
        ClientMessage::StopDelivery(request) => {
            let result = relay.stop_delivery(request.courier_id.as_deref()).await;
            status_reply(session_id, result)
        }
        ClientMessage::GoOffline(request) => {
            let result = relay.go_offline(request.courier_id.as_deref()).await;
            status_reply(session_id, result)
        }
        ClientMessage::BeginTracking(request) => {
            match relay
                .begin_tracking(session_id, request.order_id.as_deref())
                .await
            {
                Ok(found) => vec![ServerEvent::CourierFound(found)],
                Err(err) => vec![error_reply(session_id, &err)],
            }
        }
        ClientMessage::EndTracking(request) => {
            relay.end_tracking(session_id, request.courier_id.as_deref());
            Vec::new()
        }
    }
}

// Status changes reach the sender through the global broadcast.
fn status_reply<T>(session_id: SessionId, result: Result<T, AppError>) -> Vec<ServerEvent> {
    match result {
        Ok(_) => Vec::new(),
        Err(err) => vec![error_reply(session_id, &err)],
    }
}

fn error_reply(session_id: SessionId, err: &AppError) -> ServerEvent {
    if matches!(err, AppError::Storage(_) | AppError::Internal(_)) {
        warn!(session_id = %session_id, error = %err, "session request failed");
    }
    ServerEvent::Error(ErrorEvent::from(err))
}

#[cfg(test)]
mod tests {
    use super::parse_client_message;

    #[test]
    fn malformed_json_is_invalid_data() {
        let err = parse_client_message("{not json").unwrap_err();
        assert_eq!(err.code(), "INVALID_DATA");
    }

    #[test]
    fn untrack_without_courier_parses() {
        assert!(parse_client_message(r#"{"event":"customer:untrack","data":{}}"#).is_ok());
    }
}
