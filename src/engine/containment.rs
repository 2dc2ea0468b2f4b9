//! Error containment for dispatch
//!
//! Anything that escapes a step function, command handler or collaborator
//! call ends up here as an [`ErrorRecord`]: logged as structured diagnostics,
//! followed by one best-effort notice to the chat it came from.

use std::any::Any;
use std::error::Error as StdError;
use std::sync::Arc;

use crate::core::error::{AppError, ErrorKind};
use crate::engine::event::{ChatId, Event, UserId};
use crate::engine::reply::{Reply, Transport};

/// Generic apology shown when a dispatch fails for reasons the user cannot fix
pub const FAILURE_NOTICE: &str = "😔 Произошла ошибка. Попробуйте ещё раз или обратитесь к администратору.";

/// Diagnostics for one failed dispatch. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub update_id: u64,
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub message_text: Option<String>,
    pub error: String,
    /// `source()` chain, outermost first, not including `error`
    pub causes: Vec<String>,
}

impl ErrorRecord {
    pub fn from_error(event: &Event, err: &AppError) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        Self {
            kind: err.kind(),
            update_id: event.update_id,
            user_id: event.user,
            chat_id: event.chat,
            message_text: Some(event.describe()),
            error: err.to_string(),
            causes,
        }
    }

    pub fn from_panic(event: &Event, payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());

        Self {
            kind: ErrorKind::Panic,
            update_id: event.update_id,
            user_id: event.user,
            chat_id: event.chat,
            message_text: Some(event.describe()),
            error: format!("panic: {}", message),
            causes: Vec::new(),
        }
    }

    /// `key=value` lines, one field per line
    pub fn to_log_lines(&self) -> String {
        let mut lines = vec![
            format!("kind={}", self.kind),
            format!("update_id={}", self.update_id),
            format!("user_id={}", self.user_id),
            format!("chat_id={}", self.chat_id),
        ];
        if let Some(text) = &self.message_text {
            lines.push(format!("message_text={:?}", text));
        }
        lines.push(format!("error={:?}", self.error));
        for (depth, cause) in self.causes.iter().enumerate() {
            lines.push(format!("cause.{}={:?}", depth, cause));
        }
        lines.join("\n")
    }
}

/// Logs failures and notifies the originating chat once, best effort.
#[derive(Clone)]
pub struct ErrorContainment {
    transport: Arc<dyn Transport>,
}

impl ErrorContainment {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Never fails. A notice that cannot be delivered is logged and dropped.
    pub async fn contain(&self, record: &ErrorRecord) {
        log::error!("Dispatch failed\n{}", record.to_log_lines());

        if let Err(e) = self.transport.send(record.chat_id, &Reply::text(FAILURE_NOTICE)).await {
            log::error!(
                "Failure notice not delivered: update_id={} chat_id={} reason={}",
                record.update_id,
                record.chat_id,
                e.reason
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::BusinessError;

    fn event() -> Event {
        Event::text(ChatId(10), UserId(20), "50").with_update_id(99)
    }

    #[test]
    fn test_record_from_error_carries_event_identifiers() {
        let err = AppError::from(rusqlite::Error::InvalidQuery);
        let record = ErrorRecord::from_error(&event(), &err);

        assert_eq!(record.kind, ErrorKind::Storage);
        assert_eq!(record.update_id, 99);
        assert_eq!(record.chat_id, ChatId(10));
        assert_eq!(record.message_text.as_deref(), Some("50"));

        let lines = record.to_log_lines();
        assert!(lines.contains("kind=storage"));
        assert!(lines.contains("update_id=99"));
        assert!(lines.contains("user_id=20"));
    }

    #[test]
    fn test_record_from_panic_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        let record = ErrorRecord::from_panic(&event(), payload.as_ref());
        assert_eq!(record.kind, ErrorKind::Panic);
        assert_eq!(record.error, "panic: boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        let record = ErrorRecord::from_panic(&event(), payload.as_ref());
        assert_eq!(record.error, "panic: owned boom");
    }

    #[test]
    fn test_business_error_kind() {
        let err = AppError::from(BusinessError::AccessDenied);
        assert_eq!(ErrorRecord::from_error(&event(), &err).kind, ErrorKind::Business);
    }
}
