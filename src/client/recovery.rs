/// Recovery action selection.
///
/// Given a decoded error and the caller's retry context, pick exactly one
/// suggested action. The rules below form a strict priority order — the
/// first match wins, and at most one action is ever returned.
use std::time::Duration;
use tokio::sync::mpsc;

use super::DecodedError;
use crate::errors::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Re-authenticate. Dispatching this also resets any in-flight
    /// conversation on the caller's side.
    ReLogin,
    ConfigureProvider,
    ConfigureDatasource,
    NewConversation,
    Retry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuggestedAction {
    pub label: String,
    pub action: RecoveryAction,
    pub disabled: bool,
}

/// Caller-side state that gates the retry action.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryContext {
    /// Whether the caller supplied a retry path at all.
    pub can_retry: bool,
    /// Seconds remaining on the retry countdown; 0 when idle.
    pub retry_countdown: u64,
    /// Whether a submission is already in flight.
    pub in_flight: bool,
}

const PROVIDER_TERMS: &[&str] = &["provider", "model", "api key", "模型"];
const DATASOURCE_TERMS: &[&str] = &["datasource", "schema", "sync", "database", "数据源", "同步"];

pub fn resolve_action(error: &DecodedError, ctx: &RecoveryContext) -> Option<SuggestedAction> {
    let status = error.status.unwrap_or(0);

    if error.code == Some(ErrorCode::Unauthenticated) || status == 401 {
        return Some(SuggestedAction {
            label: "Log in again".to_string(),
            action: RecoveryAction::ReLogin,
            disabled: false,
        });
    }

    if error.code == Some(ErrorCode::ConfigurationError) {
        let lower = error.message.to_lowercase();
        if PROVIDER_TERMS.iter().any(|t| lower.contains(t)) {
            return Some(SuggestedAction {
                label: "Configure AI provider".to_string(),
                action: RecoveryAction::ConfigureProvider,
                disabled: false,
            });
        }
        if DATASOURCE_TERMS.iter().any(|t| lower.contains(t)) {
            return Some(SuggestedAction {
                label: "Configure datasource".to_string(),
                action: RecoveryAction::ConfigureDatasource,
                disabled: false,
            });
        }
    }

    if matches!(
        error.code,
        Some(ErrorCode::ConversationForbidden) | Some(ErrorCode::ConversationNotFound)
    ) || status == 403
        || status == 404
    {
        return Some(SuggestedAction {
            label: "Start new conversation".to_string(),
            action: RecoveryAction::NewConversation,
            disabled: false,
        });
    }

    if matches!(
        error.code,
        Some(ErrorCode::InternalError) | Some(ErrorCode::RateLimit)
    ) || status >= 500
        || status == 429
    {
        if !ctx.can_retry {
            return None;
        }
        let label = if ctx.retry_countdown > 0 {
            format!("Retry in {} seconds", ctx.retry_countdown)
        } else {
            "Retry".to_string()
        };
        return Some(SuggestedAction {
            label,
            action: RecoveryAction::Retry,
            disabled: ctx.retry_countdown > 0 || ctx.in_flight,
        });
    }

    None
}

/// Countdown ticker feeding the retry label: emits `seconds, seconds - 1,
/// ..., 0`, one value per tick, then closes. Modeled as an explicit timer
/// rather than ad-hoc re-render side effects so consumers observe a plain
/// stream of decrementing values.
pub fn countdown_ticker(seconds: u64, tick: Duration) -> mpsc::Receiver<u64> {
    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        let mut remaining = seconds;
        loop {
            interval.tick().await;
            if tx.send(remaining).await.is_err() {
                break;
            }
            if remaining == 0 {
                break;
            }
            remaining -= 1;
        }
    });
    rx
}
