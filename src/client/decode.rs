/// Error decoding heuristics.
///
/// The decoder reconstructs a typed error from whatever a failed request
/// left behind. A server-supplied code is always trusted over local
/// inference; missing codes are inferred from message keywords (English and
/// Chinese phrasings are both recognized — whether future messages stay
/// bilingual or move to message keys is an open question upstream), then
/// from the HTTP status. `decode` never panics: the worst case is a generic
/// internal error carrying the fallback message.
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use super::{ApiFailure, DecodedError};
use crate::envelope::{clamp_retry_after, infer_code_from_status};
use crate::errors::ErrorCode;

pub fn decode(failure: &ApiFailure, fallback: &str) -> DecodedError {
    match failure {
        ApiFailure::Api { status, body } => decode_api(*status, body, fallback),
        ApiFailure::Transport(message) => decode_message(message, fallback),
    }
}

fn decode_api(status: u16, body: &Value, fallback: &str) -> DecodedError {
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(fallback);

    let code = body
        .get("code")
        .and_then(Value::as_str)
        .and_then(ErrorCode::parse)
        .or_else(|| infer_code_from_message(message))
        .or_else(|| infer_code_from_status(status))
        .unwrap_or(ErrorCode::InternalError);

    let (message, sql) = if code == ErrorCode::DatabaseError {
        extract_sql(message)
    } else {
        (message.to_string(), None)
    };

    let details = body
        .get("details")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().map(localize_detail).collect::<Vec<_>>());

    let retry_after = clamp_retry_after(body.get("retryAfter").and_then(Value::as_f64));
    let advice = advice_for(code, &message);

    DecodedError {
        message,
        status: Some(status),
        code: Some(code),
        sql,
        advice,
        details,
        retry_after,
    }
}

fn decode_message(raw: &str, fallback: &str) -> DecodedError {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return DecodedError {
            message: fallback.to_string(),
            code: Some(ErrorCode::InternalError),
            ..Default::default()
        };
    }

    // Local validation phrases are recognized directly.
    if let Some(localized) = localize_validation_message(trimmed) {
        return DecodedError {
            message: localized,
            code: Some(ErrorCode::ValidationError),
            advice: advice_for(ErrorCode::ValidationError, trimmed),
            ..Default::default()
        };
    }

    if NETWORK_FAILURE.is_match(trimmed) {
        return DecodedError {
            message: "Unable to reach the server. Please check your connection and try again."
                .to_string(),
            code: Some(ErrorCode::InternalError),
            advice: Some("Check your network connection, then retry.".to_string()),
            ..Default::default()
        };
    }

    if let Some(code) = infer_code_from_message(trimmed) {
        let (message, sql) = if code == ErrorCode::DatabaseError {
            extract_sql(trimmed)
        } else {
            (trimmed.to_string(), None)
        };
        let advice = advice_for(code, trimmed);
        return DecodedError {
            message,
            code: Some(code),
            sql,
            advice,
            ..Default::default()
        };
    }

    DecodedError {
        message: fallback.to_string(),
        code: Some(ErrorCode::InternalError),
        ..Default::default()
    }
}

fn rule(pattern: &str, code: ErrorCode) -> (Regex, ErrorCode) {
    (
        Regex::new(pattern).expect("message rule pattern is valid"),
        code,
    )
}

/// Prioritized keyword clusters; first match wins.
static MESSAGE_RULES: LazyLock<Vec<(Regex, ErrorCode)>> = LazyLock::new(|| {
    vec![
        rule(
            r"(?i)rate limit|too many requests|请求过于频繁|限流",
            ErrorCode::RateLimit,
        ),
        rule(
            r"(?i)unauthenticated|unauthorized|not logged in|log in again|session expired|未登录|重新登录",
            ErrorCode::Unauthenticated,
        ),
        rule(
            r"(?i)forbidden|permission denied|no permission|无权|没有权限",
            ErrorCode::ConversationForbidden,
        ),
        rule(
            r"(?i)not found|does not exist|不存在|找不到",
            ErrorCode::ConversationNotFound,
        ),
        rule(
            r"(?i)not configured|no (datasource|ai provider)|please configure|sync.{0,40}(schema|datasource)|未配置|请先配置|同步",
            ErrorCode::ConfigurationError,
        ),
        rule(
            r"(?i)database|\bsql\b|syntax error|数据库",
            ErrorCode::DatabaseError,
        ),
        rule(
            r"(?i)is required|must be|at most \d+|positive integer|不能为空|必须",
            ErrorCode::ValidationError,
        ),
    ]
});

static NETWORK_FAILURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)failed to fetch|networkerror|typeerror|error sending request|connection (refused|reset)|dns error")
        .expect("network pattern is valid")
});

pub(crate) fn infer_code_from_message(message: &str) -> Option<ErrorCode> {
    for (pattern, code) in MESSAGE_RULES.iter() {
        if pattern.is_match(message) {
            return Some(*code);
        }
    }
    None
}

static SQL_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)SQL:\s*((?:SELECT|INSERT|UPDATE|DELETE|WITH)\b[^;]*);?")
        .expect("sql marker pattern is valid")
});

static BARE_SQL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*((?:SELECT|INSERT|UPDATE|DELETE|WITH)\b[^;]*);?")
        .expect("bare sql pattern is valid")
});

/// Pull an embedded SQL statement out of a database error message. Returns
/// the display message with the SQL fragment removed, plus the statement.
fn extract_sql(message: &str) -> (String, Option<String>) {
    let captures = SQL_MARKER
        .captures(message)
        .or_else(|| BARE_SQL.captures(message));
    let Some(caps) = captures else {
        return (message.to_string(), None);
    };
    let (Some(matched), Some(sql)) = (caps.get(0), caps.get(1)) else {
        return (message.to_string(), None);
    };

    let sql = sql.as_str().trim().to_string();
    let remainder = format!("{} {}", &message[..matched.start()], &message[matched.end()..]);
    let cleaned = remainder
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == ';' || c == ',' || c.is_whitespace())
        .to_string();
    let display = if cleaned.is_empty() {
        ErrorCode::DatabaseError.default_message().to_string()
    } else {
        cleaned
    };
    (display, Some(sql))
}

fn field_label(field: &str) -> Option<&'static str> {
    match field {
        "question" => Some("Question"),
        "datasource" => Some("Datasource ID"),
        "aiProvider" => Some("AI Provider ID"),
        "action" => Some("Action ID"),
        "conversationId" => Some("Conversation ID"),
        "limit" => Some("Limit"),
        _ => None,
    }
}

static VALIDATION_TEMPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<field>[A-Za-z][A-Za-z0-9]*) (?P<rest>is required|must be a positive integer|must be at most \d+ characters?|must not exceed \d+)$",
    )
    .expect("validation template pattern is valid")
});

/// Rewrite a known validation message with its human field label.
fn localize_validation_message(message: &str) -> Option<String> {
    let caps = VALIDATION_TEMPLATE.captures(message.trim())?;
    let field = caps.name("field")?.as_str();
    let rest = caps.name("rest")?.as_str();
    let label = field_label(field).unwrap_or(field);
    Some(format!("{label} {rest}"))
}

/// Rewrite a `"field: message"` detail entry. Unrecognized pairs pass
/// through unchanged.
fn localize_detail_str(raw: &str) -> String {
    let Some((field, message)) = raw.split_once(':') else {
        return localize_validation_message(raw).unwrap_or_else(|| raw.to_string());
    };
    let field = field.trim();
    let message = message.trim();
    let label = field_label(field);
    let localized = localize_validation_message(message);
    if label.is_none() && localized.is_none() {
        return raw.to_string();
    }
    format!(
        "{}: {}",
        label.unwrap_or(field),
        localized.unwrap_or_else(|| message.to_string())
    )
}

/// Coerce an arbitrary detail entry to a display string.
fn localize_detail(entry: &Value) -> String {
    match entry {
        Value::String(s) => localize_detail_str(s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Object(map) => {
            if let Some(Value::String(message)) = map.get("message") {
                localize_detail_str(message)
            } else {
                serde_json::to_string(entry).unwrap_or_else(|_| "[detail]".to_string())
            }
        }
        other => serde_json::to_string(other).unwrap_or_else(|_| "[detail]".to_string()),
    }
}

/// An actionable hint per code. Configuration advice is refined by message
/// content — "configuration error" alone is not actionable.
fn advice_for(code: ErrorCode, message: &str) -> Option<String> {
    match code {
        ErrorCode::ConfigurationError => Some(configuration_advice(message)),
        ErrorCode::RateLimit => Some("Please wait a moment before retrying.".to_string()),
        ErrorCode::ValidationError => {
            Some("Check the highlighted fields and try again.".to_string())
        }
        ErrorCode::DatabaseError => {
            Some("Review the generated SQL or try rephrasing your question.".to_string())
        }
        ErrorCode::Unauthenticated => Some("Log in again to continue.".to_string()),
        ErrorCode::ConversationForbidden | ErrorCode::ConversationNotFound => {
            Some("Start a new conversation and ask again.".to_string())
        }
        ErrorCode::InternalError => None,
    }
}

fn configuration_advice(message: &str) -> String {
    let lower = message.to_lowercase();
    if lower.contains("sync") || lower.contains("schema") || lower.contains("同步") {
        "Sync the datasource first, then ask again.".to_string()
    } else if lower.contains("provider") || lower.contains("model") || lower.contains("模型") {
        "Configure an AI provider in settings first.".to_string()
    } else {
        "Configure a datasource connection first.".to_string()
    }
}
