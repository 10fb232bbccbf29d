use super::*;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api(status: u16, body: Value) -> ApiFailure {
    ApiFailure::Api { status, body }
}

fn decoded(failure: &ApiFailure) -> DecodedError {
    decode(failure, DEFAULT_FALLBACK_MESSAGE)
}

// ---- structured decoding ----

#[test]
fn server_supplied_code_is_trusted_over_message_heuristics() {
    // The message mentions the database, but the server already classified
    // this as a rate limit; no re-classification happens.
    let err = decoded(&api(
        429,
        json!({"code": "RATE_LIMIT", "message": "database pool saturated"}),
    ));
    assert_eq!(err.code, Some(ErrorCode::RateLimit));
    assert_eq!(err.status, Some(429));
}

#[test]
fn unknown_code_falls_back_to_message_inference() {
    let err = decoded(&api(
        400,
        json!({
            "code": "E_CONFIGURATION_ERROR",
            "message": "Please sync the datasource schema and try again."
        }),
    ));
    assert_eq!(err.code, Some(ErrorCode::ConfigurationError));
    assert_eq!(
        err.advice.as_deref(),
        Some("Sync the datasource first, then ask again.")
    );
}

#[test]
fn unknown_code_and_message_fall_back_to_status() {
    let err = decoded(&api(401, json!({"message": "nope"})));
    assert_eq!(err.code, Some(ErrorCode::Unauthenticated));
}

#[test]
fn null_body_decodes_to_fallback_internal() {
    let err = decoded(&api(500, Value::Null));
    assert_eq!(err.message, DEFAULT_FALLBACK_MESSAGE);
    assert_eq!(err.code, Some(ErrorCode::InternalError));
    assert_eq!(err.status, Some(500));
}

#[test]
fn database_error_extracts_and_strips_sql() {
    let err = decoded(&api(
        400,
        json!({
            "code": "DATABASE_ERROR",
            "message": "Database error. SQL: SELECT * FROM t; Syntax Error"
        }),
    ));
    assert_eq!(err.sql.as_deref(), Some("SELECT * FROM t"));
    assert_eq!(err.message, "Database error. Syntax Error");
}

#[test]
fn database_error_with_bare_leading_sql() {
    let err = decoded(&api(
        400,
        json!({
            "code": "DATABASE_ERROR",
            "message": "SELECT name FROM missing_table"
        }),
    ));
    assert_eq!(err.sql.as_deref(), Some("SELECT name FROM missing_table"));
    // Nothing but SQL in the message; the taxonomy default stands in.
    assert_eq!(err.message, "Database error");
}

#[test]
fn sql_is_not_extracted_for_other_codes() {
    let err = decoded(&api(
        400,
        json!({
            "code": "VALIDATION_ERROR",
            "message": "SELECT is fine but the limit is not"
        }),
    ));
    assert!(err.sql.is_none());
}

#[test]
fn known_detail_pairs_are_localized() {
    let err = decoded(&api(
        400,
        json!({
            "code": "VALIDATION_ERROR",
            "message": "Invalid query request",
            "details": ["conversationId: conversationId must be a positive integer"]
        }),
    ));
    assert_eq!(
        err.details.unwrap(),
        vec!["Conversation ID: Conversation ID must be a positive integer"]
    );
}

#[test]
fn known_field_with_unknown_message_keeps_the_message() {
    let err = decoded(&api(
        400,
        json!({
            "code": "VALIDATION_ERROR",
            "message": "Invalid query request",
            "details": ["limit: out of bounds somehow"]
        }),
    ));
    assert_eq!(err.details.unwrap(), vec!["Limit: out of bounds somehow"]);
}

#[test]
fn unrecognized_detail_pairs_pass_through_unchanged() {
    let err = decoded(&api(
        400,
        json!({
            "code": "VALIDATION_ERROR",
            "message": "Invalid query request",
            "details": ["frobnicator: exploded quietly"]
        }),
    ));
    assert_eq!(err.details.unwrap(), vec!["frobnicator: exploded quietly"]);
}

#[test]
fn non_string_details_are_coerced() {
    let err = decoded(&api(
        400,
        json!({
            "code": "VALIDATION_ERROR",
            "message": "Invalid query request",
            "details": [
                42,
                true,
                null,
                {"message": "limit must not exceed 1000"},
                {"unexpected": "shape"}
            ]
        }),
    ));
    let details = err.details.unwrap();
    assert_eq!(details[0], "42");
    assert_eq!(details[1], "true");
    assert_eq!(details[2], "null");
    assert_eq!(details[3], "Limit must not exceed 1000");
    assert_eq!(details[4], r#"{"unexpected":"shape"}"#);
}

#[test]
fn retry_after_is_read_and_clamped() {
    let err = decoded(&api(
        429,
        json!({"code": "RATE_LIMIT", "message": "slow down", "retryAfter": 30}),
    ));
    assert_eq!(err.retry_after, Some(30));

    let err = decoded(&api(
        429,
        json!({"code": "RATE_LIMIT", "message": "slow down", "retryAfter": 600}),
    ));
    assert_eq!(err.retry_after, Some(120));
}

#[test]
fn decode_survives_hostile_body_shapes() {
    // Arrays, numeric codes, nested garbage — never a panic, always an error.
    for body in [
        json!([1, 2, 3]),
        json!({"code": 42, "message": {"nested": true}}),
        json!({"details": "not an array"}),
        json!({"message": "", "details": [[["deep"]]]}),
    ] {
        let err = decoded(&api(500, body));
        assert!(!err.message.is_empty());
        assert!(err.code.is_some());
    }
}

// ---- bare-message decoding ----

fn bare(message: &str) -> DecodedError {
    decode(
        &ApiFailure::Transport(message.to_string()),
        DEFAULT_FALLBACK_MESSAGE,
    )
}

#[test]
fn local_validation_phrase_is_localized_and_classified() {
    let err = bare("question is required");
    assert_eq!(err.message, "Question is required");
    assert_eq!(err.code, Some(ErrorCode::ValidationError));
}

#[test]
fn network_failures_get_a_friendly_message() {
    for raw in [
        "TypeError: Failed to fetch",
        "NetworkError when attempting to fetch resource",
        "error sending request for url (http://localhost:8080/api/query)",
    ] {
        let err = bare(raw);
        assert!(err.message.contains("check your connection"), "{raw}");
        assert_eq!(err.code, Some(ErrorCode::InternalError));
    }
}

#[test]
fn rate_limit_phrasing_is_recognized() {
    let err = bare("Too many requests, slow down");
    assert_eq!(err.code, Some(ErrorCode::RateLimit));
    assert_eq!(
        err.advice.as_deref(),
        Some("Please wait a moment before retrying.")
    );
}

#[test]
fn chinese_phrasings_are_recognized() {
    assert_eq!(
        bare("没有权限访问该会话").code,
        Some(ErrorCode::ConversationForbidden)
    );
    assert_eq!(bare("会话不存在").code, Some(ErrorCode::ConversationNotFound));
    assert_eq!(
        bare("数据源未配置").code,
        Some(ErrorCode::ConfigurationError)
    );
}

#[test]
fn provider_configuration_message_gets_provider_advice() {
    let err = bare("No AI provider available, please configure one");
    assert_eq!(err.code, Some(ErrorCode::ConfigurationError));
    assert_eq!(
        err.advice.as_deref(),
        Some("Configure an AI provider in settings first.")
    );
}

#[test]
fn unmatched_messages_default_to_internal_with_fallback() {
    let err = bare("wibble wobble");
    assert_eq!(err.message, DEFAULT_FALLBACK_MESSAGE);
    assert_eq!(err.code, Some(ErrorCode::InternalError));
    assert!(err.advice.is_none());
}

#[test]
fn empty_message_defaults_to_fallback() {
    let err = bare("   ");
    assert_eq!(err.message, DEFAULT_FALLBACK_MESSAGE);
}

// ---- recovery resolution ----

fn error_with(code: ErrorCode, status: u16, message: &str) -> DecodedError {
    DecodedError {
        message: message.to_string(),
        status: Some(status),
        code: Some(code),
        ..Default::default()
    }
}

#[test]
fn unauthenticated_wins_over_everything() {
    // Even with a configuration-flavored message, a 401 resolves to re-login.
    let err = error_with(ErrorCode::ConfigurationError, 401, "please configure a datasource");
    let action = resolve_action(&err, &RecoveryContext::default()).unwrap();
    assert_eq!(action.action, RecoveryAction::ReLogin);
    assert!(!action.disabled);
}

#[test]
fn status_401_alone_suggests_relogin() {
    let err = DecodedError {
        status: Some(401),
        message: "huh".to_string(),
        ..Default::default()
    };
    let action = resolve_action(&err, &RecoveryContext::default()).unwrap();
    assert_eq!(action.action, RecoveryAction::ReLogin);
}

#[test]
fn provider_configuration_suggests_provider_setup() {
    let err = error_with(ErrorCode::ConfigurationError, 400, "No AI provider available");
    let action = resolve_action(&err, &RecoveryContext::default()).unwrap();
    assert_eq!(action.action, RecoveryAction::ConfigureProvider);
    assert_eq!(action.label, "Configure AI provider");
}

#[test]
fn datasource_configuration_suggests_datasource_setup() {
    let err = error_with(
        ErrorCode::ConfigurationError,
        400,
        "Datasource schema is not synced. Please sync the datasource schema and try again.",
    );
    let action = resolve_action(&err, &RecoveryContext::default()).unwrap();
    assert_eq!(action.action, RecoveryAction::ConfigureDatasource);
}

#[test]
fn conversation_errors_suggest_a_new_conversation() {
    for code in [
        ErrorCode::ConversationForbidden,
        ErrorCode::ConversationNotFound,
    ] {
        let err = error_with(code, code.status(), "conversation trouble");
        let action = resolve_action(&err, &RecoveryContext::default()).unwrap();
        assert_eq!(action.action, RecoveryAction::NewConversation);
    }
    // Raw statuses work without a code too.
    for status in [403u16, 404] {
        let err = DecodedError {
            status: Some(status),
            message: "gone".to_string(),
            ..Default::default()
        };
        let action = resolve_action(&err, &RecoveryContext::default()).unwrap();
        assert_eq!(action.action, RecoveryAction::NewConversation);
    }
}

#[test]
fn countdown_in_progress_disables_retry_with_live_label() {
    let err = error_with(ErrorCode::RateLimit, 429, "slow down");
    let ctx = RecoveryContext {
        can_retry: true,
        retry_countdown: 6,
        in_flight: false,
    };
    let action = resolve_action(&err, &ctx).unwrap();
    assert_eq!(action.label, "Retry in 6 seconds");
    assert!(action.disabled);
}

#[test]
fn idle_countdown_enables_retry() {
    let err = error_with(ErrorCode::RateLimit, 429, "slow down");
    let ctx = RecoveryContext {
        can_retry: true,
        retry_countdown: 0,
        in_flight: false,
    };
    let action = resolve_action(&err, &ctx).unwrap();
    assert_eq!(action.label, "Retry");
    assert!(!action.disabled);
}

#[test]
fn in_flight_submission_disables_retry() {
    let err = error_with(ErrorCode::InternalError, 500, "boom");
    let ctx = RecoveryContext {
        can_retry: true,
        retry_countdown: 0,
        in_flight: true,
    };
    let action = resolve_action(&err, &ctx).unwrap();
    assert_eq!(action.label, "Retry");
    assert!(action.disabled);
}

#[test]
fn retry_requires_a_retry_path() {
    let err = error_with(ErrorCode::InternalError, 500, "boom");
    assert!(resolve_action(&err, &RecoveryContext::default()).is_none());
}

#[test]
fn validation_errors_get_no_action() {
    let err = error_with(ErrorCode::ValidationError, 400, "Invalid query request");
    let ctx = RecoveryContext {
        can_retry: true,
        ..Default::default()
    };
    assert!(resolve_action(&err, &ctx).is_none());
}

#[tokio::test]
async fn countdown_ticker_emits_decrementing_values() {
    let mut rx = countdown_ticker(3, std::time::Duration::from_millis(2));
    let mut seen = Vec::new();
    while let Some(value) = rx.recv().await {
        seen.push(value);
    }
    assert_eq!(seen, vec![3, 2, 1, 0]);
}

// ---- QueryClient round trips ----

#[tokio::test]
async fn client_returns_parsed_response_on_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sql": "SELECT 1",
            "rows": [{"n": 1}],
            "datasourceId": 7,
            "aiProviderId": 1,
            "limit": 100
        })))
        .mount(&server)
        .await;

    let client = QueryClient::new(server.uri());
    let response = client
        .ask(&QueryRequest {
            question: "one".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(response.sql, "SELECT 1");
    assert_eq!(response.datasource_id, 7);
}

#[tokio::test]
async fn client_decodes_error_envelopes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/query"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": "VALIDATION_ERROR",
            "message": "Invalid query request",
            "details": ["limit: limit must be a positive integer"]
        })))
        .mount(&server)
        .await;

    let client = QueryClient::new(server.uri());
    let err = client.ask(&QueryRequest::default()).await.unwrap_err();
    assert_eq!(err.code, Some(ErrorCode::ValidationError));
    assert_eq!(err.status, Some(400));
    assert_eq!(
        err.details.unwrap(),
        vec!["Limit: Limit must be a positive integer"]
    );
}

#[tokio::test]
async fn client_decodes_rate_limits_with_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/query"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "code": "RATE_LIMIT",
            "message": "Too many requests. Please try again later.",
            "retryAfter": 15
        })))
        .mount(&server)
        .await;

    let client = QueryClient::new(server.uri());
    let err = client.ask(&QueryRequest::default()).await.unwrap_err();
    assert_eq!(err.code, Some(ErrorCode::RateLimit));
    assert_eq!(err.retry_after, Some(15));

    let action = resolve_action(
        &err,
        &RecoveryContext {
            can_retry: true,
            retry_countdown: 15,
            in_flight: false,
        },
    )
    .unwrap();
    assert_eq!(action.label, "Retry in 15 seconds");
}

#[tokio::test]
async fn client_decodes_transport_failures() {
    // Port 1 is never listening; the connect error must surface as the
    // friendly network message, not a raw reqwest error.
    let client = QueryClient::new("http://127.0.0.1:1");
    let err = client
        .ask(&QueryRequest {
            question: "hello".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, Some(ErrorCode::InternalError));
    assert!(err.message.contains("check your connection"));
}
