/// Message-text classification of collaborator failures.
///
/// The planner and executor throw with free-text messages as the only
/// signal, so classification is a prioritized list of `(regex, class)`
/// rules evaluated in order — data, not control flow. New phrasings are
/// added to the tables, never as inline branches.
use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Planning,
    Execution,
}

/// Taxonomy class a sniffed message resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The system is not set up (schema never synced, nothing to plan against).
    Configuration,
    /// The caller asked for something disallowed (write through a read-only path).
    Validation,
    /// Query-time failure against the target store.
    Database,
    /// The collaborator's own dependency is unreachable or unreliable.
    ExternalService,
}

fn rule(pattern: &str, class: FailureClass) -> (Regex, FailureClass) {
    (
        Regex::new(pattern).expect("classification pattern is valid"),
        class,
    )
}

static SHARED_RULES: LazyLock<Vec<(Regex, FailureClass)>> = LazyLock::new(|| {
    vec![
        rule(r"(?i)\bsync\b|no tables found", FailureClass::Configuration),
        rule(
            r"(?i)read-?only|only SELECT|write operations? (is|are) not allowed",
            FailureClass::Validation,
        ),
        rule(
            r"(?i)ECONNREFUSED|ECONNRESET|ETIMEDOUT|timed? ?out|connection (refused|reset)",
            FailureClass::ExternalService,
        ),
    ]
});

static CREDENTIAL_RULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)access denied|check database credentials|authentication failed for user")
        .expect("credential pattern is valid")
});

/// Classify a collaborator failure message for the given stage. Unmatched
/// planning failures are someone else's service being unreliable; unmatched
/// execution failures are query-time database failures.
pub fn classify_failure(stage: Stage, message: &str) -> FailureClass {
    if stage == Stage::Execution && CREDENTIAL_RULE.is_match(message) {
        return FailureClass::Database;
    }
    for (pattern, class) in SHARED_RULES.iter() {
        if pattern.is_match(message) {
            return *class;
        }
    }
    match stage {
        Stage::Planning => FailureClass::ExternalService,
        Stage::Execution => FailureClass::Database,
    }
}

/// Whether an execution failure looks like a credential problem rather than
/// a bad query; these get a dedicated message without SQL attached.
pub fn is_credential_failure(message: &str) -> bool {
    CREDENTIAL_RULE.is_match(message)
}
