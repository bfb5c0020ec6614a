//! Classification of request-level failures into fatal and retryable ones.
//!
//! A [ClassifierChain] is an ordered list of [Rule]s evaluated over a [ServiceError]. The first
//! rule that matches decides the [FailureKind]; an error that no rule matches is retryable.
use thiserror::Error;

/// Codes services use to reject a caller that lacks permissions.
pub const AUTHORIZATION_ERROR_CODES: &[&str] =
    &["NotAuthorized", "AccessDenied", "AccessDeniedException"];

/// Broad category of a service failure, filled in by the service binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// The service answered with an error response.
    Service,
    /// The target resource (queue, stream) does not exist.
    ResourceNotFound,
    /// The request never produced a response (connection refused, timeout, ...).
    Transport,
    /// An entry could not be turned into a valid request.
    InvalidEntry,
}

/// A request-level failure reported by a [crate::client::BatchClient].
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    /// Service provided error code, if the service answered at all.
    pub code: Option<String>,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ServiceError {
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn invalid_entry(id: &str, reason: &str) -> Self {
        Self::new(
            ServiceErrorKind::InvalidEntry,
            format!("entry {id} could not be converted: {reason}"),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Fatal,
    Retryable,
}

/// Outcome of running a [ServiceError] through a [ClassifierChain].
#[derive(Debug)]
pub struct ClassifiedFailure {
    pub kind: FailureKind,
    pub message: String,
    pub cause: ServiceError,
}

impl ClassifiedFailure {
    pub fn is_fatal(&self) -> bool {
        self.kind == FailureKind::Fatal
    }
}

/// Predicate over a [ServiceError].
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Matches when the error carries one of the codes.
    ErrorCode(&'static [&'static str]),
    /// Matches on the error category.
    Kind(ServiceErrorKind),
}

impl Matcher {
    fn matches(&self, err: &ServiceError) -> bool {
        match self {
            Matcher::ErrorCode(codes) => err
                .code
                .as_deref()
                .is_some_and(|code| codes.contains(&code)),
            Matcher::Kind(kind) => err.kind == *kind,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    name: &'static str,
    matcher: Matcher,
    kind: FailureKind,
    message: &'static str,
}

impl Rule {
    pub fn new(
        name: &'static str,
        matcher: Matcher,
        kind: FailureKind,
        message: &'static str,
    ) -> Self {
        Self {
            name,
            matcher,
            kind,
            message,
        }
    }

    /// A rule that marks the matched errors as non-recoverable.
    pub fn fatal(name: &'static str, matcher: Matcher, message: &'static str) -> Self {
        Self::new(name, matcher, FailureKind::Fatal, message)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Ordered, first-match-wins list of [Rule]s.
#[derive(Debug, Clone, Default)]
pub struct ClassifierChain {
    rules: Vec<Rule>,
}

impl ClassifierChain {
    /// An empty chain, which classifies everything as retryable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Authorization failures, missing resources and unconvertible entries are fatal.
    pub fn standard() -> Self {
        Self::new()
            .with_rule(Rule::fatal(
                "authorization",
                Matcher::ErrorCode(AUTHORIZATION_ERROR_CODES),
                "Encountered non-recoverable exception: the caller is not authorized",
            ))
            .with_rule(Rule::fatal(
                "resource-not-found",
                Matcher::Kind(ServiceErrorKind::ResourceNotFound),
                "Encountered non-recoverable exception relating to not being able to find the specified resources",
            ))
            .with_rule(Rule::fatal(
                "invalid-entry",
                Matcher::Kind(ServiceErrorKind::InvalidEntry),
                "Encountered non-recoverable exception: a record could not be converted into a batch entry",
            ))
    }

    /// Appends a rule; it is evaluated after all the rules already in the chain.
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn classify(&self, err: ServiceError) -> ClassifiedFailure {
        match self.rules.iter().find(|rule| rule.matcher.matches(&err)) {
            Some(rule) => {
                let message = match err.code.as_deref() {
                    Some(code) => format!("{} ({code})", rule.message),
                    None => rule.message.to_string(),
                };
                ClassifiedFailure {
                    kind: rule.kind,
                    message,
                    cause: err,
                }
            }
            None => ClassifiedFailure {
                kind: FailureKind::Retryable,
                message: format!("Encountered retryable exception: {}", err.message),
                cause: err,
            },
        }
    }
}
