use strum::EnumIs;
use thiserror::Error;

/// Classification of failures raised while matching.
#[derive(Debug, Error, EnumIs)]
pub enum ErrorKind {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration file '{file}': {message}")]
    Config { file: String, message: String },

    /// A call value was resolved without any evaluation context.
    #[error("Cannot evaluate call `{call}` without a context")]
    NoContext { call: String },

    #[error("Variable `?{0}` is not bound in the current context")]
    UnboundVariable(String),

    #[error("Slot {slot} is out of range for fact of template `{template}` ({len} slots)")]
    SlotOutOfRange {
        template: String,
        slot: usize,
        len: usize,
    },

    #[error("Template `{template}` declares {expected} slot(s), {found} value(s) given")]
    SlotCount {
        template: String,
        expected: usize,
        found: usize,
    },

    #[error("Template `{template}` has no slot named `{slot}`")]
    UnknownSlot { template: String, slot: String },

    #[error("Template `{0}` is not defined")]
    UndefinedTemplate(String),

    #[error("Template `{0}` is already defined")]
    DuplicateTemplate(String),

    /// The ancestor walk exceeded the configured depth guard.
    #[error("Ancestor chain of template `{template}` exceeds the maximum depth of {max}")]
    TemplateTooDeep { template: String, max: usize },

    #[error("Function `{0}` has no implementation")]
    UndefinedFunction(String),

    #[error("Function `{function}` expected {expected} argument(s), got {found}")]
    WrongArgumentCount {
        function: String,
        expected: String,
        found: usize,
    },

    #[error("Expected a value of kind {expected}, found {found} `{value}`")]
    WrongKind {
        expected: &'static str,
        found: &'static str,
        value: String,
    },

    #[error("Index {index} is out of range for a list of length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    /// A vertex was invoked through a call protocol it does not accept.
    #[error("Node {node} does not accept a call from the {direction}")]
    UnsupportedCall {
        node: String,
        direction: &'static str,
    },

    #[error("A token without facts reached a test node")]
    EmptyToken,

    #[error("Node {0} does not exist in this network")]
    UnknownNode(String),

    #[error("Matching was cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// The single error type of the crate.
///
/// Carries its [`ErrorKind`], an optional cause (the causal chain is exposed
/// through [`std::error::Error::source`]) and a trail of context lines appended
/// while the error travels up through the network.
#[derive(Debug, Error)]
pub struct ReteError {
    kind: ErrorKind,
    trail: Vec<String>,
    #[source]
    cause: Option<Box<ReteError>>,
}

impl ReteError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            trail: Vec::new(),
            cause: None,
        }
    }

    /// Build a new error of the given kind caused by `cause`.
    pub fn caused_by(kind: ErrorKind, cause: ReteError) -> Self {
        Self {
            kind,
            trail: Vec::new(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Append a line to the context trail.
    pub fn context(mut self, line: impl Into<String>) -> Self {
        self.trail.push(line.into());
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn trail(&self) -> &[String] {
        &self.trail
    }

    pub fn cause(&self) -> Option<&ReteError> {
        self.cause.as_deref()
    }

    /// Innermost error of the causal chain.
    pub fn root_cause(&self) -> &ReteError {
        let mut current = self;
        while let Some(cause) = current.cause() {
            current = cause;
        }
        current
    }
}

impl std::fmt::Display for ReteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        for line in &self.trail {
            write!(f, "\n  while {}", line)?;
        }
        Ok(())
    }
}

impl From<ErrorKind> for ReteError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<std::io::Error> for ReteError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::Io(err))
    }
}

pub type ReteResult<T> = Result<T, ReteError>;

/// Extension to decorate the error of a [`ReteResult`] with a context line.
pub trait ResultExt<T> {
    fn context_with(self, line: impl FnOnce() -> String) -> ReteResult<T>;
}

impl<T> ResultExt<T> for ReteResult<T> {
    fn context_with(self, line: impl FnOnce() -> String) -> ReteResult<T> {
        self.map_err(|e| e.context(line()))
    }
}
