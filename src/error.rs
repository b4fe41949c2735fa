use std::path::PathBuf;

/// Coarse classification of a [`CompileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Structural,
    Scoping,
    ClientScript,
    Directive,
    Parse,
    Io,
    Config,
}

/// Every failure is fatal to the compile call that raised it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("Template should have only one root node")]
    MultipleRoots,

    #[error("Template must contain a root element")]
    EmptyTemplate,

    #[error("unexpected {directive}")]
    UnexpectedElse { directive: String },

    #[error(
        "Named slot \"{slot}\" cannot be declared on component <{component}>; use <template v-slot:{slot}> instead"
    )]
    NamedSlotOnComponent { slot: String, component: String },

    #[error("Only one <script> tag is allowed per component template")]
    MultipleScripts,

    #[error("The <{tag}> tag must be placed at the root level of the template")]
    NotAtRootLevel { tag: String },

    #[error("Scoped styles require the template root element to be a single HTML element.")]
    ScopedStyleRoot,

    #[error("Unable to parse client script: {0}")]
    ScriptParse(String),

    #[error("Client script must export a default object")]
    MissingDefaultExport,

    #[error("Client script must contain exactly one default export")]
    MultipleDefaultExports,

    #[error("Client script default export must be an object literal")]
    DefaultExportNotObject,

    #[error("Unsupported key \"{0}\" in client script export")]
    UnsupportedKey(String),

    #[error("Client script export uses an unsupported property name")]
    UnsupportedPropertyName,

    #[error("Client script \"{0}\" section must be an object literal")]
    SectionNotObject(String),

    #[error("Client script \"data\" section must be a function")]
    DataNotFunction,

    #[error("Client script \"data\" function must return an object literal")]
    DataNotReturningObject,

    #[error("Lifecycle hook \"{0}\" must be a function")]
    LifecycleNotFunction(String),

    #[error("unexpected value in v-for \"{0}\"")]
    InvalidLoop(String),

    #[error("Invalid directive \"{directive}\": {reason}")]
    InvalidDirective { directive: String, reason: String },

    #[error("Failed to parse template: {0}")]
    Parse(String),

    #[error("I/O error on {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },

    #[error("Invalid compiler options: {0}")]
    Config(String),
}

impl CompileError {
    pub fn kind(&self) -> ErrorKind {
        use CompileError::*;
        match self {
            MultipleRoots
            | EmptyTemplate
            | UnexpectedElse { .. }
            | NamedSlotOnComponent { .. }
            | MultipleScripts
            | NotAtRootLevel { .. } => ErrorKind::Structural,
            ScopedStyleRoot => ErrorKind::Scoping,
            ScriptParse(_)
            | MissingDefaultExport
            | MultipleDefaultExports
            | DefaultExportNotObject
            | UnsupportedKey(_)
            | UnsupportedPropertyName
            | SectionNotObject(_)
            | DataNotFunction
            | DataNotReturningObject
            | LifecycleNotFunction(_) => ErrorKind::ClientScript,
            InvalidLoop(_) | InvalidDirective { .. } => ErrorKind::Directive,
            Parse(_) => ErrorKind::Parse,
            Io { .. } => ErrorKind::Io,
            Config(_) => ErrorKind::Config,
        }
    }

    /// Stable machine-readable code, suitable for tooling.
    pub fn code(&self) -> &'static str {
        use CompileError::*;
        match self {
            MultipleRoots => "FLOW-STRUCT-001",
            EmptyTemplate => "FLOW-STRUCT-002",
            UnexpectedElse { .. } => "FLOW-STRUCT-003",
            NamedSlotOnComponent { .. } => "FLOW-STRUCT-004",
            MultipleScripts => "FLOW-STRUCT-005",
            NotAtRootLevel { .. } => "FLOW-STRUCT-006",
            ScopedStyleRoot => "FLOW-SCOPE-001",
            ScriptParse(_) => "FLOW-SCRIPT-001",
            MissingDefaultExport => "FLOW-SCRIPT-002",
            MultipleDefaultExports => "FLOW-SCRIPT-003",
            DefaultExportNotObject => "FLOW-SCRIPT-004",
            UnsupportedKey(_) => "FLOW-SCRIPT-005",
            UnsupportedPropertyName => "FLOW-SCRIPT-006",
            SectionNotObject(_) => "FLOW-SCRIPT-007",
            DataNotFunction => "FLOW-SCRIPT-008",
            DataNotReturningObject => "FLOW-SCRIPT-009",
            LifecycleNotFunction(_) => "FLOW-SCRIPT-010",
            InvalidLoop(_) => "FLOW-DIR-001",
            InvalidDirective { .. } => "FLOW-DIR-002",
            Parse(_) => "FLOW-PARSE-001",
            Io { .. } => "FLOW-IO-001",
            Config(_) => "FLOW-CONFIG-001",
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        CompileError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
