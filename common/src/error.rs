use std::path::PathBuf;

/// The workspace's single error vocabulary (`spec.md` §7).
///
/// Grounded on `modules/fundamental/src/error.rs`'s flat `thiserror` enum:
/// one variant per failure kind, `#[error(transparent)]` for wrapped
/// causes, plain messages for everything the spec names by category
/// rather than by wrapped type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --- input errors ---
    #[error("invalid CVE format: {0:?}")]
    InvalidCveFormat(String),
    #[error("field must not be empty: {0}")]
    EmptyField(&'static str),
    #[error("name already in use: {0}")]
    NameTaken(String),
    #[error("name not found: {0}")]
    NameNotFound(String),
    #[error("duplicate id: {0}")]
    DuplicateId(String),
    #[error("path is out of scope: {0}")]
    OutOfScope(PathBuf),
    #[error("path escapes its scope root: {0}")]
    PathEscape(PathBuf),

    // --- parse errors ---
    #[error("not a Burp Suite export: {0}")]
    NotABurpExport(String),
    #[error("malformed XML: {0}")]
    MalformedXml(String),
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),
    #[error("file too large: {size} bytes (limit {limit})")]
    FileTooLarge { size: u64, limit: u64 },

    // --- external errors ---
    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),
    #[error("vector database unavailable: {0}")]
    VectorDbUnavailable(String),
    #[error("binary analyzer timed out")]
    AnalyzerTimeout,
    #[error("binary analyzer executable not found: {0}")]
    BinaryNotFound(PathBuf),
    #[error("analyzer script not found: {0}")]
    ScriptNotFound(String),
    #[error("analyzer exited with code {code}: {output}")]
    ExitNonZero { code: i32, output: String },

    // --- concurrency errors ---
    #[error("operation cancelled")]
    Cancelled,
    #[error("operation timed out")]
    Timeout,
    #[error("lock poisoned")]
    LockPoisoned,

    // --- persistence errors ---
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("corrupt record: {0}")]
    CorruptRecord(String),
}

impl Error {
    /// Render as a `[ERROR] …`/`[WARN] …` prefixed sentence per `spec.md`
    /// §7, so command processors never have to remember the marker.
    pub fn as_user_sentence(&self) -> String {
        format!("[ERROR] {self}")
    }
}

/// A non-fatal warning attached to an `ExtractedData`/`BurpParseResult`
/// (`spec.md` §7: "Parse errors on a single file or issue degrade to a
/// warning ... the whole operation continues").
pub fn warn_sentence(message: impl AsRef<str>) -> String {
    format!("[WARN] {}", message.as_ref())
}

pub type Result<T> = std::result::Result<T, Error>;
