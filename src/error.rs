use thiserror::Error;

#[derive(Error, Debug)]
pub enum PplxError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    #[error("No PPLX files found: {0}")]
    NoFilesFound(String),

    #[error("XML parse error in {file}: {message}")]
    Parse { file: String, message: String },

    #[error("Missing structure element in {file}: {element}")]
    MissingStructure { file: String, element: String },

    #[error("Pole attribute not found: {0}")]
    AttributeNotFound(String),

    #[error("Pole index {index} out of range ({count} WoodPole elements)")]
    PoleOutOfRange { index: usize, count: usize },

    #[error("Excel read error: {0}")]
    ExcelRead(String),

    #[error("Excel sheet not found: '{0}'")]
    MissingSheet(String),

    #[error("Excel columns missing: {}", .0.join(", "))]
    SchemaMismatch(Vec<String>),

    #[error("Excel generation error: {0}")]
    ExcelGeneration(String),

    #[error("Duplicate SCID '{scid}' in batch (already seen in {first})")]
    DuplicateScid { scid: String, first: String },

    #[error("ZIP archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Batch worker stopped unexpectedly")]
    WorkerPanicked,

    #[error(transparent)]
    Common(#[from] pplx_common::Error),
}

impl PplxError {
    pub fn parse(file: impl Into<String>, err: impl std::fmt::Display) -> Self {
        PplxError::Parse {
            file: file.into(),
            message: err.to_string(),
        }
    }

    /// Excel problems that leave the batch able to run without node data
    pub fn is_recoverable_excel(&self) -> bool {
        matches!(self, PplxError::MissingSheet(_) | PplxError::SchemaMismatch(_))
    }
}

impl From<rust_xlsxwriter::XlsxError> for PplxError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        PplxError::ExcelGeneration(err.to_string())
    }
}

impl From<calamine::Error> for PplxError {
    fn from(err: calamine::Error) -> Self {
        PplxError::ExcelRead(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PplxError>;
