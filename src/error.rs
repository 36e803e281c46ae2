use thiserror::Error;

#[derive(Error, Debug)]
pub enum MybaError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("git {command} failed: {detail}")]
    GitCommand { command: String, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cipher error: {0}")]
    Cipher(String),

    #[error("Wrong password: decrypted data is not valid text")]
    WrongPassword,

    #[error("Unsupported entry: {0}")]
    Unsupported(String),

    #[error("Plain repository already has history; set YES_OVERWRITE=1 to restore over it")]
    AlreadyRestored,

    #[error("Refused to overwrite {0}")]
    OverwriteRefused(String),

    #[error("{0}")]
    Usage(String),

    #[error("{0}")]
    Other(String),
}

impl MybaError {
    pub fn exit_code(&self) -> i32 {
        match self {
            MybaError::Usage(_) => 1,
            _ => 2,
        }
    }
}

pub type Result<T> = std::result::Result<T, MybaError>;
