use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum IbError {
    #[error("resolution error: {0}")]
    Resolution(String),

    #[error("{relpath} is not doable: {reason}")]
    Plan { relpath: String, reason: String },

    #[error("no progress: stuck on {0:?}")]
    NoProgress(Vec<String>),

    #[error("slot error: {0}")]
    Slot(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("tool error: `{command}` exited with {status:?}\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    Tool {
        command: String,
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl IbError {
    pub fn plan(relpath: impl Into<String>, reason: impl Into<String>) -> Self {
        IbError::Plan {
            relpath: relpath.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IbError>;

/// Paths that fall outside both the source and output roots can't be
/// converted back into a spec; callers fold this into a resolution error.
pub fn outside_roots(path: &PathBuf) -> IbError {
    IbError::Resolution(format!("{} is outside src_root and out_root", path.display()))
}
