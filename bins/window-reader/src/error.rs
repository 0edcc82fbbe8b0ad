use window_engine::{StatusClass, WindowError};

#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("dump ({stream}): {source}")]
    Dump {
        stream: String,
        source: window_api::ServiceError,
    },

    #[error("invalid input: {0}")]
    Input(String),

    #[error("{0}")]
    Window(#[from] WindowError),

    #[error("output: {0}")]
    Output(#[from] serde_json::Error),
}

impl ReaderError {
    /// 2: исправить должен вызывающий; 1: сбой сервиса или окружения.
    pub fn exit_code(&self) -> i32 {
        match self {
            ReaderError::Config { .. } | ReaderError::Input(_) => 2,
            ReaderError::Window(e) => match e.status_class() {
                StatusClass::Client => 2,
                StatusClass::Service => 1,
            },
            ReaderError::Dump { .. } | ReaderError::Output(_) => 1,
        }
    }
}
