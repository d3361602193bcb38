pub type AppResult<T> = Result<T, AppError>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },
    #[error("failed to open document: {0}")]
    DocumentLoad(String),
    #[error("render failed for page {page}")]
    PageRender {
        page: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<std::io::Error> for AppError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            source,
            context: "I/O operation failed".to_string(),
        }
    }
}

impl AppError {
    pub fn io_with_context(source: std::io::Error, context: impl Into<String>) -> Self {
        Self::Io {
            source,
            context: context.into(),
        }
    }

    pub fn document_load(message: impl Into<String>) -> Self {
        Self::DocumentLoad(message.into())
    }

    pub fn page_render(page: usize, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::PageRender {
            page,
            source: Box::new(source),
        }
    }

    pub fn page_render_message(page: usize, message: impl Into<String>) -> Self {
        Self::PageRender {
            page,
            source: Box::<dyn std::error::Error + Send + Sync>::from(message.into()),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::AppError;

    #[test]
    fn page_render_error_wraps_page_and_source() {
        let err = AppError::page_render(7, AppError::invalid_argument("bad page"));
        assert!(matches!(err, AppError::PageRender { page: 7, .. }));
        assert_eq!(err.to_string(), "render failed for page 7");
    }

    #[test]
    fn document_load_error_carries_message() {
        let err = AppError::document_load("not a PDF");
        assert_eq!(err.to_string(), "failed to open document: not a PDF");
    }
}
