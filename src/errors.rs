use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HubError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(policyhub::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(policyhub::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(policyhub::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    #[diagnostic(code(policyhub::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("Bad request: {0}")]
    #[diagnostic(code(policyhub::bad_request))]
    BadRequest(String),

    #[error("{0}")]
    #[diagnostic(code(policyhub::other))]
    Other(String),
}
