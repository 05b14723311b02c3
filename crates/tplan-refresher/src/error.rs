use thiserror::Error;

#[derive(Error, Debug)]
pub enum RefresherError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Task error: {0}")]
    Task(String),
}
