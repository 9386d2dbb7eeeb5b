use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum BrokerError {
    #[error(transparent)]
    Config(#[from] broker_base::ConfigError),
    #[error(transparent)]
    Core(#[from] broker_base::Error),
}

pub type Result<T> = std::result::Result<T, BrokerError>;
