//! Errors raised by the external collaborators (data, portfolio, execution).

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ComponentError {
    #[error("unknown symbol '{0}'")]
    UnknownSymbol(String),
    #[error("no price available for '{0}'")]
    MissingPrice(String),
    #[error("statistics unavailable: {0}")]
    StatsUnavailable(String),
}
