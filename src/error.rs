use crate::{config, parameters, render, stack, staging, storage, template};

/// Run-level error. Every stage's error folds into one of these kinds, which
/// decide the process exit code.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    Resolution(String),

    #[error("{0}")]
    Render(String),

    #[error("{0}")]
    Deployment(String),

    #[error("{0}")]
    Io(String),
}

impl Error {
    pub fn exit_code(&self) -> u8 {
        return match self {
            Error::Io(_) => 1,
            Error::Config(_) => 2,
            Error::Resolution(_) => 3,
            Error::Render(_) => 4,
            Error::Deployment(_) => 5,
        };
    }
}

impl From<config::Error> for Error {
    fn from(error: config::Error) -> Self {
        return Error::Config(error.to_string());
    }
}

impl From<parameters::Error> for Error {
    fn from(error: parameters::Error) -> Self {
        return match error {
            parameters::Error::InvalidValue { .. } => Error::Config(error.to_string()),
            _ => Error::Resolution(error.to_string()),
        };
    }
}

impl From<staging::Error> for Error {
    fn from(error: staging::Error) -> Self {
        return match error {
            staging::Error::Io(..) => Error::Io(error.to_string()),
            _ => Error::Config(error.to_string()),
        };
    }
}

impl From<render::Error> for Error {
    fn from(error: render::Error) -> Self {
        return match error {
            render::Error::Io(..) => Error::Io(error.to_string()),
            _ => Error::Render(error.to_string()),
        };
    }
}

impl From<template::Error> for Error {
    fn from(error: template::Error) -> Self {
        return match error {
            template::Error::Io(..) => Error::Io(error.to_string()),
            _ => Error::Render(error.to_string()),
        };
    }
}

impl From<storage::Error> for Error {
    fn from(error: storage::Error) -> Self {
        return match error {
            storage::Error::Io(..) => Error::Io(error.to_string()),
            _ => Error::Deployment(error.to_string()),
        };
    }
}

impl From<stack::Error> for Error {
    fn from(error: stack::Error) -> Self {
        return Error::Deployment(error.to_string());
    }
}
