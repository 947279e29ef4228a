// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

use crate::types::{ExecutionMode, Status};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FmuError {
    #[error("Missing FMI function: `{0}`")]
    MissingFunction(String),
    #[error("Invalid invocation order")]
    InvalidCallingOrder,
    #[error("FMI function `{0}` returned status `{1}`")]
    CallFailed(String, Status),
    #[error("Could not instantiate model `{0}`")]
    InstantiationFailed(String),
    #[error("Could not complete simulation step, status `{0}`")]
    StepFailed(Status),
    #[error("Invalid communication step size `{0}`")]
    InvalidStepSize(f64),
    #[error("The FMI version of the package could not be read from `{0}`")]
    MissingVersion(String),
    #[error("The package implements FMI `{0}`, but expected FMI `{1}`")]
    VersionMismatch(String, String),
    #[error("No {0} element found in model description")]
    MissingExecutionMode(ExecutionMode),
    #[error("Invalid model description: `{0}`")]
    InvalidModelDescription(String),
    #[error(transparent)]
    XmlError(#[from] roxmltree::Error),
    #[error("Interface functions could not be bound from `{0}`")]
    BindFailed(String),
    #[error("Invalid string value for value reference `{0}`")]
    InvalidStringValue(u32),
    #[error("Not implemented: `{0}`")]
    NotImplementedError(String)
}
