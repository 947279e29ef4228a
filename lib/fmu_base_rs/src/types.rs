// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

use std::fmt;

use fmi2_abi as FMI;

/// Status returned by every FMI call, ordered by severity.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub enum Status {
    OK,
    Warning,
    Discard,
    Error,
    Fatal,
    Pending
}

impl Status {
    /// Lifecycle calls accept `OK` and `Warning` only.
    pub fn is_worse_than_warning(&self) -> bool {
        *self > Status::Warning
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::OK => "ok",
            Status::Warning => "warning",
            Status::Discard => "discard",
            Status::Error => "error",
            Status::Fatal => "fatal",
            Status::Pending => "pending",
        }
    }
}

impl From<FMI::fmi2Status> for Status {
    fn from(st: FMI::fmi2Status) -> Self {
        match st {
            FMI::fmi2OK => Status::OK,
            FMI::fmi2Warning => Status::Warning,
            FMI::fmi2Discard => Status::Discard,
            FMI::fmi2Error => Status::Error,
            FMI::fmi2Fatal => Status::Fatal,
            FMI::fmi2Pending => Status::Pending,
            _ => Status::Error,
        }
    }
}

impl From<Status> for FMI::fmi2Status {
    fn from(st: Status) -> Self {
        match st {
            Status::OK => FMI::fmi2OK,
            Status::Warning => FMI::fmi2Warning,
            Status::Discard => FMI::fmi2Discard,
            Status::Error => FMI::fmi2Error,
            Status::Fatal => FMI::fmi2Fatal,
            Status::Pending => FMI::fmi2Pending,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of the two mutually exclusive FMI interfaces is used.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ExecutionMode {
    CoSimulation,
    ModelExchange
}

impl ExecutionMode {
    pub fn fmi2_type(&self) -> FMI::fmi2Type {
        match self {
            ExecutionMode::CoSimulation => FMI::fmi2CoSimulation,
            ExecutionMode::ModelExchange => FMI::fmi2ModelExchange,
        }
    }

    /// Element name of the mode record in `modelDescription.xml`
    pub fn element_name(&self) -> &'static str {
        match self {
            ExecutionMode::CoSimulation => "CoSimulation",
            ExecutionMode::ModelExchange => "ModelExchange",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element_name())
    }
}

/// Result of a successful call to the step operation.
///
/// * `Advanced` - the step completed, session time is now `time`
/// * `TerminationRequested` - the model rejected the step and asked to end the simulation
/// * `EndReached` - session time already equals the end time, nothing was stepped
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    Advanced { time: f64 },
    TerminationRequested,
    EndReached
}
