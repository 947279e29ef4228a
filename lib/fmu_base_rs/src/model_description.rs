// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

use crate::types::ExecutionMode;

#[derive(Debug,Clone)]
pub struct ModelDescription {
    pub fmi_version: String,
    pub model: ModelInfo,
    pub co_simulation: Option<ExecutionModeInfo>,
    pub model_exchange: Option<ExecutionModeInfo>,
    pub experiment: Option<ExperimentInfo>,
    pub log_categories: Vec<LogCategory>,
    pub variables: Vec<ModelVariable>
}

impl ModelDescription {
    /// Mode record for the given execution mode, if the package supports it
    pub fn execution_mode(&self, mode: ExecutionMode) -> Option<&ExecutionModeInfo> {
        match mode {
            ExecutionMode::CoSimulation => self.co_simulation.as_ref(),
            ExecutionMode::ModelExchange => self.model_exchange.as_ref(),
        }
    }

    /// First variable of the given type with the given value reference
    pub fn find_variable(&self, value_type: VariableType, value_reference: u32) -> Option<&ModelVariable> {
        self.variables.iter()
            .find(|v| v.value_type == value_type && v.value_reference == value_reference)
    }
}

#[derive(Debug,Clone)]
pub struct ModelInfo {
    pub name: String,
    pub guid: String,
    pub description: String,
    pub generation_tool: String,
    pub generation_date_time: String,
    pub variable_naming_convention: String,
    pub number_of_event_indicators: u32
}

#[derive(Debug,Clone)]
pub struct ExecutionModeInfo {
    pub model_identifier: String,
    pub capabilities: Capabilities
}

#[derive(Debug,Clone,Default)]
pub struct Capabilities {
    pub needs_execution_tool: bool,
    pub can_handle_variable_communication_step_size: bool,
    pub can_interpolate_inputs: bool,
    pub can_be_instantiated_only_once_per_process: bool,
    pub can_get_and_set_fmu_state: bool,
    pub can_serialize_fmu_state: bool,
    pub provides_directional_derivative: bool
}

#[derive(Debug,Clone,Default)]
pub struct ExperimentInfo {
    pub start_time: Option<f64>,
    pub stop_time: Option<f64>,
    pub tolerance: Option<f64>,
    pub step_size: Option<f64>
}

#[derive(Debug,Clone)]
pub struct LogCategory {
    pub name: String,
    pub description: String
}

#[derive(Debug,Clone)]
pub struct ModelVariable {
    pub value_reference: u32,
    pub name: String,
    pub value_type: VariableType,
    pub description: String,
    pub causality: CausalityType,
    pub variability: VariabilityType,
    pub start: Option<String>
}

#[derive(Debug,Clone,Eq,PartialEq,Copy)]
pub enum VariableType {
    Real,
    Integer,
    Boolean,
    String,
    Enumeration
}

impl VariableType {
    /// Type letter used by `#<t><vr>#` references in log messages
    pub fn from_reference_tag(tag: char) -> Option<VariableType> {
        match tag {
            'r' => Some(VariableType::Real),
            'i' => Some(VariableType::Integer),
            'b' => Some(VariableType::Boolean),
            's' => Some(VariableType::String),
            _ => None
        }
    }
}

#[derive(Debug,Clone,Eq,PartialEq,Copy)]
pub enum CausalityType {
    Parameter,
    CalculatedParameter,
    Input,
    Output,
    Local,
    Independent
}

#[derive(Debug,Clone,Eq,PartialEq,Copy)]
pub enum VariabilityType {
    Constant,
    Fixed,
    Tunable,
    Discrete,
    Continuous
}
