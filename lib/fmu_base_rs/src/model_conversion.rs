// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

use roxmltree::{Document, Node};

use crate::errors::FmuError;
use crate::model_description as MD;

const ROOT_ELEMENT: &str = "fmiModelDescription";
const VERSION_ATTRIBUTE: &str = "fmiVersion";

/// Reads the `fmiVersion` attribute of the root element without parsing the
/// whole document.
pub fn extract_version(xml: &str) -> Option<String> {
    let start = xml.find(&format!("<{}", ROOT_ELEMENT))?;
    let tag = &xml[start + ROOT_ELEMENT.len() + 1..];
    let tag = &tag[..tag.find('>')?];

    let mut rest = tag;
    while let Some(pos) = rest.find(VERSION_ATTRIBUTE) {
        let is_attribute = rest[..pos].chars().last().map_or(false, char::is_whitespace);
        let after = &rest[pos + VERSION_ATTRIBUTE.len()..];

        if is_attribute {
            if let Some(value) = after.trim_start().strip_prefix('=') {
                let value = value.trim_start();
                let quote = value.chars().next()?;
                if quote == '"' || quote == '\'' {
                    let inner = &value[1..];
                    let end = inner.find(quote)?;
                    return Some(inner[..end].to_string());
                }
                return None;
            }
        }
        rest = after;
    }

    None
}

pub fn parse_model_description(xml: &str) -> Result<MD::ModelDescription, FmuError> {
    let doc = Document::parse(xml)?;
    convert_model_description(&doc)
}

pub fn convert_model_description(doc: &Document) -> Result<MD::ModelDescription, FmuError> {
    let root = doc.root_element();
    if !root.has_tag_name(ROOT_ELEMENT) {
        return Err(FmuError::InvalidModelDescription(
            format!("unexpected root element `{}`", root.tag_name().name())));
    }

    let mut md = MD::ModelDescription {
        fmi_version: String::from(root.attribute(VERSION_ATTRIBUTE).unwrap_or_default()),
        model: convert_model_info(&root)?,
        co_simulation: None,
        model_exchange: None,
        experiment: None,
        log_categories: Vec::new(),
        variables: Vec::new()
    };

    for child in root.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "CoSimulation" => md.co_simulation = Some(convert_execution_mode(&child)?),
            "ModelExchange" => md.model_exchange = Some(convert_execution_mode(&child)?),
            "DefaultExperiment" => md.experiment = Some(convert_experiment(&child)?),
            "LogCategories" => md.log_categories = convert_log_categories(&child),
            "ModelVariables" => md.variables = convert_variables(&child)?,
            _ => {}
        }
    }

    Ok(md)
}

pub fn convert_model_info(root: &Node) -> Result<MD::ModelInfo, FmuError> {
    Ok(MD::ModelInfo {
        name: String::from(root.attribute("modelName").unwrap_or_default()),
        guid: String::from(root.attribute("guid").unwrap_or_default()),
        description: String::from(root.attribute("description").unwrap_or_default()),
        generation_tool: String::from(root.attribute("generationTool").unwrap_or_default()),
        generation_date_time: String::from(root.attribute("generationDateAndTime").unwrap_or_default()),
        variable_naming_convention: String::from(root.attribute("variableNamingConvention").unwrap_or("flat")),
        number_of_event_indicators: parse_attribute(root, "numberOfEventIndicators")?.unwrap_or(0)
    })
}

pub fn convert_execution_mode(node: &Node) -> Result<MD::ExecutionModeInfo, FmuError> {
    let model_identifier = node.attribute("modelIdentifier")
        .ok_or_else(|| FmuError::InvalidModelDescription(
            format!("`{}` element without modelIdentifier", node.tag_name().name())))?;

    Ok(MD::ExecutionModeInfo {
        model_identifier: model_identifier.to_string(),
        capabilities: convert_capabilities(node)
    })
}

pub fn convert_capabilities(node: &Node) -> MD::Capabilities {
    MD::Capabilities {
        needs_execution_tool: parse_flag(node, "needsExecutionTool"),
        can_handle_variable_communication_step_size: parse_flag(node, "canHandleVariableCommunicationStepSize"),
        can_interpolate_inputs: parse_flag(node, "canInterpolateInputs"),
        can_be_instantiated_only_once_per_process: parse_flag(node, "canBeInstantiatedOnlyOncePerProcess"),
        can_get_and_set_fmu_state: parse_flag(node, "canGetAndSetFMUstate"),
        can_serialize_fmu_state: parse_flag(node, "canSerializeFMUstate"),
        provides_directional_derivative: parse_flag(node, "providesDirectionalDerivative")
    }
}

pub fn convert_experiment(node: &Node) -> Result<MD::ExperimentInfo, FmuError> {
    Ok(MD::ExperimentInfo {
        start_time: parse_attribute(node, "startTime")?,
        stop_time: parse_attribute(node, "stopTime")?,
        tolerance: parse_attribute(node, "tolerance")?,
        step_size: parse_attribute(node, "stepSize")?
    })
}

pub fn convert_log_categories(node: &Node) -> Vec<MD::LogCategory> {
    node.children()
        .filter(|n| n.has_tag_name("Category"))
        .map(|n| MD::LogCategory {
            name: String::from(n.attribute("name").unwrap_or_default()),
            description: String::from(n.attribute("description").unwrap_or_default())
        })
        .collect()
}

pub fn convert_variables(node: &Node) -> Result<Vec<MD::ModelVariable>, FmuError> {
    let mut vars: Vec<MD::ModelVariable> = Vec::new();

    for var in node.children().filter(|n| n.has_tag_name("ScalarVariable")) {
        let name = var.attribute("name")
            .ok_or_else(|| FmuError::InvalidModelDescription("ScalarVariable without name".to_string()))?;

        let value_reference = parse_attribute::<u32>(&var, "valueReference")?
            .ok_or_else(|| FmuError::InvalidModelDescription(
                format!("ScalarVariable `{}` without valueReference", name)))?;

        let type_node = var.children()
            .filter(|n| n.is_element())
            .find(|n| convert_value_type(n.tag_name().name()).is_some())
            .ok_or_else(|| FmuError::InvalidModelDescription(
                format!("ScalarVariable `{}` without type element", name)))?;

        vars.push(
            MD::ModelVariable {
                value_reference,
                name: name.to_string(),
                value_type: convert_value_type(type_node.tag_name().name())
                    .unwrap_or(MD::VariableType::Real),
                description: String::from(var.attribute("description").unwrap_or_default()),
                causality: convert_causality(var.attribute("causality").unwrap_or("local"))?,
                variability: convert_variability(var.attribute("variability").unwrap_or("continuous"))?,
                start: type_node.attribute("start").map(String::from)
            }
        );
    }

    Ok(vars)
}

pub fn convert_causality(caus: &str) -> Result<MD::CausalityType, FmuError> {
    match caus {
        "parameter" => Ok(MD::CausalityType::Parameter),
        "calculatedParameter" => Ok(MD::CausalityType::CalculatedParameter),
        "input" => Ok(MD::CausalityType::Input),
        "output" => Ok(MD::CausalityType::Output),
        "local" => Ok(MD::CausalityType::Local),
        "independent" => Ok(MD::CausalityType::Independent),
        _ => Err(FmuError::InvalidModelDescription(format!("unknown causality `{}`", caus))),
    }
}

pub fn convert_variability(var: &str) -> Result<MD::VariabilityType, FmuError> {
    match var {
        "constant" => Ok(MD::VariabilityType::Constant),
        "fixed" => Ok(MD::VariabilityType::Fixed),
        "tunable" => Ok(MD::VariabilityType::Tunable),
        "discrete" => Ok(MD::VariabilityType::Discrete),
        "continuous" => Ok(MD::VariabilityType::Continuous),
        _ => Err(FmuError::InvalidModelDescription(format!("unknown variability `{}`", var))),
    }
}

pub fn convert_value_type(element: &str) -> Option<MD::VariableType> {
    match element {
        "Real" => Some(MD::VariableType::Real),
        "Integer" => Some(MD::VariableType::Integer),
        "Boolean" => Some(MD::VariableType::Boolean),
        "String" => Some(MD::VariableType::String),
        "Enumeration" => Some(MD::VariableType::Enumeration),
        _ => None,
    }
}

fn parse_flag(node: &Node, name: &str) -> bool {
    node.attribute(name) == Some("true")
}

fn parse_attribute<T: std::str::FromStr>(node: &Node, name: &str) -> Result<Option<T>, FmuError> {
    match node.attribute(name) {
        None => Ok(None),
        Some(text) => text.trim().parse::<T>()
            .map(Some)
            .map_err(|_| FmuError::InvalidModelDescription(
                format!("invalid value `{}` for attribute `{}`", text, name))),
    }
}
