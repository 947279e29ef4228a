// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

//! Resolution of the FMI 2.0 function catalogue from a loaded module.
//!
//! FMI 2.0 modules export `fmi2`-prefixed symbols, modules built against the
//! 2.0 release candidate export the same interface with an `fmi` prefix. A
//! table is always filled by one full pass under a single convention.

use std::ffi::c_void;
use std::fmt;
use std::mem;

use libloading::Library;
use tracing::{debug, warn};

use fmi2_abi as FMI;
use fmu_base::types::ExecutionMode;

/// Symbol prefix generations, in the order they are tried
pub static NAMING_CONVENTIONS: [NamingConvention; 2] = [
    NamingConvention::Fmi2,
    NamingConvention::Fmi2Rc1];

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum NamingConvention {
    Fmi2,
    Fmi2Rc1
}

impl NamingConvention {
    pub fn prefix(&self) -> &'static str {
        match self {
            NamingConvention::Fmi2 => "fmi2",
            NamingConvention::Fmi2Rc1 => "fmi",
        }
    }
}

impl fmt::Display for NamingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Anything exported symbols can be looked up in
pub trait SymbolSource {
    fn lookup(&self, name: &str) -> Option<*const c_void>;
}

impl SymbolSource for Library {
    fn lookup(&self, name: &str) -> Option<*const c_void> {
        let symbol = unsafe { self.get::<unsafe extern "C" fn()>(name.as_bytes()) };
        match symbol {
            Ok(f) => Some(*f as *const c_void),
            Err(e) => {
                debug!("Error was: {}", e);
                None
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommonFunctions {
    pub get_types_platform: Option<FMI::fmi2GetTypesPlatformTYPE>,
    pub get_version: Option<FMI::fmi2GetVersionTYPE>,
    pub set_debug_logging: Option<FMI::fmi2SetDebugLoggingTYPE>,
    pub instantiate: Option<FMI::fmi2InstantiateTYPE>,
    pub free_instance: Option<FMI::fmi2FreeInstanceTYPE>,
    pub setup_experiment: Option<FMI::fmi2SetupExperimentTYPE>,
    pub enter_initialization_mode: Option<FMI::fmi2EnterInitializationModeTYPE>,
    pub exit_initialization_mode: Option<FMI::fmi2ExitInitializationModeTYPE>,
    pub terminate: Option<FMI::fmi2TerminateTYPE>,
    pub reset: Option<FMI::fmi2ResetTYPE>,
    pub get_real: Option<FMI::fmi2GetRealTYPE>,
    pub get_integer: Option<FMI::fmi2GetIntegerTYPE>,
    pub get_boolean: Option<FMI::fmi2GetBooleanTYPE>,
    pub get_string: Option<FMI::fmi2GetStringTYPE>,
    pub set_real: Option<FMI::fmi2SetRealTYPE>,
    pub set_integer: Option<FMI::fmi2SetIntegerTYPE>,
    pub set_boolean: Option<FMI::fmi2SetBooleanTYPE>,
    pub set_string: Option<FMI::fmi2SetStringTYPE>,
    pub get_fmu_state: Option<FMI::fmi2GetFMUstateTYPE>,
    pub set_fmu_state: Option<FMI::fmi2SetFMUstateTYPE>,
    pub free_fmu_state: Option<FMI::fmi2FreeFMUstateTYPE>,
    pub serialized_fmu_state_size: Option<FMI::fmi2SerializedFMUstateSizeTYPE>,
    pub serialize_fmu_state: Option<FMI::fmi2SerializeFMUstateTYPE>,
    pub de_serialize_fmu_state: Option<FMI::fmi2DeSerializeFMUstateTYPE>,
    pub get_directional_derivative: Option<FMI::fmi2GetDirectionalDerivativeTYPE>,
}

#[derive(Debug, Clone, Default)]
pub struct CoSimulationFunctions {
    pub set_real_input_derivatives: Option<FMI::fmi2SetRealInputDerivativesTYPE>,
    pub get_real_output_derivatives: Option<FMI::fmi2GetRealOutputDerivativesTYPE>,
    pub do_step: Option<FMI::fmi2DoStepTYPE>,
    pub cancel_step: Option<FMI::fmi2CancelStepTYPE>,
    pub get_status: Option<FMI::fmi2GetStatusTYPE>,
    pub get_real_status: Option<FMI::fmi2GetRealStatusTYPE>,
    pub get_integer_status: Option<FMI::fmi2GetIntegerStatusTYPE>,
    pub get_boolean_status: Option<FMI::fmi2GetBooleanStatusTYPE>,
    pub get_string_status: Option<FMI::fmi2GetStringStatusTYPE>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelExchangeFunctions {
    pub enter_event_mode: Option<FMI::fmi2EnterEventModeTYPE>,
    pub new_discrete_states: Option<FMI::fmi2NewDiscreteStatesTYPE>,
    pub enter_continuous_time_mode: Option<FMI::fmi2EnterContinuousTimeModeTYPE>,
    pub completed_integrator_step: Option<FMI::fmi2CompletedIntegratorStepTYPE>,
    pub set_time: Option<FMI::fmi2SetTimeTYPE>,
    pub set_continuous_states: Option<FMI::fmi2SetContinuousStatesTYPE>,
    pub get_derivatives: Option<FMI::fmi2GetDerivativesTYPE>,
    pub get_event_indicators: Option<FMI::fmi2GetEventIndicatorsTYPE>,
    pub get_continuous_states: Option<FMI::fmi2GetContinuousStatesTYPE>,
    pub get_nominals_of_continuous_states: Option<FMI::fmi2GetNominalsOfContinuousStatesTYPE>,
}

#[derive(Debug, Clone)]
pub enum ModeFunctions {
    CoSimulation(CoSimulationFunctions),
    ModelExchange(ModelExchangeFunctions)
}

/// Resolved entry points of one loaded module
#[derive(Debug, Clone)]
pub struct InterfaceTable {
    pub convention: NamingConvention,
    pub common: CommonFunctions,
    pub mode: ModeFunctions
}

impl InterfaceTable {
    /// Both load-bearing functions (version query, instantiate) are bound
    pub fn is_usable(&self) -> bool {
        self.common.get_version.is_some() && self.common.instantiate.is_some()
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        match self.mode {
            ModeFunctions::CoSimulation(_) => ExecutionMode::CoSimulation,
            ModeFunctions::ModelExchange(_) => ExecutionMode::ModelExchange,
        }
    }

    pub fn co_simulation(&self) -> Option<&CoSimulationFunctions> {
        match &self.mode {
            ModeFunctions::CoSimulation(cs) => Some(cs),
            ModeFunctions::ModelExchange(_) => None,
        }
    }

    pub fn model_exchange(&self) -> Option<&ModelExchangeFunctions> {
        match &self.mode {
            ModeFunctions::ModelExchange(me) => Some(me),
            ModeFunctions::CoSimulation(_) => None,
        }
    }
}

macro_rules! resolve {
    ($source:expr, $convention:expr, $name:literal, $fn_type:ty) => {
        lookup_function($source, $convention, $name)
            .map(|addr| unsafe { mem::transmute::<*const c_void, $fn_type>(addr) })
    };
}

fn lookup_function(source: &dyn SymbolSource, convention: NamingConvention, name: &str) -> Option<*const c_void> {
    let symbol = format!("{}{}", convention.prefix(), name);
    let addr = source.lookup(&symbol).filter(|addr| !addr.is_null());
    if addr.is_none() {
        warn!("Function {} not found in module", symbol);
    }
    addr
}

/// Bind the interface functions for the given execution mode. Missing
/// functions leave their slot empty; check [`InterfaceTable::is_usable`].
pub fn bind(source: &dyn SymbolSource, mode: ExecutionMode) -> InterfaceTable {
    let mut table = bind_with_convention(source, mode, NAMING_CONVENTIONS[0]);

    for convention in NAMING_CONVENTIONS.iter().skip(1) {
        if table.common.get_version.is_some() || table.common.instantiate.is_some() {
            break;
        }
        warn!("Functions from FMI 2.0 could not be found, looking for `{}` prefixed function names", convention);
        table = bind_with_convention(source, mode, *convention);
    }

    table
}

/// One full resolution pass under a single naming convention
pub fn bind_with_convention(source: &dyn SymbolSource, mode: ExecutionMode,
    convention: NamingConvention) -> InterfaceTable {
    let s = source;
    let c = convention;

    let common = CommonFunctions {
        get_types_platform: resolve!(s, c, "GetTypesPlatform", FMI::fmi2GetTypesPlatformTYPE),
        get_version: resolve!(s, c, "GetVersion", FMI::fmi2GetVersionTYPE),
        set_debug_logging: resolve!(s, c, "SetDebugLogging", FMI::fmi2SetDebugLoggingTYPE),
        instantiate: resolve!(s, c, "Instantiate", FMI::fmi2InstantiateTYPE),
        free_instance: resolve!(s, c, "FreeInstance", FMI::fmi2FreeInstanceTYPE),
        setup_experiment: resolve!(s, c, "SetupExperiment", FMI::fmi2SetupExperimentTYPE),
        enter_initialization_mode: resolve!(s, c, "EnterInitializationMode", FMI::fmi2EnterInitializationModeTYPE),
        exit_initialization_mode: resolve!(s, c, "ExitInitializationMode", FMI::fmi2ExitInitializationModeTYPE),
        terminate: resolve!(s, c, "Terminate", FMI::fmi2TerminateTYPE),
        reset: resolve!(s, c, "Reset", FMI::fmi2ResetTYPE),
        get_real: resolve!(s, c, "GetReal", FMI::fmi2GetRealTYPE),
        get_integer: resolve!(s, c, "GetInteger", FMI::fmi2GetIntegerTYPE),
        get_boolean: resolve!(s, c, "GetBoolean", FMI::fmi2GetBooleanTYPE),
        get_string: resolve!(s, c, "GetString", FMI::fmi2GetStringTYPE),
        set_real: resolve!(s, c, "SetReal", FMI::fmi2SetRealTYPE),
        set_integer: resolve!(s, c, "SetInteger", FMI::fmi2SetIntegerTYPE),
        set_boolean: resolve!(s, c, "SetBoolean", FMI::fmi2SetBooleanTYPE),
        set_string: resolve!(s, c, "SetString", FMI::fmi2SetStringTYPE),
        get_fmu_state: resolve!(s, c, "GetFMUstate", FMI::fmi2GetFMUstateTYPE),
        set_fmu_state: resolve!(s, c, "SetFMUstate", FMI::fmi2SetFMUstateTYPE),
        free_fmu_state: resolve!(s, c, "FreeFMUstate", FMI::fmi2FreeFMUstateTYPE),
        serialized_fmu_state_size: resolve!(s, c, "SerializedFMUstateSize", FMI::fmi2SerializedFMUstateSizeTYPE),
        serialize_fmu_state: resolve!(s, c, "SerializeFMUstate", FMI::fmi2SerializeFMUstateTYPE),
        de_serialize_fmu_state: resolve!(s, c, "DeSerializeFMUstate", FMI::fmi2DeSerializeFMUstateTYPE),
        get_directional_derivative: resolve!(s, c, "GetDirectionalDerivative", FMI::fmi2GetDirectionalDerivativeTYPE),
    };

    let mode = match mode {
        ExecutionMode::CoSimulation => ModeFunctions::CoSimulation(CoSimulationFunctions {
            set_real_input_derivatives: resolve!(s, c, "SetRealInputDerivatives", FMI::fmi2SetRealInputDerivativesTYPE),
            get_real_output_derivatives: resolve!(s, c, "GetRealOutputDerivatives", FMI::fmi2GetRealOutputDerivativesTYPE),
            do_step: resolve!(s, c, "DoStep", FMI::fmi2DoStepTYPE),
            cancel_step: resolve!(s, c, "CancelStep", FMI::fmi2CancelStepTYPE),
            get_status: resolve!(s, c, "GetStatus", FMI::fmi2GetStatusTYPE),
            get_real_status: resolve!(s, c, "GetRealStatus", FMI::fmi2GetRealStatusTYPE),
            get_integer_status: resolve!(s, c, "GetIntegerStatus", FMI::fmi2GetIntegerStatusTYPE),
            get_boolean_status: resolve!(s, c, "GetBooleanStatus", FMI::fmi2GetBooleanStatusTYPE),
            get_string_status: resolve!(s, c, "GetStringStatus", FMI::fmi2GetStringStatusTYPE),
        }),
        ExecutionMode::ModelExchange => ModeFunctions::ModelExchange(ModelExchangeFunctions {
            enter_event_mode: resolve!(s, c, "EnterEventMode", FMI::fmi2EnterEventModeTYPE),
            new_discrete_states: resolve!(s, c, "NewDiscreteStates", FMI::fmi2NewDiscreteStatesTYPE),
            enter_continuous_time_mode: resolve!(s, c, "EnterContinuousTimeMode", FMI::fmi2EnterContinuousTimeModeTYPE),
            completed_integrator_step: resolve!(s, c, "CompletedIntegratorStep", FMI::fmi2CompletedIntegratorStepTYPE),
            set_time: resolve!(s, c, "SetTime", FMI::fmi2SetTimeTYPE),
            set_continuous_states: resolve!(s, c, "SetContinuousStates", FMI::fmi2SetContinuousStatesTYPE),
            get_derivatives: resolve!(s, c, "GetDerivatives", FMI::fmi2GetDerivativesTYPE),
            get_event_indicators: resolve!(s, c, "GetEventIndicators", FMI::fmi2GetEventIndicatorsTYPE),
            get_continuous_states: resolve!(s, c, "GetContinuousStates", FMI::fmi2GetContinuousStatesTYPE),
            get_nominals_of_continuous_states: resolve!(s, c, "GetNominalsOfContinuousStates", FMI::fmi2GetNominalsOfContinuousStatesTYPE),
        }),
    };

    InterfaceTable {
        convention,
        common,
        mode
    }
}
