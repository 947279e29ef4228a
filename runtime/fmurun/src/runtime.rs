// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

use std::ffi::{CStr, CString};
use std::path::Path;
use std::ptr;

use libc::c_char;
use tracing::{debug, info, warn};

use fmi2_abi as FMI;
use fmu_base::errors::FmuError;
use fmu_base::model_description as MD;
use fmu_base::types::{Status, StepOutcome};

use crate::binder::{CoSimulationFunctions, CommonFunctions, InterfaceTable};
use crate::errors::FmurunError;
use crate::logger::LogContext;
use crate::output::ValueSource;
use FmurunError::FmuError as FMERR;

/// Relative tolerance when comparing the session time with the end time
const END_TIME_TOLERANCE: f64 = 1e-9;

/// Settings for one simulation run
///
/// * `visible` - whether the model may show its own user interface
/// * `logging_on` - debug logging flag passed to instantiate
/// * `categories` - log categories enabled with `fmi2SetDebugLogging`
/// * `start_time` - time where simulation starts
/// * `end_time` - optional final time; steps are clamped to it
/// * `step_size` - nominal communication step used by [`Instance::advance`]
/// * `buffer_log` - keep model log messages in memory instead of emitting them
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub visible: bool,
    pub logging_on: bool,
    pub categories: Vec<String>,
    pub start_time: f64,
    pub end_time: Option<f64>,
    pub step_size: f64,
    pub buffer_log: bool
}

impl Default for InstanceConfig {
    fn default() -> Self {
        InstanceConfig {
            visible: false,
            logging_on: false,
            categories: Vec::new(),
            start_time: 0.0,
            end_time: None,
            step_size: 0.1,
            buffer_log: false
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InstanceState {
    Instantiated,
    Initialized,
    Terminated
}

/// A live co-simulation instance of a loaded package
pub struct Instance<'a> {
    functions: &'a CommonFunctions,
    cs_functions: &'a CoSimulationFunctions,
    md: &'a MD::ModelDescription,
    component: FMI::fmi2Component,
    // the instance may keep pointers to both for its whole lifetime
    _callbacks: Box<FMI::fmi2CallbackFunctions>,
    log_context: Box<LogContext<'a>>,
    config: InstanceConfig,
    state: InstanceState,
    time: f64,
    last_step_size: f64,
    step_count: u64
}

fn required<T>(slot: Option<T>, name: &str) -> Result<T, FmurunError> {
    slot.ok_or_else(|| FMERR(FmuError::MissingFunction(name.to_string())))
}

fn check(function: &str, status: FMI::fmi2Status) -> Result<Status, FmurunError> {
    let status = Status::from(status);
    if status.is_worse_than_warning() {
        return Err(FMERR(FmuError::CallFailed(function.to_string(), status)));
    }
    if status == Status::Warning {
        warn!("{} returned status warning", function);
    }
    Ok(status)
}

fn c_string(value: &str) -> Result<CString, FmurunError> {
    CString::new(value)
        .map_err(|_| FMERR(FmuError::InvalidModelDescription(format!("embedded NUL in `{}`", value))))
}

impl<'a> Instance<'a> {
    /// Instantiate the model and, if categories were requested, enable debug logging.
    ///
    /// * `table` - bound interface; must be the co-simulation variant
    /// * `md` - model description of the same package
    /// * `resource_location` - URI of the extracted `resources` directory
    pub fn new(table: &'a InterfaceTable, md: &'a MD::ModelDescription, resource_location: &str,
        config: InstanceConfig) -> Result<Instance<'a>, FmurunError> {

        let cs_functions = table.co_simulation()
            .ok_or_else(|| FMERR(FmuError::NotImplementedError("stepping of ModelExchange instances".to_string())))?;
        let mode = md.co_simulation.as_ref()
            .ok_or(FMERR(FmuError::MissingExecutionMode(table.execution_mode())))?;
        let instantiate = required(table.common.instantiate, "fmi2Instantiate")?;

        let instance_name = c_string(&mode.model_identifier)?;
        let guid = c_string(&md.model.guid)?;
        let resource_location = c_string(resource_location)?;

        let log_context = Box::new(if config.buffer_log {
            LogContext::buffered(&md.variables)
        } else {
            LogContext::new(&md.variables)
        });
        let callbacks = Box::new(log_context.callback_functions());

        let component = unsafe {
            instantiate(
                instance_name.as_ptr(),
                table.execution_mode().fmi2_type(),
                guid.as_ptr(),
                resource_location.as_ptr(),
                &*callbacks,
                config.visible as FMI::fmi2Boolean,
                config.logging_on as FMI::fmi2Boolean)
        };

        if component.is_null() {
            return Err(FMERR(FmuError::InstantiationFailed(mode.model_identifier.clone())));
        }
        debug!("Instantiated `{}`", mode.model_identifier);

        let mut inst = Instance {
            functions: &table.common,
            cs_functions,
            md,
            component,
            _callbacks: callbacks,
            log_context,
            time: config.start_time,
            config,
            state: InstanceState::Instantiated,
            last_step_size: 0.0,
            step_count: 0
        };

        if !inst.config.categories.is_empty() {
            inst.set_debug_logging()?;
        }

        Ok(inst)
    }

    fn set_debug_logging(&mut self) -> Result<(), FmurunError> {
        let set_debug_logging = required(self.functions.set_debug_logging, "fmi2SetDebugLogging")?;

        let categories = self.config.categories.iter()
            .map(|c| c_string(c))
            .collect::<Result<Vec<CString>, FmurunError>>()?;
        let category_ptrs: Vec<FMI::fmi2String> = categories.iter().map(|c| c.as_ptr()).collect();

        let status = unsafe {
            set_debug_logging(self.component, FMI::fmi2True, category_ptrs.len(), category_ptrs.as_ptr())
        };
        check("fmi2SetDebugLogging", status)?;

        Ok(())
    }

    /// Set up the experiment and run through initialization mode
    pub fn initialize(&mut self) -> Result<(), FmurunError> {
        if self.state != InstanceState::Instantiated {
            return Err(FMERR(FmuError::InvalidCallingOrder));
        }

        let setup_experiment = required(self.functions.setup_experiment, "fmi2SetupExperiment")?;
        let enter_init = required(self.functions.enter_initialization_mode, "fmi2EnterInitializationMode")?;
        let exit_init = required(self.functions.exit_initialization_mode, "fmi2ExitInitializationMode")?;

        let tolerance = self.md.experiment.as_ref().and_then(|e| e.tolerance);

        // the end time is enforced by clamping steps, not by the instance
        let status = unsafe {
            setup_experiment(self.component,
                tolerance.is_some() as FMI::fmi2Boolean,
                tolerance.unwrap_or(0.0),
                self.config.start_time,
                FMI::fmi2False,
                0.0)
        };
        check("fmi2SetupExperiment", status)?;

        let status = unsafe { enter_init(self.component) };
        check("fmi2EnterInitializationMode", status)?;

        let status = unsafe { exit_init(self.component) };
        check("fmi2ExitInitializationMode", status)?;

        self.time = self.config.start_time;
        self.state = InstanceState::Initialized;

        Ok(())
    }

    /// Simulate one communication step of the nominal step size
    pub fn advance(&mut self) -> Result<StepOutcome, FmurunError> {
        self.do_step(self.config.step_size)
    }

    /// Simulate a time step
    ///
    /// * `timestep` - requested step; shortened so that time never passes the end time
    pub fn do_step(&mut self, timestep: f64) -> Result<StepOutcome, FmurunError> {
        if self.state != InstanceState::Initialized {
            return Err(FMERR(FmuError::InvalidCallingOrder));
        }
        if !(timestep > 0.0) || !timestep.is_finite() {
            return Err(FMERR(FmuError::InvalidStepSize(timestep)));
        }

        let do_step = required(self.cs_functions.do_step, "fmi2DoStep")?;

        let mut h = timestep;
        let mut clamped_to = None;
        if let Some(end) = self.config.end_time {
            let tolerance = self.end_tolerance(end);
            if end - self.time <= tolerance {
                return Ok(StepOutcome::EndReached);
            }
            if h >= end - self.time - tolerance {
                h = end - self.time;
                clamped_to = Some(end);
            }
        }

        let status = Status::from(unsafe { do_step(self.component, self.time, h, FMI::fmi2True) });

        match status {
            Status::OK | Status::Warning => {
                if status == Status::Warning {
                    warn!("fmi2DoStep returned status warning at t={}", self.time);
                }
                self.time = clamped_to.unwrap_or(self.time + h);
                self.last_step_size = h;
                self.step_count += 1;
                Ok(StepOutcome::Advanced { time: self.time })
            },
            Status::Discard => {
                match self.termination_requested() {
                    Ok(true) => {
                        info!("The model requested to end the simulation at t={}", self.time);
                        Ok(StepOutcome::TerminationRequested)
                    },
                    Ok(false) => Err(FMERR(FmuError::StepFailed(status))),
                    Err(e) => {
                        warn!("Could not query termination status: {}", e);
                        Err(FMERR(FmuError::StepFailed(status)))
                    }
                }
            },
            _ => Err(FMERR(FmuError::StepFailed(status))),
        }
    }

    /// Remaining intervals up to this size count as having reached `end`
    fn end_tolerance(&self, end: f64) -> f64 {
        END_TIME_TOLERANCE * self.config.step_size.abs().max(end.abs()).max(1.0)
    }

    /// Whether the instance asked to end the simulation (`fmi2Terminated` status)
    pub fn termination_requested(&self) -> Result<bool, FmurunError> {
        let get_boolean_status = required(self.cs_functions.get_boolean_status, "fmi2GetBooleanStatus")?;

        let mut value: FMI::fmi2Boolean = FMI::fmi2False;
        let status = Status::from(unsafe {
            get_boolean_status(self.component, FMI::fmi2Terminated, &mut value)
        });
        if status != Status::OK {
            return Err(FMERR(FmuError::CallFailed("fmi2GetBooleanStatus".to_string(), status)));
        }

        Ok(value != FMI::fmi2False)
    }

    /// Time of the last successfully completed step as reported by the instance
    pub fn last_successful_time(&self) -> Result<f64, FmurunError> {
        let get_real_status = required(self.cs_functions.get_real_status, "fmi2GetRealStatus")?;

        let mut value: FMI::fmi2Real = 0.0;
        let status = unsafe { get_real_status(self.component, FMI::fmi2LastSuccessfulTime, &mut value) };
        check("fmi2GetRealStatus", status)?;

        Ok(value)
    }

    /// Reset the instance to the state right after instantiation
    pub fn reset(&mut self) -> Result<(), FmurunError> {
        self.ensure_live()?;
        let reset = required(self.functions.reset, "fmi2Reset")?;

        let status = unsafe { reset(self.component) };
        check("fmi2Reset", status)?;

        self.state = InstanceState::Instantiated;
        self.time = self.config.start_time;
        self.last_step_size = 0.0;
        self.step_count = 0;

        Ok(())
    }

    pub fn get_real(&self, vr: u32) -> Result<f64, FmurunError> {
        self.ensure_live()?;
        let get_real = required(self.functions.get_real, "fmi2GetReal")?;

        let mut value: FMI::fmi2Real = 0.0;
        let status = unsafe { get_real(self.component, &vr, 1, &mut value) };
        check("fmi2GetReal", status)?;

        Ok(value)
    }

    pub fn get_integer(&self, vr: u32) -> Result<i32, FmurunError> {
        self.ensure_live()?;
        let get_integer = required(self.functions.get_integer, "fmi2GetInteger")?;

        let mut value: FMI::fmi2Integer = 0;
        let status = unsafe { get_integer(self.component, &vr, 1, &mut value) };
        check("fmi2GetInteger", status)?;

        Ok(value)
    }

    pub fn get_boolean(&self, vr: u32) -> Result<bool, FmurunError> {
        self.ensure_live()?;
        let get_boolean = required(self.functions.get_boolean, "fmi2GetBoolean")?;

        let mut value: FMI::fmi2Boolean = FMI::fmi2False;
        let status = unsafe { get_boolean(self.component, &vr, 1, &mut value) };
        check("fmi2GetBoolean", status)?;

        Ok(value != FMI::fmi2False)
    }

    pub fn get_string(&self, vr: u32) -> Result<String, FmurunError> {
        self.ensure_live()?;
        let get_string = required(self.functions.get_string, "fmi2GetString")?;

        let mut value: FMI::fmi2String = ptr::null();
        let status = unsafe { get_string(self.component, &vr, 1, &mut value) };
        check("fmi2GetString", status)?;

        if value.is_null() {
            return Ok(String::new());
        }
        Ok(unsafe { CStr::from_ptr(value) }.to_string_lossy().into_owned())
    }

    pub fn set_real(&mut self, vr: u32, value: f64) -> Result<(), FmurunError> {
        self.ensure_live()?;
        let set_real = required(self.functions.set_real, "fmi2SetReal")?;

        let status = unsafe { set_real(self.component, &vr, 1, &value) };
        check("fmi2SetReal", status)?;

        Ok(())
    }

    pub fn set_integer(&mut self, vr: u32, value: i32) -> Result<(), FmurunError> {
        self.ensure_live()?;
        let set_integer = required(self.functions.set_integer, "fmi2SetInteger")?;

        let status = unsafe { set_integer(self.component, &vr, 1, &value) };
        check("fmi2SetInteger", status)?;

        Ok(())
    }

    pub fn set_boolean(&mut self, vr: u32, value: bool) -> Result<(), FmurunError> {
        self.ensure_live()?;
        let set_boolean = required(self.functions.set_boolean, "fmi2SetBoolean")?;

        let value = value as FMI::fmi2Boolean;
        let status = unsafe { set_boolean(self.component, &vr, 1, &value) };
        check("fmi2SetBoolean", status)?;

        Ok(())
    }

    pub fn set_string(&mut self, vr: u32, value: &str) -> Result<(), FmurunError> {
        self.ensure_live()?;
        let set_string = required(self.functions.set_string, "fmi2SetString")?;

        let value = CString::new(value).map_err(|_| FMERR(FmuError::InvalidStringValue(vr)))?;
        let value_ptr = value.as_ptr();
        let status = unsafe { set_string(self.component, &vr, 1, &value_ptr) };
        check("fmi2SetString", status)?;

        Ok(())
    }

    /// Serialize the current state of the instance to a binary file
    pub fn save_state(&mut self, filepath: &Path) -> Result<(), FmurunError> {
        self.ensure_live()?;
        let get_state = required(self.functions.get_fmu_state, "fmi2GetFMUstate")?;
        let free_state = required(self.functions.free_fmu_state, "fmi2FreeFMUstate")?;
        let state_size = required(self.functions.serialized_fmu_state_size, "fmi2SerializedFMUstateSize")?;
        let serialize = required(self.functions.serialize_fmu_state, "fmi2SerializeFMUstate")?;

        let mut fmu_state: FMI::fmi2FMUstate = ptr::null_mut();
        let status = unsafe { get_state(self.component, &mut fmu_state) };
        check("fmi2GetFMUstate", status)?;

        let bytes = (|| {
            let mut size: libc::size_t = 0;
            let status = unsafe { state_size(self.component, fmu_state, &mut size) };
            check("fmi2SerializedFMUstateSize", status)?;

            let mut buffer = vec![0u8; size];
            let status = unsafe {
                serialize(self.component, fmu_state, buffer.as_mut_ptr() as *mut c_char, size)
            };
            check("fmi2SerializeFMUstate", status)?;

            Ok::<Vec<u8>, FmurunError>(buffer)
        })();

        let status = unsafe { free_state(self.component, &mut fmu_state) };
        check("fmi2FreeFMUstate", status)?;

        std::fs::write(filepath, bytes?)?;
        debug!("Wrote state of `{}` to {}", self.md.model.name, filepath.display());

        Ok(())
    }

    /// Load a serialized state from file into this instance
    pub fn load_state(&mut self, filepath: &Path) -> Result<(), FmurunError> {
        if self.state != InstanceState::Initialized {
            return Err(FMERR(FmuError::InvalidCallingOrder));
        }
        let set_state = required(self.functions.set_fmu_state, "fmi2SetFMUstate")?;
        let free_state = required(self.functions.free_fmu_state, "fmi2FreeFMUstate")?;
        let deserialize = required(self.functions.de_serialize_fmu_state, "fmi2DeSerializeFMUstate")?;

        let buffer = std::fs::read(filepath)?;

        let mut fmu_state: FMI::fmi2FMUstate = ptr::null_mut();
        let status = unsafe {
            deserialize(self.component, buffer.as_ptr() as *const c_char, buffer.len(), &mut fmu_state)
        };
        check("fmi2DeSerializeFMUstate", status)?;

        let status = unsafe { set_state(self.component, fmu_state) };
        let set_result = check("fmi2SetFMUstate", status);

        let status = unsafe { free_state(self.component, &mut fmu_state) };
        set_result?;
        check("fmi2FreeFMUstate", status)?;

        match self.last_successful_time() {
            Ok(t) => self.time = t,
            Err(e) => debug!("Keeping session time {} after state restore: {}", self.time, e),
        }

        Ok(())
    }

    /// Terminate and free the instance. Runs at most once; also performed on drop.
    pub fn terminate(&mut self) -> Result<(), FmurunError> {
        if self.state == InstanceState::Terminated {
            return Ok(());
        }
        self.state = InstanceState::Terminated;

        let status = self.functions.terminate.map(|terminate| unsafe { terminate(self.component) });
        if let Some(free_instance) = self.functions.free_instance {
            unsafe { free_instance(self.component) };
        }
        self.component = ptr::null_mut();

        match status {
            Some(status) => check("fmi2Terminate", status).map(|_| ()),
            None => Err(FMERR(FmuError::MissingFunction("fmi2Terminate".to_string()))),
        }
    }

    fn ensure_live(&self) -> Result<(), FmurunError> {
        match self.state {
            InstanceState::Terminated => Err(FMERR(FmuError::InvalidCallingOrder)),
            _ => Ok(()),
        }
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    /// Current simulation time
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Step size actually applied by the last completed step
    pub fn last_step_size(&self) -> f64 {
        self.last_step_size
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    pub fn model_description(&self) -> &'a MD::ModelDescription {
        self.md
    }

    /// Log lines collected when `buffer_log` is set
    pub fn take_log_messages(&self) -> Vec<String> {
        self.log_context.take_messages()
    }
}

impl ValueSource for Instance<'_> {
    fn real(&self, vr: u32) -> Result<f64, FmurunError> {
        self.get_real(vr)
    }

    fn integer(&self, vr: u32) -> Result<i32, FmurunError> {
        self.get_integer(vr)
    }

    fn boolean(&self, vr: u32) -> Result<bool, FmurunError> {
        self.get_boolean(vr)
    }

    fn string(&self, vr: u32) -> Result<String, FmurunError> {
        self.get_string(vr)
    }
}

impl Drop for Instance<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            warn!("Terminating `{}` failed: {}", self.md.model.name, e);
        }
    }
}
