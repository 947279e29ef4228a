//! In-process model made of `extern "C"` functions. Behaviour variants are
//! selected through markers in the GUID, e.g. `discard-terminate`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::ffi::{c_void, CStr, CString};
use std::sync::Mutex;

use libc::{c_char, c_int, size_t};

use fmi2_abi::*;
use fmu_base::model_conversion::parse_model_description;
use fmu_base::model_description::ModelDescription;
use fmu_base::types::ExecutionMode;
use fmurun::binder::{self, InterfaceTable, SymbolSource};
use fmurun::runtime::{Instance, InstanceConfig};

pub const RESOURCES: &str = "file:///tmp/fmuTmpMock/resources";

pub const VR_X: u32 = 1;
pub const VR_H: u32 = 2;
pub const VR_U: u32 = 3;
pub const VR_COUNTER: u32 = 1;
pub const VR_K: u32 = 2;
pub const VR_FLAG: u32 = 1;
pub const VR_LABEL: u32 = 1;

pub fn mock_xml(guid: &str) -> String {
    format!(r#"<?xml version="1.0" encoding="UTF-8"?>
<fmiModelDescription fmiVersion="2.0" modelName="mock" guid="{}" generationTool="hand written">
  <CoSimulation modelIdentifier="mock" canHandleVariableCommunicationStepSize="true" canGetAndSetFMUstate="true" canSerializeFMUstate="true"/>
  <LogCategories>
    <Category name="logAll"/>
    <Category name="logError"/>
  </LogCategories>
  <DefaultExperiment startTime="0" stopTime="1" tolerance="1e-6"/>
  <ModelVariables>
    <ScalarVariable name="x" valueReference="1" causality="output"><Real/></ScalarVariable>
    <ScalarVariable name="h" valueReference="2" causality="output"><Real/></ScalarVariable>
    <ScalarVariable name="u" valueReference="3" causality="input"><Real start="0"/></ScalarVariable>
    <ScalarVariable name="counter" valueReference="1" causality="output" variability="discrete"><Integer/></ScalarVariable>
    <ScalarVariable name="k" valueReference="2" causality="input" variability="discrete"><Integer start="0"/></ScalarVariable>
    <ScalarVariable name="flag" valueReference="1" causality="output" variability="discrete"><Boolean/></ScalarVariable>
    <ScalarVariable name="label" valueReference="1" causality="parameter" variability="fixed"><String start="mock"/></ScalarVariable>
  </ModelVariables>
</fmiModelDescription>"#, guid)
}

pub fn mock_description(guid: &str) -> ModelDescription {
    parse_model_description(&mock_xml(guid)).expect("mock model description does not parse")
}

/// What a freed instance went through
#[derive(Debug, Clone)]
pub struct MockRecord {
    pub guid: String,
    pub calls: Vec<String>,
    pub steps: Vec<(f64, f64)>
}

static FREED: Mutex<Vec<MockRecord>> = Mutex::new(Vec::new());

/// Record of the freed instance with the given GUID
pub fn freed(guid: &str) -> Option<MockRecord> {
    FREED.lock().ok()?.iter().find(|r| r.guid == guid).cloned()
}

struct MockComponent {
    guid: String,
    name: CString,
    functions: *const fmi2CallbackFunctions,
    time: f64,
    x: f64,
    h: f64,
    u: f64,
    counter: i32,
    k: i32,
    flag: bool,
    label: CString,
    terminated: bool,
    calls: Vec<String>,
    steps: Vec<(f64, f64)>
}

impl MockComponent {
    fn has(&self, marker: &str) -> bool {
        self.guid.contains(marker)
    }

    fn log(&self, status: fmi2Status, message: &[u8], arg: c_int) {
        unsafe {
            let functions = &*self.functions;
            (functions.logger)(functions.componentEnvironment, self.name.as_ptr(), status,
                b"logAll\0".as_ptr() as *const c_char, message.as_ptr() as *const c_char, arg);
        }
    }
}

#[derive(Clone, Copy)]
struct Snapshot {
    time: f64,
    x: f64,
    counter: i32
}

const SNAPSHOT_SIZE: usize = 8 + 8 + 4;

unsafe fn comp<'a>(c: fmi2Component) -> &'a mut MockComponent {
    &mut *(c as *mut MockComponent)
}

unsafe extern "C" fn mock_get_types_platform() -> *const c_char {
    b"default\0".as_ptr() as *const c_char
}

unsafe extern "C" fn mock_get_version() -> *const c_char {
    b"2.0\0".as_ptr() as *const c_char
}

unsafe extern "C" fn mock_set_debug_logging(c: fmi2Component, _logging_on: fmi2Boolean,
    n_categories: size_t, categories: *const fmi2String) -> fmi2Status {
    let m = comp(c);
    let names: Vec<String> = (0..n_categories)
        .map(|i| CStr::from_ptr(*categories.add(i)).to_string_lossy().into_owned())
        .collect();
    m.calls.push(format!("SetDebugLogging {}", names.join(",")));
    if m.has("debug-error") { fmi2Error } else { fmi2OK }
}

unsafe extern "C" fn mock_instantiate(instance_name: fmi2String, fmu_type: fmi2Type, guid: fmi2String,
    resource_location: fmi2String, functions: *const fmi2CallbackFunctions, _visible: fmi2Boolean,
    logging_on: fmi2Boolean) -> fmi2Component {

    let guid = CStr::from_ptr(guid).to_string_lossy().into_owned();
    if guid.contains("null-instance") || fmu_type != fmi2CoSimulation {
        return std::ptr::null_mut();
    }

    let m = Box::new(MockComponent {
        guid,
        name: CStr::from_ptr(instance_name).to_owned(),
        functions,
        time: 0.0,
        x: 0.0,
        h: 0.0,
        u: 0.0,
        counter: 0,
        k: 0,
        flag: false,
        label: CString::new("mock").unwrap_or_default(),
        terminated: false,
        calls: vec![format!("Instantiate {}", CStr::from_ptr(resource_location).to_string_lossy())],
        steps: Vec::new()
    });

    if logging_on != fmi2False {
        m.log(fmi2OK, b"instantiated #r1# after %d tries\0", 1);
    }

    Box::into_raw(m) as fmi2Component
}

unsafe extern "C" fn mock_free_instance(c: fmi2Component) {
    let m = Box::from_raw(c as *mut MockComponent);
    let mut calls = m.calls.clone();
    calls.push("FreeInstance".to_string());
    if let Ok(mut freed) = FREED.lock() {
        freed.push(MockRecord { guid: m.guid.clone(), calls, steps: m.steps.clone() });
    }
}

unsafe extern "C" fn mock_setup_experiment(c: fmi2Component, tolerance_defined: fmi2Boolean, tolerance: fmi2Real,
    start_time: fmi2Real, stop_time_defined: fmi2Boolean, stop_time: fmi2Real) -> fmi2Status {
    let m = comp(c);
    m.calls.push(format!("SetupExperiment {} {} {} {} {}",
        tolerance_defined, tolerance, start_time, stop_time_defined, stop_time));
    m.time = start_time;
    fmi2OK
}

unsafe extern "C" fn mock_enter_initialization_mode(c: fmi2Component) -> fmi2Status {
    let m = comp(c);
    m.calls.push("EnterInitializationMode".to_string());
    if m.has("init-error") { fmi2Error } else { fmi2OK }
}

unsafe extern "C" fn mock_exit_initialization_mode(c: fmi2Component) -> fmi2Status {
    comp(c).calls.push("ExitInitializationMode".to_string());
    fmi2OK
}

unsafe extern "C" fn mock_terminate(c: fmi2Component) -> fmi2Status {
    comp(c).calls.push("Terminate".to_string());
    fmi2OK
}

unsafe extern "C" fn mock_reset(c: fmi2Component) -> fmi2Status {
    let m = comp(c);
    m.calls.push("Reset".to_string());
    m.time = 0.0;
    m.x = 0.0;
    m.counter = 0;
    fmi2OK
}

unsafe extern "C" fn mock_get_real(c: fmi2Component, vr: *const fmi2ValueReference, nvr: size_t,
    value: *mut fmi2Real) -> fmi2Status {
    let m = comp(c);
    for i in 0..nvr {
        *value.add(i) = match *vr.add(i) {
            VR_X => m.x,
            VR_H => m.h,
            VR_U => m.u,
            _ => return fmi2Error,
        };
    }
    fmi2OK
}

unsafe extern "C" fn mock_get_integer(c: fmi2Component, vr: *const fmi2ValueReference, nvr: size_t,
    value: *mut fmi2Integer) -> fmi2Status {
    let m = comp(c);
    for i in 0..nvr {
        *value.add(i) = match *vr.add(i) {
            VR_COUNTER => m.counter,
            VR_K => m.k,
            _ => return fmi2Error,
        };
    }
    fmi2OK
}

unsafe extern "C" fn mock_get_boolean(c: fmi2Component, vr: *const fmi2ValueReference, nvr: size_t,
    value: *mut fmi2Boolean) -> fmi2Status {
    let m = comp(c);
    for i in 0..nvr {
        if *vr.add(i) != VR_FLAG {
            return fmi2Error;
        }
        *value.add(i) = m.flag as fmi2Boolean;
    }
    fmi2OK
}

unsafe extern "C" fn mock_get_string(c: fmi2Component, vr: *const fmi2ValueReference, nvr: size_t,
    value: *mut fmi2String) -> fmi2Status {
    let m = comp(c);
    for i in 0..nvr {
        if *vr.add(i) != VR_LABEL {
            return fmi2Error;
        }
        *value.add(i) = m.label.as_ptr();
    }
    fmi2OK
}

unsafe extern "C" fn mock_set_real(c: fmi2Component, vr: *const fmi2ValueReference, nvr: size_t,
    value: *const fmi2Real) -> fmi2Status {
    let m = comp(c);
    for i in 0..nvr {
        match *vr.add(i) {
            VR_U => m.u = *value.add(i),
            _ => return fmi2Error,
        }
    }
    fmi2OK
}

unsafe extern "C" fn mock_set_integer(c: fmi2Component, vr: *const fmi2ValueReference, nvr: size_t,
    value: *const fmi2Integer) -> fmi2Status {
    let m = comp(c);
    for i in 0..nvr {
        match *vr.add(i) {
            VR_K => m.k = *value.add(i),
            _ => return fmi2Error,
        }
    }
    fmi2OK
}

unsafe extern "C" fn mock_set_boolean(c: fmi2Component, vr: *const fmi2ValueReference, nvr: size_t,
    value: *const fmi2Boolean) -> fmi2Status {
    let m = comp(c);
    for i in 0..nvr {
        match *vr.add(i) {
            VR_FLAG => m.flag = *value.add(i) != fmi2False,
            _ => return fmi2Error,
        }
    }
    fmi2OK
}

unsafe extern "C" fn mock_set_string(c: fmi2Component, vr: *const fmi2ValueReference, nvr: size_t,
    value: *const fmi2String) -> fmi2Status {
    let m = comp(c);
    for i in 0..nvr {
        match *vr.add(i) {
            VR_LABEL => m.label = CStr::from_ptr(*value.add(i)).to_owned(),
            _ => return fmi2Error,
        }
    }
    fmi2OK
}

unsafe extern "C" fn mock_get_fmu_state(c: fmi2Component, state: *mut fmi2FMUstate) -> fmi2Status {
    let m = comp(c);
    let snapshot = Box::new(Snapshot { time: m.time, x: m.x, counter: m.counter });
    *state = Box::into_raw(snapshot) as fmi2FMUstate;
    fmi2OK
}

unsafe extern "C" fn mock_set_fmu_state(c: fmi2Component, state: fmi2FMUstate) -> fmi2Status {
    let m = comp(c);
    let snapshot = &*(state as *const Snapshot);
    m.time = snapshot.time;
    m.x = snapshot.x;
    m.counter = snapshot.counter;
    fmi2OK
}

unsafe extern "C" fn mock_free_fmu_state(_c: fmi2Component, state: *mut fmi2FMUstate) -> fmi2Status {
    if !(*state).is_null() {
        drop(Box::from_raw(*state as *mut Snapshot));
        *state = std::ptr::null_mut();
    }
    fmi2OK
}

unsafe extern "C" fn mock_serialized_fmu_state_size(_c: fmi2Component, _state: fmi2FMUstate,
    size: *mut size_t) -> fmi2Status {
    *size = SNAPSHOT_SIZE;
    fmi2OK
}

unsafe extern "C" fn mock_serialize_fmu_state(_c: fmi2Component, state: fmi2FMUstate,
    serialized: *mut fmi2Byte, size: size_t) -> fmi2Status {
    if size < SNAPSHOT_SIZE {
        return fmi2Error;
    }
    let snapshot = &*(state as *const Snapshot);
    let mut bytes = Vec::with_capacity(SNAPSHOT_SIZE);
    bytes.extend_from_slice(&snapshot.time.to_le_bytes());
    bytes.extend_from_slice(&snapshot.x.to_le_bytes());
    bytes.extend_from_slice(&snapshot.counter.to_le_bytes());
    std::ptr::copy_nonoverlapping(bytes.as_ptr(), serialized as *mut u8, SNAPSHOT_SIZE);
    fmi2OK
}

unsafe extern "C" fn mock_de_serialize_fmu_state(_c: fmi2Component, serialized: *const fmi2Byte,
    size: size_t, state: *mut fmi2FMUstate) -> fmi2Status {
    if size != SNAPSHOT_SIZE {
        return fmi2Error;
    }
    let bytes = std::slice::from_raw_parts(serialized as *const u8, size);
    let mut f = [0u8; 8];
    let mut i = [0u8; 4];

    f.copy_from_slice(&bytes[0..8]);
    let time = f64::from_le_bytes(f);
    f.copy_from_slice(&bytes[8..16]);
    let x = f64::from_le_bytes(f);
    i.copy_from_slice(&bytes[16..20]);
    let counter = i32::from_le_bytes(i);

    *state = Box::into_raw(Box::new(Snapshot { time, x, counter })) as fmi2FMUstate;
    fmi2OK
}

unsafe extern "C" fn mock_do_step(c: fmi2Component, current: fmi2Real, step: fmi2Real,
    _no_set_prior: fmi2Boolean) -> fmi2Status {
    let m = comp(c);
    m.steps.push((current, step));

    if m.has("step-error") {
        return fmi2Error;
    }
    if m.has("discard") {
        m.terminated = m.has("discard-terminate");
        return fmi2Discard;
    }

    m.time = current + step;
    m.h = step;
    m.x = m.time + m.u;
    m.counter += 1 + m.k;
    m.flag = m.counter % 2 == 0;

    if m.has("log-steps") {
        m.log(fmi2Warning, b"step %d done, ## of #i1# is fine\0", m.counter);
    }

    if m.has("step-warning") { fmi2Warning } else { fmi2OK }
}

unsafe extern "C" fn mock_get_boolean_status(c: fmi2Component, kind: fmi2StatusKind,
    value: *mut fmi2Boolean) -> fmi2Status {
    let m = comp(c);
    if m.has("status-fail") || kind != fmi2Terminated {
        return fmi2Error;
    }
    *value = m.terminated as fmi2Boolean;
    fmi2OK
}

unsafe extern "C" fn mock_get_real_status(c: fmi2Component, kind: fmi2StatusKind,
    value: *mut fmi2Real) -> fmi2Status {
    let m = comp(c);
    if kind != fmi2LastSuccessfulTime {
        return fmi2Error;
    }
    *value = m.time;
    fmi2OK
}

/// Symbol table standing in for a loaded module
pub struct MockLibrary {
    symbols: HashMap<String, *const c_void>
}

fn mock_functions() -> Vec<(&'static str, *const c_void)> {
    vec![
        ("GetTypesPlatform", mock_get_types_platform as *const c_void),
        ("GetVersion", mock_get_version as *const c_void),
        ("SetDebugLogging", mock_set_debug_logging as *const c_void),
        ("Instantiate", mock_instantiate as *const c_void),
        ("FreeInstance", mock_free_instance as *const c_void),
        ("SetupExperiment", mock_setup_experiment as *const c_void),
        ("EnterInitializationMode", mock_enter_initialization_mode as *const c_void),
        ("ExitInitializationMode", mock_exit_initialization_mode as *const c_void),
        ("Terminate", mock_terminate as *const c_void),
        ("Reset", mock_reset as *const c_void),
        ("GetReal", mock_get_real as *const c_void),
        ("GetInteger", mock_get_integer as *const c_void),
        ("GetBoolean", mock_get_boolean as *const c_void),
        ("GetString", mock_get_string as *const c_void),
        ("SetReal", mock_set_real as *const c_void),
        ("SetInteger", mock_set_integer as *const c_void),
        ("SetBoolean", mock_set_boolean as *const c_void),
        ("SetString", mock_set_string as *const c_void),
        ("GetFMUstate", mock_get_fmu_state as *const c_void),
        ("SetFMUstate", mock_set_fmu_state as *const c_void),
        ("FreeFMUstate", mock_free_fmu_state as *const c_void),
        ("SerializedFMUstateSize", mock_serialized_fmu_state_size as *const c_void),
        ("SerializeFMUstate", mock_serialize_fmu_state as *const c_void),
        ("DeSerializeFMUstate", mock_de_serialize_fmu_state as *const c_void),
        ("DoStep", mock_do_step as *const c_void),
        ("GetBooleanStatus", mock_get_boolean_status as *const c_void),
        ("GetRealStatus", mock_get_real_status as *const c_void),
    ]
}

impl MockLibrary {
    /// Export every mock function under `prefix`
    pub fn new(prefix: &str) -> MockLibrary {
        MockLibrary { symbols: HashMap::new() }.with_prefix(prefix)
    }

    pub fn empty() -> MockLibrary {
        MockLibrary { symbols: HashMap::new() }
    }

    pub fn with_prefix(mut self, prefix: &str) -> MockLibrary {
        for (name, addr) in mock_functions() {
            self.symbols.insert(format!("{}{}", prefix, name), addr);
        }
        self
    }

    pub fn without(mut self, symbols: &[&str]) -> MockLibrary {
        for symbol in symbols {
            self.symbols.remove(*symbol);
        }
        self
    }

    pub fn address(&self, symbol: &str) -> Option<*const c_void> {
        self.symbols.get(symbol).copied()
    }
}

impl SymbolSource for MockLibrary {
    fn lookup(&self, name: &str) -> Option<*const c_void> {
        self.symbols.get(name).copied()
    }
}

/// Bound mock interface plus a model description for one GUID
pub struct MockFmu {
    pub table: InterfaceTable,
    pub md: ModelDescription
}

impl MockFmu {
    pub fn new(guid: &str) -> MockFmu {
        MockFmu {
            table: binder::bind(&MockLibrary::new("fmi2"), ExecutionMode::CoSimulation),
            md: mock_description(guid)
        }
    }

    pub fn instantiate(&self, config: InstanceConfig) -> Instance<'_> {
        Instance::new(&self.table, &self.md, RESOURCES, config).expect("instantiation of mock failed")
    }
}
