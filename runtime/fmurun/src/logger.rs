// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

//! Logger callback handed to instances.
//!
//! Messages may reference variables as `#<t><vr>#` where `t` is one of
//! `r`, `i`, `b`, `s`; these are replaced by the variable name, `##` by `#`.

use std::cell::RefCell;
use std::ffi::CStr;

use libc::{c_char, c_int, c_void};
use tracing::{error, info, warn};

use fmi2_abi as FMI;
use fmu_base::model_description::{ModelVariable, VariableType};
use fmu_base::types::Status;

extern "C" {
    /// Formats the printf style message, then calls [`fmurun_log_message`]
    pub fn fmurun_logger(
        componentEnvironment: FMI::fmi2ComponentEnvironment,
        instanceName: FMI::fmi2String,
        status: FMI::fmi2Status,
        category: FMI::fmi2String,
        message: FMI::fmi2String,
        ...
    );
}

enum LogSink {
    Tracing,
    Buffer(RefCell<Vec<String>>)
}

/// State the logger callback needs, reached through the component environment
/// pointer of the callback bundle.
pub struct LogContext<'a> {
    variables: &'a [ModelVariable],
    sink: LogSink
}

impl<'a> LogContext<'a> {
    /// Messages are emitted as tracing events
    pub fn new(variables: &'a [ModelVariable]) -> LogContext<'a> {
        LogContext {
            variables,
            sink: LogSink::Tracing
        }
    }

    /// Messages are kept in memory until taken with [`LogContext::take_messages`]
    pub fn buffered(variables: &'a [ModelVariable]) -> LogContext<'a> {
        LogContext {
            variables,
            sink: LogSink::Buffer(RefCell::new(Vec::new()))
        }
    }

    pub fn rewrite(&self, message: &str) -> String {
        replace_refs_in_message(message, self.variables)
    }

    /// Rewrite and emit one message; returns the final log line
    pub fn log(&self, instance_name: Option<&str>, status: Status, category: Option<&str>,
        message: &str) -> String {

        let line = format!("{} {} ({}): {}",
            status,
            instance_name.unwrap_or("?"),
            category.unwrap_or("?"),
            self.rewrite(message));

        match &self.sink {
            LogSink::Tracing => match status {
                Status::OK | Status::Pending => info!("{}", line),
                Status::Warning | Status::Discard => warn!("{}", line),
                Status::Error | Status::Fatal => error!("{}", line),
            },
            LogSink::Buffer(messages) => messages.borrow_mut().push(line.clone()),
        }

        line
    }

    pub fn take_messages(&self) -> Vec<String> {
        match &self.sink {
            LogSink::Tracing => Vec::new(),
            LogSink::Buffer(messages) => messages.take(),
        }
    }

    /// Callback bundle for `fmi2Instantiate`. The context must stay at a fixed
    /// address for as long as the instance lives.
    pub fn callback_functions(&self) -> FMI::fmi2CallbackFunctions {
        FMI::fmi2CallbackFunctions {
            logger: fmurun_logger,
            allocateMemory: libc::calloc,
            freeMemory: libc::free,
            stepFinished: None,
            componentEnvironment: self as *const LogContext as *mut c_void
        }
    }
}

/// Receives the formatted message from the C side of the logger callback.
///
/// # Safety
/// `component_environment` must be null or point to a live [`LogContext`];
/// string arguments must be null or NUL terminated.
#[no_mangle]
pub unsafe extern "C" fn fmurun_log_message(component_environment: *mut c_void,
    instance_name: *const c_char, status: c_int, category: *const c_char, message: *const c_char) {

    let text = |p: *const c_char| {
        if p.is_null() { None } else { Some(CStr::from_ptr(p).to_string_lossy()) }
    };
    let instance_name = text(instance_name);
    let category = text(category);
    let message = text(message).unwrap_or_default();

    if component_environment.is_null() {
        warn!("{} {} ({}): {}", Status::from(status),
            instance_name.as_deref().unwrap_or("?"), category.as_deref().unwrap_or("?"), message);
        return;
    }

    let ctx = &*(component_environment as *const LogContext);
    ctx.log(instance_name.as_deref(), Status::from(status), category.as_deref(), &message);
}

/// Replace `#r12#` style references by variable names and `##` by `#`.
/// `#IND` and `#INF` are kept. An unmatched `#` or an unreadable value
/// reference ends the message with a single `#`.
pub fn replace_refs_in_message(msg: &str, variables: &[ModelVariable]) -> String {
    let mut out = String::with_capacity(msg.len());
    let mut rest = msg;

    while let Some(pos) = rest.find('#') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + 1..];

        // 1.#IND, 1.#INF
        if tail.starts_with("IND") || tail.starts_with("INF") {
            out.push('#');
            rest = tail;
            continue;
        }

        let end = match tail.find('#') {
            Some(end) => end,
            None => {
                warn!("unmatched '#' in '{}'", msg);
                out.push('#');
                return out;
            }
        };

        if end == 0 {
            out.push('#');
            rest = &tail[1..];
            continue;
        }

        let mut reference = tail[..end].chars();
        let tag = reference.next().unwrap_or('#');
        let digits: String = reference.take_while(|c| c.is_ascii_digit()).collect();

        match digits.parse::<u32>() {
            Ok(vr) => {
                let name = VariableType::from_reference_tag(tag)
                    .and_then(|t| variables.iter().find(|v| v.value_type == t && v.value_reference == vr))
                    .map(|v| v.name.as_str())
                    .unwrap_or("?");
                out.push_str(name);
                rest = &tail[end + 1..];
            }
            Err(_) => {
                warn!("illegal value reference at position {} in '{}'", msg.len() - tail.len() + 1, msg);
                out.push('#');
                return out;
            }
        }
    }

    out.push_str(rest);
    out
}
