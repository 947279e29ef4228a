// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

//! Adapter for running an instance as a slave of an external
//! synchronization engine that owns the step schedule.

use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;

use csv::{Reader, ReaderBuilder, StringRecord};
use tracing::{debug, info, warn};

use fmu_base::errors::FmuError;
use fmu_base::types::StepOutcome;

use crate::errors::FmurunError;
use crate::output::{ResultWriter, RowKind, DEFAULT_SEPARATOR, RESULT_FILE};
use crate::runtime::{Instance, InstanceState};

/// Value references and files used by a slave
#[derive(Debug, Clone)]
pub struct SlaveConfig {
    pub input_integer: Option<u32>,
    pub input_real: Option<u32>,
    pub output_integer: Option<u32>,
    pub output_real: Option<u32>,
    pub input_file: Option<PathBuf>,
    pub separator: char,
    pub result_file: PathBuf
}

impl Default for SlaveConfig {
    fn default() -> Self {
        SlaveConfig {
            input_integer: None,
            input_real: None,
            output_integer: None,
            output_real: None,
            input_file: None,
            separator: DEFAULT_SEPARATOR,
            result_file: PathBuf::from(RESULT_FILE)
        }
    }
}

/// States announced by the synchronization engine
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ProtocolState {
    Configuring,
    Initializing,
    Running,
    Stopped,
    Alive
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Control {
    Continue,
    Shutdown
}

/// Values published after a step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlaveOutputs {
    pub outcome: StepOutcome,
    pub integer: Option<i32>,
    pub real: Option<f64>
}

pub struct Slave<'a, W: Write> {
    instance: Instance<'a>,
    writer: ResultWriter<W>,
    config: SlaveConfig,
    input: Option<Reader<Box<dyn Read>>>,
    record: StringRecord,
    time_resolution: f64,
    steps_done: u64,
    header_written: bool
}

impl<'a> Slave<'a, File> {
    /// Open the result file and the optional input file named in `config`
    pub fn create(instance: Instance<'a>, config: SlaveConfig) -> Result<Slave<'a, File>, FmurunError> {
        let writer = ResultWriter::create(&config.result_file, config.separator)?;
        let input = match &config.input_file {
            Some(path) => Some(Box::new(File::open(path)?) as Box<dyn Read>),
            None => None,
        };
        Ok(Slave::new(instance, writer, config, input))
    }
}

impl<'a, W: Write> Slave<'a, W> {
    /// * `input` - optional source of `<int>,<real>` rows, one consumed per step
    pub fn new(instance: Instance<'a>, writer: ResultWriter<W>, config: SlaveConfig,
        input: Option<Box<dyn Read>>) -> Slave<'a, W> {

        let input = input.map(|r| ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(r));
        let time_resolution = instance.config().step_size;

        Slave {
            instance,
            writer,
            config,
            input,
            record: StringRecord::new(),
            time_resolution,
            steps_done: 0,
            header_written: false
        }
    }

    /// One step unit lasts `numerator / denominator` seconds
    pub fn set_time_res(&mut self, numerator: u32, denominator: u32) -> Result<(), FmurunError> {
        if numerator == 0 || denominator == 0 {
            return Err(FmurunError::FmuError(FmuError::InvalidStepSize(
                numerator as f64 / denominator as f64)));
        }
        self.time_resolution = numerator as f64 / denominator as f64;
        debug!("Time resolution set to {}", self.time_resolution);
        Ok(())
    }

    /// Rewind to the start time and clear the step counter
    pub fn configure(&mut self) -> Result<(), FmurunError> {
        if self.instance.state() == InstanceState::Initialized {
            self.instance.reset()?;
        }
        self.steps_done = 0;
        info!("Configured slave for `{}`", self.instance.model_description().model.name);
        Ok(())
    }

    /// Initialize the instance and write the header and the initial values
    pub fn initialize(&mut self) -> Result<(), FmurunError> {
        self.instance.initialize()?;

        let md = self.instance.model_description();
        let time = self.instance.time();
        if !self.header_written {
            self.writer.write_row(RowKind::Header, &self.instance, md, time)?;
            self.header_written = true;
        }
        self.writer.write_row(RowKind::Values, &self.instance, md, time)?;
        Ok(())
    }

    fn read_inputs(&mut self) -> Option<(i32, f64)> {
        let reader = self.input.as_mut()?;

        match reader.read_record(&mut self.record) {
            Ok(true) => {},
            Ok(false) => return None,
            Err(e) => {
                warn!("Could not read input row: {}", e);
                return None;
            }
        }

        let integer = self.record.get(0).and_then(|f| f.parse::<i32>().ok());
        let real = self.record.get(1).and_then(|f| f.parse::<f64>().ok());
        match (integer, real) {
            (Some(i), Some(r)) => Some((i, r)),
            _ => {
                warn!("Skipping malformed input row {:?}", self.record);
                None
            }
        }
    }

    /// Apply the next inputs, advance by `steps` time units and collect the outputs
    pub fn do_step(&mut self, steps: u64) -> Result<SlaveOutputs, FmurunError> {
        if let Some((integer, real)) = self.read_inputs() {
            if let Some(vr) = self.config.input_integer {
                self.instance.set_integer(vr, integer)?;
            }
            if let Some(vr) = self.config.input_real {
                self.instance.set_real(vr, real)?;
            }
        }

        let outcome = self.instance.do_step(self.time_resolution * steps as f64)?;

        if let StepOutcome::Advanced { time } = outcome {
            self.steps_done += 1;
            let md = self.instance.model_description();
            self.writer.write_row(RowKind::Values, &self.instance, md, time)?;
        }

        let integer = match self.config.output_integer {
            Some(vr) => Some(self.instance.get_integer(vr)?),
            None => None,
        };
        let real = match self.config.output_real {
            Some(vr) => Some(self.instance.get_real(vr)?),
            None => None,
        };

        Ok(SlaveOutputs { outcome, integer, real })
    }

    /// React to a state change of the engine
    pub fn state_changed(&mut self, state: ProtocolState) -> Result<Control, FmurunError> {
        debug!("Protocol state changed to {:?}", state);
        match state {
            ProtocolState::Alive => {
                self.writer.flush()?;
                self.instance.terminate()?;
                info!("Slave finished after {} steps", self.steps_done);
                Ok(Control::Shutdown)
            },
            _ => Ok(Control::Continue),
        }
    }

    pub fn steps_done(&self) -> u64 {
        self.steps_done
    }

    pub fn instance(&self) -> &Instance<'a> {
        &self.instance
    }

    pub fn config(&self) -> &SlaveConfig {
        &self.config
    }

    /// Stop the instance and hand back the result sink
    pub fn finish(mut self) -> Result<W, FmurunError> {
        self.instance.terminate()?;
        self.writer.into_inner()
    }
}
