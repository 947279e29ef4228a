// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use libloading::Library;
use tracing::{debug, info, warn};
use uuid::Uuid;

use fmi2_abi as FMI;
use fmu_base::errors::FmuError;
use fmu_base::model_conversion::{extract_version, parse_model_description};
use fmu_base::model_description as MD;
use fmu_base::types::ExecutionMode;

use crate::binder::{self, InterfaceTable};
use crate::errors::FmurunError;
use crate::runtime::{Instance, InstanceConfig};
use FmurunError::FmuError as FMERR;

pub const MODEL_DESCRIPTION_FILE: &str = "modelDescription.xml";
pub const RESOURCES_DIR: &str = "resources";
pub const BINARIES_DIR: &str = "binaries";
const WORKING_DIR_PREFIX: &str = "fmuTmp";

/// Extraction and cleanup of package archives
pub trait ArchiveTool {
    /// Unpack `archive` into the existing directory `dest`
    fn extract(&self, archive: &Path, dest: &Path) -> bool;
    /// Recursively remove `dir`
    fn remove_tree(&self, dir: &Path) -> bool;
}

/// Runs `unzip` and `rm` from the host
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellArchiveTool;

impl ArchiveTool for ShellArchiveTool {
    fn extract(&self, archive: &Path, dest: &Path) -> bool {
        let status = Command::new("unzip")
            .arg("-q")
            .arg("-o")
            .arg(archive)
            .arg("-d")
            .arg(dest)
            .status();

        match status {
            // exit code 1 only reports warnings
            Ok(status) => matches!(status.code(), Some(0) | Some(1)),
            Err(e) => {
                warn!("Could not run unzip: {}", e);
                false
            }
        }
    }

    fn remove_tree(&self, dir: &Path) -> bool {
        match Command::new("rm").arg("-rf").arg(dir).status() {
            Ok(status) => status.success(),
            Err(e) => {
                warn!("Could not run rm: {}", e);
                false
            }
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct LoadOptions {
    /// Leave the extracted package on disk when the package is dropped
    pub keep_working_dir: bool
}

/// Name of the `binaries` subfolder holding modules for the host platform
pub fn platform_folder() -> &'static str {
    if cfg!(target_os = "windows") {
        if cfg!(target_pointer_width = "64") { "win64" } else { "win32" }
    } else if cfg!(target_os = "macos") {
        "darwin64"
    } else if cfg!(target_pointer_width = "64") {
        "linux64"
    } else {
        "linux32"
    }
}

/// Location of the native module inside an extracted package
pub fn module_path(working_dir: &Path, model_identifier: &str) -> PathBuf {
    working_dir
        .join(BINARIES_DIR)
        .join(platform_folder())
        .join(format!("{}{}", model_identifier, std::env::consts::DLL_SUFFIX))
}

/// `file://` URI of the `resources` folder of an extracted package
pub fn resource_location(working_dir: &Path) -> String {
    let path = working_dir.join(RESOURCES_DIR).to_string_lossy().replace('\\', "/");
    if path.starts_with('/') {
        format!("file://{}", path)
    } else {
        format!("file:///{}", path)
    }
}

/// An extracted, validated and bound package
pub struct Package {
    md: MD::ModelDescription,
    table: InterfaceTable,
    working_dir: PathBuf,
    library: Option<Library>,
    archive_tool: Box<dyn ArchiveTool>,
    options: LoadOptions
}

struct WorkingDir<'t> {
    path: PathBuf,
    tool: &'t dyn ArchiveTool,
    armed: bool
}

impl Drop for WorkingDir<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!("Removing working directory {}", self.path.display());
            if !self.tool.remove_tree(&self.path) {
                warn!("Could not remove working directory {}", self.path.display());
            }
        }
    }
}

impl Package {
    /// Load a package with the default shell archive tool
    pub fn load(filename: &Path, mode: ExecutionMode) -> Result<Package, FmurunError> {
        Package::load_with(filename, mode, Box::new(ShellArchiveTool), LoadOptions::default())
    }

    /// Extract, validate and bind a package
    ///
    /// * `filename` - path of the package archive
    /// * `mode` - execution mode whose interface is bound
    /// * `archive_tool` - extraction and cleanup collaborator, kept for cleanup on drop
    pub fn load_with(filename: &Path, mode: ExecutionMode, archive_tool: Box<dyn ArchiveTool>,
        options: LoadOptions) -> Result<Package, FmurunError> {

        let archive = fs::canonicalize(filename)
            .map_err(|_| FmurunError::PackageNotFound(filename.display().to_string()))?;

        let path = std::env::temp_dir().join(format!("{}{}", WORKING_DIR_PREFIX, Uuid::new_v4()));
        fs::create_dir_all(&path)?;
        let mut working_dir = WorkingDir { path, tool: archive_tool.as_ref(), armed: true };

        if !archive_tool.extract(&archive, &working_dir.path) {
            return Err(FmurunError::ExtractionFailed(
                archive.display().to_string(), working_dir.path.display().to_string()));
        }
        debug!("Extracted {} to {}", archive.display(), working_dir.path.display());

        let md_path = working_dir.path.join(MODEL_DESCRIPTION_FILE);
        let xml = fs::read_to_string(&md_path)?;

        let version = extract_version(&xml)
            .ok_or_else(|| FMERR(FmuError::MissingVersion(md_path.display().to_string())))?;
        if version != FMI::fmi2Version {
            return Err(FMERR(FmuError::VersionMismatch(version, FMI::fmi2Version.to_string())));
        }

        let md = parse_model_description(&xml)?;
        log_model_description(&md, mode);

        let model_identifier = md.execution_mode(mode)
            .ok_or(FMERR(FmuError::MissingExecutionMode(mode)))?
            .model_identifier.clone();

        let module = module_path(&working_dir.path, &model_identifier);
        debug!("Loading module {}", module.display());
        let library = unsafe { Library::new(&module) }?;

        let table = binder::bind(&library, mode);
        if !table.is_usable() {
            return Err(FMERR(FmuError::BindFailed(module.display().to_string())));
        }
        debug!("Bound interface with `{}` naming convention", table.convention);

        working_dir.armed = false;
        let path = working_dir.path.clone();
        drop(working_dir);

        Ok(Package {
            md,
            table,
            working_dir: path,
            library: Some(library),
            archive_tool,
            options
        })
    }

    /// Create a co-simulation instance reading resources from this package
    pub fn instantiate(&self, config: InstanceConfig) -> Result<Instance<'_>, FmurunError> {
        Instance::new(&self.table, &self.md, &self.resource_location(), config)
    }

    pub fn resource_location(&self) -> String {
        resource_location(&self.working_dir)
    }

    pub fn model_description(&self) -> &MD::ModelDescription {
        &self.md
    }

    pub fn interface(&self) -> &InterfaceTable {
        &self.table
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}

impl Drop for Package {
    fn drop(&mut self) {
        // unload before the module file is removed
        drop(self.library.take());

        if self.options.keep_working_dir {
            return;
        }
        if !self.archive_tool.remove_tree(&self.working_dir) {
            warn!("Could not remove working directory {}", self.working_dir.display());
        }
    }
}

fn log_model_description(md: &MD::ModelDescription, mode: ExecutionMode) {
    info!("Model description:");
    info!("  fmiVersion: {}", md.fmi_version);
    info!("  modelName: {}", md.model.name);
    info!("  guid: {}", md.model.guid);
    info!("  description: {}", md.model.description);
    info!("  generationTool: {}", md.model.generation_tool);
    info!("  generationDateTime: {}", md.model.generation_date_time);
    info!("  variableNamingConvention: {}", md.model.variable_naming_convention);
    info!("  numberOfEventIndicators: {}", md.model.number_of_event_indicators);
    info!("  variables: {}", md.variables.len());

    if let Some(info) = md.execution_mode(mode) {
        info!("{}:", mode.element_name());
        info!("  modelIdentifier: {}", info.model_identifier);
        info!("  canHandleVariableCommunicationStepSize: {}", info.capabilities.can_handle_variable_communication_step_size);
        info!("  canGetAndSetFMUstate: {}", info.capabilities.can_get_and_set_fmu_state);
        info!("  canSerializeFMUstate: {}", info.capabilities.can_serialize_fmu_state);
    }
}
