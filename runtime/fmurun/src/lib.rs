// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

pub mod binder;
pub mod errors;
pub mod loader;
pub mod logger;
pub mod output;
pub mod runtime;
pub mod slave;

pub use fmu_base::model_description;
pub use fmu_base::types;
