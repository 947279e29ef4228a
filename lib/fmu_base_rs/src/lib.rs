// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

pub mod errors;
pub mod model_description;
pub mod model_conversion;
pub mod types;
