// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT
use thiserror::Error;
use fmu_base::errors;

#[derive(Error, Debug)]
pub enum FmurunError {
    #[error(transparent)]
    FmuError(#[from] errors::FmuError),
    #[error(transparent)]
    LibraryError(#[from] libloading::Error),
    #[error(transparent)]
    CsvError(#[from] csv::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Could not resolve package path `{0}`")]
    PackageNotFound(String),
    #[error("Could not extract package `{0}` to `{1}`")]
    ExtractionFailed(String, String),
    #[error("Separator `{0}` is not a single byte character")]
    InvalidSeparator(char),
}
