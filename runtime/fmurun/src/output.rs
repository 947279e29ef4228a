// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

//! Time series output: one header row, then one value row per sample.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::{QuoteStyle, Writer, WriterBuilder};

use fmu_base::model_description::{ModelDescription, VariableType};

use crate::errors::FmurunError;

pub const RESULT_FILE: &str = "result.csv";
pub const DEFAULT_SEPARATOR: char = ',';
pub const SIGNIFICANT_DIGITS: usize = 17;

/// Scalar reads by value reference
pub trait ValueSource {
    fn real(&self, vr: u32) -> Result<f64, FmurunError>;
    fn integer(&self, vr: u32) -> Result<i32, FmurunError>;
    fn boolean(&self, vr: u32) -> Result<bool, FmurunError>;
    fn string(&self, vr: u32) -> Result<String, FmurunError>;
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RowKind {
    Header,
    Values
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Format like C's `%.17g`
pub fn format_significant(value: f64) -> String {
    if value.is_nan() {
        return String::from("nan");
    }
    if value.is_infinite() {
        return String::from(if value > 0.0 { "inf" } else { "-inf" });
    }

    let precision = SIGNIFICANT_DIGITS as i32;
    let scientific = format!("{:.*e}", SIGNIFICANT_DIGITS - 1, value);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (scientific.as_str(), 0),
    };

    if exponent < -4 || exponent >= precision {
        format!("{}e{}{:02}", trim_fraction(mantissa), if exponent < 0 { '-' } else { '+' }, exponent.abs())
    } else {
        let decimals = (precision - 1 - exponent) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    }
}

/// Format a real variable value; integral values keep a `.0`
pub fn format_real(value: f64) -> String {
    let mut s = format_significant(value);
    if value.is_finite() && !s.contains(|c: char| c == '.' || c == 'e') {
        s.push_str(".0");
    }
    s
}

fn localize(s: String, separator: char) -> String {
    if separator == ',' { s } else { s.replace('.', ",") }
}

/// Column names: `time` followed by one column per variable
pub fn format_header(md: &ModelDescription, separator: char) -> Vec<String> {
    let mut row = Vec::with_capacity(md.variables.len() + 1);
    row.push(String::from("time"));

    for var in md.variables.iter() {
        if separator == ',' {
            row.push(var.name.chars().filter(|c| *c != ' ').map(|c| if c == ',' { '.' } else { c }).collect());
        } else {
            row.push(var.name.clone());
        }
    }

    row
}

/// Current values of all variables, preceded by the time
pub fn format_values(source: &dyn ValueSource, md: &ModelDescription, time: f64,
    separator: char) -> Result<Vec<String>, FmurunError> {

    let mut row = Vec::with_capacity(md.variables.len() + 1);
    row.push(localize(format_significant(time), separator));

    for var in md.variables.iter() {
        let vr = var.value_reference;
        let field = match var.value_type {
            VariableType::Real => localize(format_real(source.real(vr)?), separator),
            VariableType::Integer | VariableType::Enumeration => source.integer(vr)?.to_string(),
            VariableType::Boolean => String::from(if source.boolean(vr)? { "1" } else { "0" }),
            VariableType::String => source.string(vr)?,
        };
        row.push(field);
    }

    Ok(row)
}

/// Writes result rows with a single character separator
pub struct ResultWriter<W: Write> {
    writer: Writer<W>,
    separator: char
}

impl ResultWriter<File> {
    pub fn create(path: &Path, separator: char) -> Result<ResultWriter<File>, FmurunError> {
        let file = File::create(path)?;
        ResultWriter::new(file, separator)
    }
}

impl<W: Write> ResultWriter<W> {
    pub fn new(inner: W, separator: char) -> Result<ResultWriter<W>, FmurunError> {
        if !separator.is_ascii() {
            return Err(FmurunError::InvalidSeparator(separator));
        }

        let writer = WriterBuilder::new()
            .delimiter(separator as u8)
            .quote_style(QuoteStyle::Never)
            .has_headers(false)
            .from_writer(inner);

        Ok(ResultWriter { writer, separator })
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    /// Write either the header row or the current values
    pub fn write_row(&mut self, kind: RowKind, source: &dyn ValueSource, md: &ModelDescription,
        time: f64) -> Result<(), FmurunError> {
        match kind {
            RowKind::Header => self.write_header(md),
            RowKind::Values => self.write_values(source, md, time),
        }
    }

    pub fn write_header(&mut self, md: &ModelDescription) -> Result<(), FmurunError> {
        self.writer.write_record(format_header(md, self.separator))?;
        Ok(())
    }

    pub fn write_values(&mut self, source: &dyn ValueSource, md: &ModelDescription,
        time: f64) -> Result<(), FmurunError> {
        let row = format_values(source, md, time, self.separator)?;
        self.writer.write_record(row)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), FmurunError> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W, FmurunError> {
        self.writer.into_inner().map_err(|e| FmurunError::IoError(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn significant_digits() {
        assert_eq!(format_significant(0.0), "0");
        assert_eq!(format_significant(1.5), "1.5");
        assert_eq!(format_significant(123456.0), "123456");
        assert_eq!(format_significant(0.1), "0.10000000000000001");
        assert_eq!(format_significant(-2.25), "-2.25");
        assert_eq!(format_significant(1e20), "1e+20");
        assert_eq!(format_significant(0.0009765625), "0.0009765625");
        assert_eq!(format_significant(9.5367431640625e-07), "9.5367431640625e-07");
        assert_eq!(format_significant(f64::NAN), "nan");
        assert_eq!(format_significant(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn reals_keep_fraction() {
        assert_eq!(format_real(1.0), "1.0");
        assert_eq!(format_real(-3.0), "-3.0");
        assert_eq!(format_real(2.5), "2.5");
        assert_eq!(format_real(1e20), "1e+20");
    }

    #[test]
    fn decimal_comma() {
        assert_eq!(localize(format_real(1.5), ';'), "1,5");
        assert_eq!(localize(format_real(1.5), ','), "1.5");
    }
}
