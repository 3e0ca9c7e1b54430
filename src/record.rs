use thiserror::Error;

/// One `value,speed` pair received from the device.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Record {
    pub value: f64,
    pub speed: f64,
}

impl Record {
    /// Line count the record would produce, as shown in the readout.
    pub fn complexity(&self) -> u32 {
        crate::params::line_count(self.value)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("expected 2 fields, got {0}")]
    FieldCount(usize),
    #[error("field {field:?} is not a number")]
    InvalidNumber { field: String },
    #[error("field {field:?} is not finite")]
    NonFinite { field: String },
}

impl RecordError {
    /// Field-count mismatches are routine line noise; numeric garbage deserves a warning.
    pub fn is_warning(&self) -> bool {
        !matches!(self, RecordError::FieldCount(_))
    }
}

pub fn parse_record(text: &str) -> Result<Record, RecordError> {
    let fields: Vec<&str> = text.trim().split(',').collect();
    if fields.len() != 2 {
        return Err(RecordError::FieldCount(fields.len()));
    }
    let value = parse_field(fields[0])?;
    let speed = parse_field(fields[1])?;
    Ok(Record { value, speed })
}

fn parse_field(raw: &str) -> Result<f64, RecordError> {
    let t = raw.trim();
    let v = t.parse::<f64>().map_err(|_| RecordError::InvalidNumber { field: t.to_string() })?;
    if !v.is_finite() {
        return Err(RecordError::NonFinite { field: t.to_string() });
    }
    Ok(v)
}
