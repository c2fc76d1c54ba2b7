use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeStrError {
    #[error("empty time string")]
    Empty,

    #[error("malformed time string '{0}', expected HH:MM:SS[.sss]")]
    Malformed(String),

    #[error("field out of range in time string '{0}'")]
    OutOfRange(String),
}

/// Parse `HH:MM:SS[.sss]` (also `MM:SS[.sss]` and `SS[.sss]`) into seconds.
pub fn time_str_to_seconds(text: &str) -> Result<f64, TimeStrError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(TimeStrError::Empty);
    }

    let fields: Vec<&str> = text.split(':').collect();
    if fields.len() > 3 {
        return Err(TimeStrError::Malformed(text.to_string()));
    }

    let (whole_fields, last) = fields.split_at(fields.len() - 1);

    let seconds: f64 = last[0]
        .parse()
        .map_err(|_| TimeStrError::Malformed(text.to_string()))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(TimeStrError::OutOfRange(text.to_string()));
    }
    if !whole_fields.is_empty() && seconds >= 60.0 {
        return Err(TimeStrError::OutOfRange(text.to_string()));
    }

    let mut total = 0.0;
    for (i, field) in whole_fields.iter().enumerate() {
        if field.is_empty() || !field.chars().all(|c| c.is_ascii_digit()) {
            return Err(TimeStrError::Malformed(text.to_string()));
        }
        let value: u64 = field
            .parse()
            .map_err(|_| TimeStrError::Malformed(text.to_string()))?;

        // minutes are bounded only when an hours field precedes them
        let is_minutes = i == whole_fields.len() - 1 && whole_fields.len() == 2;
        if is_minutes && value >= 60 {
            return Err(TimeStrError::OutOfRange(text.to_string()));
        }
        total = total * 60.0 + value as f64;
    }

    Ok(total * 60.0 + seconds)
}
