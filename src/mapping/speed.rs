//! Speed setting validation and wire form

use thiserror::Error;

/// Validation failures for submitted speed values
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpeedError {
    /// The input did not parse as an integer
    #[error("invalid speed value: {0:?}")]
    InvalidFormat(String),

    /// The input parsed but is not a positive integer
    #[error("speed must be greater than zero, got {0}")]
    NonPositive(i64),
}

/// A validated, positive speed setting
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpeedCommand {
    value: i64,
}

impl SpeedCommand {
    /// Parses raw user input into a speed command
    ///
    /// Surrounding whitespace is tolerated; anything that is not a
    /// positive integer is rejected without any transmission happening.
    pub fn parse(raw: &str) -> Result<Self, SpeedError> {
        let value: i64 = raw
            .trim()
            .parse()
            .map_err(|_| SpeedError::InvalidFormat(raw.to_string()))?;
        if value <= 0 {
            return Err(SpeedError::NonPositive(value));
        }
        Ok(Self { value })
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    /// Newline-terminated wire frame, e.g. `S120\n`
    pub fn wire(&self) -> String {
        format!("S{}\n", self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_integer_parses() {
        let cmd = SpeedCommand::parse("120").unwrap();
        assert_eq!(cmd.value(), 120);
        assert_eq!(cmd.wire(), "S120\n");
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        assert_eq!(SpeedCommand::parse("  60 ").unwrap().value(), 60);
    }

    #[test]
    fn zero_is_rejected_as_non_positive() {
        assert_eq!(SpeedCommand::parse("0"), Err(SpeedError::NonPositive(0)));
    }

    #[test]
    fn negative_values_are_rejected_as_non_positive() {
        assert_eq!(SpeedCommand::parse("-5"), Err(SpeedError::NonPositive(-5)));
    }

    #[test]
    fn non_numeric_input_is_rejected_as_invalid_format() {
        assert_eq!(
            SpeedCommand::parse("abc"),
            Err(SpeedError::InvalidFormat("abc".to_string()))
        );
        assert_eq!(
            SpeedCommand::parse("12.5"),
            Err(SpeedError::InvalidFormat("12.5".to_string()))
        );
        assert_eq!(
            SpeedCommand::parse(""),
            Err(SpeedError::InvalidFormat(String::new()))
        );
    }
}
