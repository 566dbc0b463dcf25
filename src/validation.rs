//! Validation stringency for reading
//!
//! The stringency decides what happens when a reader meets a problem it can recover from:
//! a record inconsistent with the dialect header, or a stream that ends without its EOF
//! container.

use std::{fmt, str::FromStr};

use crate::{AlignmentHeader, AlignmentRecord, Error, Result, error::ReadError};

/// How recoverable problems are treated while reading
///
/// The default stringency is `Strict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationStringency {
    /// Fail on the first problem (default)
    #[default]
    Strict,

    /// Log a warning and continue
    Lenient,

    /// Continue without reporting
    Silent,
}
impl ValidationStringency {
    /// Applies the stringency to a recoverable error.
    ///
    /// Returns the error under `Strict`, otherwise swallows it (logging under `Lenient`)
    /// so the caller can skip the offending item.
    pub fn handle(&self, error: Error) -> Result<()> {
        match self {
            Self::Strict => Err(error),
            Self::Lenient => {
                log::warn!("{error}");
                Ok(())
            }
            Self::Silent => Ok(()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Lenient => "lenient",
            Self::Silent => "silent",
        }
    }
}
impl FromStr for ValidationStringency {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            "silent" => Ok(Self::Silent),
            _ => Err(format!("Unknown validation stringency: {s}")),
        }
    }
}
impl fmt::Display for ValidationStringency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checks a record against the references declared by the dialect header
pub fn validate_record(
    record: &AlignmentRecord,
    header: &AlignmentHeader,
) -> std::result::Result<(), ReadError> {
    let invalid = |reason: String| ReadError::InvalidRecord {
        name: String::from_utf8_lossy(record.name()).into_owned(),
        reason,
    };
    for (what, index) in [
        ("reference", record.reference_index()),
        ("mate reference", record.mate_reference_index()),
    ] {
        if let Some(index) = index
            && index >= header.num_references()
        {
            return Err(invalid(format!(
                "{what} index {index} is not among the {} header references",
                header.num_references()
            )));
        }
    }
    if record.alignment_start() < 0 {
        return Err(invalid(format!(
            "negative alignment start {}",
            record.alignment_start()
        )));
    }
    if record.is_placed()
        && let Some(reference) = record.reference_index().and_then(|i| header.reference(i))
        && record.alignment_end() > reference.length as i64
    {
        return Err(invalid(format!(
            "alignment end {} exceeds the length {} of {}",
            record.alignment_end(),
            reference.length,
            reference.name
        )));
    }
    if !record.qualities().is_empty() && record.qualities().len() != record.sequence().len() {
        return Err(invalid(format!(
            "{} qualities for {} bases",
            record.qualities().len(),
            record.sequence().len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AlignmentRecordBuilder, SortOrder};

    fn header() -> Result<AlignmentHeader> {
        let mut header = AlignmentHeader::new(SortOrder::Coordinate);
        header.add_reference("chr1", 100)?;
        Ok(header)
    }

    #[test]
    fn test_handle() {
        let error = || Error::from(ReadError::DuplicateHeader(0));
        assert!(ValidationStringency::Strict.handle(error()).is_err());
        assert!(ValidationStringency::Lenient.handle(error()).is_ok());
        assert!(ValidationStringency::Silent.handle(error()).is_ok());
    }

    #[test]
    fn test_parse() {
        assert_eq!("STRICT".parse(), Ok(ValidationStringency::Strict));
        assert_eq!("silent".parse(), Ok(ValidationStringency::Silent));
        assert!("loose".parse::<ValidationStringency>().is_err());
        assert_eq!(ValidationStringency::Lenient.to_string(), "lenient");
    }

    #[test]
    fn test_validate_record() -> Result<()> {
        let header = header()?;
        let valid = AlignmentRecordBuilder::default()
            .reference_index(0)
            .alignment_start(97)
            .sequence(b"ACGT")
            .qualities(b"IIII")
            .build()?;
        assert!(validate_record(&valid, &header).is_ok());

        let past_end = AlignmentRecordBuilder::default()
            .reference_index(0)
            .alignment_start(98)
            .sequence(b"ACGT")
            .build()?;
        assert!(validate_record(&past_end, &header).is_err());

        let unknown_reference = AlignmentRecordBuilder::default()
            .reference_index(1)
            .alignment_start(1)
            .sequence(b"ACGT")
            .build()?;
        assert!(validate_record(&unknown_reference, &header).is_err());

        let bad_qualities = AlignmentRecordBuilder::default()
            .sequence(b"ACGT")
            .qualities(b"II")
            .build()?;
        assert!(validate_record(&bad_qualities, &header).is_err());
        Ok(())
    }
}
