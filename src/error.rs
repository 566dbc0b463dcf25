use std::error::Error as StdError;

/// Custom Result type for alnstream operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the alnstream library, encompassing all possible error cases
/// that can occur while writing, reading, or indexing container streams.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Errors related to the file definition and the dialect header
    #[error("Error processing header: {0}")]
    HeaderError(#[from] HeaderError),

    /// Errors that occur during write operations
    #[error("Error writing stream: {0}")]
    WriteError(#[from] WriteError),

    /// Errors that occur during read operations
    #[error("Error reading stream: {0}")]
    ReadError(#[from] ReadError),

    /// Errors related to stream indexing and indexed queries
    #[error("Error processing index: {0}")]
    IndexError(#[from] IndexError),

    /// Standard I/O errors
    #[error("Error with IO: {0}")]
    IoError(#[from] std::io::Error),

    /// UTF-8 conversion errors
    #[error("Error with UTF8: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),

    /// Generic errors for other unexpected situations
    #[error("Generic error: {0}")]
    GenericError(#[from] Box<dyn StdError + Send + Sync>),
}
impl Error {
    /// Checks if the error signals that an index does not belong to the stream it was used with
    ///
    /// This is useful for determining if an index needs to be rebuilt.
    #[must_use]
    pub fn is_index_mismatch(&self) -> bool {
        match self {
            Self::IndexError(err) => err.is_mismatch(),
            _ => false,
        }
    }

    /// Checks if the error is the result of a stream ending before its EOF container
    #[must_use]
    pub fn is_truncation(&self) -> bool {
        matches!(self, Self::ReadError(ReadError::TruncatedStream { .. }))
    }

    /// Checks if the error is fatal to the writer that produced it
    #[must_use]
    pub fn is_fatal_write(&self) -> bool {
        matches!(
            self,
            Self::WriteError(
                WriteError::WriteAfterFinish
                    | WriteError::EncodingFailure(_)
                    | WriteError::WriterAborted
            )
        )
    }
}

/// Errors specific to the file definition and the textual dialect header
#[derive(thiserror::Error, Debug)]
pub enum HeaderError {
    /// The magic number in the file definition does not match the expected value
    #[error("Invalid file definition magic: {0:?}")]
    InvalidMagic([u8; 4]),

    /// The format version is not supported by this library
    #[error("Unsupported format version: {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    /// A header container is too small to carry a file definition
    #[error("Header container of {0} bytes is too small to hold a file definition")]
    TruncatedDefinition(usize),

    /// A header line could not be parsed
    #[error("Invalid header line {line}: {reason}")]
    InvalidLine { line: usize, reason: String },

    /// A reference sequence is declared twice
    #[error("Duplicate reference sequence name: {0}")]
    DuplicateReference(String),
}

/// Errors that can occur while reading container streams
#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    /// The stream ended mid-container, or without an EOF container
    #[error("Stream truncated at byte {offset}: {reason}")]
    TruncatedStream { offset: u64, reason: &'static str },

    /// The container header does not carry the container magic
    #[error("Invalid container magic {0:?} at byte {1}")]
    InvalidContainerMagic([u8; 4], u64),

    /// The container kind byte is not recognized
    #[error("Unknown container kind {0} at byte {1}")]
    UnknownContainerKind(u8, u64),

    /// The slice header does not carry the slice magic
    #[error("Invalid slice magic {0:?}")]
    InvalidSliceMagic([u8; 3]),

    /// The block compression method is not recognized
    #[error("Unknown block compression method {0}")]
    UnknownBlockMethod(u8),

    /// The layout of a container or slice is inconsistent with its header
    #[error("Malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    /// A second HEADER container was found in the stream
    #[error("Duplicate header container at byte {0}")]
    DuplicateHeader(u64),

    /// A HEADER container was found after DATA containers
    #[error("Header container at byte {0} follows data containers")]
    HeaderAfterData(u64),

    /// A container was found after the EOF container
    #[error("Container found at byte {0} after the EOF container")]
    DataAfterEof(u64),

    /// A record was encoded against a reference that is not available for decoding
    #[error("Reference sequence {0} is required to decode records but is not available")]
    MissingReference(usize),

    /// A decoded record is inconsistent with the dialect header
    #[error("Invalid record {name}: {reason}")]
    InvalidRecord { name: String, reason: String },
}

/// Errors that can occur while writing container streams
#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    /// The writer was used after `finish`
    #[error("Writer has already been finished")]
    WriteAfterFinish,

    /// A record could not be serialized
    #[error("Unable to encode record: {0}")]
    EncodingFailure(String),

    /// The writer failed earlier and refuses further output
    #[error("Writer was aborted by an earlier failure")]
    WriterAborted,

    /// `write_header` was called twice
    #[error("The header container has already been written")]
    HeaderAlreadyWritten,

    /// `write_header` was called after data containers were emitted
    #[error("The header container must precede all data containers")]
    HeaderAfterData,

    /// A partition passed to `ingest` is not a bare run of data containers
    #[error("Invalid partition: {0}")]
    InvalidPartition(String),

    /// A configuration value is out of range
    #[error("Invalid writer configuration: {0}")]
    InvalidConfiguration(&'static str),

    /// A record builder was finished without a sequence
    #[error("AlignmentRecordBuilder requires a sequence")]
    MissingSequence,
}

/// Errors related to stream indexes and indexed queries
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// A query was attempted without an index
    #[error("A query requires an index but none was supplied")]
    IndexMissing,

    /// The index refers to byte ranges that do not exist in the stream
    #[error("Index is corrupt or belongs to another stream: {0}")]
    IndexCorrupt(String),

    /// The query reference is not declared by the stream's dialect header
    #[error("Query reference {reference_index} is not among the {num_references} header references")]
    RegionOutOfRange {
        reference_index: i32,
        num_references: usize,
    },

    /// The index is not in coordinate order and cannot answer region queries
    #[error("Index is not coordinate sorted at entry {0}")]
    UnsortedIndex(usize),

    /// The index bytes are in neither supported format
    #[error("Unrecognized index format")]
    UnknownFormat,

    /// The index framing is broken
    #[error("Invalid index framing: {0}")]
    InvalidFraming(String),

    /// A value does not fit in the fixed-width legacy layout
    #[error("Value {value} of field {field} does not fit the legacy index layout")]
    FieldOverflow { field: &'static str, value: i64 },

    /// The indexer was finished twice
    #[error("Indexer has already been finished")]
    AlreadyFinished,
}
impl IndexError {
    /// Checks if this error indicates a mismatch between the index and the stream
    ///
    /// This is useful to determine if the index needs to be rebuilt.
    #[must_use]
    pub fn is_mismatch(&self) -> bool {
        matches!(
            self,
            Self::IndexCorrupt(_) | Self::InvalidFraming(_) | Self::UnknownFormat
        )
    }
}

/// Trait for converting arbitrary errors into `Error`
pub trait IntoAlnstreamError {
    fn into_alnstream_error(self) -> Error;
}

impl<E> IntoAlnstreamError for E
where
    E: StdError + Send + Sync + 'static,
{
    fn into_alnstream_error(self) -> Error {
        Error::GenericError(Box::new(self))
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum MyError {
        #[error("Custom error: {0}")]
        CustomError(String),
    }

    #[test]
    fn test_into_alnstream_error() {
        let my_error = MyError::CustomError(String::from("some error"));
        let error = my_error.into_alnstream_error();
        assert!(matches!(error, Error::GenericError(_)));
    }

    #[test]
    fn test_is_index_mismatch() {
        let error = Error::IndexError(IndexError::IndexCorrupt("offset 10".to_string()));
        assert!(error.is_index_mismatch());

        let error = Error::IndexError(IndexError::IndexMissing);
        assert!(!error.is_index_mismatch());

        let error = Error::WriteError(WriteError::WriteAfterFinish);
        assert!(!error.is_index_mismatch());
    }

    #[test]
    fn test_is_truncation() {
        let error = Error::ReadError(ReadError::TruncatedStream {
            offset: 120,
            reason: "missing EOF container",
        });
        assert!(error.is_truncation());
        assert!(format!("{error}").contains("120"));
    }

    #[test]
    fn test_is_fatal_write() {
        assert!(Error::from(WriteError::WriteAfterFinish).is_fatal_write());
        assert!(Error::from(WriteError::EncodingFailure("bad".into())).is_fatal_write());
        assert!(!Error::from(WriteError::HeaderAlreadyWritten).is_fatal_write());
    }

    #[test]
    fn test_region_out_of_range_message() {
        let error = IndexError::RegionOutOfRange {
            reference_index: 7,
            num_references: 2,
        };
        let error_str = format!("{error}");
        assert!(error_str.contains('7'));
        assert!(error_str.contains('2'));
    }

    #[test]
    fn test_field_overflow_message() {
        let error = IndexError::FieldOverflow {
            field: "slice_size",
            value: 1 << 40,
        };
        assert!(format!("{error}").contains("slice_size"));
    }

    #[test]
    fn test_error_conversions() {
        let error: Error = HeaderError::InvalidMagic(*b"BAD!").into();
        assert!(matches!(error, Error::HeaderError(_)));

        let error: Error = ReadError::DuplicateHeader(0).into();
        assert!(matches!(error, Error::ReadError(_)));

        let error: Error = IndexError::IndexMissing.into();
        assert!(matches!(error, Error::IndexError(_)));

        let error: Error = std::io::Error::other("disk").into();
        assert!(matches!(error, Error::IoError(_)));
    }
}
