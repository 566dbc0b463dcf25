//! The dialect header and the binary file definition carried by the HEADER container.
//!
//! The dialect header is a small tab-delimited text header describing the sort order,
//! the reference sequences records are placed on, and the read groups:
//!
//! ```text
//! @HD	VN:1.6	SO:coordinate
//! @SQ	SN:chr1	LN:1048576
//! @RG	ID:1
//! ```
//!
//! Record types other than `@HD`, `@SQ` and `@RG` are kept verbatim.

use std::{fmt, str::FromStr};

use bytemuck::{Pod, Zeroable};

use crate::{
    FILE_MAGIC, FORMAT_MAJOR, FORMAT_MINOR, Result,
    error::HeaderError,
};

/// Default dialect version written in `@HD`
pub const DIALECT_VERSION: &str = "1.6";

/// Length of the identifying label stored in the file definition
pub const FILE_ID_LEN: usize = 24;

/// The order records were written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Unknown,
    Unsorted,
    QueryName,
    Coordinate,
}
impl SortOrder {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Unsorted => "unsorted",
            Self::QueryName => "queryname",
            Self::Coordinate => "coordinate",
        }
    }
}
impl FromStr for SortOrder {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "unsorted" => Ok(Self::Unsorted),
            "queryname" => Ok(Self::QueryName),
            "coordinate" => Ok(Self::Coordinate),
            _ => Err(format!("Unknown sort order: {s}")),
        }
    }
}

/// A reference sequence declared by the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSequence {
    pub name: String,
    pub length: usize,
}
impl ReferenceSequence {
    #[must_use]
    pub fn new(name: impl Into<String>, length: usize) -> Self {
        Self {
            name: name.into(),
            length,
        }
    }
}

/// The textual dialect header of an alignment stream
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AlignmentHeader {
    version: String,
    sort_order: SortOrder,
    references: Vec<ReferenceSequence>,
    read_groups: Vec<String>,
    other_lines: Vec<String>,
}
impl AlignmentHeader {
    #[must_use]
    pub fn new(sort_order: SortOrder) -> Self {
        Self {
            version: DIALECT_VERSION.to_string(),
            sort_order,
            ..Default::default()
        }
    }

    /// Adds a reference sequence and returns its index
    pub fn add_reference(&mut self, name: impl Into<String>, length: usize) -> Result<usize> {
        let name = name.into();
        if self.reference_index(&name).is_some() {
            return Err(HeaderError::DuplicateReference(name).into());
        }
        self.references.push(ReferenceSequence::new(name, length));
        Ok(self.references.len() - 1)
    }

    pub fn add_read_group(&mut self, id: impl Into<String>) {
        self.read_groups.push(id.into());
    }

    pub fn set_sort_order(&mut self, sort_order: SortOrder) {
        self.sort_order = sort_order;
    }

    #[must_use]
    pub fn sort_order(&self) -> SortOrder {
        self.sort_order
    }

    #[must_use]
    pub fn is_coordinate_sorted(&self) -> bool {
        self.sort_order == SortOrder::Coordinate
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn references(&self) -> &[ReferenceSequence] {
        &self.references
    }

    #[must_use]
    pub fn reference(&self, index: usize) -> Option<&ReferenceSequence> {
        self.references.get(index)
    }

    #[must_use]
    pub fn num_references(&self) -> usize {
        self.references.len()
    }

    #[must_use]
    pub fn reference_index(&self, name: &str) -> Option<usize> {
        self.references.iter().position(|r| r.name == name)
    }

    #[must_use]
    pub fn read_groups(&self) -> &[String] {
        &self.read_groups
    }

    /// Renders the header as text
    #[must_use]
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    /// Parses a header from its textual form
    pub fn from_text(text: &str) -> Result<Self> {
        let mut header = Self {
            version: DIALECT_VERSION.to_string(),
            ..Default::default()
        };
        for (idx, line) in text.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let invalid = |reason: String| HeaderError::InvalidLine {
                line: idx + 1,
                reason,
            };
            let mut fields = line.split('\t');
            let kind = fields.next().unwrap_or_default();
            match kind {
                "@HD" => {
                    for field in fields {
                        match field.split_once(':') {
                            Some(("VN", value)) => header.version = value.to_string(),
                            Some(("SO", value)) => header.sort_order = value.parse().map_err(invalid)?,
                            _ => {}
                        }
                    }
                }
                "@SQ" => {
                    let mut name = None;
                    let mut length = None;
                    for field in fields {
                        match field.split_once(':') {
                            Some(("SN", value)) => name = Some(value.to_string()),
                            Some(("LN", value)) => {
                                length = Some(value.parse::<usize>().map_err(|e| {
                                    invalid(format!("invalid reference length {value}: {e}"))
                                })?);
                            }
                            _ => {}
                        }
                    }
                    let Some(name) = name else {
                        return Err(invalid("@SQ without SN".to_string()).into());
                    };
                    let Some(length) = length else {
                        return Err(invalid(format!("@SQ {name} without LN")).into());
                    };
                    header.add_reference(name, length)?;
                }
                "@RG" => {
                    let id = fields.find_map(|f| f.strip_prefix("ID:"));
                    let Some(id) = id else {
                        return Err(invalid("@RG without ID".to_string()).into());
                    };
                    header.add_read_group(id);
                }
                _ if kind.starts_with('@') && kind.len() == 3 => {
                    header.other_lines.push(line.to_string());
                }
                _ => return Err(invalid(format!("unexpected record type {kind:?}")).into()),
            }
        }
        Ok(header)
    }
}
impl fmt::Display for AlignmentHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "@HD\tVN:{}\tSO:{}", self.version, self.sort_order.as_str())?;
        for reference in &self.references {
            writeln!(f, "@SQ\tSN:{}\tLN:{}", reference.name, reference.length)?;
        }
        for id in &self.read_groups {
            writeln!(f, "@RG\tID:{id}")?;
        }
        for line in &self.other_lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// The fixed binary prefix of the HEADER container.
///
/// This is stored identically in memory and on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
pub struct FileDefinition {
    /// File magic number
    magic: [u8; 4],
    /// Format major version
    pub major: u8,
    /// Format minor version
    pub minor: u8,
    reserved: [u8; 2],
    /// Free-text label identifying the writer (zero padded)
    file_id: [u8; FILE_ID_LEN],
}
impl FileDefinition {
    /// Builds a definition for the current format version, truncating the label if needed
    #[must_use]
    pub fn new(label: &str) -> Self {
        let mut file_id = [0u8; FILE_ID_LEN];
        let len = label.len().min(FILE_ID_LEN);
        file_id[..len].copy_from_slice(&label.as_bytes()[..len]);
        Self {
            magic: *FILE_MAGIC,
            major: FORMAT_MAJOR,
            minor: FORMAT_MINOR,
            reserved: [0; 2],
            file_id,
        }
    }

    /// Returns the identifying label with padding removed
    #[must_use]
    pub fn label(&self) -> String {
        let end = self
            .file_id
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FILE_ID_LEN);
        String::from_utf8_lossy(&self.file_id[..end]).into_owned()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < size_of::<Self>() {
            return Err(HeaderError::TruncatedDefinition(bytes.len()).into());
        }
        let definition: Self = bytemuck::pod_read_unaligned(&bytes[..size_of::<Self>()]);
        if definition.magic != *FILE_MAGIC {
            return Err(HeaderError::InvalidMagic(definition.magic).into());
        }
        if definition.major != FORMAT_MAJOR {
            return Err(HeaderError::UnsupportedVersion {
                major: definition.major,
                minor: definition.minor,
            }
            .into());
        }
        Ok(definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_reference_header() -> Result<AlignmentHeader> {
        let mut header = AlignmentHeader::new(SortOrder::Coordinate);
        header.add_reference("chr1", 1024 * 1024)?;
        header.add_reference("chr2", 1024 * 1024)?;
        header.add_read_group("1");
        Ok(header)
    }

    #[test]
    fn test_text_round_trip() -> Result<()> {
        let header = two_reference_header()?;
        let text = header.to_text();
        assert!(text.starts_with("@HD\tVN:1.6\tSO:coordinate\n"));
        assert!(text.contains("@SQ\tSN:chr2\tLN:1048576\n"));

        let parsed = AlignmentHeader::from_text(&text)?;
        assert_eq!(parsed, header);
        assert_eq!(parsed.reference_index("chr2"), Some(1));
        assert!(parsed.is_coordinate_sorted());
        Ok(())
    }

    #[test]
    fn test_unknown_lines_are_preserved() -> Result<()> {
        let text = "@HD\tVN:1.6\tSO:unsorted\n@PG\tID:aligner\n@CO\tsome comment\n";
        let header = AlignmentHeader::from_text(text)?;
        assert_eq!(header.sort_order(), SortOrder::Unsorted);
        assert_eq!(header.to_text(), text);
        Ok(())
    }

    #[test]
    fn test_invalid_lines() {
        assert!(AlignmentHeader::from_text("@SQ\tLN:10\n").is_err());
        assert!(AlignmentHeader::from_text("@SQ\tSN:chr1\tLN:abc\n").is_err());
        assert!(AlignmentHeader::from_text("@HD\tSO:sideways\n").is_err());
        assert!(AlignmentHeader::from_text("not a header\n").is_err());
    }

    #[test]
    fn test_duplicate_reference() -> Result<()> {
        let mut header = two_reference_header()?;
        assert!(header.add_reference("chr1", 10).is_err());
        Ok(())
    }

    #[test]
    fn test_file_definition() -> Result<()> {
        let definition = FileDefinition::new("test");
        assert_eq!(definition.as_bytes().len(), 32);

        let parsed = FileDefinition::from_bytes(definition.as_bytes())?;
        assert_eq!(parsed.label(), "test");
        assert_eq!(parsed.major, FORMAT_MAJOR);
        Ok(())
    }

    #[test]
    fn test_file_definition_truncates_label() {
        let definition = FileDefinition::new("a-very-long-label-that-does-not-fit");
        assert_eq!(definition.label().len(), FILE_ID_LEN);
    }

    #[test]
    fn test_file_definition_rejects_bad_magic() {
        let mut bytes = FileDefinition::new("x").as_bytes().to_vec();
        bytes[0] = b'X';
        assert!(FileDefinition::from_bytes(&bytes).is_err());
        assert!(FileDefinition::from_bytes(&bytes[..10]).is_err());
    }
}
