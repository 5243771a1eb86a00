//! Error Type Definition Module
//!
//! This module defines the errors that may be encountered while opening a
//! container, building a [Publication](crate::types::Publication) from it, or
//! dispatching an encrypted resource to a decoder. All errors are uniformly
//! wrapped in the [PublicationError] enumeration.
//!
//! Every variant belongs to one of the four coarse categories described by
//! [ErrorKind], which is what callers usually branch on.

use thiserror::Error;

/// Coarse classification of a [PublicationError]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The file is missing, unreadable or not a valid archive
    ContainerOpenFailure,

    /// No parser is registered for the file extension
    UnsupportedFormat,

    /// A structurally required element or attribute is absent or unparseable
    MetadataMalformed,

    /// An encrypted resource has no registered `(algorithm, scheme)` decoder
    NoMatchingDecoder,
}

/// Types of errors that can occur during publication parsing and decoding
#[derive(Debug, Error)]
pub enum PublicationError {
    /// ZIP archive related errors
    ///
    /// Errors occur when processing the ZIP structure of a container,
    /// such as file corruption, unreadability, etc.
    #[error("Archive error: {source}")]
    ArchiveError { source: zip::result::ZipError },

    /// The container file could not be opened at all
    #[error("Container open failure: Unable to open \"{path}\": {source}")]
    ContainerOpenFailure {
        path: String,
        source: std::io::Error,
    },

    /// Data Decoding Error - Null data
    ///
    /// This error occurs when trying to decode an empty stream.
    #[error("Decode error: The data is empty.")]
    EmptyDataError,

    /// A comic page refers to an image position outside the reading order
    #[error(
        "Invalid page index: Page refers to image {index}, but only {len} images were found."
    )]
    InvalidPageIndex { index: usize, len: usize },

    #[error("IO error: {source}")]
    IOError { source: std::io::Error },

    /// Missing required attribute error
    ///
    /// Triggered when an XML element lacks an attribute the container
    /// format requires.
    #[error(
        "Missing required attribute: The \"{attribute}\" attribute is a must attribute for the \"{tag}\" element."
    )]
    MissingRequiredAttribute { tag: String, attribute: String },

    /// Mutex error
    ///
    /// This error occurs when the mutex guarding a shared archive is poisoned,
    /// which means that a thread has panicked while reading from it.
    #[error("Mutex error: Mutex was poisoned.")]
    MutexError,

    /// Non-canonical EPUB structure error
    ///
    /// This error occurs when an EPUB file lacks a file the container
    /// format requires, such as `META-INF/container.xml` or the package document.
    #[error("Non-canonical epub: The \"{expected_file}\" file was not found.")]
    NonCanonicalEpub { expected_file: String },

    /// Non-canonical file structure error
    ///
    /// This error is triggered when XML elements the container format
    /// requires are missing.
    #[error("Non-canonical file: The \"{tag}\" elements was not found.")]
    NonCanonicalFile { tag: String },

    /// No decoder is registered for the encryption of a resource
    ///
    /// Also returned when decoding is requested for a resource that
    /// is not encrypted at all.
    #[error("No matching decoder: Unable to find a decoder for \"{href}\".")]
    NoMatchingDecoder { href: String },

    /// Relative link leak error
    ///
    /// This error occurs when a relative path link is outside the scope
    /// of the container.
    #[error("Relative link leakage: Path \"{path}\" is out of container range.")]
    RelativeLinkLeakage { path: String },

    /// Unable to find the resource id error
    ///
    /// This error occurs when a spine item refers to an id that doesn't exist in the manifest.
    #[error("Resource Id Not Exist: There is no resource item with id \"{id}\".")]
    ResourceIdNotExist { id: String },

    /// Unable to find the resource error
    #[error("Resource not found: Unable to find resource from \"{resource}\".")]
    ResourceNotFound { resource: String },

    /// Unrecognized EPUB version error
    #[error(
        "Unrecognized EPUB version: Unable to identify version number and version characteristics from epub file"
    )]
    UnrecognizedEpubVersion,

    /// No parser is registered for the extension of the file
    #[error("Unsupported format: No parser registered for extension \"{extension}\".")]
    UnsupportedFormat { extension: String },

    /// Unusable compression method error
    ///
    /// This error occurs when an EPUB file uses an unsupported compression method.
    #[error(
        "Unusable compression method: The \"{file}\" file uses the unsupported \"{method}\" compression method."
    )]
    UnusableCompressionMethod { file: String, method: String },

    #[error("Decode error: {source}")]
    Utf8DecodeError { source: std::string::FromUtf8Error },

    #[error("Decode error: {source}")]
    Utf16DecodeError { source: std::string::FromUtf16Error },

    /// QuickXml error
    ///
    /// This error occurs when parsing XML data using the QuickXml library.
    #[error("QuickXml error: {source}")]
    QuickXmlError { source: quick_xml::Error },
}

impl PublicationError {
    /// Returns the category this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ArchiveError { .. }
            | Self::ContainerOpenFailure { .. }
            | Self::IOError { .. }
            | Self::MutexError
            | Self::ResourceNotFound { .. }
            | Self::UnusableCompressionMethod { .. } => ErrorKind::ContainerOpenFailure,

            Self::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,

            Self::NoMatchingDecoder { .. } => ErrorKind::NoMatchingDecoder,

            Self::EmptyDataError
            | Self::InvalidPageIndex { .. }
            | Self::MissingRequiredAttribute { .. }
            | Self::NonCanonicalEpub { .. }
            | Self::NonCanonicalFile { .. }
            | Self::RelativeLinkLeakage { .. }
            | Self::ResourceIdNotExist { .. }
            | Self::UnrecognizedEpubVersion
            | Self::Utf8DecodeError { .. }
            | Self::Utf16DecodeError { .. }
            | Self::QuickXmlError { .. } => ErrorKind::MetadataMalformed,
        }
    }
}

impl From<zip::result::ZipError> for PublicationError {
    fn from(value: zip::result::ZipError) -> Self {
        PublicationError::ArchiveError { source: value }
    }
}

impl From<quick_xml::Error> for PublicationError {
    fn from(value: quick_xml::Error) -> Self {
        PublicationError::QuickXmlError { source: value }
    }
}

impl From<std::io::Error> for PublicationError {
    fn from(value: std::io::Error) -> Self {
        PublicationError::IOError { source: value }
    }
}

impl From<std::string::FromUtf8Error> for PublicationError {
    fn from(value: std::string::FromUtf8Error) -> Self {
        PublicationError::Utf8DecodeError { source: value }
    }
}

impl From<std::string::FromUtf16Error> for PublicationError {
    fn from(value: std::string::FromUtf16Error) -> Self {
        PublicationError::Utf16DecodeError { source: value }
    }
}

impl<T> From<std::sync::PoisonError<T>> for PublicationError {
    fn from(_value: std::sync::PoisonError<T>) -> Self {
        PublicationError::MutexError
    }
}

#[cfg(test)]
impl PartialEq for PublicationError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::InvalidPageIndex {
                    index: l_index,
                    len: l_len,
                },
                Self::InvalidPageIndex {
                    index: r_index,
                    len: r_len,
                },
            ) => l_index == r_index && l_len == r_len,
            (
                Self::MissingRequiredAttribute {
                    tag: l_tag,
                    attribute: l_attribute,
                },
                Self::MissingRequiredAttribute {
                    tag: r_tag,
                    attribute: r_attribute,
                },
            ) => l_tag == r_tag && l_attribute == r_attribute,
            (
                Self::NonCanonicalEpub {
                    expected_file: l_expected_file,
                },
                Self::NonCanonicalEpub {
                    expected_file: r_expected_file,
                },
            ) => l_expected_file == r_expected_file,
            (Self::NonCanonicalFile { tag: l_tag }, Self::NonCanonicalFile { tag: r_tag }) => {
                l_tag == r_tag
            }
            (Self::NoMatchingDecoder { href: l_href }, Self::NoMatchingDecoder { href: r_href }) => {
                l_href == r_href
            }
            (
                Self::RelativeLinkLeakage { path: l_path },
                Self::RelativeLinkLeakage { path: r_path },
            ) => l_path == r_path,
            (Self::ResourceIdNotExist { id: l_id }, Self::ResourceIdNotExist { id: r_id }) => {
                l_id == r_id
            }
            (
                Self::UnsupportedFormat {
                    extension: l_extension,
                },
                Self::UnsupportedFormat {
                    extension: r_extension,
                },
            ) => l_extension == r_extension,
            (
                Self::Utf8DecodeError { source: l_source },
                Self::Utf8DecodeError { source: r_source },
            ) => l_source == r_source,

            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}
