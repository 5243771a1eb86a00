use std::{
    fmt,
    fs::File,
    io::{BufReader, Cursor},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use indexmap::IndexMap;
use zip::ZipArchive;

use crate::{error::PublicationError, utils::get_file_in_zip_archive};

/// Context identifier attached to every publication manifest
pub const WEBPUB_CONTEXT: &str = "https://readium.org/webpub-manifest/context.jsonld";

/// The container format a publication was parsed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    Epub,
    Cbz,
}

/// The canonical model produced by every format parser
///
/// A `Publication` is fully built inside one parser invocation and is then
/// treated as an immutable snapshot. Only [Publication::internal] is meant
/// to be touched by later stages, which use it to read resource bytes
/// without reopening the container.
#[derive(Debug, Clone, Default)]
pub struct Publication {
    /// Manifest context identifiers, in the order they were appended
    pub context: Vec<String>,

    pub metadata: Metadata,

    /// Every content resource, in container order
    ///
    /// For EPUB this follows the spine document, including items that are
    /// marked non-linear. For CBZ this is the archive order of the images.
    pub reading_order: Vec<Link>,

    /// The linearly readable subset of `reading_order`
    pub spine: Vec<Link>,

    /// Resources that are part of the publication but not of the reading order,
    /// such as stylesheets, fonts and the navigation document
    pub resources: Vec<Link>,

    /// The table of contents, nested through [Link::children]
    pub toc: Vec<Link>,

    /// Handle to the opened container
    ///
    /// Ownership of the archive passes to the publication; it is released
    /// when the last clone of the handle is dropped.
    pub internal: Option<ArchiveHandle>,
}

impl Publication {
    /// Looks up a link by href in the reading order, then in the resources
    pub fn find_link(&self, href: &str) -> Option<&Link> {
        self.reading_order
            .iter()
            .chain(self.resources.iter())
            .find(|link| link.href == href)
    }

    /// Returns the handle to the opened container, if the parser kept one
    pub fn archive(&self) -> Option<&ArchiveHandle> {
        self.internal.as_ref()
    }
}

impl PartialEq for Publication {
    fn eq(&self, other: &Self) -> bool {
        self.context == other.context
            && self.metadata == other.metadata
            && self.reading_order == other.reading_order
            && self.spine == other.spine
            && self.resources == other.resources
            && self.toc == other.toc
    }
}

/// Descriptive metadata of a publication
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub title: MultiLanguage,

    /// The unique identifier of the publication
    ///
    /// For EPUB this is the `dc:identifier` referenced by the package's
    /// `unique-identifier`; for CBZ it is the path of the archive.
    pub identifier: String,

    pub author: Vec<Contributor>,
    pub translator: Vec<Contributor>,
    pub editor: Vec<Contributor>,
    pub illustrator: Vec<Contributor>,
    pub penciler: Vec<Contributor>,
    pub colorist: Vec<Contributor>,
    pub inker: Vec<Contributor>,
    pub narrator: Vec<Contributor>,
    pub contributor: Vec<Contributor>,
    pub publisher: Vec<Contributor>,

    pub source: String,
    pub description: String,
    pub subject: Vec<String>,

    /// Language tags, in declaration order
    pub language: Vec<String>,

    /// Publication date, as declared by the container
    pub published: Option<String>,

    /// Last modification date, as declared by the container
    pub modified: Option<String>,

    /// Classification of the publication kind
    pub rdf_type: String,
}

/// A string value with either one canonical form or per-language alternatives
///
/// Exactly one representation is populated: `single_string` when the
/// container supplies one value, `multi_string` when it supplies several
/// language alternatives. The map keeps declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiLanguage {
    pub single_string: String,
    pub multi_string: IndexMap<String, String>,
}

impl MultiLanguage {
    pub fn single<S: Into<String>>(value: S) -> Self {
        Self {
            single_string: value.into(),
            multi_string: IndexMap::new(),
        }
    }

    /// Creates a value from `(language, value)` pairs
    ///
    /// The first value declared for a language wins.
    pub fn multi<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut multi_string = IndexMap::new();
        for (lang, value) in values {
            multi_string.entry(lang.into()).or_insert_with(|| value.into());
        }

        Self {
            single_string: String::new(),
            multi_string,
        }
    }

    /// Returns the alternative declared for `lang`
    pub fn get(&self, lang: &str) -> Option<&str> {
        self.multi_string.get(lang).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.single_string.is_empty() && self.multi_string.values().all(|value| value.is_empty())
    }
}

impl fmt::Display for MultiLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.single_string.is_empty() {
            return f.write_str(&self.single_string);
        }

        match self.multi_string.first() {
            Some((_, value)) => f.write_str(value),
            None => Ok(()),
        }
    }
}

/// A person or organization credited for a publication
///
/// The role is implied by the [Metadata] field the contributor is stored in;
/// `role` keeps the raw role code when the container declared one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contributor {
    pub name: MultiLanguage,
    pub sort_as: Option<String>,
    pub role: Option<String>,
}

impl Contributor {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: MultiLanguage::single(name),
            sort_as: None,
            role: None,
        }
    }
}

/// A reference to one resource of the publication
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Link {
    /// Path of the resource, relative to the root of the container
    pub href: String,

    /// Media type of the resource, empty when it could not be determined
    pub type_link: String,

    pub title: String,
    pub height: u32,
    pub width: u32,

    /// Relation tags, without duplicates
    pub rel: Vec<String>,

    pub properties: Properties,

    /// Nested entries, used by the table of contents
    pub children: Vec<Link>,
}

impl Link {
    pub fn new<H: Into<String>, T: Into<String>>(href: H, type_link: T) -> Self {
        Self {
            href: href.into(),
            type_link: type_link.into(),
            ..Default::default()
        }
    }

    /// Adds a relation tag unless it is already present
    pub fn add_rel(&mut self, rel: &str) {
        if !self.has_rel(rel) {
            self.rel.push(rel.to_string());
        }
    }

    pub fn has_rel(&self, rel: &str) -> bool {
        self.rel.iter().any(|item| item == rel)
    }

    /// The href without its fragment identifier
    pub fn href_path(&self) -> &str {
        self.href.split('#').next().unwrap_or(&self.href)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    /// Present when the resource must be decoded before use
    pub encrypted: Option<Encrypted>,
}

/// Encryption state of a resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Encrypted {
    /// The encryption algorithm URI
    pub algorithm: String,

    /// The protection scheme URI, empty when the resource is only obfuscated
    pub scheme: String,

    /// Compression applied before encryption, e.g. "deflate"
    pub compression: Option<String>,

    /// Size of the resource before compression and encryption
    pub original_length: Option<u64>,
}

/// Shared handle to an opened ZIP container
///
/// Clones share the same archive. Reads of distinct entries from several
/// threads are serialized through a mutex.
#[derive(Clone)]
pub struct ArchiveHandle {
    format: ContainerFormat,
    path: PathBuf,
    archive: Arc<Mutex<ZipArchive<BufReader<File>>>>,
}

impl ArchiveHandle {
    pub(crate) fn new(
        format: ContainerFormat,
        path: PathBuf,
        archive: ZipArchive<BufReader<File>>,
    ) -> Self {
        Self {
            format,
            path,
            archive: Arc::new(Mutex::new(archive)),
        }
    }

    pub fn format(&self) -> ContainerFormat {
        self.format
    }

    /// Path of the container file on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the raw bytes of an entry
    ///
    /// The bytes are returned as stored in the container; encrypted entries
    /// still have to go through a decoder.
    pub fn read_entry(&self, name: &str) -> Result<Vec<u8>, PublicationError> {
        let mut archive = self.archive.lock()?;
        get_file_in_zip_archive(&mut archive, name)
    }

    /// Opens an entry as a seekable reader
    pub fn open_entry(&self, name: &str) -> Result<Cursor<Vec<u8>>, PublicationError> {
        self.read_entry(name).map(Cursor::new)
    }

    /// Names of all entries, in archive order
    pub fn entry_names(&self) -> Result<Vec<String>, PublicationError> {
        let archive = self.archive.lock()?;
        Ok(archive.file_names().map(str::to_string).collect())
    }
}

impl fmt::Debug for ArchiveHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveHandle")
            .field("format", &self.format)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
