//! Publication library
//!
//! A Rust library that turns e-book and comic containers into one canonical
//! publication model, so that a reading system can handle every supported
//! format the same way.
//!
//! Parsing is driven by a [ParserRegistry] that maps file extensions to format
//! parsers. Resources that are stored encrypted or obfuscated are turned back
//! into plaintext by a [DecoderRegistry] keyed by encryption algorithm and
//! protection scheme.
//!
//! ## Features
//!
//! - EPUB 2 and EPUB 3 containers: metadata, reading order, spine, resources,
//!   table of contents and encryption declarations.
//! - CBZ comic archives, with `ComicInfo.xml` metadata when present.
//! - IDPF and Adobe font deobfuscation out of the box.
//! - Custom parsers and decoders through the registries.
//!
//! ## Quick Start
//!
//! ```rust, no_run
//! # fn main() -> Result<(), lib_publication::error::PublicationError> {
//! let publication = lib_publication::parse("path/to/book.epub")?;
//!
//! println!("Title: {}", publication.metadata.title);
//! for link in &publication.spine {
//!     println!("{} ({})", link.href, link.type_link);
//! }
//!
//! // Read a resource, decoding it first when needed
//! let link = &publication.spine[0];
//! let archive = publication.archive().expect("parsed containers keep their archive");
//! let reader = Box::new(archive.open_entry(&link.href)?);
//! let _content = if lib_publication::need_to_decode(&publication, link) {
//!     lib_publication::decode(&publication, link, reader)?
//! } else {
//!     reader
//! };
//! # Ok(())
//! # }
//! ```
//!
//! ## Registries
//!
//! The crate-level [parse], [need_to_decode] and [decode] functions use
//! registries holding the built-in parsers and decoders, created on first
//! use. Build a [ParserRegistry] or [DecoderRegistry] yourself to add
//! formats or protection schemes.

use std::{path::Path, sync::LazyLock};

pub(crate) mod utils;

pub mod cbz;
pub mod comic;
pub mod decoder;
pub mod epub;
pub mod error;
pub mod parser;
pub mod types;

#[cfg(test)]
mod test_support;

pub use decoder::{Decoder, DecoderRegistry, ReadSeek};
pub use error::{ErrorKind, PublicationError};
pub use parser::{FormatParser, ParserRegistry};
pub use types::{Link, Publication};

static DEFAULT_PARSERS: LazyLock<ParserRegistry> =
    LazyLock::new(ParserRegistry::with_default_parsers);

static DEFAULT_DECODERS: LazyLock<DecoderRegistry> =
    LazyLock::new(DecoderRegistry::with_default_decoders);

/// Parses the container at `path` with the built-in parsers
///
/// See [ParserRegistry::parse].
pub fn parse<P: AsRef<Path>>(path: P) -> Result<Publication, PublicationError> {
    DEFAULT_PARSERS.parse(path)
}

/// Reports whether a built-in decoder handles the encryption of `link`
pub fn need_to_decode(publication: &Publication, link: &Link) -> bool {
    DEFAULT_DECODERS.need_to_decode(publication, link)
}

/// Decodes the raw stream of `link` with the built-in decoders
///
/// See [DecoderRegistry::decode].
pub fn decode(
    publication: &Publication,
    link: &Link,
    reader: Box<dyn ReadSeek>,
) -> Result<Box<dyn ReadSeek>, PublicationError> {
    DEFAULT_DECODERS.decode(publication, link, reader)
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use crate::{
        decoder::IDPF_FONT_OBFUSCATION,
        error::ErrorKind,
        test_support::{TestDir, minimal_epub},
        types::{Encrypted, Link, Publication},
    };

    #[test]
    fn test_parse_with_default_registry() {
        let dir = TestDir::new("lib_default_registry");
        let path = dir.write_zip("moby-dick.epub", &minimal_epub());

        let publication = crate::parse(&path).unwrap();
        assert_eq!(publication.metadata.title.to_string(), "Moby-Dick");
        assert_eq!(publication.spine[0].title, "Loomings.");

        let result = crate::parse(dir.write_file("book.pdf", b"%PDF"));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn test_decode_with_default_registry() {
        let publication = Publication::default();
        let mut link = Link::new("font.otf", "font/otf");
        assert!(!crate::need_to_decode(&publication, &link));

        link.properties.encrypted = Some(Encrypted {
            algorithm: IDPF_FONT_OBFUSCATION.to_string(),
            ..Default::default()
        });
        assert!(crate::need_to_decode(&publication, &link));

        let mut reader =
            crate::decode(&publication, &link, Box::new(Cursor::new(vec![0u8; 8]))).unwrap();
        let mut data = Vec::new();
        reader.read_to_end(&mut data).unwrap();
        assert_eq!(data.len(), 8);
    }
}
