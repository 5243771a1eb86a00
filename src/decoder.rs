//! Resource decoding dispatch
//!
//! Links produced by the parsers carry an optional [Encrypted] record. The
//! [DecoderRegistry] maps an `(algorithm, scheme)` pair to the [Decoder] able
//! to turn the stored bytes of such a resource back into plaintext.
//!
//! ## Usage
//!
//! ```rust, no_run
//! # fn main() -> Result<(), lib_publication::error::PublicationError> {
//! use lib_publication::decoder::DecoderRegistry;
//!
//! let decoders = DecoderRegistry::with_default_decoders();
//! let publication = lib_publication::parse("path/to/book.epub")?;
//!
//! for link in &publication.resources {
//!     if decoders.need_to_decode(&publication, link) {
//!         let archive = publication.archive().expect("epub keeps its archive");
//!         let reader = Box::new(archive.open_entry(&link.href)?);
//!         let _plaintext = decoders.decode(&publication, link, reader)?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::io::{Cursor, Read, Seek};

use log::debug;

use crate::{
    error::PublicationError,
    types::{Encrypted, Link, Publication},
    utils::{adobe_font_deobfuscation, idpf_font_deobfuscation},
};

/// Algorithm URI of the IDPF font obfuscation
pub const IDPF_FONT_OBFUSCATION: &str = "http://www.idpf.org/2008/embedding";

/// Algorithm URI of the Adobe font obfuscation
pub const ADOBE_FONT_OBFUSCATION: &str = "http://ns.adobe.com/pdf/enc#RC";

/// Scheme URI of resources protected by LCP
pub const LCP_SCHEME: &str = "http://readium.org/2014/01/lcp";

/// A seekable byte stream that can be handed across threads
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Turns the stored bytes of an encrypted resource into plaintext
///
/// Implementations receive the raw, still encrypted stream and return a
/// plaintext stream. They must not keep state between calls, since one
/// decoder may serve several links in parallel.
///
/// Any `Fn(&Publication, &Link, Box<dyn ReadSeek>) -> Result<Box<dyn ReadSeek>, PublicationError>`
/// closure implements this trait.
pub trait Decoder: Send + Sync {
    fn decode(
        &self,
        publication: &Publication,
        link: &Link,
        reader: Box<dyn ReadSeek>,
    ) -> Result<Box<dyn ReadSeek>, PublicationError>;
}

impl<F> Decoder for F
where
    F: Fn(&Publication, &Link, Box<dyn ReadSeek>) -> Result<Box<dyn ReadSeek>, PublicationError>
        + Send
        + Sync,
{
    fn decode(
        &self,
        publication: &Publication,
        link: &Link,
        reader: Box<dyn ReadSeek>,
    ) -> Result<Box<dyn ReadSeek>, PublicationError> {
        self(publication, link, reader)
    }
}

struct DecoderEntry {
    algorithm: String,
    scheme: String,
    decoder: Box<dyn Decoder>,
}

impl DecoderEntry {
    fn matches(&self, encrypted: &Encrypted) -> bool {
        self.algorithm == encrypted.algorithm && self.scheme == encrypted.scheme
    }
}

/// Table of decoders keyed by `(algorithm, scheme)`
///
/// The registry is assembled once during initialization and is read-only
/// afterwards. Lookups compare both identifiers exactly; when several
/// decoders are registered for the same pair, the first one registered wins.
#[derive(Default)]
pub struct DecoderRegistry {
    decoders: Vec<DecoderEntry>,
}

impl DecoderRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the font deobfuscation decoders
    ///
    /// Both decoders are registered with an empty scheme, which is how the
    /// EPUB parser marks obfuscated fonts.
    pub fn with_default_decoders() -> Self {
        let mut registry = Self::new();
        registry
            .register(IDPF_FONT_OBFUSCATION, "", IdpfFontDecoder)
            .register(ADOBE_FONT_OBFUSCATION, "", AdobeFontDecoder);
        registry
    }

    /// Installs a decoder for an `(algorithm, scheme)` pair
    pub fn register<D: Decoder + 'static>(
        &mut self,
        algorithm: &str,
        scheme: &str,
        decoder: D,
    ) -> &mut Self {
        self.decoders.push(DecoderEntry {
            algorithm: algorithm.to_string(),
            scheme: scheme.to_string(),
            decoder: Box::new(decoder),
        });
        self
    }

    /// Reports whether the link is encrypted and a registered decoder handles it
    pub fn need_to_decode(&self, _publication: &Publication, link: &Link) -> bool {
        self.find(link).is_some()
    }

    /// Decodes the raw stream of a resource with the first matching decoder
    ///
    /// ## Return
    /// - `Ok(Box<dyn ReadSeek>)`: The plaintext stream
    /// - `Err(PublicationError)`: The link is not encrypted, no decoder matches,
    ///   or the decoder itself failed
    pub fn decode(
        &self,
        publication: &Publication,
        link: &Link,
        reader: Box<dyn ReadSeek>,
    ) -> Result<Box<dyn ReadSeek>, PublicationError> {
        let entry = self
            .find(link)
            .ok_or_else(|| PublicationError::NoMatchingDecoder {
                href: link.href.clone(),
            })?;

        debug!(
            "Decoding \"{}\" with ({}, {})",
            link.href, entry.algorithm, entry.scheme
        );
        entry.decoder.decode(publication, link, reader)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    fn find(&self, link: &Link) -> Option<&DecoderEntry> {
        let encrypted = link.properties.encrypted.as_ref()?;
        self.decoders.iter().find(|entry| entry.matches(encrypted))
    }
}

/// Deobfuscates fonts using the IDPF algorithm
pub struct IdpfFontDecoder;

impl Decoder for IdpfFontDecoder {
    fn decode(
        &self,
        publication: &Publication,
        _link: &Link,
        mut reader: Box<dyn ReadSeek>,
    ) -> Result<Box<dyn ReadSeek>, PublicationError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        let data = idpf_font_deobfuscation(&data, &publication.metadata.identifier);
        Ok(Box::new(Cursor::new(data)))
    }
}

/// Deobfuscates fonts using the Adobe algorithm
pub struct AdobeFontDecoder;

impl Decoder for AdobeFontDecoder {
    fn decode(
        &self,
        publication: &Publication,
        _link: &Link,
        mut reader: Box<dyn ReadSeek>,
    ) -> Result<Box<dyn ReadSeek>, PublicationError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        let data = adobe_font_deobfuscation(&data, &publication.metadata.identifier)
            .ok_or_else(|| PublicationError::NonCanonicalFile {
                tag: "dc:identifier".to_string(),
            })?;
        Ok(Box::new(Cursor::new(data)))
    }
}
