//! Format parser registry
//!
//! A [ParserRegistry] maps file extensions to [FormatParser]s. It is built
//! once at startup from an explicit list of parsers and then only read:
//! [ParserRegistry::parse] resolves the extension of a path, runs the
//! matching parser and hands the fully built publication to the parser's
//! post-processing step.

use std::{fs, path::Path};

use log::debug;

use crate::{cbz::CbzParser, epub::EpubParser, error::PublicationError, types::Publication};

/// Turns one kind of container into a [Publication]
pub trait FormatParser: Send + Sync {
    /// Parses the container at `path`
    ///
    /// On failure no publication is produced; the error describes why.
    fn parse(&self, path: &Path) -> Result<Publication, PublicationError>;

    /// Runs once the publication is fully built
    ///
    /// Used for work that needs every link to be known, such as resolving
    /// cross references between the table of contents and the reading order.
    fn post_process(&self, _publication: &mut Publication) {}
}

/// Parse function signature accepted by [ParserRegistry::register_fn]
pub type ParseFn = fn(&Path) -> Result<Publication, PublicationError>;

/// Post-processing function signature accepted by [ParserRegistry::register_fn]
pub type CallbackFn = fn(&mut Publication);

struct FnParser {
    parse: ParseFn,
    callback: CallbackFn,
}

impl FormatParser for FnParser {
    fn parse(&self, path: &Path) -> Result<Publication, PublicationError> {
        (self.parse)(path)
    }

    fn post_process(&self, publication: &mut Publication) {
        (self.callback)(publication)
    }
}

struct ParserEntry {
    extension: String,
    parser: Box<dyn FormatParser>,
}

/// Table of format parsers keyed by file extension
///
/// Extensions are compared case-insensitively. When several parsers are
/// registered for the same extension, the first one registered wins.
#[derive(Default)]
pub struct ParserRegistry {
    entries: Vec<ParserEntry>,
}

impl ParserRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the EPUB and CBZ parsers
    pub fn with_default_parsers() -> Self {
        let mut registry = Self::new();
        registry.register("epub", EpubParser).register("cbz", CbzParser);
        registry
    }

    /// Registers a parser for an extension, with or without its leading dot
    pub fn register<P: FormatParser + 'static>(&mut self, extension: &str, parser: P) -> &mut Self {
        self.entries.push(ParserEntry {
            extension: normalize_extension(extension),
            parser: Box::new(parser),
        });
        self
    }

    /// Registers a parse function and its post-processing callback
    pub fn register_fn(
        &mut self,
        extension: &str,
        parse: ParseFn,
        callback: CallbackFn,
    ) -> &mut Self {
        self.register(extension, FnParser { parse, callback })
    }

    /// Reports whether a parser is registered for the extension
    pub fn supports(&self, extension: &str) -> bool {
        let extension = normalize_extension(extension);
        self.entries.iter().any(|entry| entry.extension == extension)
    }

    /// Parses the container at `path` with the parser registered for its extension
    ///
    /// ## Return
    /// - `Ok(Publication)`: The publication, after post-processing
    /// - `Err(PublicationError)`: The file cannot be opened, no parser is
    ///   registered for its extension, or the parser failed
    pub fn parse<P: AsRef<Path>>(&self, path: P) -> Result<Publication, PublicationError> {
        let path = path.as_ref();
        if let Err(err) = fs::metadata(path) {
            return Err(PublicationError::ContainerOpenFailure {
                path: path.display().to_string(),
                source: err,
            });
        }

        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .map(normalize_extension)
            .unwrap_or_default();
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.extension == extension)
            .ok_or_else(|| PublicationError::UnsupportedFormat {
                extension: extension.clone(),
            })?;

        debug!("Parsing \"{}\" as {}", path.display(), extension);
        let mut publication = entry.parser.parse(path)?;
        entry.parser.post_process(&mut publication);
        Ok(publication)
    }
}

fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}
