use std::{
    collections::HashMap,
    io::{Read, Seek},
};

use quick_xml::{NsReader, escape::unescape, events::Event};
use sha1::{Digest, Sha1};
use zip::{CompressionMethod, ZipArchive, result::ZipError};

use crate::error::PublicationError;

/// Extracts the contents of a specified file from a ZIP archive
///
/// This function reads the raw byte data of a file stored in a container.
/// When the name is not found as-is, the percent-decoded form of the name
/// is tried as well, since some packagers percent-encode hrefs that are
/// stored unencoded in the archive.
///
/// ## Parameters
/// - `zip_file`: A mutable reference to a ZIP archive object
/// - `file_name`: The path to the file to extract (relative to the ZIP archive root directory)
///
/// ## Return
/// - `Ok(Vec<u8>)`: The raw bytes of the file
/// - `Err(PublicationError)`: The file does not exist or an error occurred during the read operation
pub fn get_file_in_zip_archive<R: Read + Seek>(
    zip_file: &mut ZipArchive<R>,
    file_name: &str,
) -> Result<Vec<u8>, PublicationError> {
    let mut buffer = Vec::<u8>::new();
    match zip_file.by_name(file_name) {
        Ok(mut file) => {
            file.read_to_end(&mut buffer)?;
            return Ok(buffer);
        }
        Err(ZipError::FileNotFound) => {}
        Err(err) => return Err(PublicationError::from(err)),
    }

    let decoded = percent_encoding::percent_decode_str(file_name).decode_utf8_lossy();
    match zip_file.by_name(&decoded) {
        Ok(mut file) => {
            file.read_to_end(&mut buffer)?;
            Ok(buffer)
        }
        Err(ZipError::FileNotFound) => Err(PublicationError::ResourceNotFound {
            resource: file_name.to_string(),
        }),
        Err(err) => Err(PublicationError::from(err)),
    }
}

/// Checks if the compression method of all entries conforms to the OCF requirements
///
/// OCF containers can only use either Stored (uncompressed) or Deflated.
/// If any other compression method is found, an error will be returned.
pub fn compression_method_check<R: Read + Seek>(
    zip_archive: &mut ZipArchive<R>,
) -> Result<(), PublicationError> {
    for index in 0..zip_archive.len() {
        let file = zip_archive.by_index(index)?;

        match file.compression() {
            CompressionMethod::Stored | CompressionMethod::Deflated => continue,
            _ => {
                return Err(PublicationError::UnusableCompressionMethod {
                    file: file.name().to_string(),
                    method: file.compression().to_string(),
                });
            }
        };
    }

    Ok(())
}

/// Resolves an href against the directory of the document that declares it
///
/// The result is a path relative to the root of the container, with `.` and
/// `..` segments folded and percent-encoding removed. A fragment identifier
/// is kept as-is. Absolute URLs are returned unchanged.
///
/// ## Parameters
/// - `base_dir`: The directory of the referencing document, relative to the container root
/// - `href`: The href to resolve
///
/// ## Return
/// - `Ok(String)`: The normalized path
/// - `Err(PublicationError)`: The href climbs out of the container
pub fn resolve_href(base_dir: &str, href: &str) -> Result<String, PublicationError> {
    if href.contains("://") || href.starts_with("mailto:") {
        return Ok(href.to_string());
    }

    let (path, fragment) = match href.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (href, None),
    };
    let path = percent_encoding::percent_decode_str(path).decode_utf8_lossy();

    let (mut segments, path) = match path.strip_prefix('/') {
        Some(path) => (Vec::new(), path),
        None => (
            base_dir
                .split('/')
                .filter(|segment| !segment.is_empty())
                .collect::<Vec<&str>>(),
            path.as_ref(),
        ),
    };

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                // Climbing above the root means the link escapes the container
                if segments.pop().is_none() {
                    return Err(PublicationError::RelativeLinkLeakage {
                        path: href.to_string(),
                    });
                }
            }
            _ => segments.push(segment),
        }
    }

    let mut resolved = segments.join("/");
    if let Some(fragment) = fragment {
        resolved.push('#');
        resolved.push_str(fragment);
    }
    Ok(resolved)
}

/// Returns the directory part of a container path, without a trailing slash
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[..index],
        None => "",
    }
}

/// Reverts the IDPF font obfuscation algorithm
///
/// The IDPF algorithm XORs the first 1040 bytes of the font file with the
/// SHA-1 digest of the publication's unique identifier, from which all
/// whitespace has been removed. XOR being its own inverse, the same routine
/// obfuscates and deobfuscates.
///
/// ## Notes
/// - Algorithm URI: `http://www.idpf.org/2008/embedding`
pub fn idpf_font_deobfuscation(data: &[u8], identifier: &str) -> Vec<u8> {
    let identifier = identifier
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>();

    let mut hasher = Sha1::new();
    hasher.update(identifier.as_bytes());
    let key = hasher.finalize();

    let mut data = data.to_vec();
    for (index, byte) in data.iter_mut().take(1040).enumerate() {
        *byte ^= key[index % key.len()];
    }

    data
}

/// Reverts the Adobe font obfuscation algorithm
///
/// The Adobe algorithm XORs the first 1024 bytes of the font file with the
/// 16 bytes of the UUID found in the publication's identifier.
///
/// ## Return
/// - `Some(Vec<u8>)`: The deobfuscated font data
/// - `None`: The identifier does not contain a UUID
///
/// ## Notes
/// - Algorithm URI: `http://ns.adobe.com/pdf/enc#RC`
pub fn adobe_font_deobfuscation(data: &[u8], identifier: &str) -> Option<Vec<u8>> {
    let key = adobe_font_key(identifier)?;

    let mut data = data.to_vec();
    for (index, byte) in data.iter_mut().take(1024).enumerate() {
        *byte ^= key[index % key.len()];
    }

    Some(data)
}

fn adobe_font_key(identifier: &str) -> Option<[u8; 16]> {
    let hex = identifier
        .trim()
        .trim_start_matches("urn:uuid:")
        .chars()
        .filter(|c| *c != '-' && *c != ':')
        .collect::<String>();
    if hex.len() != 32 {
        return None;
    }

    let mut key = [0u8; 16];
    for (index, byte) in key.iter_mut().enumerate() {
        *byte = u8::from_str_radix(hex.get(index * 2..index * 2 + 2)?, 16).ok()?;
    }
    Some(key)
}

/// Provides functionality to decode byte data into strings
///
/// This trait is primarily used to decode raw byte data (such as
/// XML documents read from a container) into a suitable string representation.
/// It supports automatic detection of multiple encoding formats,
/// including UTF-8 (with or without BOM), UTF-16 BE, and UTF-16 LE.
///
/// ## Notes
/// - When attempting to parse a byte stream lacking a BOM (Byte Order Mark), the parsing
///   results may be unreadable; caution should be exercised when using such streams.
pub trait DecodeBytes {
    fn decode(&self) -> Result<String, PublicationError>;
}

impl DecodeBytes for Vec<u8> {
    fn decode(&self) -> Result<String, PublicationError> {
        if self.is_empty() || self.len() < 4 {
            return Err(PublicationError::EmptyDataError);
        }

        match self[0..3] {
            // Check UTF-8 BOM (0xEF, 0xBB, 0xBF)
            [0xEF, 0xBB, 0xBF, ..] => {
                String::from_utf8(self[3..].to_vec()).map_err(PublicationError::from)
            }

            // Check UTF-16 BE BOM (0xFE, 0xFF)
            [0xFE, 0xFF, ..] => {
                let utf16_units: Vec<u16> = self[2..]
                    .chunks_exact(2)
                    .map(|b| u16::from_be_bytes([b[0], b[1]]))
                    .collect();

                String::from_utf16(&utf16_units).map_err(PublicationError::from)
            }

            // Check UTF-16 LE BOM (0xFF, 0xFE)
            [0xFF, 0xFE, ..] => {
                let utf16_units: Vec<u16> = self[2..]
                    .chunks_exact(2)
                    .map(|b| u16::from_le_bytes([b[0], b[1]]))
                    .collect();

                String::from_utf16(&utf16_units).map_err(PublicationError::from)
            }

            // Without BOM, only UTF-8 is tried before the lossy fallback
            _ => match String::from_utf8(self.to_vec()) {
                Ok(utf8_str) => Ok(utf8_str),
                Err(_) => Ok(String::from_utf8_lossy(self).to_string()),
            },
        }
    }
}

/// Provides functionality for normalizing whitespace characters
///
/// Sequences of whitespace characters are collapsed into a single space,
/// and leading and trailing whitespace is removed.
pub trait NormalizeWhitespace {
    fn normalize_whitespace(&self) -> String;
}

impl NormalizeWhitespace for &str {
    fn normalize_whitespace(&self) -> String {
        self.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl NormalizeWhitespace for String {
    fn normalize_whitespace(&self) -> String {
        self.as_str().normalize_whitespace()
    }
}

/// Represents an element node in an XML document
#[derive(Debug)]
pub struct XmlElement {
    /// The local name of the element(excluding namespace prefix)
    pub name: String,

    /// The namespace prefix of the element
    pub prefix: Option<String>,

    /// The namespace of the element
    pub namespace: Option<String>,

    /// The attributes of the element
    ///
    /// The key is the qualified attribute name, the value is the unescaped attribute value
    pub attributes: HashMap<String, String>,

    /// Text and child positions, in document order
    pub content: Vec<XmlContent>,

    /// The children of the element
    pub children: Vec<XmlElement>,
}

/// One piece of the mixed content of an [XmlElement]
#[derive(Debug)]
pub enum XmlContent {
    /// Character data, with references resolved and CDATA sections included
    Text(String),

    /// The child element at this index of `children`
    Element(usize),
}

impl XmlElement {
    /// Create a new element
    pub fn new(name: String) -> Self {
        Self {
            name,
            prefix: None,
            namespace: None,
            attributes: HashMap::new(),
            content: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Get the full tag name of the element
    ///
    /// If the element has a namespace prefix, return "prefix:name" format;
    /// otherwise, return only the element name.
    pub fn tag_name(&self) -> String {
        if let Some(prefix) = &self.prefix {
            format!("{}:{}", prefix, self.name)
        } else {
            self.name.clone()
        }
    }

    /// Gets the text content of the element and all its child elements
    ///
    /// Text segments and child elements are concatenated in document order,
    /// then leading and trailing whitespace is removed.
    pub fn text(&self) -> String {
        let mut result = String::new();
        self.collect_text(&mut result);
        result.trim().to_string()
    }

    fn collect_text(&self, result: &mut String) {
        for node in &self.content {
            match node {
                XmlContent::Text(text) => result.push_str(text),
                XmlContent::Element(index) => {
                    if let Some(child) = self.children.get(*index) {
                        child.collect_text(result);
                    }
                }
            }
        }
    }

    /// Appends character data, merging it with a directly preceding text segment
    pub fn push_text(&mut self, text: &str) {
        match self.content.last_mut() {
            Some(XmlContent::Text(existing)) => existing.push_str(text),
            _ => self.content.push(XmlContent::Text(text.to_string())),
        }
    }

    /// Appends a child element after the content read so far
    pub fn push_child(&mut self, child: XmlElement) {
        self.content.push(XmlContent::Element(self.children.len()));
        self.children.push(child);
    }

    /// Returns the value of the specified attribute
    pub fn get_attr(&self, name: &str) -> Option<String> {
        self.attributes.get(name).cloned()
    }

    /// Returns the language of the element, from `xml:lang` or `lang`
    pub fn lang(&self) -> Option<String> {
        self.get_attr("xml:lang")
            .or_else(|| self.get_attr("lang"))
            .filter(|lang| !lang.is_empty())
    }

    /// Find all elements with the specified name
    pub fn find_elements_by_name(&self, name: &str) -> impl Iterator<Item = &XmlElement> {
        SearchElementsByNameIter::new(self, name)
    }

    /// Find all elements with the specified name among the child elements of the current element
    pub fn find_children_by_name(&self, name: &str) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Find all elements with the specified name list among the child elements of the current element
    pub fn find_children_by_names(&self, names: &[&str]) -> impl Iterator<Item = &XmlElement> {
        self.children
            .iter()
            .filter(move |child| names.contains(&child.name.as_str()))
    }

    /// Get children elements
    pub fn children(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter()
    }
}

struct SearchElementsByNameIter<'a> {
    elements: Vec<&'a XmlElement>,
    current_index: usize,
    target_name: String,
}

impl<'a> SearchElementsByNameIter<'a> {
    fn new(root: &'a XmlElement, name: &str) -> Self {
        let mut elements = Vec::new();
        Self::collect_elements(root, &mut elements);
        Self {
            elements,
            current_index: 0,
            target_name: name.to_string(),
        }
    }

    fn collect_elements(element: &'a XmlElement, collection: &mut Vec<&'a XmlElement>) {
        collection.push(element);
        for child in &element.children {
            Self::collect_elements(child, collection);
        }
    }
}

impl<'a> Iterator for SearchElementsByNameIter<'a> {
    type Item = &'a XmlElement;

    fn next(&mut self) -> Option<Self::Item> {
        while self.current_index < self.elements.len() {
            let element = self.elements[self.current_index];
            self.current_index += 1;
            if element.name == self.target_name {
                return Some(element);
            }
        }
        None
    }
}

/// XML parser used to parse XML content and build an XML element tree
pub struct XmlReader {}

impl XmlReader {
    /// Parses an XML from string and builds the root element
    ///
    /// This function takes an XML string, parses its content using the `quick_xml` library,
    /// and builds an `XmlElement` tree representing the structure of the entire XML document.
    ///
    /// ## Parameters
    /// - `content`: The XML string to be parsed
    ///
    /// ## Return
    /// - `Ok(XmlElement)`: The root element of the XML element tree
    /// - `Err(PublicationError)`: An error occurred during parsing
    pub fn parse(content: &str) -> Result<XmlElement, PublicationError> {
        if content.is_empty() {
            return Err(PublicationError::EmptyDataError);
        }

        // Create a XML reader with namespace support
        let mut reader = NsReader::from_str(content);

        let mut buf = Vec::new();
        let mut stack = Vec::<XmlElement>::new();
        let mut root = None;
        let mut namespace_map = HashMap::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Eof) => break,

                Ok(Event::Start(e)) => {
                    let element = Self::build_element(&e, &mut namespace_map);
                    stack.push(element);
                }

                Ok(Event::End(_)) => {
                    if let Some(element) = stack.pop() {
                        // An element closing with an empty stack is the root element
                        if stack.is_empty() {
                            root = Some(element);
                        } else if let Some(parent) = stack.last_mut() {
                            parent.push_child(element);
                        }
                    }
                }

                Ok(Event::Empty(e)) => {
                    let element = Self::build_element(&e, &mut namespace_map);

                    match stack.last_mut() {
                        Some(parent) => parent.push_child(element),
                        None => root = Some(element),
                    }
                }

                // Entity references split text into several events
                Ok(Event::Text(e)) => {
                    if let Some(element) = stack.last_mut() {
                        element.push_text(&String::from_utf8_lossy(e.as_ref()));
                    }
                }

                Ok(Event::GeneralRef(e)) => {
                    if let Some(element) = stack.last_mut() {
                        let name = String::from_utf8_lossy(&e).to_string();
                        if let Some(resolved) = resolve_entity(&name) {
                            element.push_text(resolved.encode_utf8(&mut [0; 4]));
                        }
                    }
                }

                Ok(Event::CData(e)) => {
                    if let Some(element) = stack.last_mut() {
                        element.push_text(&String::from_utf8_lossy(e.as_ref()));
                    }
                }

                Err(err) => return Err(err.into()),

                // Ignore the following events (elements):
                // Comment, PI, Declaration, Doctype
                _ => continue,
            }
            buf.clear();
        }

        if let Some(element) = root.as_mut() {
            Self::assign_namespace(element, &namespace_map);
        }

        root.ok_or(PublicationError::EmptyDataError)
    }

    /// Parse XML from bytes and builds the root element
    pub fn parse_bytes(bytes: Vec<u8>) -> Result<XmlElement, PublicationError> {
        let content = bytes.decode()?;
        Self::parse(&content)
    }

    fn build_element(
        start: &quick_xml::events::BytesStart,
        namespace_map: &mut HashMap<String, String>,
    ) -> XmlElement {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).to_string();
        let mut element = XmlElement::new(name);

        if let Some(prefix) = start.name().prefix() {
            element.prefix = Some(String::from_utf8_lossy(prefix.as_ref()).to_string());
        }

        for attr in start.attributes().flatten() {
            let attr_key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let raw_value = String::from_utf8_lossy(&attr.value).to_string();
            let attr_value = match unescape(&raw_value) {
                Ok(value) => value.into_owned(),
                Err(_) => raw_value,
            };

            // Namespace declarations are collected instead of stored as attributes
            if attr_key == "xmlns" {
                namespace_map.insert(attr_key, attr_value);
                continue;
            }
            if let Some(prefix) = attr_key.strip_prefix("xmlns:") {
                namespace_map.insert(prefix.to_string(), attr_value);
                continue;
            }

            element.attributes.insert(attr_key, attr_value);
        }

        element
    }

    /// Assign namespace to element recursively
    ///
    /// ## Parameters
    /// - `element`: The element to assign namespace
    /// - `namespace_map`: The prefix-namespace map
    fn assign_namespace(element: &mut XmlElement, namespace_map: &HashMap<String, String>) {
        if let Some(prefix) = &element.prefix {
            if let Some(namespace) = namespace_map.get(prefix) {
                element.namespace = Some(namespace.clone());
            }
        } else if let Some(namespace) = namespace_map.get("xmlns") {
            element.namespace = Some(namespace.clone());
        }

        for child in element.children.iter_mut() {
            Self::assign_namespace(child, namespace_map);
        }
    }
}

/// Resolves a predefined XML entity or a character reference
fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = name.strip_prefix('#')?;
            let code = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}
