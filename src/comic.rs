//! ComicRack metadata
//!
//! CBZ archives may carry a `ComicInfo.xml` document describing the issue
//! (title, series, credits) and each page of the archive. This module decodes
//! that document into the flat [ComicInfo] record consumed by the CBZ parser.

use std::{io::Read, str::FromStr};

use log::warn;

use crate::{
    error::PublicationError,
    utils::{NormalizeWhitespace, XmlElement, XmlReader},
};

/// Reserved name of the comic metadata document inside a CBZ archive
pub const COMIC_INFO_FILE: &str = "ComicInfo.xml";

/// Page type marking the cover of the issue
pub const FRONT_COVER: &str = "FrontCover";

/// Flat record decoded from a `ComicInfo.xml` document
///
/// Absent fields are left at their zero value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComicInfo {
    pub title: String,
    pub series: String,

    /// Issue number, 0 when absent or not an integer
    pub number: u32,
    pub volume: u32,
    pub summary: String,

    pub writer: String,
    pub penciller: String,
    pub inker: String,
    pub colorist: String,
    pub letterer: String,
    pub cover_artist: String,
    pub editor: String,
    pub publisher: String,

    pub language_iso: String,
    pub page_count: u32,

    pub pages: Vec<ComicPage>,
}

/// Attributes of one page of the archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComicPage {
    /// Position of the page image among the images of the archive
    pub image: usize,

    /// Page type, such as "FrontCover", "Story" or "Advertisement"
    pub page_type: String,
    pub double_page: bool,
    pub image_width: u32,
    pub image_height: u32,

    /// Bookmark label, empty when the page is not bookmarked
    pub bookmark: String,
}

impl ComicPage {
    pub fn is_front_cover(&self) -> bool {
        self.page_type == FRONT_COVER
    }
}

impl ComicInfo {
    /// Decodes a `ComicInfo.xml` document from a reader
    ///
    /// Unknown elements are ignored. Numeric fields that cannot be parsed are
    /// treated as absent and reported through a warning.
    pub fn parse<R: Read>(mut reader: R) -> Result<Self, PublicationError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;

        let root = XmlReader::parse_bytes(bytes)?;
        if root.name != "ComicInfo" {
            return Err(PublicationError::NonCanonicalFile {
                tag: "ComicInfo".to_string(),
            });
        }

        let mut info = ComicInfo::default();
        for element in root.children() {
            match element.name.as_str() {
                "Title" => info.title = element.text().normalize_whitespace(),
                "Series" => info.series = element.text().normalize_whitespace(),
                "Number" => info.number = parse_number(element),
                "Volume" => info.volume = parse_number(element),
                "Summary" => info.summary = element.text().normalize_whitespace(),
                "Writer" => info.writer = element.text().normalize_whitespace(),
                "Penciller" => info.penciller = element.text().normalize_whitespace(),
                "Inker" => info.inker = element.text().normalize_whitespace(),
                "Colorist" => info.colorist = element.text().normalize_whitespace(),
                "Letterer" => info.letterer = element.text().normalize_whitespace(),
                "CoverArtist" => info.cover_artist = element.text().normalize_whitespace(),
                "Editor" => info.editor = element.text().normalize_whitespace(),
                "Publisher" => info.publisher = element.text().normalize_whitespace(),
                "LanguageISO" => info.language_iso = element.text().trim().to_string(),
                "PageCount" => info.page_count = parse_number(element),
                "Pages" => info.pages = Self::parse_pages(element)?,
                _ => {}
            }
        }

        Ok(info)
    }

    fn parse_pages(pages_element: &XmlElement) -> Result<Vec<ComicPage>, PublicationError> {
        let mut pages = Vec::new();
        for element in pages_element.find_children_by_name("Page") {
            let image = element
                .get_attr("Image")
                .ok_or_else(|| PublicationError::MissingRequiredAttribute {
                    tag: "Page".to_string(),
                    attribute: "Image".to_string(),
                })?;
            let image = image.trim().parse::<usize>().map_err(|_| {
                PublicationError::NonCanonicalFile {
                    tag: format!("Page Image=\"{}\"", image),
                }
            })?;

            pages.push(ComicPage {
                image,
                page_type: element.get_attr("Type").unwrap_or_default(),
                double_page: element
                    .get_attr("DoublePage")
                    .is_some_and(|value| value.eq_ignore_ascii_case("true")),
                image_width: parse_attr(element, "ImageWidth"),
                image_height: parse_attr(element, "ImageHeight"),
                bookmark: element.get_attr("Bookmark").unwrap_or_default(),
            });
        }

        Ok(pages)
    }
}

/// Parses the text of an element, falling back to the zero value
fn parse_number<T: FromStr + Default>(element: &XmlElement) -> T {
    let text = element.text();
    text.trim().parse::<T>().unwrap_or_else(|_| {
        if !text.is_empty() {
            warn!("Ignoring unparseable <{}> value \"{}\".", element.name, text);
        }
        T::default()
    })
}

fn parse_attr<T: FromStr + Default>(element: &XmlElement, name: &str) -> T {
    match element.get_attr(name) {
        Some(value) => value.trim().parse::<T>().unwrap_or_else(|_| {
            warn!("Ignoring unparseable {} attribute \"{}\".", name, value);
            T::default()
        }),
        None => T::default(),
    }
}
