//! CBZ container parser
//!
//! A CBZ file is a ZIP archive of page images, optionally accompanied by a
//! `ComicInfo.xml` document at the archive root. Images form the reading
//! order in archive order; the comic metadata, when present, supplies the
//! title, the credits and a table of contents built from its page list.

use std::{fs::File, io::BufReader, path::Path};

use log::{debug, warn};
use zip::ZipArchive;

use crate::{
    comic::{COMIC_INFO_FILE, ComicInfo},
    error::PublicationError,
    parser::FormatParser,
    types::{
        ArchiveHandle, ContainerFormat, Contributor, Link, MultiLanguage, Publication,
        WEBPUB_CONTEXT,
    },
    utils::get_file_in_zip_archive,
};

/// Classification of publications parsed from CBZ containers
pub const COMIC_ISSUE_TYPE: &str = "http://schema.org/ComicIssue";

/// The [FormatParser] registered for the `cbz` extension
///
/// Comic archives need no post-processing.
pub struct CbzParser;

impl FormatParser for CbzParser {
    fn parse(&self, path: &Path) -> Result<Publication, PublicationError> {
        let file = File::open(path).map_err(|source| PublicationError::ContainerOpenFailure {
            path: path.display().to_string(),
            source,
        })?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;

        let mut publication = Publication {
            context: vec![WEBPUB_CONTEXT.to_string()],
            ..Default::default()
        };
        publication.metadata.identifier = path.display().to_string();
        publication.metadata.rdf_type = COMIC_ISSUE_TYPE.to_string();

        // Pages are referenced by image position, so every image is listed first
        let mut comic_info_entry = None;
        for index in 0..archive.len() {
            let file = archive.by_index_raw(index)?;
            if file.is_dir() {
                continue;
            }

            let name = file.name().to_string();
            if name.eq_ignore_ascii_case(COMIC_INFO_FILE) {
                comic_info_entry = Some(name);
                continue;
            }

            match media_type_by_name(&name) {
                Some(media_type) => publication.reading_order.push(Link::new(name, media_type)),
                None => debug!("Skipping \"{}\", not a page image.", name),
            }
        }

        if let Some(name) = comic_info_entry {
            let data = get_file_in_zip_archive(&mut archive, &name)?;
            let info = ComicInfo::parse(data.as_slice())?;
            merge_comic_info(&mut publication, info)?;
        }

        if publication.metadata.title.is_empty() {
            publication.metadata.title = MultiLanguage::single(file_path_to_title(path));
        }

        publication.spine = publication.reading_order.clone();
        publication.internal = Some(ArchiveHandle::new(
            ContainerFormat::Cbz,
            path.to_path_buf(),
            archive,
        ));

        Ok(publication)
    }
}

/// Maps a page image file name to its media type, by extension
pub fn media_type_by_name(name: &str) -> Option<&'static str> {
    let (_, extension) = name.rsplit_once('.')?;
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

/// Derives a title from the file name: the part before the first dot, with
/// underscores turned into spaces
fn file_path_to_title(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    match file_name.split('.').next() {
        Some(stem) if !stem.is_empty() => stem.replace('_', " "),
        _ => file_name,
    }
}

fn merge_comic_info(
    publication: &mut Publication,
    info: ComicInfo,
) -> Result<(), PublicationError> {
    let metadata = &mut publication.metadata;

    let credits = [
        (&info.writer, &mut metadata.author),
        (&info.penciller, &mut metadata.penciler),
        (&info.colorist, &mut metadata.colorist),
        (&info.inker, &mut metadata.inker),
        (&info.editor, &mut metadata.editor),
        (&info.publisher, &mut metadata.publisher),
    ];
    for (name, contributors) in credits {
        if !name.is_empty() {
            contributors.push(Contributor::new(name.as_str()));
        }
    }

    if !info.title.is_empty() {
        metadata.title = MultiLanguage::single(info.title.as_str());
    } else if !info.series.is_empty() {
        let title = match info.number {
            0 => info.series.clone(),
            number => format!("{} - {}", info.series, number),
        };
        metadata.title = MultiLanguage::single(title);
    }

    if !info.summary.is_empty() {
        metadata.description = info.summary.clone();
    }
    if !info.language_iso.is_empty() {
        metadata.language.push(info.language_iso.clone());
    }

    for page in &info.pages {
        let len = publication.reading_order.len();
        let image = publication
            .reading_order
            .get_mut(page.image)
            .ok_or(PublicationError::InvalidPageIndex {
                index: page.image,
                len,
            })?;

        let mut link = Link::new(image.href.clone(), image.type_link.clone());
        if page.is_front_cover() {
            link.add_rel("cover");
            image.add_rel("cover");
        }
        link.height = page.image_height;
        link.width = page.image_width;
        link.title = page.bookmark.clone();

        publication.toc.push(link);
    }

    if info.page_count != 0 && info.page_count as usize != publication.reading_order.len() {
        warn!(
            "ComicInfo declares {} pages, the archive holds {} images.",
            info.page_count,
            publication.reading_order.len()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::{
        cbz::{COMIC_ISSUE_TYPE, CbzParser, media_type_by_name},
        error::{ErrorKind, PublicationError},
        parser::FormatParser,
        test_support::TestDir,
        types::{ContainerFormat, Publication, WEBPUB_CONTEXT},
    };

    const JPEG: &[u8] = b"\xFF\xD8\xFF\xE0 jpeg data";

    fn parse(path: &Path) -> Result<Publication, PublicationError> {
        CbzParser.parse(path)
    }

    fn hrefs(publication: &Publication) -> Vec<&str> {
        publication
            .reading_order
            .iter()
            .map(|link| link.href.as_str())
            .collect()
    }

    #[test]
    fn test_media_type_by_name() {
        assert_eq!(media_type_by_name("page_001.jpg"), Some("image/jpeg"));
        assert_eq!(media_type_by_name("page_001.JPEG"), Some("image/jpeg"));
        assert_eq!(media_type_by_name("scans/page.Png"), Some("image/png"));
        assert_eq!(media_type_by_name("page.webp"), Some("image/webp"));
        assert_eq!(media_type_by_name("notes.txt"), None);
        assert_eq!(media_type_by_name("jpg"), None);
    }

    #[test]
    fn test_images_without_comic_info() {
        let dir = TestDir::new("cbz_without_comic_info");
        let path = dir.write_zip(
            "Captain_Cosmos.issue_12.cbz",
            &[
                ("page_001.jpg", JPEG),
                ("notes.txt", b"scanned by someone".as_slice()),
                ("page_002.png", JPEG),
                ("page_003.JPEG", JPEG),
            ],
        );
        let publication = parse(&path).unwrap();

        assert_eq!(publication.context, vec![WEBPUB_CONTEXT]);
        assert_eq!(publication.metadata.rdf_type, COMIC_ISSUE_TYPE);
        assert_eq!(publication.metadata.identifier, path.display().to_string());
        assert_eq!(
            hrefs(&publication),
            vec!["page_001.jpg", "page_002.png", "page_003.JPEG"]
        );
        assert_eq!(publication.reading_order[1].type_link, "image/png");
        assert_eq!(publication.spine, publication.reading_order);
        assert!(publication.toc.is_empty());

        // Title derived from the file name
        assert_eq!(publication.metadata.title.to_string(), "Captain Cosmos");
    }

    #[test]
    fn test_comic_info_merge() {
        let comic_info = r#"<?xml version="1.0" encoding="utf-8"?>
<ComicInfo>
  <Series>Foo</Series>
  <Number>3</Number>
  <Summary>The heroes meet.</Summary>
  <Writer>Jane Writer</Writer>
  <Penciller>Pete Penciller</Penciller>
  <Colorist>Carl Colorist</Colorist>
  <Inker>Ingrid Inker</Inker>
  <Publisher>Small Press</Publisher>
  <LanguageISO>en</LanguageISO>
  <Pages>
    <Page Image="0" Type="FrontCover" ImageWidth="1200" ImageHeight="1800" />
    <Page Image="1" Bookmark="Chapter One" />
    <Page Image="2" />
  </Pages>
</ComicInfo>"#;

        let dir = TestDir::new("cbz_comic_info_merge");
        let path = dir.write_zip(
            "foo.cbz",
            &[
                ("ComicInfo.xml", comic_info.as_bytes()),
                ("01.jpg", JPEG),
                ("02.jpg", JPEG),
                ("03.jpg", JPEG),
            ],
        );
        let publication = parse(&path).unwrap();
        let metadata = &publication.metadata;

        assert_eq!(metadata.title.to_string(), "Foo - 3");
        assert_eq!(metadata.description, "The heroes meet.");
        assert_eq!(metadata.language, vec!["en"]);

        // Each credit keeps its own name
        assert_eq!(metadata.author[0].name.to_string(), "Jane Writer");
        assert_eq!(metadata.penciler[0].name.to_string(), "Pete Penciller");
        assert_eq!(metadata.colorist[0].name.to_string(), "Carl Colorist");
        assert_eq!(metadata.inker[0].name.to_string(), "Ingrid Inker");
        assert_eq!(metadata.publisher[0].name.to_string(), "Small Press");

        // ComicInfo.xml is not a page even though it precedes the images
        assert_eq!(hrefs(&publication), vec!["01.jpg", "02.jpg", "03.jpg"]);

        let toc = &publication.toc;
        assert_eq!(toc.len(), 3);
        assert_eq!(toc[0].href, "01.jpg");
        assert_eq!(toc[0].rel, vec!["cover"]);
        assert_eq!(toc[0].width, 1200);
        assert_eq!(toc[0].height, 1800);
        assert_eq!(toc[1].title, "Chapter One");
        assert!(toc[1].rel.is_empty());
        assert_eq!(toc[2].href, "03.jpg");
        assert_eq!(toc[2].width, 0);

        assert!(publication.reading_order[0].has_rel("cover"));
        assert!(!publication.reading_order[1].has_rel("cover"));
    }

    #[test]
    fn test_title_precedence() {
        let dir = TestDir::new("cbz_title_precedence");

        let path = dir.write_zip(
            "titled.cbz",
            &[
                (
                    "ComicInfo.xml",
                    b"<ComicInfo><Title>The Long Night</Title><Series>Foo</Series><Number>3</Number></ComicInfo>"
                        .as_slice(),
                ),
                ("01.jpg", JPEG),
            ],
        );
        assert_eq!(
            parse(&path).unwrap().metadata.title.to_string(),
            "The Long Night"
        );

        let path = dir.write_zip(
            "series.cbz",
            &[
                (
                    "ComicInfo.xml",
                    b"<ComicInfo><Series>Foo</Series></ComicInfo>".as_slice(),
                ),
                ("01.jpg", JPEG),
            ],
        );
        assert_eq!(parse(&path).unwrap().metadata.title.to_string(), "Foo");

        let path = dir.write_zip(
            "untitled_issue.cbz",
            &[
                (
                    "ComicInfo.xml",
                    b"<ComicInfo><Writer>Jane Writer</Writer></ComicInfo>".as_slice(),
                ),
                ("01.jpg", JPEG),
            ],
        );
        let publication = parse(&path).unwrap();
        assert_eq!(publication.metadata.title.to_string(), "untitled issue");
        assert_eq!(publication.metadata.author.len(), 1);
    }

    #[test]
    fn test_directories_are_skipped() {
        let dir = TestDir::new("cbz_directories");
        let path = dir.write_zip(
            "nested.cbz",
            &[
                ("chapter-1/", b"".as_slice()),
                ("chapter-1/01.jpg", JPEG),
                ("chapter-1/02.jpg", JPEG),
            ],
        );
        let publication = parse(&path).unwrap();

        assert_eq!(
            hrefs(&publication),
            vec!["chapter-1/01.jpg", "chapter-1/02.jpg"]
        );
    }

    #[test]
    fn test_page_index_out_of_range() {
        let comic_info =
            r#"<ComicInfo><Pages><Page Image="0"/><Page Image="5"/></Pages></ComicInfo>"#;
        let dir = TestDir::new("cbz_page_out_of_range");
        let path = dir.write_zip(
            "broken.cbz",
            &[
                ("ComicInfo.xml", comic_info.as_bytes()),
                ("01.jpg", JPEG),
                ("02.jpg", JPEG),
            ],
        );

        let err = parse(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MetadataMalformed);
        assert_eq!(err, PublicationError::InvalidPageIndex { index: 5, len: 2 });
    }

    #[test]
    fn test_malformed_comic_info() {
        let dir = TestDir::new("cbz_malformed_comic_info");
        let path = dir.write_zip(
            "broken.cbz",
            &[
                ("ComicInfo.xml", b"<ComicInfo><Title>x</Series></ComicInfo>".as_slice()),
                ("01.jpg", JPEG),
            ],
        );

        assert_eq!(parse(&path).unwrap_err().kind(), ErrorKind::MetadataMalformed);
    }

    #[test]
    fn test_archive_handle() {
        let dir = TestDir::new("cbz_archive_handle");
        let path = dir.write_zip("issue.cbz", &[("01.jpg", JPEG)]);
        let publication = parse(&path).unwrap();

        let archive = publication.archive().unwrap();
        assert_eq!(archive.format(), ContainerFormat::Cbz);
        assert_eq!(archive.read_entry("01.jpg").unwrap(), JPEG);
        assert_eq!(archive.entry_names().unwrap(), vec!["01.jpg"]);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let dir = TestDir::new("cbz_deterministic");
        let path = dir.write_zip(
            "issue.cbz",
            &[
                (
                    "ComicInfo.xml",
                    br#"<ComicInfo><Series>Foo</Series><Pages><Page Image="1" Type="FrontCover"/></Pages></ComicInfo>"#
                        .as_slice(),
                ),
                ("01.jpg", JPEG),
                ("02.jpg", JPEG),
            ],
        );

        let first = parse(&path).unwrap();
        for _ in 0..3 {
            assert_eq!(parse(&path).unwrap(), first);
        }
    }

    #[test]
    fn test_missing_file() {
        let result = parse(Path::new("./missing/empty.cbz"));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::ContainerOpenFailure);
    }
}
