//! Fixture containers shared by the unit tests
//!
//! Containers are written into a per-test directory under the system
//! temporary directory, which is removed when the [TestDir] is dropped.

use std::{
    env, fs,
    fs::File,
    io::Write,
    path::PathBuf,
    process,
};

use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

pub struct TestDir {
    path: PathBuf,
}

impl TestDir {
    pub fn new(name: &str) -> Self {
        let path = env::temp_dir().join(format!("lib-publication-{}-{}", name, process::id()));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).unwrap();
        Self { path }
    }

    pub fn write_file(&self, name: &str, data: &[u8]) -> PathBuf {
        let path = self.path.join(name);
        fs::write(&path, data).unwrap();
        path
    }

    /// Writes a ZIP archive holding `entries` in the given order
    pub fn write_zip(&self, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = self.path.join(name);
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (entry_name, data) in entries {
            zip.start_file(*entry_name, options).unwrap();
            zip.write_all(data).unwrap();
        }

        zip.finish().unwrap();
        path
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

pub const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

/// Entries of an EPUB whose package document lives at `OEBPS/content.opf`
pub fn epub_with_package<'a>(
    opf: &'a str,
    files: &[(&'a str, &'a [u8])],
) -> Vec<(&'a str, &'a [u8])> {
    let mut entries = vec![
        ("mimetype", b"application/epub+zip".as_slice()),
        ("META-INF/container.xml", CONTAINER_XML.as_bytes()),
        ("OEBPS/content.opf", opf.as_bytes()),
    ];
    entries.extend_from_slice(files);
    entries
}

pub const MOBY_DICK_OPF: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="id" xml:lang="en">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="id">code.google.com.epub-samples.moby-dick-basic</dc:identifier>
    <dc:identifier id="isbn">9780000000001</dc:identifier>
    <dc:title>
      Moby-Dick
    </dc:title>
    <dc:creator id="creator">Herman Melville</dc:creator>
    <meta refines="#creator" property="role" scheme="marc:relators">aut</meta>
    <meta refines="#creator" property="file-as">Melville, Herman</meta>
    <dc:language>en-US</dc:language>
    <dc:publisher>Harper &amp; Brothers</dc:publisher>
    <dc:subject>Whaling</dc:subject>
    <dc:subject>Sea stories</dc:subject>
    <meta property="dcterms:modified">2012-01-18T12:47:00Z</meta>
  </metadata>
  <manifest>
    <item id="font" href="fonts/Standard.otf" media-type="application/vnd.ms-opentype"/>
    <item id="toc" properties="nav" href="toc.xhtml" media-type="application/xhtml+xml"/>
    <item id="cover" href="cover.xhtml" media-type="application/xhtml+xml"/>
    <item id="cover-image" properties="cover-image" href="images/cover.jpg" media-type="image/jpeg"/>
    <item id="style" href="css/stylesheet.css" media-type="text/css"/>
    <item id="c1" href="chapter_001.xhtml" media-type="application/xhtml+xml"/>
    <item id="c2" href="chapter_002.xhtml" media-type="application/xhtml+xml"/>
    <item id="c3" href="chapter_003.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine>
    <itemref idref="cover" linear="no"/>
    <itemref idref="c1"/>
    <itemref idref="c2"/>
    <itemref idref="c3" linear="yes"/>
  </spine>
</package>"##;

pub const MOBY_DICK_NAV: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
  <head><title>Moby-Dick</title></head>
  <body>
    <nav epub:type="toc" id="toc">
      <h1>Table of Contents</h1>
      <ol>
        <li><a href="chapter_001.xhtml">Loomings.</a></li>
        <li><a href="chapter_002.xhtml">The Carpet-Bag.</a></li>
        <li><a href="chapter_003.xhtml#start">ETYMOLOGY.</a></li>
      </ol>
    </nav>
    <nav epub:type="landmarks">
      <ol><li><a href="cover.xhtml">Cover</a></li></ol>
    </nav>
  </body>
</html>"#;

pub const XHTML: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>Chapter</title></head><body><p>Call me Ishmael.</p></body></html>"#;

/// A small but complete EPUB 3 publication
pub fn minimal_epub() -> Vec<(&'static str, &'static [u8])> {
    epub_with_package(
        MOBY_DICK_OPF,
        &[
            ("OEBPS/toc.xhtml", MOBY_DICK_NAV.as_bytes()),
            ("OEBPS/cover.xhtml", XHTML),
            ("OEBPS/images/cover.jpg", b"jpeg data".as_slice()),
            ("OEBPS/css/stylesheet.css", b"body { margin: 0; }".as_slice()),
            ("OEBPS/fonts/Standard.otf", b"OTTO font data".as_slice()),
            ("OEBPS/chapter_001.xhtml", XHTML),
            ("OEBPS/chapter_002.xhtml", XHTML),
            ("OEBPS/chapter_003.xhtml", XHTML),
        ],
    )
}
