//! EPUB container parser
//!
//! Turns an OCF container (EPUB 2 or EPUB 3) into a [Publication]. The
//! parser reads `META-INF/container.xml` to locate the package document,
//! then maps the package metadata, manifest and spine onto the publication
//! model. The table of contents comes from the EPUB 3 navigation document
//! or, failing that, from the EPUB 2 NCX file.
//!
//! Encryption declared in `META-INF/encryption.xml` is recorded on the
//! affected links; decoding is left to the
//! [DecoderRegistry](crate::decoder::DecoderRegistry).

use std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::{BufReader, Read, Seek},
    iter,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use log::{debug, warn};
use zip::ZipArchive;

use crate::{
    decoder::{ADOBE_FONT_OBFUSCATION, IDPF_FONT_OBFUSCATION, LCP_SCHEME},
    error::PublicationError,
    parser::FormatParser,
    types::{
        ArchiveHandle, ContainerFormat, Contributor, Encrypted, Link, Metadata, MultiLanguage,
        Publication, WEBPUB_CONTEXT,
    },
    utils::{
        NormalizeWhitespace, XmlElement, XmlReader, compression_method_check,
        get_file_in_zip_archive, parent_dir, resolve_href,
    },
};

/// Classification of publications parsed from EPUB containers
pub const BOOK_TYPE: &str = "http://schema.org/Book";

const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";
const CONTAINER_FILE: &str = "META-INF/container.xml";
const ENCRYPTION_FILE: &str = "META-INF/encryption.xml";
const LICENSE_FILE: &str = "META-INF/license.lcpl";
const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

/// The [FormatParser] registered for the `epub` extension
pub struct EpubParser;

impl FormatParser for EpubParser {
    fn parse(&self, path: &Path) -> Result<Publication, PublicationError> {
        EpubDoc::open(path)?.into_publication()
    }

    /// Gives untitled reading-order items the title of their TOC entry
    fn post_process(&self, publication: &mut Publication) {
        let Publication {
            toc,
            reading_order,
            spine,
            ..
        } = publication;
        let toc: &[Link] = toc;

        for link in reading_order.iter_mut().chain(spine.iter_mut()) {
            if !link.title.is_empty() {
                continue;
            }

            if let Some(title) = find_toc_title(toc, link.href_path()).map(str::to_string) {
                link.title = title;
            }
        }
    }
}

/// Depth-first search for the first titled entry pointing at `href`
fn find_toc_title<'a>(toc: &'a [Link], href: &str) -> Option<&'a str> {
    for entry in toc {
        if entry.href_path() == href && !entry.title.is_empty() {
            return Some(&entry.title);
        }
        if let Some(title) = find_toc_title(&entry.children, href) {
            return Some(title);
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EpubVersion {
    Version2_0,
    Version3_0,
}

/// One metadata entry of the package document
///
/// `property` is the local name for Dublin Core elements, the `property`
/// attribute for EPUB 3 `<meta>` elements and the `name` attribute for
/// EPUB 2 `<meta>` elements.
#[derive(Debug)]
struct MetadataItem {
    id: Option<String>,
    property: String,
    value: String,
    lang: Option<String>,
    refined: Vec<MetadataRefinement>,
}

/// A refinement of a metadata entry
///
/// Comes either from an EPUB 3 `<meta refines="#id">` element or from an
/// EPUB 2 attribute such as `opf:role`, stored without its `opf:` prefix.
#[derive(Debug)]
struct MetadataRefinement {
    property: String,
    value: String,
    lang: Option<String>,
}

impl MetadataItem {
    fn refinement_value(&self, property: &str) -> Option<&str> {
        self.refined
            .iter()
            .find(|refinement| refinement.property == property)
            .map(|refinement| refinement.value.as_str())
    }

    /// `(language, value)` pairs of the `alternate-script` refinements
    fn alternate_scripts(&self) -> Vec<(String, String)> {
        self.refined
            .iter()
            .filter(|refinement| refinement.property == "alternate-script")
            .filter_map(|refinement| {
                refinement
                    .lang
                    .clone()
                    .map(|lang| (lang, refinement.value.clone()))
            })
            .collect()
    }
}

#[derive(Debug)]
struct ManifestItem {
    id: String,

    /// Path relative to the container root
    href: String,
    media_type: String,
    properties: Vec<String>,
}

impl ManifestItem {
    fn has_property(&self, property: &str) -> bool {
        self.properties.iter().any(|item| item == property)
    }
}

#[derive(Debug)]
struct SpineItem {
    idref: String,
    linear: bool,
}

#[derive(Debug)]
struct EncryptionData {
    algorithm: String,

    /// Path of the encrypted resource, relative to the container root
    uri: String,
    compression: Option<String>,
    original_length: Option<u64>,
}

/// A package document loaded from an opened container
struct EpubDoc {
    archive: ZipArchive<BufReader<File>>,
    path: PathBuf,

    /// Path of the package document inside the container
    package_path: String,

    /// Directory of the package document, against which manifest hrefs resolve
    base_path: String,
    version: EpubVersion,

    /// Value of `package@unique-identifier`
    unique_identifier: Option<String>,

    /// Value of `package@xml:lang`
    package_lang: Option<String>,

    metadata: Vec<MetadataItem>,
    manifest: IndexMap<String, ManifestItem>,
    spine: Vec<SpineItem>,

    /// Manifest id of the NCX declared by `spine@toc`
    spine_toc: Option<String>,

    encryption: Vec<EncryptionData>,

    /// Whether the container carries an LCP license
    has_license: bool,
}

impl EpubDoc {
    /// Opens the container and loads its package document
    fn open(path: &Path) -> Result<Self, PublicationError> {
        // 1. Open the archive and check the compression of every entry
        // 2. Locate the package document through `META-INF/container.xml`
        // 3. Parse metadata, manifest and spine
        // 4. Parse `META-INF/encryption.xml` when present

        let file = File::open(path).map_err(|source| PublicationError::ContainerOpenFailure {
            path: path.display().to_string(),
            source,
        })?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;
        compression_method_check(&mut archive)?;

        let container = read_required_file(&mut archive, CONTAINER_FILE)?;
        let package_path = Self::parse_container(container)?;
        let base_path = parent_dir(&package_path).to_string();
        debug!("Package document of \"{}\" at {}", path.display(), package_path);

        let package = XmlReader::parse_bytes(read_required_file(&mut archive, &package_path)?)?;
        let version = Self::determine_epub_version(&package)?;
        let has_license = archive.file_names().any(|name| name == LICENSE_FILE);

        let mut doc = Self {
            archive,
            path: path.to_path_buf(),
            package_path,
            base_path,
            version,
            unique_identifier: package.get_attr("unique-identifier"),
            package_lang: package.lang(),
            metadata: vec![],
            manifest: IndexMap::new(),
            spine: vec![],
            spine_toc: None,
            encryption: vec![],
            has_license,
        };

        let metadata_element = required_child(&package, "metadata")?;
        let manifest_element = required_child(&package, "manifest")?;
        let spine_element = required_child(&package, "spine")?;

        doc.parse_metadata(metadata_element);
        doc.parse_manifest(manifest_element)?;
        doc.parse_spine(spine_element)?;
        doc.parse_encryption()?;

        Ok(doc)
    }

    /// Returns the path of the first rootfile declared by `container.xml`
    fn parse_container(data: Vec<u8>) -> Result<String, PublicationError> {
        let root = XmlReader::parse_bytes(data)?;
        let rootfile = root.find_elements_by_name("rootfile").next().ok_or_else(|| {
            PublicationError::NonCanonicalFile {
                tag: "rootfile".to_string(),
            }
        })?;

        let full_path =
            rootfile
                .get_attr("full-path")
                .ok_or_else(|| PublicationError::MissingRequiredAttribute {
                    tag: "rootfile".to_string(),
                    attribute: "full-path".to_string(),
                })?;

        resolve_href("", &full_path)
    }

    /// Determines the EPUB version of the package
    ///
    /// The `version` attribute is trusted first. Without a usable attribute,
    /// a `spine@toc` reference marks an EPUB 2 package and a manifest item
    /// with the `nav` property marks an EPUB 3 package.
    fn determine_epub_version(package: &XmlElement) -> Result<EpubVersion, PublicationError> {
        if let Some(version) = package.get_attr("version") {
            match version.trim().split('.').next() {
                Some("2") => return Ok(EpubVersion::Version2_0),
                Some("3") => return Ok(EpubVersion::Version3_0),
                _ => {}
            }
        }

        if package
            .find_children_by_name("spine")
            .any(|spine| spine.get_attr("toc").is_some())
        {
            return Ok(EpubVersion::Version2_0);
        }

        let has_nav = package
            .find_children_by_name("manifest")
            .flat_map(|manifest| manifest.find_children_by_name("item"))
            .any(|item| {
                item.get_attr("properties")
                    .is_some_and(|properties| properties.split_whitespace().any(|p| p == "nav"))
            });
        if has_nav {
            return Ok(EpubVersion::Version3_0);
        }

        Err(PublicationError::UnrecognizedEpubVersion)
    }

    /// Parses the `<metadata>` element
    ///
    /// Dublin Core elements are recognized by namespace, or by their `dc`
    /// prefix when the namespace was not declared. The legacy `dc-metadata`
    /// and `x-metadata` groups of OEB packages are flattened.
    fn parse_metadata(&mut self, metadata_element: &XmlElement) {
        let mut metadata = Vec::new();
        let mut refinements = HashMap::<String, Vec<MetadataRefinement>>::new();
        Self::collect_metadata(metadata_element, &mut metadata, &mut refinements);

        for item in metadata.iter_mut() {
            if let Some(refined) = item.id.as_ref().and_then(|id| refinements.remove(id)) {
                item.refined.extend(refined);
            }
        }

        self.metadata = metadata;
    }

    fn collect_metadata(
        element: &XmlElement,
        metadata: &mut Vec<MetadataItem>,
        refinements: &mut HashMap<String, Vec<MetadataRefinement>>,
    ) {
        for child in element.children() {
            match child.name.as_str() {
                "dc-metadata" | "x-metadata" => {
                    Self::collect_metadata(child, metadata, refinements)
                }
                "meta" => Self::parse_meta_element(child, metadata, refinements),
                _ if is_dublin_core(child) => metadata.push(Self::parse_dc_element(child)),
                _ => {}
            }
        }
    }

    /// Parses a Dublin Core element
    ///
    /// Attributes other than `id` and the language become refinements of the
    /// entry, which is how EPUB 2 expresses roles, sort keys and events.
    fn parse_dc_element(element: &XmlElement) -> MetadataItem {
        let mut refined = element
            .attributes
            .iter()
            .filter(|(name, _)| !matches!(name.as_str(), "id" | "xml:lang" | "lang"))
            .map(|(name, value)| MetadataRefinement {
                property: name.strip_prefix("opf:").unwrap_or(name).to_string(),
                value: value.normalize_whitespace(),
                lang: None,
            })
            .collect::<Vec<_>>();
        refined.sort_by(|a, b| a.property.cmp(&b.property));

        MetadataItem {
            id: element.get_attr("id"),
            property: element.name.clone(),
            value: element.text().normalize_whitespace(),
            lang: element.lang(),
            refined,
        }
    }

    fn parse_meta_element(
        element: &XmlElement,
        metadata: &mut Vec<MetadataItem>,
        refinements: &mut HashMap<String, Vec<MetadataRefinement>>,
    ) {
        // EPUB 3 form: <meta property="..." refines="#id">value</meta>
        if let Some(property) = element.get_attr("property") {
            let value = element.text().normalize_whitespace();
            let lang = element.lang();

            match element.get_attr("refines") {
                Some(refines) => {
                    let id = refines.trim_start_matches('#').to_string();
                    refinements.entry(id).or_default().push(MetadataRefinement {
                        property,
                        value,
                        lang,
                    });
                }
                None => metadata.push(MetadataItem {
                    id: element.get_attr("id"),
                    property,
                    value,
                    lang,
                    refined: vec![],
                }),
            }
            return;
        }

        // EPUB 2 form: <meta name="..." content="..."/>
        match (element.get_attr("name"), element.get_attr("content")) {
            (Some(name), Some(content)) => metadata.push(MetadataItem {
                id: None,
                property: name,
                value: content.normalize_whitespace(),
                lang: None,
                refined: vec![],
            }),
            _ => warn!("Ignoring <meta> element without property or name/content attributes."),
        }
    }

    /// Parses the `<manifest>` element
    ///
    /// Every `item` requires `id`, `href` and `media-type`. Hrefs are resolved
    /// against the directory of the package document.
    fn parse_manifest(&mut self, manifest_element: &XmlElement) -> Result<(), PublicationError> {
        let mut manifest = IndexMap::with_capacity(manifest_element.children.len());

        for element in manifest_element.find_children_by_name("item") {
            let id = required_attr(element, "id")?;
            let href = required_attr(element, "href")?;
            let media_type = required_attr(element, "media-type")?;
            let properties = element
                .get_attr("properties")
                .map(|properties| {
                    properties
                        .split_whitespace()
                        .map(str::to_string)
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();

            if manifest.contains_key(&id) {
                warn!("Duplicate manifest id \"{}\", keeping the first item.", id);
                continue;
            }

            manifest.insert(
                id.clone(),
                ManifestItem {
                    id,
                    href: resolve_href(&self.base_path, &href)?,
                    media_type,
                    properties,
                },
            );
        }

        self.manifest = manifest;
        Ok(())
    }

    fn parse_spine(&mut self, spine_element: &XmlElement) -> Result<(), PublicationError> {
        let mut spine = Vec::new();
        for element in spine_element.find_children_by_name("itemref") {
            let idref = required_attr(element, "idref")?;
            let linear = element
                .get_attr("linear")
                .is_none_or(|linear| linear.trim() != "no");

            spine.push(SpineItem { idref, linear });
        }

        self.spine = spine;
        self.spine_toc = spine_element.get_attr("toc");
        Ok(())
    }

    /// Parses `META-INF/encryption.xml`, if the container has one
    fn parse_encryption(&mut self) -> Result<(), PublicationError> {
        let data = match get_file_in_zip_archive(&mut self.archive, ENCRYPTION_FILE) {
            Ok(data) => data,
            Err(PublicationError::ResourceNotFound { .. }) => return Ok(()),
            Err(err) => return Err(err),
        };
        let root = XmlReader::parse_bytes(data)?;

        let mut encryption = Vec::new();
        for encrypted_data in root.find_elements_by_name("EncryptedData") {
            let method = encrypted_data
                .find_elements_by_name("EncryptionMethod")
                .next()
                .ok_or_else(|| PublicationError::NonCanonicalFile {
                    tag: "EncryptionMethod".to_string(),
                })?;
            let reference = encrypted_data
                .find_elements_by_name("CipherReference")
                .next()
                .ok_or_else(|| PublicationError::NonCanonicalFile {
                    tag: "CipherReference".to_string(),
                })?;

            let compression = encrypted_data.find_elements_by_name("Compression").next();
            let original_length = compression
                .and_then(|element| element.get_attr("OriginalLength"))
                .and_then(|length| length.trim().parse::<u64>().ok());
            let compression = compression
                .and_then(|element| element.get_attr("Method"))
                .and_then(|method| match method.trim() {
                    "0" => None,
                    "8" => Some("deflate".to_string()),
                    other => Some(other.to_string()),
                });

            encryption.push(EncryptionData {
                algorithm: required_attr(method, "Algorithm")?,
                uri: resolve_href("", &required_attr(reference, "URI")?)?,
                compression,
                original_length,
            });
        }

        debug!("{} encrypted resources declared", encryption.len());
        self.encryption = encryption;
        Ok(())
    }

    fn into_publication(mut self) -> Result<Publication, PublicationError> {
        let metadata = self.build_metadata();
        let (reading_order, spine, resources) = self.build_links()?;
        let toc = self.parse_toc()?;

        Ok(Publication {
            context: vec![WEBPUB_CONTEXT.to_string()],
            metadata,
            reading_order,
            spine,
            resources,
            toc,
            internal: Some(ArchiveHandle::new(
                ContainerFormat::Epub,
                self.path,
                self.archive,
            )),
        })
    }

    fn items<'a>(&'a self, property: &'a str) -> impl Iterator<Item = &'a MetadataItem> {
        self.metadata
            .iter()
            .filter(move |item| item.property == property)
    }

    fn values(&self, property: &str) -> Vec<String> {
        self.items(property)
            .map(|item| item.value.clone())
            .filter(|value| !value.is_empty())
            .collect()
    }

    fn first_value(&self, property: &str) -> Option<String> {
        self.values(property).into_iter().next()
    }

    fn build_metadata(&self) -> Metadata {
        let mut metadata = Metadata {
            identifier: self.identifier(),
            source: self.first_value("source").unwrap_or_default(),
            description: self.first_value("description").unwrap_or_default(),
            subject: self.values("subject"),
            language: self.values("language"),
            rdf_type: BOOK_TYPE.to_string(),
            ..Default::default()
        };

        // Untagged values inherit the package language, then the first declared one
        let default_lang = self
            .package_lang
            .clone()
            .or_else(|| metadata.language.first().cloned())
            .unwrap_or_else(|| "und".to_string());

        metadata.title = self.title(&default_lang);

        for item in self.metadata.iter().filter(|item| {
            matches!(
                item.property.as_str(),
                "creator" | "contributor" | "publisher"
            )
        }) {
            add_contributor(&mut metadata, item, &default_lang);
        }

        for item in self.items("date") {
            match item.refinement_value("event") {
                Some("modification") => {
                    metadata.modified.get_or_insert_with(|| item.value.clone());
                }
                Some("publication") | None => {
                    metadata.published.get_or_insert_with(|| item.value.clone());
                }
                Some(_) => {}
            }
        }
        if let Some(modified) = self.first_value("dcterms:modified") {
            metadata.modified = Some(modified);
        }

        let contributors = [
            &metadata.author,
            &metadata.translator,
            &metadata.editor,
            &metadata.illustrator,
            &metadata.penciler,
            &metadata.colorist,
            &metadata.inker,
            &metadata.narrator,
            &metadata.publisher,
            &metadata.contributor,
        ];
        let langs = iter::once(&metadata.title)
            .chain(contributors.into_iter().flatten().map(|c| &c.name))
            .flat_map(|name| name.multi_string.keys())
            .cloned()
            .collect::<Vec<_>>();
        for lang in langs {
            if !metadata.language.contains(&lang) {
                metadata.language.push(lang);
            }
        }

        metadata
    }

    /// Resolves the unique identifier through `package@unique-identifier`
    fn identifier(&self) -> String {
        let identifiers = self.items("identifier").collect::<Vec<_>>();
        let unique = self.unique_identifier.as_deref().and_then(|uid| {
            identifiers
                .iter()
                .copied()
                .find(|item| item.id.as_deref() == Some(uid))
        });

        match unique.or_else(|| identifiers.first().copied()) {
            Some(item) => item.value.clone(),
            None => {
                warn!("The package document declares no dc:identifier.");
                String::new()
            }
        }
    }

    /// Builds the title
    ///
    /// The main title is the one refined with `title-type` "main", else the
    /// first declared. It becomes a multi-language value when it has
    /// `alternate-script` refinements, or when several titles are declared
    /// in distinct languages.
    fn title(&self, default_lang: &str) -> MultiLanguage {
        let titles = self.items("title").collect::<Vec<_>>();
        let main = titles
            .iter()
            .copied()
            .find(|item| item.refinement_value("title-type") == Some("main"))
            .or_else(|| titles.first().copied());
        let Some(main) = main else {
            warn!("The package document declares no dc:title.");
            return MultiLanguage::default();
        };

        let alternates = main.alternate_scripts();
        if !alternates.is_empty() {
            let lang = main.lang.clone().unwrap_or_else(|| default_lang.to_string());
            return MultiLanguage::multi(iter::once((lang, main.value.clone())).chain(alternates));
        }

        let candidates = titles
            .iter()
            .filter(|item| {
                item.refinement_value("title-type")
                    .is_none_or(|title_type| title_type == "main")
            })
            .map(|item| {
                let lang = item.lang.clone().unwrap_or_else(|| default_lang.to_string());
                (lang, item.value.clone())
            })
            .collect::<Vec<_>>();
        let distinct_languages = candidates.len() > 1
            && candidates
                .iter()
                .enumerate()
                .all(|(index, (lang, _))| candidates[..index].iter().all(|(other, _)| other != lang));

        if distinct_languages {
            MultiLanguage::multi(candidates)
        } else {
            MultiLanguage::single(main.value.clone())
        }
    }

    /// Builds the reading order, the spine and the remaining resources
    fn build_links(&self) -> Result<(Vec<Link>, Vec<Link>, Vec<Link>), PublicationError> {
        let cover_id = self.first_value("cover");

        let mut reading_order = Vec::new();
        let mut spine = Vec::new();
        let mut seen = HashSet::new();

        for itemref in &self.spine {
            let item = self.manifest.get(&itemref.idref).ok_or_else(|| {
                PublicationError::ResourceIdNotExist {
                    id: itemref.idref.clone(),
                }
            })?;

            // Items with no media type stay among the resources
            if item.media_type.trim().is_empty() {
                warn!(
                    "Spine item \"{}\" has no media type, keeping it as a resource.",
                    item.href
                );
                continue;
            }
            if !seen.insert(item.href.as_str()) {
                warn!("Skipping duplicate spine item \"{}\".", item.href);
                continue;
            }

            let link = self.manifest_link(item, cover_id.as_deref());
            if itemref.linear {
                spine.push(link.clone());
            }
            reading_order.push(link);
        }

        let resources = self
            .manifest
            .values()
            .filter(|item| !seen.contains(item.href.as_str()))
            .map(|item| self.manifest_link(item, cover_id.as_deref()))
            .collect();

        Ok((reading_order, spine, resources))
    }

    fn manifest_link(&self, item: &ManifestItem, cover_id: Option<&str>) -> Link {
        let mut link = Link::new(item.href.clone(), item.media_type.clone());

        if item.has_property("cover-image") || cover_id == Some(item.id.as_str()) {
            link.add_rel("cover");
        }
        if item.has_property("nav") {
            link.add_rel("contents");
        }

        if let Some(data) = self.encryption.iter().find(|data| data.uri == item.href) {
            link.properties.encrypted = Some(self.encrypted(data));
        }

        link
    }

    fn encrypted(&self, data: &EncryptionData) -> Encrypted {
        let obfuscation = matches!(
            data.algorithm.as_str(),
            IDPF_FONT_OBFUSCATION | ADOBE_FONT_OBFUSCATION
        );
        let scheme = if self.has_license && !obfuscation {
            LCP_SCHEME
        } else {
            ""
        };

        Encrypted {
            algorithm: data.algorithm.clone(),
            scheme: scheme.to_string(),
            compression: data.compression.clone(),
            original_length: data.original_length,
        }
    }

    /// Parses the table of contents
    ///
    /// EPUB 3 packages prefer the navigation document and EPUB 2 packages
    /// the NCX; each falls back to the other. A package with neither, or
    /// whose navigation file is absent from the container, has an empty TOC.
    fn parse_toc(&mut self) -> Result<Vec<Link>, PublicationError> {
        let nav = self
            .manifest
            .values()
            .find(|item| item.has_property("nav"))
            .map(|item| item.href.clone());
        let ncx = self
            .spine_toc
            .as_ref()
            .and_then(|id| self.manifest.get(id))
            .or_else(|| {
                self.manifest
                    .values()
                    .find(|item| item.media_type == NCX_MEDIA_TYPE)
            })
            .map(|item| item.href.clone());

        let result = match (self.version, nav, ncx) {
            (EpubVersion::Version3_0, Some(nav), _) | (EpubVersion::Version2_0, Some(nav), None) => {
                self.parse_nav_document(&nav)
            }
            (_, _, Some(ncx)) => self.parse_ncx(&ncx),
            (_, None, None) => {
                warn!(
                    "No navigation document in \"{}\", the table of contents is empty.",
                    self.package_path
                );
                Ok(vec![])
            }
        };

        match result {
            Err(PublicationError::ResourceNotFound { resource }) => {
                warn!(
                    "Navigation file \"{}\" is missing, the table of contents is empty.",
                    resource
                );
                Ok(vec![])
            }
            result => result,
        }
    }

    fn parse_nav_document(&mut self, href: &str) -> Result<Vec<Link>, PublicationError> {
        let root = XmlReader::parse_bytes(get_file_in_zip_archive(&mut self.archive, href)?)?;
        let base_dir = parent_dir(href);

        let toc_nav = root.find_elements_by_name("nav").find(|nav| {
            nav.get_attr("epub:type")
                .is_some_and(|types| types.split_whitespace().any(|t| t == "toc"))
        });
        let Some(list) = toc_nav.and_then(|nav| nav.find_elements_by_name("ol").next()) else {
            warn!("\"{}\" has no toc navigation list.", href);
            return Ok(vec![]);
        };

        self.parse_nav_list(list, base_dir)
    }

    /// Converts an `<ol>` of the navigation document, nested lists included
    fn parse_nav_list(
        &self,
        list: &XmlElement,
        base_dir: &str,
    ) -> Result<Vec<Link>, PublicationError> {
        let mut links = Vec::new();
        for item in list.find_children_by_name("li") {
            let label = item.find_children_by_names(&["a", "span"]).next();
            let sub_list = item.find_children_by_name("ol").next();

            // An unlabeled item still carries its nested entries
            let mut link = match label {
                Some(label) => {
                    let mut link = self.toc_link(label.get_attr("href"), base_dir)?;
                    link.title = label.text().normalize_whitespace();
                    link
                }
                None if sub_list.is_some() => Link::default(),
                None => continue,
            };
            if let Some(sub_list) = sub_list {
                link.children = self.parse_nav_list(sub_list, base_dir)?;
            }

            links.push(link);
        }

        Ok(links)
    }

    fn parse_ncx(&mut self, href: &str) -> Result<Vec<Link>, PublicationError> {
        let root = XmlReader::parse_bytes(get_file_in_zip_archive(&mut self.archive, href)?)?;

        let Some(nav_map) = root.find_elements_by_name("navMap").next() else {
            warn!("\"{}\" has no navMap.", href);
            return Ok(vec![]);
        };

        self.parse_nav_points(nav_map, parent_dir(href))
    }

    /// Converts the `navPoint` children of an element
    ///
    /// Siblings are ordered by `playOrder` when every one of them declares it,
    /// and kept in document order otherwise.
    fn parse_nav_points(
        &self,
        parent: &XmlElement,
        base_dir: &str,
    ) -> Result<Vec<Link>, PublicationError> {
        let mut nav_points = Vec::new();
        for nav_point in parent.find_children_by_name("navPoint") {
            let src = nav_point
                .find_children_by_name("content")
                .next()
                .and_then(|content| content.get_attr("src"));

            let mut link = self.toc_link(src, base_dir)?;
            link.title = nav_point
                .find_children_by_name("navLabel")
                .next()
                .map(|label| label.text().normalize_whitespace())
                .unwrap_or_default();
            link.children = self.parse_nav_points(nav_point, base_dir)?;

            let play_order = nav_point
                .get_attr("playOrder")
                .and_then(|order| order.trim().parse::<u32>().ok());
            nav_points.push((play_order, link));
        }

        if nav_points.iter().all(|(play_order, _)| play_order.is_some()) {
            nav_points.sort_by_key(|(play_order, _)| *play_order);
        }

        Ok(nav_points.into_iter().map(|(_, link)| link).collect())
    }

    fn toc_link(&self, href: Option<String>, base_dir: &str) -> Result<Link, PublicationError> {
        let Some(href) = href else {
            return Ok(Link::default());
        };

        let href = resolve_href(base_dir, &href)?;
        let href_path = href.split('#').next().unwrap_or(&href);
        let media_type = self
            .manifest
            .values()
            .find(|item| item.href == href_path)
            .map(|item| item.media_type.clone())
            .unwrap_or_default();

        Ok(Link::new(href, media_type))
    }
}

/// Files the contributor under the metadata field matching its MARC relator role
fn add_contributor(metadata: &mut Metadata, item: &MetadataItem, default_lang: &str) {
    let alternates = item.alternate_scripts();
    let name = if alternates.is_empty() {
        MultiLanguage::single(item.value.clone())
    } else {
        let lang = item.lang.clone().unwrap_or_else(|| default_lang.to_string());
        MultiLanguage::multi(iter::once((lang, item.value.clone())).chain(alternates))
    };

    let role = item.refinement_value("role").map(str::to_string);
    let list = match (role.as_deref(), item.property.as_str()) {
        (Some("aut"), _) => &mut metadata.author,
        (Some("trl"), _) => &mut metadata.translator,
        (Some("edt"), _) => &mut metadata.editor,
        (Some("ill"), _) => &mut metadata.illustrator,
        (Some("pen"), _) => &mut metadata.penciler,
        (Some("clr"), _) => &mut metadata.colorist,
        (Some("ink"), _) => &mut metadata.inker,
        (Some("nrt"), _) => &mut metadata.narrator,
        (Some("pbl"), _) | (_, "publisher") => &mut metadata.publisher,
        (_, "creator") => &mut metadata.author,
        _ => &mut metadata.contributor,
    };

    list.push(Contributor {
        name,
        sort_as: item.refinement_value("file-as").map(str::to_string),
        role,
    });
}

fn is_dublin_core(element: &XmlElement) -> bool {
    match &element.namespace {
        Some(namespace) => namespace == DC_NAMESPACE,
        None => element.prefix.as_deref() == Some("dc"),
    }
}

/// Reads a file the container format requires
fn read_required_file<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, PublicationError> {
    get_file_in_zip_archive(archive, name).map_err(|err| match err {
        PublicationError::ResourceNotFound { .. } => PublicationError::NonCanonicalEpub {
            expected_file: name.to_string(),
        },
        err => err,
    })
}

fn required_child<'a>(
    element: &'a XmlElement,
    name: &str,
) -> Result<&'a XmlElement, PublicationError> {
    element
        .find_children_by_name(name)
        .next()
        .ok_or_else(|| PublicationError::NonCanonicalFile {
            tag: name.to_string(),
        })
}

fn required_attr(element: &XmlElement, attribute: &str) -> Result<String, PublicationError> {
    element
        .get_attr(attribute)
        .ok_or_else(|| PublicationError::MissingRequiredAttribute {
            tag: element.tag_name(),
            attribute: attribute.to_string(),
        })
}
