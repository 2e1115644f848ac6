//! Decide how an uploaded file should be parsed.
//!
//! The declared MIME type wins when present; otherwise the extension is
//! looked up in [`MIME_LOOKUPS`]. Anything that still resolves to neither
//! JSON nor ZIP gets one last chance: the bytes are opened as a ZIP archive,
//! which catches bundles uploaded with a misleading name or type.

use std::io::Cursor;

use log::debug;

use crate::model::RawFile;

pub const JSON_MIME: &str = "application/json";
pub const ZIP_MIME: &str = "application/zip";
pub const LEGACY_ZIP_MIME: &str = "application/x-zip-compressed";

/// Extension to MIME table used when the upload carries no MIME type.
pub const MIME_LOOKUPS: &[(&str, &str)] = &[
    ("json", JSON_MIME),
    ("geojson", JSON_MIME),
    ("zip", ZIP_MIME),
    ("shp", "application/octet-stream"),
    ("kml", "application/vnd.google-earth.kml+xml"),
    ("kmz", "application/vnd.google-earth.kmz"),
    ("gpx", "application/gpx+xml"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Json,
    Zip,
    Unsupported,
}

/// Resolve the MIME type of a file: declared type first, then extension.
pub fn resolve_mime(file: &RawFile) -> Option<String> {
    let declared = file
        .mime
        .split(';')
        .next()
        .map(str::trim)
        .unwrap_or_default();
    if !declared.is_empty() {
        return Some(declared.to_ascii_lowercase());
    }
    let ext = file.extension()?;
    MIME_LOOKUPS
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| (*mime).to_owned())
}

pub fn classify(file: &RawFile) -> FileKind {
    let mime = resolve_mime(file);
    let kind = match mime.as_deref() {
        Some(JSON_MIME) => FileKind::Json,
        Some(ZIP_MIME) | Some(LEGACY_ZIP_MIME) => FileKind::Zip,
        _ if looks_like_zip(&file.bytes) => FileKind::Zip,
        _ => FileKind::Unsupported,
    };
    debug!("Classified {} ({:?}) as {:?}", file.name, mime, kind);
    kind
}

/// Byte-level fallback: can the buffer be opened as a ZIP archive?
pub fn looks_like_zip(bytes: &[u8]) -> bool {
    zip::ZipArchive::new(Cursor::new(bytes)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn tiny_zip() -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("readme.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"hello").unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[rstest]
    #[case("zones.json", "", FileKind::Json)]
    #[case("zones.GEOJSON", "", FileKind::Json)]
    #[case("zones.bin", "application/json", FileKind::Json)]
    #[case("zones.txt", "application/json; charset=utf-8", FileKind::Json)]
    #[case("bundle", "application/x-zip-compressed", FileKind::Zip)]
    #[case("bundle.zip", "", FileKind::Zip)]
    #[case("notes.txt", "text/plain", FileKind::Unsupported)]
    #[case("drawing.kml", "", FileKind::Unsupported)]
    fn classifies_by_declared_type(
        #[case] name: &str,
        #[case] mime: &str,
        #[case] expected: FileKind,
    ) {
        let file = RawFile::new(name, mime, b"not inspected".to_vec());
        assert_eq!(classify(&file), expected);
    }

    #[test]
    fn declared_type_beats_extension() {
        let file = RawFile::new("zones.zip", "application/json", Vec::new());
        assert_eq!(resolve_mime(&file).as_deref(), Some(JSON_MIME));
        assert_eq!(classify(&file), FileKind::Json);
    }

    #[test]
    fn sniffs_zip_bytes_behind_a_misleading_name() {
        let file = RawFile::new("upload.dat", "application/octet-stream", tiny_zip());
        assert_eq!(classify(&file), FileKind::Zip);
    }

    #[test]
    fn garbage_without_a_known_type_is_unsupported() {
        let file = RawFile::new("upload", "", b"PK but not really".to_vec());
        assert_eq!(resolve_mime(&file), None);
        assert_eq!(classify(&file), FileKind::Unsupported);
    }
}
