//! Display classification of MIME types.

use serde::{Deserialize, Serialize};

use super::kind::EntityKind;

/// Coarse file class shown next to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileClass {
    Folder,
    Link,
    Image,
    #[serde(rename = "PDF")]
    Pdf,
    Text,
    #[serde(rename = "XML Data")]
    XmlData,
    Document,
    Spreadsheet,
    Presentation,
    Code,
    Audio,
    Video,
    Book,
    Application,
    Archive,
    Unknown,
}

const CLASSES: &[(FileClass, &[&str])] = &[
    (
        FileClass::Image,
        &[
            "image/png",
            "image/jpeg",
            "image/svg+xml",
            "image/heic",
            "image/heif",
            "image/avif",
            "image/webp",
            "image/tiff",
            "image/gif",
        ],
    ),
    (FileClass::Pdf, &["application/pdf"]),
    (FileClass::Text, &["text/plain"]),
    (FileClass::XmlData, &["application/xml"]),
    (
        FileClass::Document,
        &[
            "application/msword",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "application/vnd.oasis.opendocument.text",
            "application/vnd.apple.pages",
            "application/x-abiword",
        ],
    ),
    (
        FileClass::Spreadsheet,
        &[
            "application/vnd.ms-excel",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "application/vnd.oasis.opendocument.spreadsheet",
            "text/csv",
            "application/vnd.apple.numbers",
        ],
    ),
    (
        FileClass::Presentation,
        &[
            "application/vnd.ms-powerpoint",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            "application/vnd.oasis.opendocument.presentation",
            "application/vnd.apple.keynote",
        ],
    ),
    (
        FileClass::Code,
        &[
            "text/x-python",
            "text/html",
            "text/css",
            "text/javascript",
            "application/javascript",
            "text/markdown",
            "application/json",
            "application/x-sql",
            "text/x-csrc",
            "text/x-sh",
        ],
    ),
    (
        FileClass::Audio,
        &["audio/mpeg", "audio/wav", "audio/ogg", "audio/mp4", "audio/mp3"],
    ),
    (
        FileClass::Video,
        &[
            "video/mp4",
            "video/webm",
            "video/ogg",
            "video/quicktime",
            "video/x-matroska",
        ],
    ),
    (
        FileClass::Book,
        &["application/epub+zip", "application/x-mobipocket-ebook"],
    ),
    (
        FileClass::Application,
        &[
            "application/octet-stream",
            "application/x-sh",
            "application/vnd.microsoft.portable-executable",
        ],
    ),
    (
        FileClass::Archive,
        &[
            "application/zip",
            "application/x-rar-compressed",
            "application/x-tar",
            "application/gzip",
            "application/x-bzip2",
        ],
    ),
];

/// Classify an entity for display.
pub fn classify(kind: EntityKind, mime_type: Option<&str>) -> FileClass {
    match kind {
        EntityKind::Folder => return FileClass::Folder,
        EntityKind::Link => return FileClass::Link,
        EntityKind::File | EntityKind::Document => {}
    }

    let Some(mime) = mime_type else {
        return FileClass::Unknown;
    };
    CLASSES
        .iter()
        .find(|(_, types)| types.contains(&mime))
        .map(|(class, _)| *class)
        .unwrap_or(FileClass::Unknown)
}
