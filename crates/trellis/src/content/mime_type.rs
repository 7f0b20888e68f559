use mime::Mime;
use std::path::Path;

/// Infers a content type from the extension of `path`, `application/octet-stream` when
/// the extension is missing or unknown.
pub fn content_type_for(path: impl AsRef<Path>) -> Mime {
    mime_guess::from_path(path).first_or_octet_stream()
}
