//! Static file serving.

use crate::error::ServiceError;
use crate::router::{HandlerResult, Reply};
use crate::server::response::ResponseHandle;
use std::path::Path;

/// A reasonable MIME type based on the extension of a file.
pub fn mime_type(path: &str) -> &'static str {
    let ext = match path.rfind('.') {
        Some(pos) => &path[pos..],
        None => "",
    };
    match ext.to_ascii_lowercase().as_str() {
        ".htm" | ".html" | ".php" => "text/html",
        ".css" => "text/css",
        ".txt" => "text/plain",
        ".js" => "application/javascript",
        ".json" => "application/json",
        ".xml" => "application/xml",
        ".swf" => "application/x-shockwave-flash",
        ".flv" => "video/x-flv",
        ".png" => "image/png",
        ".jpe" | ".jpeg" | ".jpg" => "image/jpeg",
        ".gif" => "image/gif",
        ".bmp" => "image/bmp",
        ".ico" => "image/vnd.microsoft.icon",
        ".tiff" | ".tif" => "image/tiff",
        ".svg" | ".svgz" => "image/svg+xml",
        _ => "application/text",
    }
}

/// Fill the response with a file's contents and MIME type.
///
/// A missing or unreadable file surfaces as `NotFound`, so a static
/// route produces the same page as an unmatched URL.
pub fn serve(response: &ResponseHandle, path: &Path) -> HandlerResult {
    let body = std::fs::read(path).map_err(|_| ServiceError::NotFound)?;
    let mut res = response.lock();
    res.set_header("Content-Type", mime_type(&path.to_string_lossy()));
    res.set_body(body);
    Ok(Reply::Manual)
}
