/// Default route prefix shared by client and server.
pub const DEFAULT_PREFIX: &str = "upload";

/// Query/form field carrying the file identity.
pub const FIELD_HASH: &str = "hash";
/// Form field carrying the chunk index.
pub const FIELD_INDEX: &str = "index";
/// Form field carrying the total chunk count.
pub const FIELD_TOTAL: &str = "total";
/// Optional SHA-256 hex digest (chunk bytes on upload, whole file on finish).
pub const FIELD_CHECKSUM: &str = "checksum";
/// Query field carrying the target filename on finish.
pub const FIELD_FILENAME: &str = "filename";
/// Multipart file field carrying the chunk bytes.
pub const FIELD_DATA: &str = "data";

/// Response status code carried in [`Envelope::err_code`](crate::Envelope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Success,
    MergeFailed,
    BadRequest,
    PersistFailed,
    ExistsFailed,
}

impl ErrorCode {
    /// Returns the wire representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Success => "000000",
            ErrorCode::MergeFailed => "000001",
            ErrorCode::BadRequest => "000002",
            ErrorCode::PersistFailed => "000003",
            ErrorCode::ExistsFailed => "000004",
        }
    }

    /// Parses a wire code. Unknown codes yield `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "000000" => Some(ErrorCode::Success),
            "000001" => Some(ErrorCode::MergeFailed),
            "000002" => Some(ErrorCode::BadRequest),
            "000003" => Some(ErrorCode::PersistFailed),
            "000004" => Some(ErrorCode::ExistsFailed),
            _ => None,
        }
    }
}

/// The three operations exposed under the shared route prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    CheckExists,
    UploadChunk,
    Finish,
}

impl Route {
    pub const ALL: [Route; 3] = [Route::CheckExists, Route::UploadChunk, Route::Finish];

    /// Last path segment of the route.
    pub fn name(&self) -> &'static str {
        match self {
            Route::CheckExists => "checkFileHashExist",
            Route::UploadChunk => "uploadChunk",
            Route::Finish => "uploadFinish",
        }
    }

    /// Full request path under `prefix`, e.g. `/upload/uploadChunk`.
    pub fn path(&self, prefix: &str) -> String {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("/{}", self.name())
        } else {
            format!("/{prefix}/{}", self.name())
        }
    }

    /// Matches a request path against the routes under `prefix`.
    ///
    /// A missing leading slash is tolerated.
    pub fn resolve(prefix: &str, path: &str) -> Option<Route> {
        let path = path.split('?').next().unwrap_or_default();
        let normalized = format!("/{}", path.trim_start_matches('/'));
        Route::ALL
            .into_iter()
            .find(|route| route.path(prefix) == normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_roundtrip() {
        for code in [
            ErrorCode::Success,
            ErrorCode::MergeFailed,
            ErrorCode::BadRequest,
            ErrorCode::PersistFailed,
            ErrorCode::ExistsFailed,
        ] {
            assert_eq!(ErrorCode::from_code(code.as_str()), Some(code));
        }
        assert_eq!(ErrorCode::from_code("999999"), None);
    }

    #[test]
    fn route_paths_use_prefix() {
        assert_eq!(Route::CheckExists.path("upload"), "/upload/checkFileHashExist");
        assert_eq!(Route::UploadChunk.path("/api/files/"), "/api/files/uploadChunk");
        assert_eq!(Route::Finish.path(""), "/uploadFinish");
    }

    #[test]
    fn resolve_matches_known_routes() {
        assert_eq!(
            Route::resolve("upload", "/upload/uploadChunk"),
            Some(Route::UploadChunk)
        );
        assert_eq!(
            Route::resolve("upload", "upload/checkFileHashExist?hash=abc"),
            Some(Route::CheckExists)
        );
        assert_eq!(Route::resolve("upload", "/other/uploadChunk"), None);
        assert_eq!(Route::resolve("upload", "/upload/unknown"), None);
    }
}
