fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use bigfile_protocol::{ChunkIndex, Envelope, ErrorCode, ExistsResponse, Route};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn read_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Parses a fixture as an envelope, re-serializes it and compares the
    /// JSON values (key order independent).
    fn roundtrip_envelope(name: &str) -> Envelope {
        let text = read_fixture(name);
        let envelope: Envelope = serde_json::from_str(&text)
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let fixture: serde_json::Value = serde_json::from_str(&text).unwrap();
        let reserialized = serde_json::to_value(&envelope)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  ours:    {reserialized}"
        );
        envelope
    }

    #[test]
    fn fixture_exists_found() {
        let env = roundtrip_envelope("exists_found.json");
        assert!(env.is_success());
        let data: ExistsResponse = env.parse_data().unwrap().unwrap();
        let (indices, rejected) = data.stored_indices();
        assert!(rejected.is_empty());
        assert_eq!(
            indices.into_iter().collect::<Vec<_>>(),
            vec![ChunkIndex::new(0), ChunkIndex::new(1), ChunkIndex::new(3)]
        );
    }

    #[test]
    fn fixture_exists_missing() {
        let env = roundtrip_envelope("exists_missing.json");
        let data: ExistsResponse = env.parse_data().unwrap().unwrap();
        assert_eq!(data, ExistsResponse::missing());
    }

    #[test]
    fn fixture_chunk_ack() {
        let env = roundtrip_envelope("chunk_ack.json");
        assert_eq!(env.parse_data::<String>().unwrap().as_deref(), Some("4"));
    }

    #[test]
    fn fixture_merge_success_has_no_data() {
        let env = roundtrip_envelope("merge_success.json");
        assert!(env.is_success());
        assert!(env.data.is_none());
    }

    #[test]
    fn fixture_merge_failed() {
        let env = roundtrip_envelope("merge_failed.json");
        assert!(!env.is_success());
        assert_eq!(env.code(), Some(ErrorCode::MergeFailed));
        assert!(env.err_msg.starts_with("file merge fail: "));
    }

    /// Older servers misspell the success message; only the code counts.
    #[test]
    fn legacy_success_message_is_still_success() {
        let env = roundtrip_envelope("legacy_success_spelling.json");
        assert!(env.is_success());
        let data: ExistsResponse = env.parse_data().unwrap().unwrap();
        assert_eq!(data.stored_indices().0.len(), 3);
    }

    #[test]
    fn built_envelopes_match_wire_shape() {
        let found = ExistsResponse::found(&[ChunkIndex::new(0), ChunkIndex::new(2)]);
        let env = Envelope::success("success", Some(&found)).unwrap();
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "errCode": "000000",
                "errMsg": "success",
                "data": { "exists": true, "chunkList": ["0", "2"] }
            })
        );

        let value = serde_json::to_value(Envelope::error(ErrorCode::BadRequest, "nope")).unwrap();
        assert_eq!(value, serde_json::json!({ "errCode": "000002", "errMsg": "nope" }));
    }

    #[test]
    fn route_paths() {
        let paths: Vec<String> = Route::ALL.iter().map(|r| r.path("upload")).collect();
        assert_eq!(
            paths,
            vec![
                "/upload/checkFileHashExist",
                "/upload/uploadChunk",
                "/upload/uploadFinish"
            ]
        );
    }

    #[test]
    fn unknown_error_code_is_preserved() {
        let env: Envelope =
            serde_json::from_str(r#"{"errCode":"999999","errMsg":"teapot"}"#).unwrap();
        assert!(!env.is_success());
        assert_eq!(env.code(), None);
        assert_eq!(env.err_code, "999999");
    }
}
