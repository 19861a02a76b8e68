//! Integration tests for hash crate

#[cfg(test)]
mod tests {
    use sipforge_hash::*;
    use tempfile::tempdir;
    use tokio::fs;

    #[tokio::test]
    async fn test_file_hash_matches_data_hash() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("sip.tar");

        // larger than one read chunk
        let data = vec![42u8; 200 * 1024];
        fs::write(&file_path, &data).await.unwrap();

        let from_file = Hash::hash_file(&file_path).await.unwrap();
        assert_eq!(from_file, Hash::from_data(&data));

        let mut builder = HashBuilder::new();
        builder.update(&data[..1000]).update(&data[1000..]);
        assert_eq!(builder.finalize(), from_file);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(Hash::hash_file(&dir.path().join("absent")).await.is_err());
    }

    #[test]
    fn test_hash_from_hex_errors() {
        // Too short
        let result = Hash::from_hex("1234");
        assert!(result.is_err());

        // Too long
        let result = Hash::from_hex(&"a".repeat(65));
        assert!(result.is_err());

        // Invalid hex
        let result = Hash::from_hex("xyz123");
        assert!(result.is_err());
    }

    #[test]
    fn test_serializes_as_hex() {
        let hash = Hash::from_data(b"archive");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));
        let back: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
