use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of a statement file, used to recognise
/// re-uploads of the same bytes.
pub fn fingerprint(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_statement_has_stable_fingerprint() {
        assert_eq!(
            fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn one_byte_edit_changes_the_fingerprint() {
        let statement = b"2024-01-10,Mercado Central,-79.90\n";
        assert_eq!(fingerprint(statement), fingerprint(&statement.to_vec()));
        assert_ne!(fingerprint(statement), fingerprint(b"2024-01-10,Mercado Central,-79.91\n"));
        assert_eq!(fingerprint(statement).len(), 64);
    }
}
