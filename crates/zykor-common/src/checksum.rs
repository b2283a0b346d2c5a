//! MD5 fingerprints for dedup keys and payload identity

/// Compute the lowercase hex MD5 of a byte buffer
pub fn compute_md5(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Check a buffer against an expected MD5, ignoring hex case
pub fn verify_md5(data: &[u8], expected: &str) -> crate::Result<()> {
    let actual = compute_md5(data);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(crate::ZykorError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}
