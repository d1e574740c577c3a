#[inline]
pub fn checksum(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::default();
    hasher.update(data);
    hasher.finalize()
}
