const FNV1_OFFSET_BASIS: u32 = 0x811C_9DC5;
const FNV1_PRIME: u32 = 0x0100_0193;

/// Hashes an event or object name the way sound banks derive object IDs from names:
/// 32-bit FNV-1 over the name with ASCII letters folded to lower case.
///
/// Non-ASCII bytes are hashed unchanged.
#[must_use]
pub fn fnv1_hash(name: &str) -> u32 {
    name.bytes().fold(FNV1_OFFSET_BASIS, |hash, byte| {
        hash.wrapping_mul(FNV1_PRIME) ^ u32::from(byte.to_ascii_lowercase())
    })
}
