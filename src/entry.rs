//! Packed record codec.
//!
//! Every cached value is stored as a contiguous blob with a fixed header in
//! front of the payload:
//!
//! ```text
//! +----------------+
//! |    deadline    |  8 bytes - expiration as signed epoch seconds (0 = none)
//! +----------------+
//! |  fingerprint   |  8 bytes - 64-bit key fingerprint
//! +----------------+
//! |      crc       |  4 bytes - CRC-32 (IEEE) of the key string
//! +----------------+
//! |    payload     |  payload bytes
//! +----------------+
//! ```
//!
//! All fields are little-endian. The fingerprint field may be rewritten in
//! place to tombstone a record without changing its length.

const DEADLINE_SIZE: usize = 8;
const FINGERPRINT_SIZE: usize = 8;
const CRC_SIZE: usize = 4;

/// Total size of the record header in bytes.
pub(crate) const HEADER_LEN: usize = DEADLINE_SIZE + FINGERPRINT_SIZE + CRC_SIZE;

/// Pack a record into `scratch`, growing it on demand, and return the
/// length of the packed blob. The caller reads the blob back out of
/// `scratch[..len]`.
pub(crate) fn wrap(
    deadline: i64,
    fingerprint: u64,
    crc: u32,
    value: &[u8],
    scratch: &mut Vec<u8>,
) -> usize {
    let blob_len = value.len() + HEADER_LEN;
    if scratch.len() < blob_len {
        scratch.resize(blob_len, 0);
    }

    scratch[..DEADLINE_SIZE].copy_from_slice(&deadline.to_le_bytes());
    scratch[DEADLINE_SIZE..DEADLINE_SIZE + FINGERPRINT_SIZE]
        .copy_from_slice(&fingerprint.to_le_bytes());
    scratch[DEADLINE_SIZE + FINGERPRINT_SIZE..HEADER_LEN].copy_from_slice(&crc.to_le_bytes());
    scratch[HEADER_LEN..blob_len].copy_from_slice(value);

    blob_len
}

/// Copy the payload out of a record. The copy is mandatory: the backing
/// ring slot may be overwritten once the shard lock is released.
pub(crate) fn read_value(record: &[u8]) -> Vec<u8> {
    record[HEADER_LEN..].to_vec()
}

/// Read the expiration deadline (epoch seconds, 0 = no expiration).
pub(crate) fn read_deadline(record: &[u8]) -> i64 {
    let mut field = [0u8; DEADLINE_SIZE];
    field.copy_from_slice(&record[..DEADLINE_SIZE]);
    i64::from_le_bytes(field)
}

/// Read the key fingerprint. Zero marks a tombstoned record.
pub(crate) fn read_fingerprint(record: &[u8]) -> u64 {
    let mut field = [0u8; FINGERPRINT_SIZE];
    field.copy_from_slice(&record[DEADLINE_SIZE..DEADLINE_SIZE + FINGERPRINT_SIZE]);
    u64::from_le_bytes(field)
}

/// Read the CRC-32 checksum of the original key.
pub(crate) fn read_crc(record: &[u8]) -> u32 {
    let mut field = [0u8; CRC_SIZE];
    field.copy_from_slice(&record[DEADLINE_SIZE + FINGERPRINT_SIZE..HEADER_LEN]);
    u32::from_le_bytes(field)
}

/// Tombstone a record in place by zeroing its fingerprint field.
pub(crate) fn reset_fingerprint(record: &mut [u8]) {
    record[DEADLINE_SIZE..DEADLINE_SIZE + FINGERPRINT_SIZE].fill(0);
}
