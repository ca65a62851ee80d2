//! AQED dataset export decoding and real-data checks
//!
//! Layout (little endian u32 fields, 64-byte header):
//!
//! | offset | field                                  |
//! |--------|----------------------------------------|
//! | 0      | magic `"AQED"`                         |
//! | 4      | version, must be 1                     |
//! | 8      | vector count `n`                       |
//! | 12     | original dimension                     |
//! | 16     | compressed dimension                   |
//! | 20     | flags: bit0 original, bit1 compressed  |
//!
//! The original embeddings section follows the header as `n × dim` f32.

/// File magic
pub const AQED_MAGIC: &[u8; 4] = b"AQED";

/// Header bytes fetched before the payload
pub const AQED_HEADER_LEN: usize = 64;

/// Supported format version
pub const AQED_VERSION: u32 = 1;

/// Flag: original embeddings present
pub const FLAG_HAS_ORIGINAL: u32 = 1 << 0;

/// Flag: compressed embeddings present
pub const FLAG_HAS_COMPRESSED: u32 = 1 << 1;

/// Decoding and data-quality errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SampleError {
    #[error("header needs {AQED_HEADER_LEN} bytes, got {0}")]
    ShortHeader(usize),

    #[error("missing AQED magic bytes")]
    BadMagic,

    #[error("unsupported AQED version {0}")]
    UnsupportedVersion(u32),

    #[error("invalid header: n={count}, dim={dim}")]
    EmptyDataset { count: u32, dim: u32 },

    #[error("dataset has no original embeddings section (flags={0})")]
    NoOriginalSection(u32),

    #[error("payload truncated: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },

    #[error("degenerate data: {0}")]
    Degenerate(String),
}

/// Parsed AQED header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AqedHeader {
    pub version: u32,
    pub count: u32,
    pub original_dim: u32,
    pub compressed_dim: u32,
    pub flags: u32,
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(word)
}

impl AqedHeader {
    /// Parse the first [`AQED_HEADER_LEN`] bytes
    pub fn parse(buf: &[u8]) -> Result<Self, SampleError> {
        if buf.len() < AQED_HEADER_LEN {
            return Err(SampleError::ShortHeader(buf.len()));
        }
        if &buf[..4] != AQED_MAGIC {
            return Err(SampleError::BadMagic);
        }
        let header = Self {
            version: read_u32(buf, 4),
            count: read_u32(buf, 8),
            original_dim: read_u32(buf, 12),
            compressed_dim: read_u32(buf, 16),
            flags: read_u32(buf, 20),
        };
        if header.version != AQED_VERSION {
            return Err(SampleError::UnsupportedVersion(header.version));
        }
        if header.count == 0 || header.original_dim == 0 {
            return Err(SampleError::EmptyDataset {
                count: header.count,
                dim: header.original_dim,
            });
        }
        if !header.has_original() {
            return Err(SampleError::NoOriginalSection(header.flags));
        }
        Ok(header)
    }

    pub fn has_original(&self) -> bool {
        self.flags & FLAG_HAS_ORIGINAL != 0
    }

    /// Encode back to a 64-byte header (zero padded)
    pub fn to_bytes(&self) -> [u8; AQED_HEADER_LEN] {
        let mut out = [0u8; AQED_HEADER_LEN];
        out[..4].copy_from_slice(AQED_MAGIC);
        for (offset, value) in [
            (4, self.version),
            (8, self.count),
            (12, self.original_dim),
            (16, self.compressed_dim),
            (20, self.flags),
        ] {
            out[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }
        out
    }

    /// Number of vectors a sample of `requested` actually takes
    pub fn take(&self, requested: usize) -> usize {
        requested.max(1).min(self.count as usize)
    }

    /// Bytes needed for the header plus `take` original vectors
    pub fn prefix_len(&self, take: usize) -> usize {
        AQED_HEADER_LEN + take * self.original_dim as usize * 4
    }
}

/// Decode `take` original vectors following the header
pub fn decode_vectors(buf: &[u8], header: &AqedHeader, take: usize) -> Result<Vec<Vec<f32>>, SampleError> {
    let need = header.prefix_len(take);
    if buf.len() < need {
        return Err(SampleError::Truncated {
            need,
            got: buf.len(),
        });
    }
    let dim = header.original_dim as usize;
    let vectors = buf[AQED_HEADER_LEN..need]
        .chunks_exact(dim * 4)
        .map(|row| {
            row.chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        })
        .collect();
    Ok(vectors)
}

/// Reject samples that cannot be real embeddings
///
/// A sample is degenerate when any coordinate is non-finite, any vector is
/// all zeros, or every vector in a multi-vector sample is identical.
pub fn check_not_degenerate(vectors: &[Vec<f32>]) -> Result<(), SampleError> {
    if vectors.is_empty() {
        return Err(SampleError::Degenerate("no vectors sampled".to_string()));
    }
    for (i, v) in vectors.iter().enumerate() {
        if v.iter().any(|x| !x.is_finite()) {
            return Err(SampleError::Degenerate(format!("vector {} has non-finite values", i)));
        }
        if v.iter().all(|x| *x == 0.0) {
            return Err(SampleError::Degenerate(format!("vector {} is all zeros", i)));
        }
    }
    if vectors.len() > 1 && vectors.iter().all(|v| v == &vectors[0]) {
        return Err(SampleError::Degenerate(format!(
            "all {} sampled vectors are identical",
            vectors.len()
        )));
    }
    Ok(())
}

/// Build an AQED blob holding `vectors` as original embeddings
pub fn encode_aqed(vectors: &[Vec<f32>]) -> Vec<u8> {
    let dim = vectors.first().map(|v| v.len()).unwrap_or(0) as u32;
    let header = AqedHeader {
        version: AQED_VERSION,
        count: vectors.len() as u32,
        original_dim: dim,
        compressed_dim: 0,
        flags: FLAG_HAS_ORIGINAL,
    };
    let mut out = header.to_bytes().to_vec();
    for v in vectors {
        for x in v {
            out.extend_from_slice(&x.to_le_bytes());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vectors() -> Vec<Vec<f32>> {
        vec![vec![0.1, -0.2, 0.3], vec![0.4, 0.5, -0.6], vec![-0.7, 0.8, 0.9]]
    }

    #[test]
    fn test_header_parse() {
        let blob = encode_aqed(&vectors());
        let header = AqedHeader::parse(&blob).unwrap();
        assert_eq!(header.count, 3);
        assert_eq!(header.original_dim, 3);
        assert!(header.has_original());
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let mut blob = encode_aqed(&vectors());
        blob[0] = b'X';
        assert_eq!(AqedHeader::parse(&blob), Err(SampleError::BadMagic));
    }

    #[test]
    fn test_header_rejects_short_buffer() {
        assert_eq!(AqedHeader::parse(&[0u8; 10]), Err(SampleError::ShortHeader(10)));
    }

    #[test]
    fn test_header_rejects_version() {
        let mut blob = encode_aqed(&vectors());
        blob[4..8].copy_from_slice(&2u32.to_le_bytes());
        assert_eq!(AqedHeader::parse(&blob), Err(SampleError::UnsupportedVersion(2)));
    }

    #[test]
    fn test_header_requires_original_section() {
        let mut blob = encode_aqed(&vectors());
        blob[20..24].copy_from_slice(&FLAG_HAS_COMPRESSED.to_le_bytes());
        assert!(matches!(AqedHeader::parse(&blob), Err(SampleError::NoOriginalSection(2))));
    }

    #[test]
    fn test_take_is_clamped() {
        let header = AqedHeader::parse(&encode_aqed(&vectors())).unwrap();
        assert_eq!(header.take(0), 1);
        assert_eq!(header.take(2), 2);
        assert_eq!(header.take(100), 3);
        assert_eq!(header.prefix_len(2), 64 + 2 * 3 * 4);
    }

    #[test]
    fn test_decode_vectors() {
        let blob = encode_aqed(&vectors());
        let header = AqedHeader::parse(&blob).unwrap();
        let decoded = decode_vectors(&blob, &header, 2).unwrap();
        assert_eq!(decoded, vectors()[..2].to_vec());
    }

    #[test]
    fn test_decode_truncated() {
        let blob = encode_aqed(&vectors());
        let header = AqedHeader::parse(&blob).unwrap();
        let err = decode_vectors(&blob[..70], &header, 2).unwrap_err();
        assert_eq!(err, SampleError::Truncated { need: 88, got: 70 });
    }

    #[test]
    fn test_all_zero_is_degenerate() {
        let zeros = vec![vec![0.0f32; 4]; 3];
        assert!(matches!(check_not_degenerate(&zeros), Err(SampleError::Degenerate(_))));
    }

    #[test]
    fn test_nan_is_degenerate() {
        let v = vec![vec![0.1, f32::NAN], vec![0.2, 0.3]];
        assert!(check_not_degenerate(&v).is_err());
    }

    #[test]
    fn test_identical_vectors_are_degenerate() {
        let v = vec![vec![0.5, 0.5]; 4];
        assert!(check_not_degenerate(&v).is_err());
        assert!(check_not_degenerate(&v[..1]).is_ok());
    }

    #[test]
    fn test_real_looking_sample_passes() {
        assert!(check_not_degenerate(&vectors()).is_ok());
    }
}
