//! Flat index binary file format.
//!
//! ```text
//! Offset   Size    Type        Description
//! ─────────────────────────────────────────────
//! 0x00     8       [u8; 8]     Magic: "SSHIDX01"
//! 0x08     4       u32 LE      N: Number of vectors
//! 0x0C     4       u32 LE      D: Dimensions
//! 0x10     N*D*4   [f32]       Vector data (Little Endian), insertion order
//! ```

use std::io;

/// Magic bytes identifying a flat index file.
pub const MAGIC: [u8; 8] = *b"SSHIDX01";

/// 8 (magic) + 4 (count) + 4 (dims)
pub const HEADER_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub count: u32,
    pub dimensions: u32,
}

impl IndexHeader {
    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "file too small for header",
            ));
        }
        if bytes[0..8] != MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid magic bytes: expected SSHIDX01",
            ));
        }

        let count = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let dimensions = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        Ok(Self { count, dimensions })
    }

    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&MAGIC);
        buf[8..12].copy_from_slice(&self.count.to_le_bytes());
        buf[12..16].copy_from_slice(&self.dimensions.to_le_bytes());
        buf
    }
}

/// Encode a flat row-major vector buffer with its header.
pub fn encode(dimensions: usize, data: &[f32]) -> io::Result<Vec<u8>> {
    let count = if dimensions == 0 { 0 } else { data.len() / dimensions };
    let header = IndexHeader {
        count: u32::try_from(count)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many vectors"))?,
        dimensions: u32::try_from(dimensions)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "dimension too large"))?,
    };

    let mut buf = Vec::with_capacity(HEADER_SIZE + data.len() * 4);
    buf.extend_from_slice(&header.to_bytes());
    for x in data {
        buf.extend_from_slice(&x.to_le_bytes());
    }
    Ok(buf)
}

/// Decode a file into its header and flat vector buffer.
pub fn decode(bytes: &[u8]) -> io::Result<(IndexHeader, Vec<f32>)> {
    let header = IndexHeader::from_bytes(bytes)?;
    let expected = (header.count as usize)
        .checked_mul(header.dimensions as usize)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "header overflow"))?;

    let payload = &bytes[HEADER_SIZE..];
    if payload.len() != expected {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "payload is {} bytes, header declares {} vectors x {} dims",
                payload.len(),
                header.count,
                header.dimensions
            ),
        ));
    }

    let data = payload
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok((header, data))
}
