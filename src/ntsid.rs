use std::fmt::{self, Debug, Display, Write};

/// A Windows security identifier (NT SID).
///
/// Wire layout is `[revision:u8][subauthority_count:u8][authority:6 bytes BE]`
/// followed by `subauthority_count` little-endian u32 values.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct Sid {
    revision: u8,
    authority: u64,
    sub_authorities: Vec<u32>,
}

impl Sid {
    /// Parse a SID from `bytes`, returning it together with the number of
    /// bytes consumed (SIDs are variable-length).
    pub fn from_bytes(bytes: &[u8]) -> Option<(Sid, usize)> {
        if bytes.len() < 8 {
            return None;
        }

        let revision = bytes[0];
        let count = bytes[1] as usize;

        // The identifier authority is kept in big-endian order.
        let mut authority: u64 = 0;
        for &b in &bytes[2..8] {
            authority = (authority << 8) | u64::from(b);
        }

        let total = 8 + count * 4;
        if bytes.len() < total {
            return None;
        }

        let mut sub_authorities = Vec::with_capacity(count);
        for chunk in bytes[8..total].chunks_exact(4) {
            sub_authorities.push(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }

        Some((
            Sid {
                revision,
                authority,
                sub_authorities,
            },
            total,
        ))
    }
}

impl Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut repr = String::with_capacity(32);
        write!(repr, "S-{}-{}", self.revision, self.authority)
            .expect("writing to a String cannot fail");

        for sub in &self.sub_authorities {
            write!(repr, "-{}", sub).expect("writing to a String cannot fail");
        }

        f.write_str(&repr)
    }
}

impl Debug for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}
