use std::io::{self, Write};

/// Write big-endian words directly to a stream.
pub trait WriteBE: Write {
    fn write_be_words(&mut self, words: &[u16]) -> io::Result<()>;
}

/// Everything that implements Write can also implement WriteBE.
impl<T: Write> WriteBE for T {
    fn write_be_words(&mut self, words: &[u16]) -> io::Result<()> {
        let bytes = words.iter()
            .flat_map(|word| word.to_be_bytes())
            .collect::<Vec<u8>>();
        self.write_all(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_words() {
        let mut out = Vec::new();
        out.write_be_words(&[0x4489]).unwrap();
        out.write_be_words(&[0x0102, 0xFFFE]).unwrap();
        assert_eq!(out, vec![0x44, 0x89, 0x01, 0x02, 0xFF, 0xFE]);
    }
}
