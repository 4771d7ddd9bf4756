use std::io::{self, Read};

/// Read big-endian words directly from a stream.
pub trait ReadBE: Read {
    fn read_be_words(&mut self, words: &mut [u16]) -> io::Result<()>;
}

/// Everything that implements Read can also implement ReadBE.
impl<T: Read> ReadBE for T {
    /// Fill the whole of `words`, failing if the stream runs dry first.
    fn read_be_words(&mut self, words: &mut [u16]) -> io::Result<()> {
        let mut bytes = vec![0; words.len() * 2];
        self.read_exact(&mut bytes)?;
        for (word, pair) in words.iter_mut().zip(bytes.chunks_exact(2)) {
            *word = u16::from_be_bytes([pair[0], pair[1]]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_words() {
        let mut input: &[u8] = &[0x44, 0x89, 0x12, 0x34, 0xAA];
        let mut words = [0; 2];
        input.read_be_words(&mut words).unwrap();
        assert_eq!(words, [0x4489, 0x1234]);
        // Only a single byte remains, which is not a whole word.
        let mut one = [0; 1];
        assert_eq!(input.read_be_words(&mut one).unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }
}
