use std::fmt::Write;

/// Words shown on each line of a dump.
const WORDS_PER_LINE: usize = 8;
/// Width of a full line's word columns, including the mid-line gap.
const WORD_COLUMNS: usize = WORDS_PER_LINE * 5;

/// Nicely format the given words as a hex block. Addresses are byte offsets
/// starting from `start`, so they line up with the on-disk layout.
pub fn pretty_print_hex_words(words: &[u16], start: usize) -> String {
    // Each line is a 10-character address, 4 spaces, the word columns, and
    // the ASCII view of its 16 bytes between bars.
    let mut str = String::with_capacity((words.len() / WORDS_PER_LINE + 1) * 76);
    for (line_num, line) in words.chunks(WORDS_PER_LINE).enumerate() {
        if line_num != 0 {
            str.push('\n');
        }
        write!(str, "{:#010X}    ", start + line_num * WORDS_PER_LINE * 2).unwrap();

        let mut width = 0;
        for (i, word) in line.iter().enumerate() {
            if i != 0 {
                let gap = if i == WORDS_PER_LINE / 2 { "  " } else { " " };
                str.push_str(gap);
                width += gap.len();
            }
            write!(str, "{:04X}", word).unwrap();
            width += 4;
        }
        // Pad a short final line so the ASCII column stays aligned.
        for _ in width..WORD_COLUMNS {
            str.push(' ');
        }

        str.push_str("  |");
        for byte in line.iter().flat_map(|word| word.to_be_bytes()) {
            str.push(printable(byte));
        }
        str.push('|');
    }

    str
}

fn printable(chr: u8) -> char {
    match chr {
        32..=126 => chr.into(),
        _ => '.',
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_line() {
        let words = [0x4489, 0x4489, 0x2AAA, 0x5554, 0x4142, 0x4344, 0x0000, 0xFFFF];
        assert_eq!(pretty_print_hex_words(&words, 0),
                   "0x00000000    4489 4489 2AAA 5554  4142 4344 0000 FFFF  \
                    |D.D.*.UTABCD....|");
    }

    #[test]
    fn test_partial_line() {
        let words = [0; 10];
        let dump = pretty_print_hex_words(&words, 0x20);
        let lines = dump.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0x00000020"));
        assert!(lines[1].starts_with("0x00000030    0000 0000 "));
        // Both lines put their ASCII column in the same place.
        assert_eq!(lines[0].find('|'), lines[1].find('|'));
        assert!(lines[1].ends_with("|....|"));
    }
}
