//! "A1"-style cell reference codec.
//!
//! Pure, stateless conversion between reference strings and 0-based
//! (row, column) indices. Columns are base-26 over letters only
//! (A=1 .. Z=26, AA=27, ..) minus one; rows are 1-based digits minus one.

/// Convert 0-based (row, column) indices to a reference like `"AB123"`.
pub fn to_reference(row: u32, col: u32) -> String {
    format!("{}{}", column_label(col), row + 1)
}

/// Convert a reference like `"AB123"` to 0-based (row, column) indices.
///
/// Returns `None` for malformed input: missing letters or digits, letters
/// after digits, row 0, or overflow.
pub fn to_indices(reference: &str) -> Option<(u32, u32)> {
    let mut col: u32 = 0;
    let mut row: u32 = 0;
    let mut saw_letter = false;
    let mut saw_digit = false;

    for ch in reference.chars() {
        if ch.is_ascii_alphabetic() {
            if saw_digit {
                return None;
            }
            saw_letter = true;
            let upper = ch.to_ascii_uppercase() as u8;
            col = col
                .checked_mul(26)?
                .checked_add(u32::from(upper - b'A') + 1)?;
        } else if ch.is_ascii_digit() {
            saw_digit = true;
            row = row
                .checked_mul(10)?
                .checked_add(u32::from(ch as u8 - b'0'))?;
        } else {
            return None;
        }
    }

    if !saw_letter || !saw_digit || row == 0 {
        return None;
    }
    Some((row - 1, col - 1))
}

/// Column letters for a 0-based column index (0 -> "A", 27 -> "AB").
pub fn column_label(col: u32) -> String {
    let mut label = String::new();
    let mut col = col + 1;
    while col > 0 {
        col -= 1;
        label.insert(0, (b'A' + (col % 26) as u8) as char);
        col /= 26;
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_column_label() {
        assert_eq!(column_label(0), "A");
        assert_eq!(column_label(25), "Z");
        assert_eq!(column_label(26), "AA");
        assert_eq!(column_label(27), "AB");
        assert_eq!(column_label(701), "ZZ");
        assert_eq!(column_label(702), "AAA");
    }

    #[test]
    fn test_to_reference() {
        assert_eq!(to_reference(0, 0), "A1");
        assert_eq!(to_reference(122, 27), "AB123");
        assert_eq!(to_reference(9_999_999, 730), "ABC10000000");
    }

    #[test]
    fn test_to_indices() {
        assert_eq!(to_indices("A1"), Some((0, 0)));
        assert_eq!(to_indices("ab123"), Some((122, 27))); // case insensitive
        assert_eq!(to_indices("AB123"), Some((122, 27)));
    }

    #[test]
    fn test_malformed_references() {
        for bad in ["", "A", "1", "1A", "A0", "A-1", "A1A", "A 1"] {
            assert_eq!(to_indices(bad), None, "{bad:?} should be rejected");
        }
    }

    proptest! {
        #[test]
        fn round_trips(row in 0u32..10_000_000, col in 0u32..20_000) {
            let reference = to_reference(row, col);
            prop_assert_eq!(to_indices(&reference), Some((row, col)));
        }
    }
}
