//! Parses free-text picks like `"1, 3"` into positions on the displayed page.

/// Why a selection resolved to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InvalidSelection {
    /// No purely numeric token at all.
    NoNumbers,
    /// Numbers were given but none is on the current page.
    OutOfRange,
}

impl InvalidSelection {
    pub fn message(self) -> &'static str {
        match self {
            InvalidSelection::NoNumbers => "⚠️ Please enter valid numbers (e.g., '1, 3').",
            InvalidSelection::OutOfRange => "⚠️ No valid frames selected from the current list.",
        }
    }
}

/// Maps comma-separated 1-based numbers to 0-based positions below `page_len`.
/// Non-numeric tokens and out-of-range numbers are dropped; repeats keep the
/// first occurrence.
pub fn parse_selection(text: &str, page_len: usize) -> Result<Vec<usize>, InvalidSelection> {
    let numbers: Vec<&str> = text
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty() && t.bytes().all(|b| b.is_ascii_digit()))
        .collect();
    if numbers.is_empty() {
        return Err(InvalidSelection::NoNumbers);
    }

    let mut picks: Vec<usize> = Vec::with_capacity(numbers.len());
    for token in numbers {
        // Overflowing values are out of range like any other large number.
        let Ok(n) = token.parse::<usize>() else {
            continue;
        };
        if n == 0 || n > page_len {
            continue;
        }
        let position = n - 1;
        if !picks.contains(&position) {
            picks.push(position);
        }
    }
    if picks.is_empty() {
        Err(InvalidSelection::OutOfRange)
    } else {
        Ok(picks)
    }
}
