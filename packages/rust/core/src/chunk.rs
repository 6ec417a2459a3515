//! Boundary-respecting splitting of long listings into delivery-sized chunks.
//!
//! A chunk never splits a unit (a word or a line). A single unit longer than
//! the limit is emitted whole as its own chunk, so that chunk exceeds the
//! limit. Lengths are counted in characters, not bytes.

/// What counts as an unsplittable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkMode {
    /// Each `\n`-delimited line; blank lines are dropped.
    Line,
    /// Each whitespace-delimited token.
    Word,
}

impl ChunkMode {
    /// Separator reinserted between units inside one chunk.
    fn separator(self) -> char {
        match self {
            Self::Line => '\n',
            Self::Word => ' ',
        }
    }
}

/// Split `text` into chunks of at most `max_len` characters.
///
/// Appending a unit costs its length plus one separator; a new chunk starts
/// whenever that would exceed `max_len`. Empty input yields no chunks.
pub fn chunk(text: &str, max_len: usize, mode: ChunkMode) -> Vec<String> {
    let units: Box<dyn Iterator<Item = &str> + '_> = match mode {
        ChunkMode::Line => Box::new(text.lines().map(str::trim).filter(|l| !l.is_empty())),
        ChunkMode::Word => Box::new(text.split_whitespace()),
    };
    let sep = mode.separator();

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for unit in units {
        let unit_len = unit.chars().count();
        if current.is_empty() {
            current.push_str(unit);
            current_len = unit_len;
        } else if current_len + 1 + unit_len > max_len {
            chunks.push(std::mem::take(&mut current));
            current.push_str(unit);
            current_len = unit_len;
        } else {
            current.push(sep);
            current.push_str(unit);
            current_len += 1 + unit_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
