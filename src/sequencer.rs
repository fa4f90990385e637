/// Ordered, 0-indexed display tokens of one document snapshot.
///
/// Tokens are the whitespace-separated pieces of the text, kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordSequence {
    words: Vec<String>,
}

impl WordSequence {
    pub fn from_text(text: &str) -> Self {
        Self {
            words: build_sequence(text),
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.words.get(index).map(String::as_str)
    }

}

pub fn build_sequence(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_owned).collect()
}
