/// Accumulates streamed content fragments into the full assistant reply.
///
/// Each exchange owns its own accumulator, so fragments of one stream can never leak into the
/// message of another. Fragments are appended in the order they are pushed; the decoder
/// guarantees that order is the wire order.
#[derive(Debug, Default)]
pub struct FragmentAccumulator {
    content: String,
    fragments: usize,
}

impl FragmentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return everything accumulated so far.
    pub fn push(&mut self, fragment: &str) -> &str {
        self.content.push_str(fragment);
        self.fragments += 1;
        &self.content
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Number of fragments pushed.
    pub fn len(&self) -> usize {
        self.fragments
    }

    pub fn is_empty(&self) -> bool {
        self.fragments == 0
    }

    pub fn into_content(self) -> String {
        self.content
    }
}
