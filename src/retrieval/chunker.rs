//! Text Chunker - overlapping splits on paragraph/sentence boundaries
//!
//! Sizes are counted in characters, so multi-byte text (Korean regulations,
//! column comments) never splits inside a code point.

/// Chunking configuration
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Characters repeated at the start of the next chunk
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }
}

pub struct TextChunker {
    config: ChunkConfig,
}

impl TextChunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// Split text into trimmed, non-empty chunks of at most `chunk_size` chars
    pub fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let size = self.config.chunk_size;
        let mut chunks = Vec::new();

        let mut start = 0;
        while start < chars.len() {
            let hard_end = (start + size).min(chars.len());
            let end = if hard_end == chars.len() {
                hard_end
            } else {
                self.find_boundary(&chars, start, hard_end)
            };

            let chunk: String = chars[start..end].iter().collect();
            let chunk = chunk.trim();
            if !chunk.is_empty() {
                chunks.push(chunk.to_string());
            }

            if end == chars.len() {
                break;
            }

            let next = end.saturating_sub(self.config.overlap);
            start = if next > start { next } else { end };
        }

        chunks
    }

    /// Best cut point in `(start, hard_end]`: paragraph break, then sentence
    /// end, then whitespace. Only the second half of the window is searched.
    fn find_boundary(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        let floor = start + (self.config.chunk_size / 2).max(1);

        // Paragraph
        for i in (floor..hard_end).rev() {
            if chars[i] == '\n' && i > 0 && chars[i - 1] == '\n' {
                return i + 1;
            }
        }

        // Sentence
        for i in (floor..hard_end).rev() {
            if matches!(chars[i], '.' | '!' | '?' | '。')
                && chars.get(i + 1).map(|c| c.is_whitespace()).unwrap_or(true)
            {
                return i + 1;
            }
        }

        // Word
        for i in (floor..hard_end).rev() {
            if chars[i].is_whitespace() {
                return i + 1;
            }
        }

        hard_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = TextChunker::new(ChunkConfig::new(100, 20));
        assert_eq!(chunker.split("  hello world  "), vec!["hello world"]);
        assert!(chunker.split("   ").is_empty());
    }

    #[test]
    fn test_chunks_respect_size_and_overlap() {
        let text = "Sentence number one. ".repeat(40);
        let chunker = TextChunker::new(ChunkConfig::new(100, 30));
        let chunks = chunker.split(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100);
        }
        // consecutive chunks share text
        let head: String = chunks[1].chars().take(8).collect();
        assert!(chunks[0].contains(&head));
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let text = format!("{}\n\n{}", "a".repeat(70), "b".repeat(70));
        let chunker = TextChunker::new(ChunkConfig::new(100, 0));
        let chunks = chunker.split(&text);
        assert_eq!(chunks[0], "a".repeat(70));
        assert_eq!(chunks[1], "b".repeat(70));
    }

    #[test]
    fn test_multibyte_text() {
        let text = "정산 규정은 다음과 같다. ".repeat(50);
        let chunker = TextChunker::new(ChunkConfig::new(37, 5));
        let chunks = chunker.split(&text);
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.chars().count() <= 37));
    }

    #[test]
    fn test_overlap_clamped() {
        let config = ChunkConfig::new(10, 50);
        assert_eq!(config.overlap, 9);
        let chunks = TextChunker::new(config).split(&"x".repeat(35));
        assert!(chunks.len() >= 4);
    }
}
