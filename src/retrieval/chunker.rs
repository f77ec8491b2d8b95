//! 文档分块：按目标长度切块，尽量在段落 / 句子边界断开，块之间保留少量重叠

/// 文档块
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// `<doc_id>#<序号>`
    pub id: String,
    pub text: String,
    pub source: String,
    pub ordinal: usize,
}

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// 目标块大小（字符数）
    pub chunk_size: usize,
    /// 块之间的重叠（字符数）
    pub chunk_overlap: usize,
    /// 断点优先级（从高到低）
    pub separators: Vec<&'static str>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            separators: vec!["\n\n", "\n", ". ", "; ", ", ", " "],
        }
    }
}

impl ChunkingConfig {
    pub fn sized(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// 切块（按字符计数，UTF-8 安全）；空白块丢弃
    pub fn chunk(&self, doc_id: &str, text: &str) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < total {
            let hard_end = (start + self.config.chunk_size).min(total);
            let end = if hard_end < total {
                self.soft_break(&chars[start..hard_end])
                    .map(|offset| start + offset)
                    .unwrap_or(hard_end)
            } else {
                hard_end
            };

            let piece: String = chars[start..end].iter().collect();
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                let ordinal = chunks.len();
                chunks.push(Chunk {
                    id: format!("{}#{}", doc_id, ordinal),
                    text: trimmed.to_string(),
                    source: doc_id.to_string(),
                    ordinal,
                });
            }

            if end >= total {
                break;
            }
            let next = end.saturating_sub(self.config.chunk_overlap.min(end - start));
            start = if next > start { next } else { end };
        }

        chunks
    }

    /// 在窗口内找最后一个优先级最高的分隔符，返回断点（分隔符之后）的字符偏移
    fn soft_break(&self, window: &[char]) -> Option<usize> {
        let window: String = window.iter().collect();
        self.config.separators.iter().find_map(|sep| {
            window
                .rfind(sep)
                .map(|pos| window[..pos].chars().count() + sep.chars().count())
                .filter(|offset| *offset > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_document_is_one_chunk() {
        let chunks = Chunker::default().chunk("guide", "  Amoxicillin is first-line.  ");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Amoxicillin is first-line.");
        assert_eq!(chunks[0].id, "guide#0");
    }

    #[test]
    fn test_breaks_on_sentence_boundary() {
        let chunker = Chunker::new(ChunkingConfig::sized(40, 0));
        let text = "Fever is common in influenza. Cough may persist for weeks after.";
        let chunks = chunker.chunk("doc", text);
        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0].text, "Fever is common in influenza.");
        assert!(chunks.iter().all(|c| c.source == "doc"));
    }

    #[test]
    fn test_empty_document() {
        assert!(Chunker::default().chunk("doc", "   \n ").is_empty());
    }

    #[test]
    fn test_always_makes_progress_without_separators() {
        let chunker = Chunker::new(ChunkingConfig::sized(4, 2));
        let chunks = chunker.chunk("doc", "abcdefghij");
        assert!(!chunks.is_empty());
        assert_eq!(chunks.last().map(|c| c.text.ends_with('j')), Some(true));
    }
}
