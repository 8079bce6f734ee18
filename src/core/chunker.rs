use std::collections::VecDeque;

const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// 遞迴字元切分：依序嘗試較粗的分隔符，片段仍太長才改用較細的分隔符。
/// 分隔符保留在後一個片段的開頭，長度以字元數計算，
/// 相鄰 chunk 之間保留 `chunk_overlap` 字元的重疊。
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        // 選第一個出現在文字中的分隔符，空字串永遠符合
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep.as_str()))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).map(String::as_str).unwrap_or("");
        let finer = separators.get(position + 1..).unwrap_or(&[]);

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge_splits(&pending));
                pending.clear();
            }

            if finer.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_recursive(&piece, finer));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge_splits(&pending));
        }

        chunks
    }

    fn merge_splits(&self, splits: &[String]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for split in splits {
            let len = char_len(split);

            if total + len > self.chunk_size && !current.is_empty() {
                push_joined(&mut docs, &current);

                // 從前面丟棄，直到剩下的長度不超過 overlap 且放得下新片段
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    let Some(first) = current.pop_front() else {
                        break;
                    };
                    total = total.saturating_sub(char_len(first));
                }
            }

            current.push_back(split.as_str());
            total += len;
        }

        push_joined(&mut docs, &current);
        docs
    }
}

/// `a\n\nb` 以 `\n\n` 切分得到 `["a", "\n\nb"]`；空分隔符逐字切分
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(|c| c.to_string()).collect();
    }

    let mut parts = text.split(separator);
    let mut splits: Vec<String> = parts.next().map(str::to_string).into_iter().collect();
    splits.extend(parts.map(|part| format!("{}{}", separator, part)));
    splits.retain(|s| !s.is_empty());
    splits
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn push_joined(docs: &mut Vec<String>, parts: &VecDeque<&str>) {
    let joined: String = parts.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}
