//! 分词：供哈希嵌入与文档关键词检索使用
//!
//! 临床文本以英文为主，按字母数字串切分并小写；单字符（除数字外）丢弃。

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

static WORD: OnceLock<Regex> = OnceLock::new();

fn word_regex() -> &'static Regex {
    WORD.get_or_init(|| {
        Regex::new(r"[\p{L}\p{N}]+(?:[-'][\p{L}\p{N}]+)*").expect("word pattern is a valid regex")
    })
}

/// 切分为小写词序列（保留顺序与重复）
pub fn tokenize(text: &str) -> Vec<String> {
    word_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|w| w.chars().count() > 1 || w.chars().all(|c| c.is_numeric()))
        .collect()
}

/// 分词并返回词集合（用于相似度计算）
pub fn tokenize_to_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// 计算两个词集合的相似度（Jaccard 相似度）
pub fn jaccard_similarity(set1: &HashSet<String>, set2: &HashSet<String>) -> f32 {
    if set1.is_empty() || set2.is_empty() {
        return 0.0;
    }
    let intersection = set1.intersection(set2).count() as f32;
    let union = set1.union(set2).count() as f32;
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lowercases_and_splits_punctuation() {
        assert_eq!(
            tokenize("Fever, chills; COUGH."),
            vec!["fever", "chills", "cough"]
        );
    }

    #[test]
    fn test_tokenize_keeps_hyphenated_terms_and_digits() {
        assert_eq!(
            tokenize("beta-blocker 5 mg x"),
            vec!["beta-blocker", "5", "mg"]
        );
    }

    #[test]
    fn test_jaccard() {
        let a = tokenize_to_set("fever cough");
        let b = tokenize_to_set("cough rash");
        assert!((jaccard_similarity(&a, &b) - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(jaccard_similarity(&a, &HashSet::new()), 0.0);
    }
}
