//! 平坦 L2 向量索引
//!
//! 序号即插入顺序，与病例记忆的条目日志一一对应；暴力检索，按平方欧氏距离升序返回。
//! 持久化为独立文件，与条目日志互不依赖。

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::memory::MemoryError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlatIndex {
    dimensions: Option<usize>,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入一个向量，返回其序号；维度由第一次插入决定
    pub fn add(&mut self, vector: Vec<f32>) -> Result<usize, MemoryError> {
        if vector.is_empty() {
            return Err(MemoryError::Index("cannot index an empty vector".to_string()));
        }
        match self.dimensions {
            Some(d) if d != vector.len() => {
                return Err(MemoryError::Index(format!(
                    "dimension mismatch: index has {}, got {}",
                    d,
                    vector.len()
                )))
            }
            None => self.dimensions = Some(vector.len()),
            _ => {}
        }
        self.vectors.push(vector);
        Ok(self.vectors.len() - 1)
    }

    /// 返回距离最近的至多 k 个 (序号, 平方距离)，k 自动截断到索引大小
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if self.dimensions != Some(query.len()) {
            return Vec::new();
        }
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, squared_l2(query, v)))
            .collect();
        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    pub async fn save(&self, path: &Path) -> Result<(), MemoryError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_vec(self)?).await?;
        Ok(())
    }

    pub async fn load(path: &Path) -> Result<Self, MemoryError> {
        let data = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&data)?)
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}
