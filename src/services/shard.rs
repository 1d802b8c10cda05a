//! 分片划分
//!
//! 第 `i` 条记录属于第 `k` 个分片，当且仅当 `i mod S == k`

/// 分片划分器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardPartitioner {
    shard_id: usize,
    shard_count: usize,
}

impl ShardPartitioner {
    /// `shard_count` 必须大于 0 且 `shard_id < shard_count`，由 `Config::validate` 保证
    pub fn new(shard_id: usize, shard_count: usize) -> Self {
        debug_assert!(shard_count > 0 && shard_id < shard_count);
        Self {
            shard_id,
            shard_count: shard_count.max(1),
        }
    }

    pub fn shard_id(&self) -> usize {
        self.shard_id
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    /// 该 index 是否属于本分片
    pub fn owns(&self, index: usize) -> bool {
        index % self.shard_count == self.shard_id
    }

    /// 本分片在 `[start, end)` 内拥有的 index，按升序
    pub fn indices(&self, start: usize, end: usize) -> impl Iterator<Item = usize> + '_ {
        (start..end).filter(move |i| self.owns(*i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_partitions_are_disjoint_and_complete() {
        for n in [0usize, 1, 7, 100, 2501] {
            for s in 1..=8 {
                let mut seen = HashSet::new();
                for k in 0..s {
                    let part = ShardPartitioner::new(k, s);
                    for i in part.indices(0, n) {
                        assert!(seen.insert(i), "index {} 出现在多个分片中 (S={})", i, s);
                    }
                }
                assert_eq!(seen.len(), n);
                assert!((0..n).all(|i| seen.contains(&i)));
            }
        }
    }

    #[test]
    fn test_owns() {
        let part = ShardPartitioner::new(1, 3);
        assert!(part.owns(1));
        assert!(part.owns(4));
        assert!(!part.owns(0));
        assert!(!part.owns(5));
        assert_eq!(part.indices(2, 11).collect::<Vec<_>>(), vec![4, 7, 10]);
    }

    #[test]
    fn test_single_shard_owns_everything() {
        let part = ShardPartitioner::new(0, 1);
        assert!((0..50).all(|i| part.owns(i)));
    }
}
