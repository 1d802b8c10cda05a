use serde::{Deserialize, Serialize};

/// 表格中的一段单元格区域（同一行，列从 1 开始，闭区间）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRange {
    pub row: u32,
    pub start_col: u32,
    pub end_col: u32,
}

impl CellRange {
    pub fn new(row: u32, start_col: u32, end_col: u32) -> Self {
        Self {
            row,
            start_col,
            end_col,
        }
    }

    /// 单个单元格
    pub fn cell(row: u32, col: u32) -> Self {
        Self::new(row, col, col)
    }

    pub fn width(&self) -> usize {
        (self.end_col.saturating_sub(self.start_col) + 1) as usize
    }

    /// 转换为 A1 表示法，如 `Sheet1!K3:V3`
    pub fn to_a1(&self, sheet_name: &str) -> String {
        format!(
            "{}!{}{}:{}{}",
            sheet_name,
            column_letter(self.start_col),
            self.row,
            column_letter(self.end_col),
            self.row
        )
    }
}

/// 缓冲中的一条更新
///
/// 按行号绝对寻址，重复写入相同内容是幂等的
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferedUpdate {
    pub location: CellRange,
    pub values: Vec<String>,
}

impl BufferedUpdate {
    pub fn new(location: CellRange, values: Vec<String>) -> Self {
        Self { location, values }
    }
}

/// 列号转字母：1 -> A, 26 -> Z, 27 -> AA
pub fn column_letter(mut col: u32) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = ((col - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        col = (col - 1) / 26;
    }
    letters.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letter() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(10), "J");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(column_letter(52), "AZ");
        assert_eq!(column_letter(703), "AAA");
    }

    #[test]
    fn test_to_a1() {
        assert_eq!(CellRange::cell(3, 1).to_a1("Sheet16"), "Sheet16!A3:A3");
        assert_eq!(CellRange::new(2, 11, 22).to_a1("Data"), "Data!K2:V2");
        assert_eq!(CellRange::new(2, 11, 22).width(), 12);
    }
}
