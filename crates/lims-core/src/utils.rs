//! 通用工具函数

use chrono::{Datelike, Utc};
use uuid::Uuid;

/// 生成订单号
pub fn generate_order_number() -> String {
    format!(
        "ORD-{}-{}",
        Utc::now().year(),
        Uuid::new_v4().simple().to_string()[..8].to_uppercase()
    )
}

/// 验证检验号格式（字母数字与连字符，非空且不超过32位）
pub fn is_valid_accession_number(accession: &str) -> bool {
    !accession.is_empty()
        && accession.len() <= 32
        && accession
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_order_number() {
        let number = generate_order_number();
        assert!(number.starts_with("ORD-"));
        assert_eq!(number.split('-').count(), 3);
    }

    #[test]
    fn test_is_valid_accession_number() {
        assert!(is_valid_accession_number("ACC-2024-001"));
        assert!(!is_valid_accession_number(""));
        assert!(!is_valid_accession_number("with space"));
    }
}
