//! 通用工具函数

/// 将空字符串视为缺失值，非空值原样保留
pub fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

/// 拆分DICOM多值字段（以反斜杠分隔）
pub fn split_multi_value(value: &str) -> Vec<String> {
    value
        .split('\\')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some("CT")), Some("CT".to_string()));
        assert_eq!(non_empty(Some("")), None);
        assert_eq!(non_empty(Some(" DOE^JOHN ")), Some(" DOE^JOHN ".to_string()));
        assert_eq!(non_empty(Some("   ")), Some("   ".to_string()));
        assert_eq!(non_empty(None), None);
    }

    #[test]
    fn test_split_multi_value() {
        assert_eq!(split_multi_value("CT\\SR"), vec!["CT", "SR"]);
        assert_eq!(split_multi_value("MR"), vec!["MR"]);
        assert!(split_multi_value("").is_empty());
        assert_eq!(split_multi_value("CT\\\\PR"), vec!["CT", "PR"]);
    }
}
