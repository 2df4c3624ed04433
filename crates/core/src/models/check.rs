use std::fmt;

use serde::{Deserialize, Serialize};

/// 检查定义：严重与警告两个表达式，空字符串表示未配置
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckDefinition {
    #[serde(default)]
    pub critical_expression: String,
    #[serde(default)]
    pub warning_expression: String,
}

impl CheckDefinition {
    pub fn new(critical: impl Into<String>, warning: impl Into<String>) -> Self {
        Self {
            critical_expression: critical.into(),
            warning_expression: warning.into(),
        }
    }

    pub fn critical_only(critical: impl Into<String>) -> Self {
        Self::new(critical, "")
    }

    pub fn critical(&self) -> Option<&str> {
        non_empty(&self.critical_expression)
    }

    pub fn warning(&self) -> Option<&str> {
        non_empty(&self.warning_expression)
    }

    pub fn expressions(&self) -> impl Iterator<Item = &str> {
        self.critical().into_iter().chain(self.warning())
    }

    pub fn is_empty(&self) -> bool {
        self.critical().is_none() && self.warning().is_none()
    }
}

fn non_empty(expr: &str) -> Option<&str> {
    let trimmed = expr.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// 检查评估结果
///
/// 多序列聚合时取最坏值：Critical > Warning > Ok。
/// `Unknown` 表示评估失败，不参与严重程度比较。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckEvalResult {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "WARNING")]
    Warning,
    #[serde(rename = "CRITICAL")]
    Critical,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl CheckEvalResult {
    pub fn severity(&self) -> Option<u8> {
        match self {
            CheckEvalResult::Ok => Some(0),
            CheckEvalResult::Warning => Some(1),
            CheckEvalResult::Critical => Some(2),
            CheckEvalResult::Unknown => None,
        }
    }

    /// 两个已知结果中更严重的那个；任一方为 Unknown 时结果为 Unknown
    pub fn worst(self, other: Self) -> Self {
        match (self.severity(), other.severity()) {
            (Some(a), Some(b)) => {
                if a >= b {
                    self
                } else {
                    other
                }
            }
            _ => CheckEvalResult::Unknown,
        }
    }

    /// 多序列聚合，空序列视为 Ok
    pub fn worst_of(results: impl IntoIterator<Item = Self>) -> Self {
        results
            .into_iter()
            .fold(CheckEvalResult::Ok, CheckEvalResult::worst)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckEvalResult::Ok => "OK",
            CheckEvalResult::Warning => "WARNING",
            CheckEvalResult::Critical => "CRITICAL",
            CheckEvalResult::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for CheckEvalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worst_of_prefers_higher_severity() {
        use CheckEvalResult::*;
        assert_eq!(CheckEvalResult::worst_of([Ok, Warning, Ok]), Warning);
        assert_eq!(CheckEvalResult::worst_of([Warning, Critical, Ok]), Critical);
        assert_eq!(CheckEvalResult::worst_of([]), Ok);
    }

    #[test]
    fn test_unknown_poisons_aggregation() {
        use CheckEvalResult::*;
        assert_eq!(CheckEvalResult::worst_of([Critical, Unknown]), Unknown);
    }

    #[test]
    fn test_definition_expressions_skip_blank() {
        let def = CheckDefinition::new("max(a) > 1", "   ");
        assert_eq!(def.critical(), Some("max(a) > 1"));
        assert_eq!(def.warning(), None);
        assert_eq!(def.expressions().count(), 1);
        assert!(CheckDefinition::new("", "").is_empty());
    }
}
