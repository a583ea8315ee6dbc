use crate::domain::model::{RiskDimension, RiskScores, Verdict, ViolationCode};
use std::collections::HashMap;

/// 解析後端的自由文字判定。
///
/// 第一行是 `safe` / `unsafe`，第二行（若有）是以逗號分隔的違規代碼。
/// 只要全文出現 "unsafe"（不分大小寫）就視為不安全，容許模型在前後多吐字。
pub fn parse_verdict(raw: &str) -> Verdict {
    let is_safe = !raw.to_lowercase().contains("unsafe");

    let violations = match raw.split('\n').nth(1) {
        Some(line) => line
            .trim()
            .split(',')
            .map(|token| ViolationCode::new(token.trim()))
            .collect(),
        None => Vec::new(),
    };

    Verdict {
        violations,
        is_safe,
    }
}

/// 違規代碼到風險維度的對照表。新增維度或代碼只需要改資料，不用動解析流程。
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreTable {
    codes: HashMap<ViolationCode, RiskDimension>,
}

impl Default for ScoreTable {
    fn default() -> Self {
        Self::empty()
            .with_code("S1", RiskDimension::ThreatOfHarm)
            .with_code("S2", RiskDimension::CommercialSolicitation)
            .with_code("S8", RiskDimension::CommercialSolicitation)
    }
}

impl ScoreTable {
    pub fn empty() -> Self {
        Self {
            codes: HashMap::new(),
        }
    }

    pub fn with_code(mut self, code: impl Into<ViolationCode>, dimension: RiskDimension) -> Self {
        self.insert(code, dimension);
        self
    }

    pub fn insert(&mut self, code: impl Into<ViolationCode>, dimension: RiskDimension) {
        self.codes.insert(code.into(), dimension);
    }

    pub fn dimension_for(&self, code: &ViolationCode) -> Option<RiskDimension> {
        self.codes.get(code).copied()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// 未知代碼直接忽略
    pub fn score(&self, violations: &[ViolationCode]) -> RiskScores {
        let mut scores = RiskScores::default();
        for code in violations {
            let trimmed = ViolationCode::new(code.as_str().trim());
            if let Some(dimension) = self.dimension_for(&trimmed) {
                scores.flag(dimension);
            }
        }
        scores
    }

    pub fn judge(&self, raw: &str) -> (RiskScores, bool) {
        let verdict = parse_verdict(raw);
        (self.score(&verdict.violations), verdict.is_safe)
    }
}
