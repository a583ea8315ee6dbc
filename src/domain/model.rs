use serde::{Deserialize, Serialize};
use std::fmt;

/// 缺少 `messages` 欄位等同空陣列
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationRequest {
    #[serde(default)]
    pub messages: Vec<String>,
}

impl ModerationRequest {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// 後端分類法輸出的違規代碼，例如 `S1`、`S8`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViolationCode(String);

impl ViolationCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViolationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ViolationCode {
    fn from(code: String) -> Self {
        Self(code)
    }
}

impl From<&str> for ViolationCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskDimension {
    ThreatOfHarm,
    CommercialSolicitation,
}

impl RiskDimension {
    pub const ALL: [RiskDimension; 2] = [
        RiskDimension::ThreatOfHarm,
        RiskDimension::CommercialSolicitation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskDimension::ThreatOfHarm => "threat_of_harm",
            RiskDimension::CommercialSolicitation => "commercial_solicitation",
        }
    }
}

impl std::str::FromStr for RiskDimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RiskDimension::ALL
            .into_iter()
            .find(|dim| dim.as_str() == s)
            .ok_or_else(|| format!("unknown risk dimension: {}", s))
    }
}

/// 每個維度的分數都在 `[0.0, 1.0]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskScores {
    pub threat_of_harm: f64,
    pub commercial_solicitation: f64,
}

impl RiskScores {
    pub fn get(&self, dimension: RiskDimension) -> f64 {
        match dimension {
            RiskDimension::ThreatOfHarm => self.threat_of_harm,
            RiskDimension::CommercialSolicitation => self.commercial_solicitation,
        }
    }

    /// 二元分數：同一維度被多個代碼命中仍然是 1.0
    pub fn flag(&mut self, dimension: RiskDimension) {
        match dimension {
            RiskDimension::ThreatOfHarm => self.threat_of_harm = 1.0,
            RiskDimension::CommercialSolicitation => self.commercial_solicitation = 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub content: String,
    pub scores: RiskScores,
    pub is_safe: bool,
}

/// 解析後端原始文字的中間結果，不對外輸出
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub violations: Vec<ViolationCode>,
    pub is_safe: bool,
}

/// 與輸入一一對應的逐筆結果，失敗的訊息保留原因而不是直接丟棄
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MessageOutcome {
    #[serde(rename = "ok")]
    Analyzed(AnalysisResult),
    #[serde(rename = "error")]
    Failed { content: String, reason: String },
}

impl MessageOutcome {
    pub fn into_result(self) -> Option<AnalysisResult> {
        match self {
            MessageOutcome::Analyzed(result) => Some(result),
            MessageOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, MessageOutcome::Failed { .. })
    }
}
