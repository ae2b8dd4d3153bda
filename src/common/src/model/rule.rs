use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    Onetime,
    Scheduled,
    Kinesis,
    Sns,
    Sqs,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Onetime => "onetime",
            RuleType::Scheduled => "scheduled",
            RuleType::Kinesis => "kinesis",
            RuleType::Sns => "sns",
            RuleType::Sqs => "sqs",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "onetime" => Some(RuleType::Onetime),
            "scheduled" => Some(RuleType::Scheduled),
            "kinesis" => Some(RuleType::Kinesis),
            "sns" => Some(RuleType::Sns),
            "sqs" => Some(RuleType::Sqs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleState {
    Enabled,
    Disabled,
}

impl RuleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleState::Enabled => "ENABLED",
            RuleState::Disabled => "DISABLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ENABLED" => Some(RuleState::Enabled),
            "DISABLED" => Some(RuleState::Disabled),
            _ => None,
        }
    }
}

/// Scheduling trigger that may reference a provider by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub rule_type: RuleType,
    pub workflow: String,
    pub state: RuleState,
}

impl Rule {
    pub fn references(&self, provider: &str) -> bool {
        self.provider.as_deref() == Some(provider)
    }
}
