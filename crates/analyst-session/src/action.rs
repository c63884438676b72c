//! Outbound actions: `{"action": "<name>", ...fields}` text frames.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SessionError;

/// Default region for industry reports.
pub const DEFAULT_REGION: &str = "global";
/// Default time horizon for industry reports.
pub const DEFAULT_TIME_HORIZON: &str = "next 12 months";

/// Action names the WebSocket API routes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionName {
    Chat,
    GetFinancialData,
    GetFundamentalAnalysis,
    GetIndustryReport,
    GetInvestmentAnalysis,
    GetQualitativeQnA,
    GetTickerNews,
    SendMessage,
}

impl ActionName {
    pub const ALL: [ActionName; 8] = [
        ActionName::Chat,
        ActionName::GetFinancialData,
        ActionName::GetFundamentalAnalysis,
        ActionName::GetIndustryReport,
        ActionName::GetInvestmentAnalysis,
        ActionName::GetQualitativeQnA,
        ActionName::GetTickerNews,
        ActionName::SendMessage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionName::Chat => "chat",
            ActionName::GetFinancialData => "getFinancialData",
            ActionName::GetFundamentalAnalysis => "getFundamentalAnalysis",
            ActionName::GetIndustryReport => "getIndustryReport",
            ActionName::GetInvestmentAnalysis => "getInvestmentAnalysis",
            ActionName::GetQualitativeQnA => "getQualitativeQnA",
            ActionName::GetTickerNews => "getTickerNews",
            ActionName::SendMessage => "sendmessage",
        }
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown action: {s}"))
    }
}

/// A request sent to the server. The discriminator is always serialized
/// as `action`; every other field sits beside it at the top level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundAction {
    action: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl OutboundAction {
    /// Free-form action with no payload fields.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            fields: Map::new(),
        }
    }

    /// Add a payload field. A field named `action` is ignored so it cannot
    /// shadow the discriminator.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key == "action" {
            tracing::debug!(action = %self.action, "ignoring payload field named 'action'");
            return self;
        }
        self.fields.insert(key, value.into());
        self
    }

    fn ticker(name: ActionName, tickr: &str) -> Self {
        Self::new(name.as_str()).with_field("tickr", tickr)
    }

    pub fn ticker_news(tickr: &str) -> Self {
        Self::ticker(ActionName::GetTickerNews, tickr)
    }

    pub fn financial_data(tickr: &str) -> Self {
        Self::ticker(ActionName::GetFinancialData, tickr)
    }

    pub fn fundamental_analysis(tickr: &str) -> Self {
        Self::ticker(ActionName::GetFundamentalAnalysis, tickr)
    }

    pub fn investment_analysis(tickr: &str) -> Self {
        Self::ticker(ActionName::GetInvestmentAnalysis, tickr)
    }

    pub fn qualitative_qna(tickr: &str) -> Self {
        Self::ticker(ActionName::GetQualitativeQnA, tickr)
    }

    /// Industry report; `None` region/horizon fall back to the server defaults.
    pub fn industry_report(industry: &str, region: Option<&str>, time_horizon: Option<&str>) -> Self {
        Self::new(ActionName::GetIndustryReport.as_str())
            .with_field("industry", industry)
            .with_field("region", region.unwrap_or(DEFAULT_REGION))
            .with_field("time_horizon", time_horizon.unwrap_or(DEFAULT_TIME_HORIZON))
    }

    pub fn chat(question: &str) -> Self {
        Self::new(ActionName::Chat.as_str()).with_field("question", question)
    }

    pub fn send_message(data: &str) -> Self {
        Self::new(ActionName::SendMessage.as_str()).with_field("data", data)
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Known action name, if the discriminator is one the API routes on.
    pub fn action_name(&self) -> Option<ActionName> {
        self.action.parse().ok()
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Serialize to the text frame sent over the wire.
    pub fn to_frame(&self) -> Result<String, SessionError> {
        serde_json::to_string(self).map_err(|e| SessionError::Parse(e.to_string()))
    }
}
