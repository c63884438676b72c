//! Per-view response mapping.
//!
//! Every view sends one action and reads its answer out of whichever
//! inbound messages carry the fields it knows about. A [`ViewProfile`]
//! captures that as data: the action name, the fields to extract (as JSON
//! pointers), and which fields mark the final answer.

use serde::Serialize;
use serde_json::Value;

use crate::action::ActionName;
use crate::inbound::InboundMessage;

/// A named field located by a JSON pointer. The empty pointer selects the
/// whole message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub pointer: &'static str,
}

const fn field(name: &'static str, pointer: &'static str) -> FieldSpec {
    FieldSpec { name, pointer }
}

/// When a view has its final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Any of the named fields is present.
    OnFields(&'static [&'static str]),
    /// The first message that is not an acknowledgement.
    FirstNonAck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewProfile {
    pub action: ActionName,
    pub fields: &'static [FieldSpec],
    pub completion: Completion,
}

/// One field value pulled out of an inbound message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewUpdate {
    pub field: &'static str,
    pub value: Value,
}

impl ViewProfile {
    /// Field values carried by `msg`. Acknowledgements carry none.
    pub fn extract(&self, msg: &InboundMessage) -> Vec<ViewUpdate> {
        if msg.is_ack() {
            return Vec::new();
        }
        self.fields
            .iter()
            .filter_map(|f| {
                msg.pointer(f.pointer).map(|v| ViewUpdate {
                    field: f.name,
                    value: v.clone(),
                })
            })
            .collect()
    }

    pub fn is_complete(&self, msg: &InboundMessage) -> bool {
        if msg.is_ack() {
            return false;
        }
        match self.completion {
            Completion::FirstNonAck => true,
            Completion::OnFields(names) => self
                .fields
                .iter()
                .filter(|f| names.contains(&f.name))
                .any(|f| msg.pointer(f.pointer).is_some()),
        }
    }
}

static TICKER_NEWS: ViewProfile = ViewProfile {
    action: ActionName::GetTickerNews,
    fields: &[field("news", "/news"), field("summary", "/summary")],
    completion: Completion::OnFields(&["summary"]),
};

static FINANCIAL_DATA: ViewProfile = ViewProfile {
    action: ActionName::GetFinancialData,
    fields: &[field("investment_response", "/body/investment_response")],
    completion: Completion::OnFields(&["investment_response"]),
};

static FUNDAMENTAL_ANALYSIS: ViewProfile = ViewProfile {
    action: ActionName::GetFundamentalAnalysis,
    fields: &[
        field("financial_summary", "/financial_summary"),
        field("conclusion", "/conclusion"),
        field("income_statement", "/income_statement"),
    ],
    completion: Completion::OnFields(&["financial_summary"]),
};

static INVESTMENT_ANALYSIS: ViewProfile = ViewProfile {
    action: ActionName::GetInvestmentAnalysis,
    fields: &[
        field("investment_summary", "/body/investment_response/investment_summary"),
        field("latest_news", "/body/investment_response/latest_news"),
        field("price_history", "/body/investment_response/price_history"),
        field("knowledge", "/body/investment_response/knowledge"),
    ],
    completion: Completion::OnFields(&[
        "investment_summary",
        "latest_news",
        "price_history",
        "knowledge",
    ]),
};

static QUALITATIVE_QNA: ViewProfile = ViewProfile {
    action: ActionName::GetQualitativeQnA,
    fields: &[field("response", "")],
    completion: Completion::FirstNonAck,
};

static INDUSTRY_REPORT: ViewProfile = ViewProfile {
    action: ActionName::GetIndustryReport,
    fields: &[
        field("industry_report", "/body/industry_report"),
        field("error", "/body/error"),
    ],
    completion: Completion::OnFields(&["industry_report", "error"]),
};

static CHAT: ViewProfile = ViewProfile {
    action: ActionName::Chat,
    fields: &[field("answer", "")],
    completion: Completion::FirstNonAck,
};

/// The request/response views the client can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    TickerNews,
    FinancialData,
    FundamentalAnalysis,
    InvestmentAnalysis,
    QualitativeQnA,
    IndustryReport,
    Chat,
}

impl View {
    pub const ALL: [View; 7] = [
        View::TickerNews,
        View::FinancialData,
        View::FundamentalAnalysis,
        View::InvestmentAnalysis,
        View::QualitativeQnA,
        View::IndustryReport,
        View::Chat,
    ];

    pub fn profile(&self) -> &'static ViewProfile {
        match self {
            View::TickerNews => &TICKER_NEWS,
            View::FinancialData => &FINANCIAL_DATA,
            View::FundamentalAnalysis => &FUNDAMENTAL_ANALYSIS,
            View::InvestmentAnalysis => &INVESTMENT_ANALYSIS,
            View::QualitativeQnA => &QUALITATIVE_QNA,
            View::IndustryReport => &INDUSTRY_REPORT,
            View::Chat => &CHAT,
        }
    }

    pub fn action(&self) -> ActionName {
        self.profile().action
    }

    /// The view that renders responses to `action`, if any.
    pub fn for_action(action: ActionName) -> Option<View> {
        Self::ALL.into_iter().find(|v| v.action() == action)
    }
}
