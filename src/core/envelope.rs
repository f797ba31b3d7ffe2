//! Wire types exchanged between the publish and consume sides.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the two independent processing pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    Knowledge,
    Action,
}

impl Lane {
    pub const ALL: [Lane; 2] = [Lane::Knowledge, Lane::Action];

    /// Fixed routing key binding this lane's queue to the exchange.
    pub fn routing_key(&self) -> &'static str {
        match self {
            Lane::Knowledge => "knowledge",
            Lane::Action => "action",
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.routing_key()
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved intent of a request, plus the two result-only tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    CheckDeliveryStatus,
    BlockCard,
    DownloadStatement,
    ConvertToEmi,
    CheckDueAmount,
    Greeting,
    AccountInfo,
    TransactionQuery,
    BillQuery,
    RepaymentQuery,
    AuthorizationRequired,
    Error,
    // unknown tags from older producers land here
    #[serde(other)]
    KnowledgeQuery,
}

impl Intent {
    /// Intents the action lane is allowed to execute.
    pub const ACTIONS: [Intent; 5] = [
        Intent::BlockCard,
        Intent::CheckDeliveryStatus,
        Intent::ConvertToEmi,
        Intent::DownloadStatement,
        Intent::CheckDueAmount,
    ];

    pub fn is_action(&self) -> bool {
        Self::ACTIONS.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::CheckDeliveryStatus => "CHECK_DELIVERY_STATUS",
            Intent::BlockCard => "BLOCK_CARD",
            Intent::DownloadStatement => "DOWNLOAD_STATEMENT",
            Intent::ConvertToEmi => "CONVERT_TO_EMI",
            Intent::CheckDueAmount => "CHECK_DUE_AMOUNT",
            Intent::Greeting => "GREETING",
            Intent::KnowledgeQuery => "KNOWLEDGE_QUERY",
            Intent::AccountInfo => "ACCOUNT_INFO",
            Intent::TransactionQuery => "TRANSACTION_QUERY",
            Intent::BillQuery => "BILL_QUERY",
            Intent::RepaymentQuery => "REPAYMENT_QUERY",
            Intent::AuthorizationRequired => "AUTHORIZATION_REQUIRED",
            Intent::Error => "ERROR",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message placed on a lane. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(alias = "request_id")]
    pub correlation_id: String,
    #[serde(alias = "message")]
    pub text: String,
    #[serde(alias = "user_id", default = "RequestEnvelope::default_caller")]
    pub caller_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "RequestEnvelope::default_channel")]
    pub channel: String,
}

impl RequestEnvelope {
    fn default_caller() -> String {
        DEFAULT_CALLER.to_string()
    }

    fn default_channel() -> String {
        DEFAULT_CHANNEL.to_string()
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }
}

pub const DEFAULT_CALLER: &str = "default_user";
pub const DEFAULT_CHANNEL: &str = "web";

/// Outcome written by a lane worker for exactly one request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub correlation_id: String,
    pub response: String,
    pub intent: Intent,
    #[serde(default)]
    pub action_taken: Option<String>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_auth: Option<bool>,
}

impl ResultEnvelope {
    pub fn new(
        correlation_id: impl Into<String>,
        response: impl Into<String>,
        intent: Intent,
        confidence: f64,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            response: response.into(),
            intent,
            action_taken: None,
            confidence,
            requires_auth: None,
        }
    }

    pub fn with_action(mut self, action: Option<String>) -> Self {
        self.action_taken = action;
        self
    }

    /// Structured ERROR result; the correlation id still gets a value.
    pub fn error(correlation_id: impl Into<String>, response: impl Into<String>) -> Self {
        Self::new(correlation_id, response, Intent::Error, 0.0)
    }

    /// Prompt to authenticate, produced by the action lane's gate.
    pub fn authorization_required(
        correlation_id: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self {
            requires_auth: Some(true),
            ..Self::new(correlation_id, response, Intent::AuthorizationRequired, 1.0)
        }
    }

    pub fn requires_auth(&self) -> bool {
        self.requires_auth.unwrap_or(false)
    }
}

/// Front-door request body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(alias = "user_id", default = "RequestEnvelope::default_caller")]
    pub caller_id: String,
    #[serde(default = "RequestEnvelope::default_channel")]
    pub channel: String,
    #[serde(default)]
    pub token: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            caller_id: DEFAULT_CALLER.to_string(),
            channel: DEFAULT_CHANNEL.to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Front-door response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub intent: Intent,
    pub action_taken: Option<String>,
    pub confidence: f64,
}

impl From<ResultEnvelope> for ChatResponse {
    fn from(result: ResultEnvelope) -> Self {
        Self {
            response: result.response,
            intent: result.intent,
            action_taken: result.action_taken,
            confidence: result.confidence,
        }
    }
}
