use async_trait::async_trait;
use dashmap::DashMap;
use log::info;

use crate::{
    core::{
        envelope::{Intent, DEFAULT_CALLER},
        error::BridgeResult,
        traits::{ActionExecutor, ActionOutcome},
    },
    processing_error,
};

const EMI_TRANSACTION: &str = "TXN123456";
const EMI_TENURE_MONTHS: u32 = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardStatus {
    Active,
    Blocked,
}

/// Mock card account backing the demo actions.
#[derive(Debug, Clone)]
pub struct CardAccount {
    pub card_number: String,
    pub card_status: CardStatus,
    pub credit_limit: u64,
    pub available_credit: u64,
    pub delivery_status: String,
    pub delivery_date: String,
    pub overdue_amount: u64,
    pub due_date: String,
    pub outstanding_balance: u64,
}

impl Default for CardAccount {
    fn default() -> Self {
        Self {
            card_number: "****1234".to_string(),
            card_status: CardStatus::Active,
            credit_limit: 50_000,
            available_credit: 35_000,
            delivery_status: "in_transit".to_string(),
            delivery_date: "2024-01-15".to_string(),
            overdue_amount: 0,
            due_date: "2024-01-25".to_string(),
            outstanding_balance: 15_000,
        }
    }
}

/// In-memory stand-in for the card management backend.
///
/// Every identity gets its own account, seeded from the default profile
/// on first use.
#[derive(Debug)]
pub struct MockActionExecutor {
    accounts: DashMap<String, CardAccount>,
}

impl Default for MockActionExecutor {
    fn default() -> Self {
        let accounts = DashMap::new();
        accounts.insert(DEFAULT_CALLER.to_string(), CardAccount::default());
        Self { accounts }
    }
}

impl MockActionExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(&self, user_id: &str) -> Option<CardAccount> {
        self.accounts.get(user_id).map(|a| a.clone())
    }

    fn block_card(account: &mut CardAccount) -> String {
        if account.card_status == CardStatus::Blocked {
            return format!("Your card {} is already blocked.", account.card_number);
        }
        account.card_status = CardStatus::Blocked;
        format!(
            "Your card {} has been blocked successfully. A replacement card will be dispatched within 7 working days.",
            account.card_number
        )
    }

    fn delivery_status(account: &CardAccount) -> String {
        format!(
            "Your card is {}. Expected delivery date: {}.",
            account.delivery_status.replace('_', " "),
            account.delivery_date
        )
    }

    fn convert_to_emi(account: &CardAccount) -> String {
        let monthly = account.outstanding_balance / u64::from(EMI_TENURE_MONTHS);
        format!(
            "Transaction {EMI_TRANSACTION} has been converted to {EMI_TENURE_MONTHS} monthly EMIs of {monthly} on card {}.",
            account.card_number
        )
    }

    fn statement(account: &CardAccount) -> String {
        format!(
            "Your latest statement for card {} is ready: outstanding balance {}, minimum due by {}.",
            account.card_number, account.outstanding_balance, account.due_date
        )
    }

    fn due_amount(account: &CardAccount) -> String {
        format!(
            "Your outstanding balance is {} due on {}. Overdue amount: {}.",
            account.outstanding_balance, account.due_date, account.overdue_amount
        )
    }
}

#[async_trait]
impl ActionExecutor for MockActionExecutor {
    async fn execute(
        &self,
        intent: Intent,
        _text: &str,
        identity: &str,
    ) -> BridgeResult<ActionOutcome> {
        if !intent.is_action() {
            return Err(processing_error!("Unknown action intent: {}", intent));
        }

        info!("Executing action {intent} for user '{identity}'");
        let mut account = self.accounts.entry(identity.to_string()).or_default();
        let message = match intent {
            Intent::BlockCard => Self::block_card(&mut account),
            Intent::CheckDeliveryStatus => Self::delivery_status(&account),
            Intent::ConvertToEmi => Self::convert_to_emi(&account),
            Intent::DownloadStatement => Self::statement(&account),
            Intent::CheckDueAmount => Self::due_amount(&account),
            _ => return Err(processing_error!("Unknown action intent: {}", intent)),
        };

        Ok(ActionOutcome {
            message,
            action: Some(intent.as_str().to_string()),
        })
    }
}
